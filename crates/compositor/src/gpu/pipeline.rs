use bytemuck::{Pod, Zeroable};
use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;

use crate::compile::{
    compile_stage, LIVE_FRAGMENT_GLSL, QUAD_VERTEX_GLSL, STORED_FRAGMENT_GLSL,
};
use crate::error::CompositorError;

/// Format of every ring slot.
pub(crate) const RING_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

/// Full-screen quad as a four-vertex triangle strip; v grows downwards so
/// texture row zero lands at the top of the target.
const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

pub(crate) struct QuadGeometry {
    pub buffer: wgpu::Buffer,
    pub vertex_count: u32,
}

impl QuadGeometry {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fullscreen quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            buffer,
            vertex_count: QUAD_VERTICES.len() as u32,
        }
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        }
    }
}

/// Programs and layouts shared by capture, playback and overlay draws.
pub(crate) struct SamplingPipelines {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
    /// Live texture into a ring slot.
    pub capture: wgpu::RenderPipeline,
    /// Live texture into the PiP viewport of the surface.
    pub overlay: wgpu::RenderPipeline,
    /// Ring slot over the whole surface.
    pub playback: wgpu::RenderPipeline,
}

impl SamplingPipelines {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, CompositorError> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("live uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sampled texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertex = compile_stage(device, "quad vertex", QUAD_VERTEX_GLSL, ShaderStage::Vertex)?;
        let live_fragment = compile_stage(
            device,
            "live fragment",
            LIVE_FRAGMENT_GLSL,
            ShaderStage::Fragment,
        )?;
        let stored_fragment = compile_stage(
            device,
            "stored fragment",
            STORED_FRAGMENT_GLSL,
            ShaderStage::Fragment,
        )?;

        let live_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("live pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let stored_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stored pipeline layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });

        let capture = link(
            device,
            "capture pipeline",
            &live_layout,
            &vertex,
            &live_fragment,
            RING_FORMAT,
        )?;
        let overlay = link(
            device,
            "overlay pipeline",
            &live_layout,
            &vertex,
            &live_fragment,
            surface_format,
        )?;
        let playback = link(
            device,
            "playback pipeline",
            &stored_layout,
            &vertex,
            &stored_fragment,
            surface_format,
        )?;

        Ok(Self {
            uniform_layout,
            texture_layout,
            sampler,
            capture,
            overlay,
            playback,
        })
    }

    /// Binds `view` with the shared sampler for use at group `texture_layout`.
    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

fn link(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline, CompositorError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[QuadGeometry::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(CompositorError::Link {
            label: label.to_string(),
            diagnostics: err.to_string(),
        });
    }
    Ok(pipeline)
}

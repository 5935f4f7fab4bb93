use crate::live::LiveFrame;

use super::pipeline::SamplingPipelines;
use super::uniforms::LiveUniforms;

/// Texture holding the most recent source frame plus its transform uniform.
pub(crate) struct LiveInput {
    pub texture: wgpu::Texture,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pub texture_bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl LiveInput {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &SamplingPipelines,
        width: u32,
        height: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("live input"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let texture_bind_group = pipelines.texture_bind_group(device, "live texture bind group", &view);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("live uniforms"),
            size: std::mem::size_of::<LiveUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("live uniform bind group"),
            layout: &pipelines.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            texture,
            uniform_buffer,
            uniform_bind_group,
            texture_bind_group,
            width,
            height,
        }
    }

    /// Copies `frame` into the texture and its transform into the uniform.
    ///
    /// The frame must already match the texture size; the sink checks this.
    pub fn write(&self, queue: &wgpu::Queue, frame: &LiveFrame) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        let uniforms = LiveUniforms::new(frame.transform);
        queue.write_buffer(&self.uniform_buffer, 0, uniforms.as_bytes());
    }

    pub fn destroy(self) {
        self.texture.destroy();
        self.uniform_buffer.destroy();
    }
}

use tracing::debug;

use crate::error::CompositorError;

use super::pipeline::{SamplingPipelines, RING_FORMAT};

const SLOT_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING);

pub(crate) struct RingSlot {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
}

/// Offscreen color targets backing the delay ring, created and destroyed
/// together.
pub(crate) struct RingTargets {
    pub slots: Vec<RingSlot>,
    pub width: u32,
    pub height: u32,
}

impl RingTargets {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &SamplingPipelines,
        capacity: usize,
        width: u32,
        height: u32,
    ) -> Result<Self, CompositorError> {
        let mut targets = Self {
            slots: Vec::with_capacity(capacity),
            width,
            height,
        };
        for index in 0..capacity {
            match create_slot(device, pipelines, index, width, height) {
                Ok(slot) => targets.slots.push(slot),
                Err(err) => {
                    targets.destroy();
                    return Err(err);
                }
            }
        }
        let bytes = capacity as u64 * u64::from(width) * u64::from(height) * 4;
        debug!(capacity, width, height, bytes, "allocated ring targets");
        Ok(targets)
    }

    pub fn slot(&self, index: usize) -> Result<&RingSlot, CompositorError> {
        self.slots.get(index).ok_or_else(|| {
            CompositorError::Runtime(format!(
                "ring slot {index} out of range for capacity {}",
                self.slots.len()
            ))
        })
    }

    pub fn destroy(&mut self) {
        for slot in self.slots.drain(..) {
            slot.texture.destroy();
        }
    }
}

fn create_slot(
    device: &wgpu::Device,
    pipelines: &SamplingPipelines,
    index: usize,
    width: u32,
    height: u32,
) -> Result<RingSlot, CompositorError> {
    let incomplete = |status: String| CompositorError::IncompleteRenderTarget { index, status };

    let max_dimension = device.limits().max_texture_dimension_2d;
    if width > max_dimension || height > max_dimension {
        return Err(incomplete(format!(
            "{width}x{height} exceeds device limit {max_dimension}"
        )));
    }

    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("ring slot"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RING_FORMAT,
        usage: SLOT_USAGE,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = pipelines.texture_bind_group(device, "ring slot bind group", &view);
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    if let Some(err) = validation.or(out_of_memory) {
        texture.destroy();
        return Err(incomplete(err.to_string()));
    }

    let extent = texture.size();
    if texture.format() != RING_FORMAT
        || !texture.usage().contains(SLOT_USAGE)
        || extent.width != width
        || extent.height != height
    {
        texture.destroy();
        return Err(incomplete(format!(
            "got {:?} {}x{} {:?}",
            texture.format(),
            extent.width,
            extent.height,
            texture.usage()
        )));
    }

    Ok(RingSlot {
        texture,
        view,
        bind_group,
    })
}

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, trace, warn};

use crate::backend::{BackendSetup, GpuBackend, PresentStatus};
use crate::error::CompositorError;
use crate::live::LiveFrame;
use crate::overlay::PipViewport;
use crate::types::SurfaceSize;

use super::context::GpuContext;
use super::live::LiveInput;
use super::pipeline::{QuadGeometry, SamplingPipelines};
use super::ring::RingTargets;

/// Surface image acquired for the current tick and the commands recorded
/// against it so far.
struct PendingFrame {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    size: SurfaceSize,
}

/// [`GpuBackend`] rendering through wgpu into a native window surface.
///
/// Every resource sits in an `Option` so teardown can run after a partial
/// setup and any number of times.
pub struct WgpuBackend {
    frame: Option<PendingFrame>,
    pipelines: Option<SamplingPipelines>,
    quad: Option<QuadGeometry>,
    live: Option<LiveInput>,
    ring: Option<RingTargets>,
    context: Option<GpuContext>,
    torn_down: bool,
    // Keeps the native window alive for as long as the surface exists.
    _target: Arc<dyn Any + Send + Sync>,
}

impl WgpuBackend {
    /// Creates the context, programs, quad and live texture for `target`.
    pub fn new<S>(target: Arc<S>, setup: &BackendSetup) -> Result<Self, CompositorError>
    where
        S: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let context = GpuContext::new(&*target, setup.surface_size)?;
        let pipelines = SamplingPipelines::new(&context.device, context.surface_format)?;
        let quad = QuadGeometry::new(&context.device);
        let live = LiveInput::new(
            &context.device,
            &pipelines,
            setup.config.frame_width,
            setup.config.frame_height,
        );
        debug!(
            width = setup.config.frame_width,
            height = setup.config.frame_height,
            format = ?context.surface_format,
            "wgpu backend ready"
        );

        Ok(Self {
            frame: None,
            pipelines: Some(pipelines),
            quad: Some(quad),
            live: Some(live),
            ring: None,
            context: Some(context),
            torn_down: false,
            _target: target,
        })
    }

    fn context(&self) -> Result<&GpuContext, CompositorError> {
        self.context
            .as_ref()
            .ok_or_else(|| CompositorError::Runtime("graphics context released".to_string()))
    }

    fn check_fault(&self) -> Result<(), CompositorError> {
        match self.context()?.take_fault() {
            Some(fault) => Err(CompositorError::Runtime(fault)),
            None => Ok(()),
        }
    }
}

fn missing(what: &str) -> CompositorError {
    CompositorError::Runtime(format!("{what} not initialised"))
}

impl GpuBackend for WgpuBackend {
    fn allocate_ring(
        &mut self,
        capacity: usize,
        width: u32,
        height: u32,
    ) -> Result<(), CompositorError> {
        let context = self.context.as_ref().ok_or_else(|| missing("graphics context"))?;
        let pipelines = self.pipelines.as_ref().ok_or_else(|| missing("pipelines"))?;
        if let Some(mut previous) = self.ring.take() {
            previous.destroy();
        }
        let ring = RingTargets::new(&context.device, pipelines, capacity, width, height)?;
        self.ring = Some(ring);
        Ok(())
    }

    fn upload_live(&mut self, frame: &LiveFrame) -> Result<(), CompositorError> {
        let context = self.context()?;
        let live = self.live.as_ref().ok_or_else(|| missing("live input"))?;
        live.write(&context.queue, frame);
        Ok(())
    }

    fn capture_live(&mut self, slot: usize) -> Result<(), CompositorError> {
        let context = self.context()?;
        let pipelines = self.pipelines.as_ref().ok_or_else(|| missing("pipelines"))?;
        let quad = self.quad.as_ref().ok_or_else(|| missing("quad geometry"))?;
        let live = self.live.as_ref().ok_or_else(|| missing("live input"))?;
        let ring = self.ring.as_ref().ok_or_else(|| missing("ring"))?;
        let target = ring.slot(slot)?;

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("capture encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("capture pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_viewport(
                0.0,
                0.0,
                ring.width as f32,
                ring.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(&pipelines.capture);
            render_pass.set_bind_group(0, &live.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, &live.texture_bind_group, &[]);
            render_pass.set_vertex_buffer(0, quad.buffer.slice(..));
            render_pass.draw(0..quad.vertex_count, 0..1);
        }
        context.queue.submit(std::iter::once(encoder.finish()));
        self.check_fault()
    }

    fn begin_present(&mut self, surface: SurfaceSize) -> Result<PresentStatus, CompositorError> {
        self.frame = None;
        let context = self.context.as_mut().ok_or_else(|| missing("graphics context"))?;
        if surface.is_empty() {
            return Ok(PresentStatus::Skipped);
        }
        if surface != context.size {
            trace!(width = surface.width, height = surface.height, "resizing surface");
            context.resize(surface);
        }

        let surface_texture = match context.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Timeout) => {
                trace!("surface acquire timed out");
                return Ok(PresentStatus::Skipped);
            }
            Err(wgpu::SurfaceError::Outdated) => {
                debug!("surface outdated, reconfiguring");
                context.reconfigure();
                return Ok(PresentStatus::Skipped);
            }
            Err(wgpu::SurfaceError::Lost) => return Ok(PresentStatus::SurfaceLost),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(CompositorError::Runtime(
                    "out of memory acquiring surface texture".to_string(),
                ))
            }
            Err(err) => {
                warn!(error = %err, "surface acquire failed, skipping tick");
                return Ok(PresentStatus::Skipped);
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present encoder"),
            });
        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        self.frame = Some(PendingFrame {
            surface_texture,
            view,
            encoder,
            size: surface,
        });
        Ok(PresentStatus::Ready)
    }

    fn draw_delayed(&mut self, slot: usize) -> Result<(), CompositorError> {
        let pipelines = self.pipelines.as_ref().ok_or_else(|| missing("pipelines"))?;
        let quad = self.quad.as_ref().ok_or_else(|| missing("quad geometry"))?;
        let ring = self.ring.as_ref().ok_or_else(|| missing("ring"))?;
        let source = ring.slot(slot)?;
        let frame = self.frame.as_mut().ok_or_else(|| missing("presentation frame"))?;

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("delayed pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&pipelines.playback);
        render_pass.set_bind_group(0, &source.bind_group, &[]);
        render_pass.set_vertex_buffer(0, quad.buffer.slice(..));
        render_pass.draw(0..quad.vertex_count, 0..1);
        Ok(())
    }

    fn draw_live(&mut self, viewport: PipViewport) -> Result<(), CompositorError> {
        let pipelines = self.pipelines.as_ref().ok_or_else(|| missing("pipelines"))?;
        let quad = self.quad.as_ref().ok_or_else(|| missing("quad geometry"))?;
        let live = self.live.as_ref().ok_or_else(|| missing("live input"))?;
        let frame = self.frame.as_mut().ok_or_else(|| missing("presentation frame"))?;

        let rect = viewport.to_top_left(frame.size.height);
        if !rect.fits_within(frame.size) {
            trace!(?viewport, "overlay outside surface, skipped");
            return Ok(());
        }

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("overlay pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_viewport(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
            0.0,
            1.0,
        );
        render_pass.set_pipeline(&pipelines.overlay);
        render_pass.set_bind_group(0, &live.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &live.texture_bind_group, &[]);
        render_pass.set_vertex_buffer(0, quad.buffer.slice(..));
        render_pass.draw(0..quad.vertex_count, 0..1);
        Ok(())
    }

    fn present(&mut self) -> Result<(), CompositorError> {
        let frame = self.frame.take().ok_or_else(|| missing("presentation frame"))?;
        let context = self.context()?;
        context.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.surface_texture.present();
        self.check_fault()
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        release("presentation frame", &mut self.frame, drop);
        release("pipelines", &mut self.pipelines, drop);
        release("quad geometry", &mut self.quad, |quad| quad.buffer.destroy());
        release("live input", &mut self.live, LiveInput::destroy);
        release("ring", &mut self.ring, |mut ring| ring.destroy());
        release("graphics context", &mut self.context, |context| {
            context.device.destroy();
        });
        debug!("wgpu backend torn down");
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Frees one resource, logging instead of unwinding if the release panics.
fn release<T>(label: &str, slot: &mut Option<T>, free: impl FnOnce(T)) {
    let Some(resource) = slot.take() else {
        return;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| free(resource))) {
        Ok(()) => trace!(resource = label, "released"),
        Err(_) => warn!(resource = label, "releasing GPU resource panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::release;

    #[test]
    fn release_swallows_panics_and_empties_slot() {
        let mut slot = Some(5u32);
        release("panicky", &mut slot, |_| panic!("boom"));
        assert!(slot.is_none());
        release("panicky", &mut slot, |_| unreachable!());
    }
}

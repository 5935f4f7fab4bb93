use crate::error::CompositorError;
use crate::live::LiveFrame;
use crate::overlay::PipViewport;
use crate::types::{CompositorConfig, SurfaceSize};

/// Result of acquiring the next presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// A frame is acquired and cleared to opaque black; draws may follow.
    Ready,
    /// Transient condition (timeout, outdated swapchain); skip this tick.
    Skipped,
    /// The surface is gone; the loop should end normally.
    SurfaceLost,
}

/// Information handed to backend constructors on the render thread.
#[derive(Debug, Clone)]
pub struct BackendSetup {
    pub config: CompositorConfig,
    pub capacity: usize,
    pub surface_size: SurfaceSize,
}

/// GPU operations the render loop drives.
///
/// Every method runs on the render thread. Implementations own all GPU
/// resources; the loop owns the ring indices.
pub trait GpuBackend {
    /// Creates `capacity` render targets of `width x height`.
    fn allocate_ring(
        &mut self,
        capacity: usize,
        width: u32,
        height: u32,
    ) -> Result<(), CompositorError>;

    /// Replaces the live input texture contents and its sampling transform.
    fn upload_live(&mut self, frame: &LiveFrame) -> Result<(), CompositorError>;

    /// Renders the live texture into ring slot `slot` at frame resolution.
    fn capture_live(&mut self, slot: usize) -> Result<(), CompositorError>;

    /// Acquires the presentation target sized `surface` and clears it.
    fn begin_present(&mut self, surface: SurfaceSize) -> Result<PresentStatus, CompositorError>;

    /// Draws ring slot `slot` over the whole surface.
    fn draw_delayed(&mut self, slot: usize) -> Result<(), CompositorError>;

    /// Draws the live texture into `viewport` (bottom-left origin).
    fn draw_live(&mut self, viewport: PipViewport) -> Result<(), CompositorError>;

    /// Submits and presents the acquired frame.
    fn present(&mut self) -> Result<(), CompositorError>;

    /// Releases every resource. Safe to call repeatedly and after partial setup.
    fn teardown(&mut self);
}

impl<B: GpuBackend + ?Sized> GpuBackend for Box<B> {
    fn allocate_ring(
        &mut self,
        capacity: usize,
        width: u32,
        height: u32,
    ) -> Result<(), CompositorError> {
        (**self).allocate_ring(capacity, width, height)
    }

    fn upload_live(&mut self, frame: &LiveFrame) -> Result<(), CompositorError> {
        (**self).upload_live(frame)
    }

    fn capture_live(&mut self, slot: usize) -> Result<(), CompositorError> {
        (**self).capture_live(slot)
    }

    fn begin_present(&mut self, surface: SurfaceSize) -> Result<PresentStatus, CompositorError> {
        (**self).begin_present(surface)
    }

    fn draw_delayed(&mut self, slot: usize) -> Result<(), CompositorError> {
        (**self).draw_delayed(slot)
    }

    fn draw_live(&mut self, viewport: PipViewport) -> Result<(), CompositorError> {
        (**self).draw_live(viewport)
    }

    fn present(&mut self) -> Result<(), CompositorError> {
        (**self).present()
    }

    fn teardown(&mut self) {
        (**self).teardown()
    }
}

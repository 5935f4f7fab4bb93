//! Delayed-playback GPU compositor for delaycam.
//!
//! The crate keeps the last few seconds of a live video feed on the GPU and
//! presents the oldest buffered frame full-screen, optionally overlaying the
//! live frame as a picture-in-picture. The overall flow is:
//!
//! ```text
//!   frame source ──▶ FrameSink::submit ──▶ (latest-wins mailbox)
//!                                                │  render thread, once per tick
//!                                                ▼
//!            upload live texture ──▶ capture into ring[head] ──▶ head += 1
//!                                                │
//!   surface ◀── present ◀── live PiP ◀── ring[(head - N) mod N] full-screen
//!
//!   UI thread ──▶ SessionHandle::fill_ratio() (atomic read)
//! ```
//!
//! [`DelaySession`] owns the render thread. All GPU work goes through the
//! [`GpuBackend`] trait; [`WgpuBackend`] is the production implementation
//! and tests drive the loop with recording backends instead.

mod backend;
mod compile;
mod compositor;
mod error;
mod gpu;
mod live;
mod overlay;
mod ring;
mod session;
mod surface;
mod types;

pub use backend::{BackendSetup, GpuBackend, PresentStatus};
pub use compositor::{Termination, TickOutcome};
pub use error::{CompositorError, FrameError};
pub use gpu::WgpuBackend;
pub use live::{FrameSink, LiveFrame, SampleTransform};
pub use overlay::{pip_margin, pip_viewport, OverlayConfig, OverlaySettings, PipViewport};
pub use ring::{BufferProgress, RingStore};
pub use session::{
    DelaySession, SessionEvent, SessionHandle, SessionState, StopStatus, DEFAULT_STOP_TIMEOUT,
};
pub use surface::{wait_for_surface, PresentationSurface, SurfaceWait, WindowSurface};
pub use types::{
    delay_frames, CompositorConfig, Pacing, PipCorner, SurfaceSize, SurfaceWaitPolicy,
    DEFAULT_PIP_SCALE,
};

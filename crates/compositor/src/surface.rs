use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing::{debug, warn};
use winit::window::Window;

use crate::error::CompositorError;
use crate::types::{SurfaceSize, SurfaceWaitPolicy};

/// Host-owned target the compositor presents into.
///
/// Queried from the render thread once per tick; implementations must be
/// cheap and thread-safe.
pub trait PresentationSurface: Send + Sync {
    /// False once the host has torn the surface down or has not created it yet.
    fn is_valid(&self) -> bool;
    /// Current drawable size in physical pixels.
    fn size(&self) -> SurfaceSize;
}

impl<T: PresentationSurface + ?Sized> PresentationSurface for Arc<T> {
    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn size(&self) -> SurfaceSize {
        (**self).size()
    }
}

/// Outcome of [`wait_for_surface`] when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceWait {
    Ready,
    Cancelled,
}

/// Polls `surface` until it reports valid, the stop flag is raised, or the
/// policy's attempts run out.
pub fn wait_for_surface(
    surface: &dyn PresentationSurface,
    policy: SurfaceWaitPolicy,
    stop: &AtomicBool,
) -> Result<SurfaceWait, CompositorError> {
    for attempt in 1..=policy.attempts {
        if stop.load(Ordering::Acquire) {
            return Ok(SurfaceWait::Cancelled);
        }
        if surface.is_valid() {
            debug!(attempt, "presentation surface ready");
            return Ok(SurfaceWait::Ready);
        }
        if attempt < policy.attempts {
            thread::sleep(policy.interval);
        }
    }
    warn!(
        attempts = policy.attempts,
        interval_ms = policy.interval.as_millis() as u64,
        "presentation surface never became valid"
    );
    Err(CompositorError::SurfaceUnavailable {
        attempts: policy.attempts,
    })
}

/// [`PresentationSurface`] backed by a winit window.
///
/// The window is valid from construction until [`invalidate`](Self::invalidate)
/// is called, which hosts do when the window is closing.
#[derive(Debug)]
pub struct WindowSurface {
    window: Arc<Window>,
    valid: AtomicBool,
}

impl WindowSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            valid: AtomicBool::new(true),
        }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl PresentationSurface for WindowSurface {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn size(&self) -> SurfaceSize {
        let size = self.window.inner_size();
        SurfaceSize::new(size.width, size.height)
    }
}

impl HasWindowHandle for WindowSurface {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WindowSurface {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct Countdown {
        remaining: AtomicU32,
    }

    impl PresentationSurface for Countdown {
        fn is_valid(&self) -> bool {
            self.remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_err()
        }

        fn size(&self) -> SurfaceSize {
            SurfaceSize::new(64, 64)
        }
    }

    fn policy(attempts: u32) -> SurfaceWaitPolicy {
        SurfaceWaitPolicy {
            attempts,
            interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn becomes_ready_within_budget() {
        let surface = Countdown {
            remaining: AtomicU32::new(3),
        };
        let stop = AtomicBool::new(false);
        assert_eq!(
            wait_for_surface(&surface, policy(10), &stop),
            Ok(SurfaceWait::Ready)
        );
    }

    #[test]
    fn gives_up_after_configured_attempts() {
        let surface = Countdown {
            remaining: AtomicU32::new(u32::MAX),
        };
        let stop = AtomicBool::new(false);
        assert_eq!(
            wait_for_surface(&surface, policy(5), &stop),
            Err(CompositorError::SurfaceUnavailable { attempts: 5 })
        );
        assert_eq!(surface.remaining.load(Ordering::Acquire), u32::MAX - 5);
    }

    #[test]
    fn stop_request_cancels_the_wait() {
        let surface = Countdown {
            remaining: AtomicU32::new(u32::MAX),
        };
        let stop = AtomicBool::new(true);
        assert_eq!(
            wait_for_surface(&surface, policy(5), &stop),
            Ok(SurfaceWait::Cancelled)
        );
    }
}

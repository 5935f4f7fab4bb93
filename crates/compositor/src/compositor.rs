//! The per-tick render loop: capture the newest live frame into the ring,
//! present the oldest buffered frame, then overlay the live picture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use crate::backend::{GpuBackend, PresentStatus};
use crate::error::CompositorError;
use crate::live::LiveSource;
use crate::overlay::{pip_viewport, OverlaySettings};
use crate::ring::RingStore;
use crate::surface::PresentationSurface;
use crate::types::Pacing;

const STATS_INTERVAL: Duration = Duration::from_secs(3);
/// Pause after a tick that could not present, so a minimised window does not spin.
const SKIP_BACKOFF: Duration = Duration::from_millis(2);

/// Why the render loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// `request_stop` was observed.
    StopRequested,
    /// The presentation surface went away.
    SurfaceInvalid,
    /// Setup or rendering failed.
    Failed(CompositorError),
}

impl Termination {
    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::Failed(_))
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Presented,
    Skipped,
    SurfaceGone,
}

#[derive(Debug)]
struct LoopStats {
    ticks: u64,
    captures: u64,
    presented: u64,
    window_start: Instant,
}

impl LoopStats {
    fn new() -> Self {
        Self {
            ticks: 0,
            captures: 0,
            presented: 0,
            window_start: Instant::now(),
        }
    }
}

pub(crate) struct Compositor<B: GpuBackend> {
    backend: B,
    ring: RingStore,
    live: LiveSource,
    overlay: Arc<OverlaySettings>,
    surface: Arc<dyn PresentationSurface>,
    live_seen: bool,
    stats: LoopStats,
}

impl<B: GpuBackend> Compositor<B> {
    pub(crate) fn new(
        backend: B,
        ring: RingStore,
        live: LiveSource,
        overlay: Arc<OverlaySettings>,
        surface: Arc<dyn PresentationSurface>,
    ) -> Self {
        Self {
            backend,
            ring,
            live,
            overlay,
            surface,
            live_seen: false,
            stats: LoopStats::new(),
        }
    }

    pub(crate) fn tick(&mut self) -> Result<TickOutcome, CompositorError> {
        if !self.surface.is_valid() {
            return Ok(TickOutcome::SurfaceGone);
        }
        self.stats.ticks += 1;

        if let Some(frame) = self.live.fetch() {
            let slot = self.ring.head();
            self.backend.upload_live(&frame)?;
            self.backend.capture_live(slot)?;
            self.ring.record_written();
            self.live_seen = true;
            self.stats.captures += 1;
            trace!(slot, sequence = frame.sequence, "captured live frame");
        }

        let size = self.surface.size();
        if size.is_empty() {
            return Ok(TickOutcome::Skipped);
        }
        match self.backend.begin_present(size)? {
            PresentStatus::Ready => {}
            PresentStatus::Skipped => return Ok(TickOutcome::Skipped),
            PresentStatus::SurfaceLost => return Ok(TickOutcome::SurfaceGone),
        }

        if self.ring.is_playback_ready() {
            self.backend.draw_delayed(self.ring.oldest_slot_index())?;
        }

        if self.live_seen {
            let overlay = self.overlay.load();
            if let Some(viewport) = pip_viewport(overlay.corner, overlay.scale, size) {
                if viewport.fits_within(size) {
                    self.backend.draw_live(viewport)?;
                } else {
                    trace!(?viewport, ?size, "overlay does not fit surface, skipped");
                }
            }
        }

        self.backend.present()?;
        self.stats.presented += 1;
        Ok(TickOutcome::Presented)
    }

    /// Ticks until `stop` is raised, the surface goes away, or a tick fails.
    pub(crate) fn run(&mut self, stop: &AtomicBool, pacing: Pacing) -> Termination {
        loop {
            if stop.load(Ordering::Acquire) {
                return Termination::StopRequested;
            }
            if let Pacing::FrameArrival { max_wait } = pacing {
                self.live.wait(max_wait);
            }
            match self.tick() {
                Ok(TickOutcome::Presented) => {}
                Ok(TickOutcome::Skipped) => thread::sleep(SKIP_BACKOFF),
                Ok(TickOutcome::SurfaceGone) => {
                    debug!("presentation surface invalid, leaving render loop");
                    return Termination::SurfaceInvalid;
                }
                Err(err) => {
                    error!(error = %err, "render loop failed");
                    return Termination::Failed(err);
                }
            }
            self.log_stats();
        }
    }

    fn log_stats(&mut self) {
        let elapsed = self.stats.window_start.elapsed();
        if elapsed < STATS_INTERVAL {
            return;
        }
        let secs = elapsed.as_secs_f64();
        debug!(
            ticks_per_sec = self.stats.ticks as f64 / secs,
            captures_per_sec = self.stats.captures as f64 / secs,
            presented = self.stats.presented,
            fill = self.ring.fill_ratio(),
            superseded = self.live.frames_superseded(),
            "render loop stats"
        );
        self.stats = LoopStats::new();
    }

    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }
}

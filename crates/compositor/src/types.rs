use std::time::Duration;

use crate::error::CompositorError;

/// Default fraction of the presentation surface covered by the live overlay.
pub const DEFAULT_PIP_SCALE: f32 = 0.25;

/// Screen corner that hosts the live picture-in-picture overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipCorner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
    /// Overlay disabled; no live draw is issued.
    Hidden,
}

impl PipCorner {
    /// Visible corners in the order a host cycles through them.
    pub const VISIBLE: [PipCorner; 4] = [
        PipCorner::TopLeft,
        PipCorner::TopRight,
        PipCorner::BottomRight,
        PipCorner::BottomLeft,
    ];

    pub fn is_visible(self) -> bool {
        !matches!(self, PipCorner::Hidden)
    }

    /// Next corner clockwise; `Hidden` wraps back to `TopLeft`.
    pub fn next(self) -> Self {
        match self {
            PipCorner::TopLeft => PipCorner::TopRight,
            PipCorner::TopRight => PipCorner::BottomRight,
            PipCorner::BottomRight => PipCorner::BottomLeft,
            PipCorner::BottomLeft => PipCorner::Hidden,
            PipCorner::Hidden => PipCorner::TopLeft,
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        match self {
            PipCorner::TopLeft => 0,
            PipCorner::TopRight => 1,
            PipCorner::BottomLeft => 2,
            PipCorner::BottomRight => 3,
            PipCorner::Hidden => 4,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            0 => PipCorner::TopLeft,
            1 => PipCorner::TopRight,
            2 => PipCorner::BottomLeft,
            3 => PipCorner::BottomRight,
            _ => PipCorner::Hidden,
        }
    }
}

impl std::fmt::Display for PipCorner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipCorner::TopLeft => f.write_str("top-left"),
            PipCorner::TopRight => f.write_str("top-right"),
            PipCorner::BottomLeft => f.write_str("bottom-left"),
            PipCorner::BottomRight => f.write_str("bottom-right"),
            PipCorner::Hidden => f.write_str("hidden"),
        }
    }
}

/// Pixel dimensions of a presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What governs the cadence of the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Tick as fast as presentation allows; FIFO presentation blocks on vblank.
    Presentation,
    /// Block until the source signals a new frame, at most `max_wait` per tick.
    FrameArrival { max_wait: Duration },
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Presentation
    }
}

/// Bounded polling policy applied while waiting for the surface to become valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceWaitPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for SurfaceWaitPolicy {
    fn default() -> Self {
        Self {
            attempts: 100,
            interval: Duration::from_millis(10),
        }
    }
}

/// Immutable configuration for one render session.
///
/// Changing any of these values means stopping the session and starting a
/// new one; only the overlay corner and scale can be adjusted while running.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorConfig {
    /// Frame rate the source delivers at.
    pub fps: f32,
    /// How far behind the live feed the full-screen playback runs.
    pub delay_seconds: f32,
    /// Width of every source frame and ring slot.
    pub frame_width: u32,
    /// Height of every source frame and ring slot.
    pub frame_height: u32,
    /// Initial overlay corner.
    pub pip_corner: PipCorner,
    /// Initial overlay size as a fraction of the surface.
    pub pip_scale: f32,
    pub pacing: Pacing,
    pub surface_wait: SurfaceWaitPolicy,
}

impl Default for CompositorConfig {
    /// 720p at 30 fps with a three second delay.
    fn default() -> Self {
        Self {
            fps: 30.0,
            delay_seconds: 3.0,
            frame_width: 1280,
            frame_height: 720,
            pip_corner: PipCorner::default(),
            pip_scale: DEFAULT_PIP_SCALE,
            pacing: Pacing::default(),
            surface_wait: SurfaceWaitPolicy::default(),
        }
    }
}

impl CompositorConfig {
    /// Ring capacity implied by this configuration.
    pub fn delay_frames(&self) -> usize {
        delay_frames(self.fps, self.delay_seconds)
    }

    pub fn validate(&self) -> Result<(), CompositorError> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(CompositorError::InvalidConfig(format!(
                "frame rate must be positive, got {}",
                self.fps
            )));
        }
        if !self.delay_seconds.is_finite() || self.delay_seconds <= 0.0 {
            return Err(CompositorError::InvalidConfig(format!(
                "delay must be positive, got {}s",
                self.delay_seconds
            )));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(CompositorError::InvalidConfig(format!(
                "frame size must be non-zero, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if !self.pip_scale.is_finite() || !(0.0..=1.0).contains(&self.pip_scale) {
            return Err(CompositorError::InvalidConfig(format!(
                "pip scale must lie within 0.0..=1.0, got {}",
                self.pip_scale
            )));
        }
        if self.surface_wait.attempts == 0 {
            return Err(CompositorError::InvalidConfig(
                "surface wait policy needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of ring slots needed to hold `delay_seconds` of video at `fps`.
///
/// Never returns less than one slot, even when the product rounds to zero.
pub fn delay_frames(fps: f32, delay_seconds: f32) -> usize {
    let frames = (f64::from(fps) * f64::from(delay_seconds)).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    }
}

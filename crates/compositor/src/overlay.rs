//! Placement of the live picture-in-picture overlay.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::types::{PipCorner, SurfaceSize, DEFAULT_PIP_SCALE};

/// Smallest margin between the overlay and the surface edges, in pixels.
const MIN_MARGIN: u32 = 8;
/// Margin grows with surface width: 8px per 360px.
const MARGIN_REFERENCE_WIDTH: u64 = 360;

/// Snapshot of the overlay settings taken once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayConfig {
    pub corner: PipCorner,
    pub scale: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            corner: PipCorner::default(),
            scale: DEFAULT_PIP_SCALE,
        }
    }
}

/// Corner and scale packed into a single atomic word.
///
/// Upper 32 bits hold the corner tag, lower 32 bits the `f32` scale bits, so a
/// reader can never observe a corner from one update with a scale from another.
#[derive(Debug)]
pub struct OverlaySettings {
    packed: AtomicU64,
}

impl OverlaySettings {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            packed: AtomicU64::new(pack(config)),
        }
    }

    pub fn load(&self) -> OverlayConfig {
        unpack(self.packed.load(Ordering::Acquire))
    }

    #[cfg(test)]
    fn set(&self, config: OverlayConfig) {
        let Some(scale) = sanitize_scale(config.scale) else {
            self.set_corner(config.corner);
            return;
        };
        self.packed.store(
            pack(OverlayConfig {
                corner: config.corner,
                scale,
            }),
            Ordering::Release,
        );
    }

    pub fn set_corner(&self, corner: PipCorner) {
        self.update(|current| OverlayConfig { corner, ..current });
    }

    /// Scales outside `0.0..=1.0` are clamped; non-finite values are ignored.
    pub fn set_scale(&self, scale: f32) {
        let Some(scale) = sanitize_scale(scale) else {
            return;
        };
        self.update(|current| OverlayConfig { scale, ..current });
    }

    fn update(&self, apply: impl Fn(OverlayConfig) -> OverlayConfig) {
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(pack(apply(unpack(bits))))
            });
    }
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self::new(OverlayConfig::default())
    }
}

fn sanitize_scale(scale: f32) -> Option<f32> {
    if !scale.is_finite() {
        warn!(scale, "ignoring non-finite pip scale");
        return None;
    }
    Some(scale.clamp(0.0, 1.0))
}

fn pack(config: OverlayConfig) -> u64 {
    (u64::from(config.corner.to_bits()) << 32) | u64::from(config.scale.to_bits())
}

fn unpack(bits: u64) -> OverlayConfig {
    OverlayConfig {
        corner: PipCorner::from_bits((bits >> 32) as u8),
        scale: f32::from_bits(bits as u32),
    }
}

/// Overlay rectangle with a bottom-left origin, y growing upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipViewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PipViewport {
    /// Same rectangle measured from the top-left corner, as wgpu viewports are.
    pub fn to_top_left(&self, surface_height: u32) -> PipViewport {
        PipViewport {
            x: self.x,
            y: surface_height as i32 - self.y - self.height as i32,
            width: self.width,
            height: self.height,
        }
    }

    /// True when the rectangle lies entirely within `surface`.
    pub fn fits_within(&self, surface: SurfaceSize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + i64::from(self.width) <= i64::from(surface.width)
            && self.y as i64 + i64::from(self.height) <= i64::from(surface.height)
    }
}

/// Margin between the overlay and the nearest surface edges.
pub fn pip_margin(surface_width: u32) -> u32 {
    let scaled = (u64::from(MIN_MARGIN) * u64::from(surface_width)) / MARGIN_REFERENCE_WIDTH;
    (scaled as u32).max(MIN_MARGIN)
}

/// Overlay rectangle for `corner`, or `None` when nothing should be drawn.
///
/// Dimensions truncate towards zero. The result may extend past the surface
/// for tiny surfaces; callers check [`PipViewport::fits_within`].
pub fn pip_viewport(corner: PipCorner, scale: f32, surface: SurfaceSize) -> Option<PipViewport> {
    if !corner.is_visible() || surface.is_empty() {
        return None;
    }
    let width = (surface.width as f32 * scale) as u32;
    let height = (surface.height as f32 * scale) as u32;
    if width == 0 || height == 0 {
        return None;
    }
    let margin = pip_margin(surface.width) as i32;
    let right = surface.width as i32 - width as i32 - margin;
    let top = surface.height as i32 - height as i32 - margin;
    let (x, y) = match corner {
        PipCorner::TopLeft => (margin, top),
        PipCorner::TopRight => (right, top),
        PipCorner::BottomLeft => (margin, margin),
        PipCorner::BottomRight => (right, margin),
        PipCorner::Hidden => return None,
    };
    Some(PipViewport {
        x,
        y,
        width,
        height,
    })
}

//! Hand-off point between the frame delivery thread and the render thread.
//!
//! The source pushes frames into a [`FrameSink`]; the render thread drains the
//! newest one at most once per tick. Frames that arrive faster than the render
//! loop consumes them are superseded, never queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::trace;

use crate::error::FrameError;

/// Column-major 4x4 matrix applied to texture coordinates when sampling a
/// live frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SampleTransform(pub [f32; 16]);

impl SampleTransform {
    pub const fn identity() -> Self {
        Self([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Mirrors sampling around `u = 0.5`.
    pub const fn horizontal_flip() -> Self {
        Self([
            -1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Applies the transform to a texture coordinate.
    pub fn apply(&self, u: f32, v: f32) -> (f32, f32) {
        let m = &self.0;
        (m[0] * u + m[4] * v + m[12], m[1] * u + m[5] * v + m[13])
    }
}

impl Default for SampleTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// One decoded RGBA8 frame from the source.
#[derive(Debug, Clone)]
pub struct LiveFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub transform: SampleTransform,
    /// Assigned by the sink on submission.
    pub sequence: u64,
}

impl LiveFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, transform: SampleTransform) -> Self {
        Self {
            width,
            height,
            pixels,
            transform,
            sequence: 0,
        }
    }

    fn check(&self, expected_width: u32, expected_height: u32) -> Result<(), FrameError> {
        if self.width != expected_width || self.height != expected_height {
            return Err(FrameError::SizeMismatch {
                expected_width,
                expected_height,
                actual_width: self.width,
                actual_height: self.height,
            });
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(FrameError::PixelCount {
                width: self.width,
                height: self.height,
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Mailbox {
    width: u32,
    height: u32,
    latest: Mutex<Option<LiveFrame>>,
    available: AtomicBool,
    next_sequence: AtomicU64,
    delivered: AtomicU64,
    superseded: AtomicU64,
    wake_tx: Sender<()>,
}

impl Mailbox {
    fn slot(&self) -> MutexGuard<'_, Option<LiveFrame>> {
        // A panicking submitter cannot leave the slot half-written.
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable handle the frame source submits into.
#[derive(Debug, Clone)]
pub struct FrameSink {
    mailbox: Arc<Mailbox>,
}

impl FrameSink {
    /// Replaces any pending frame with `frame` and wakes the render thread.
    pub fn submit(&self, mut frame: LiveFrame) -> Result<(), FrameError> {
        frame.check(self.mailbox.width, self.mailbox.height)?;
        frame.sequence = self.mailbox.next_sequence.fetch_add(1, Ordering::Relaxed);

        let replaced = self.mailbox.slot().replace(frame);
        if replaced.is_some() {
            self.mailbox.superseded.fetch_add(1, Ordering::Relaxed);
        }
        self.mailbox.delivered.fetch_add(1, Ordering::Relaxed);
        self.mailbox.available.store(true, Ordering::Release);

        if let Err(TrySendError::Disconnected(())) = self.mailbox.wake_tx.try_send(()) {
            trace!("render thread gone, frame parked without wake-up");
        }
        Ok(())
    }

    /// Dimensions every submitted frame must have.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.mailbox.width, self.mailbox.height)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.mailbox.delivered.load(Ordering::Relaxed)
    }

    /// Frames replaced by a newer one before the render thread picked them up.
    pub fn frames_superseded(&self) -> u64 {
        self.mailbox.superseded.load(Ordering::Relaxed)
    }
}

/// Render-thread end of the mailbox.
#[derive(Debug)]
pub(crate) struct LiveSource {
    mailbox: Arc<Mailbox>,
    wake_rx: Receiver<()>,
}

impl LiveSource {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            mailbox: Arc::new(Mailbox {
                width,
                height,
                latest: Mutex::new(None),
                available: AtomicBool::new(false),
                next_sequence: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                superseded: AtomicU64::new(0),
                wake_tx,
            }),
            wake_rx,
        }
    }

    pub(crate) fn sink(&self) -> FrameSink {
        FrameSink {
            mailbox: Arc::clone(&self.mailbox),
        }
    }

    /// Takes the newest unseen frame, if any.
    pub(crate) fn fetch(&self) -> Option<LiveFrame> {
        if !self.mailbox.available.swap(false, Ordering::AcqRel) {
            return None;
        }
        self.mailbox.slot().take()
    }

    /// Blocks until a frame is signalled or `timeout` passes.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        if self.mailbox.available.load(Ordering::Acquire) {
            return true;
        }
        self.wake_rx.recv_timeout(timeout).is_ok()
            || self.mailbox.available.load(Ordering::Acquire)
    }

    pub(crate) fn frames_superseded(&self) -> u64 {
        self.mailbox.superseded.load(Ordering::Relaxed)
    }
}

//! Synthetic frame source standing in for a camera.
//!
//! Each frame shows a sweeping bar and a row of blocks encoding the elapsed
//! seconds in binary, which makes the playback delay easy to read off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use compositor::{FrameSink, LiveFrame, SampleTransform};

const BAR_PERIOD_SECS: f32 = 2.0;
const SECOND_BITS: u32 = 8;

pub struct PatternSource {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PatternSource {
    pub fn spawn(sink: FrameSink, fps: u32, mirror: bool) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let transform = if mirror {
            SampleTransform::horizontal_flip()
        } else {
            SampleTransform::identity()
        };
        let interval = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));

        let thread = thread::Builder::new()
            .name("delaycam-pattern".into())
            .spawn(move || {
                let (width, height) = sink.frame_size();
                let mut next = Instant::now();
                let mut index = 0u64;
                while !thread_stop.load(Ordering::Acquire) {
                    let mut pixels = Vec::new();
                    render_pattern(width, height, index, fps, &mut pixels);
                    if let Err(err) = sink.submit(LiveFrame::new(width, height, pixels, transform)) {
                        tracing::warn!(error = %err, "pattern frame rejected, stopping source");
                        break;
                    }
                    index += 1;
                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                tracing::debug!(
                    frames = index,
                    delivered = sink.frames_delivered(),
                    superseded = sink.frames_superseded(),
                    "pattern source stopped"
                );
            })
            .context("failed to spawn pattern thread")?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("pattern thread panicked");
            }
        }
    }
}

impl Drop for PatternSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fills `pixels` with frame `index` of the test pattern as RGBA8.
pub fn render_pattern(width: u32, height: u32, index: u64, fps: u32, pixels: &mut Vec<u8>) {
    let fps = fps.max(1);
    let (w, h) = (width as usize, height as usize);
    pixels.clear();
    pixels.resize(w * h * 4, 0);
    if w == 0 || h == 0 {
        return;
    }

    let seconds = index / u64::from(fps);
    let phase = (index as f32 / fps as f32 / BAR_PERIOD_SECS).fract();
    let bar_x = (phase * w as f32) as usize;
    let bar_half = (w / 64).max(1);
    let block = (w / (SECOND_BITS as usize * 2)).max(1);
    let block_top = h / 8;
    let block_bottom = (block_top + block).min(h);

    for (y, row) in pixels.chunks_exact_mut(w * 4).enumerate() {
        let shade = (y * 160 / h) as u8;
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let mut rgb = [shade / 2, shade / 3, 40 + shade / 2];
            if x.abs_diff(bar_x) <= bar_half {
                rgb = [240, 200, 40];
            }
            if (block_top..block_bottom).contains(&y) {
                let slot = x / block;
                if slot % 2 == 1 && slot / 2 < SECOND_BITS as usize {
                    let bit = SECOND_BITS as usize - 1 - slot / 2;
                    rgb = if seconds >> bit & 1 == 1 {
                        [250, 250, 250]
                    } else {
                        [60, 60, 60]
                    };
                }
            }
            px.copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * width + x) * 4) as usize;
        pixels[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn frame_has_rgba_layout_and_opaque_alpha() {
        let mut pixels = Vec::new();
        render_pattern(64, 36, 0, 30, &mut pixels);
        assert_eq!(pixels.len(), 64 * 36 * 4);
        assert!(pixels.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn bar_sweeps_across_the_frame() {
        let (width, height) = (128, 32);
        let mut first = Vec::new();
        let mut later = Vec::new();
        render_pattern(width, height, 0, 30, &mut first);
        render_pattern(width, height, 30, 30, &mut later);
        let bar = [240, 200, 40, 255];
        let row = height - 1;
        assert_eq!(pixel(&first, width, 0, row), bar);
        assert_eq!(pixel(&later, width, 64, row), bar);
        assert_ne!(pixel(&later, width, 0, row), bar);
    }

    #[test]
    fn seconds_are_encoded_in_blocks() {
        let (width, height) = (160, 80);
        let mut pixels = Vec::new();
        // Three seconds in: the two lowest bits are lit.
        render_pattern(width, height, 90, 30, &mut pixels);
        let block = width / 16;
        let y = height / 8;
        let lit = [250, 250, 250, 255];
        let dark = [60, 60, 60, 255];
        assert_eq!(pixel(&pixels, width, block * 15, y), lit);
        assert_eq!(pixel(&pixels, width, block * 13, y), lit);
        assert_eq!(pixel(&pixels, width, block * 11, y), dark);
    }
}

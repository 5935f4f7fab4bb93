//! Bookkeeping for the delay ring: which slot is written next, which slot is
//! old enough to play back, and how full the ring is.
//!
//! The GPU targets themselves live in `gpu::ring`; this module only tracks
//! indices so it can be exercised without a device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free view of how many frames the ring holds.
///
/// Shared between the render thread (sole writer) and any number of polling
/// readers such as a UI progress indicator.
#[derive(Debug)]
pub struct BufferProgress {
    capacity: usize,
    frames_buffered: AtomicUsize,
}

impl BufferProgress {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames_buffered: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frames_buffered(&self) -> usize {
        self.frames_buffered.load(Ordering::Acquire)
    }

    /// Fraction of the ring holding captured frames, in `0.0..=1.0`.
    pub fn fill_ratio(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        let buffered = self.frames_buffered().min(self.capacity);
        buffered as f32 / self.capacity as f32
    }

    pub fn is_playback_ready(&self) -> bool {
        self.frames_buffered() >= self.capacity
    }

    fn record_frame(&self) {
        // Single writer: a plain load/store pair cannot race with itself.
        let current = self.frames_buffered.load(Ordering::Relaxed);
        if current < self.capacity {
            self.frames_buffered.store(current + 1, Ordering::Release);
        }
    }
}

/// Head pointer and fill counter of the fixed-capacity delay ring.
///
/// Owned and mutated by the render thread only.
#[derive(Debug)]
pub struct RingStore {
    capacity: usize,
    head: usize,
    progress: Arc<BufferProgress>,
}

impl RingStore {
    /// Creates an empty ring. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            head: 0,
            progress: Arc::new(BufferProgress::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot the next captured frame is written into.
    pub fn head(&self) -> usize {
        self.head
    }

    pub fn progress(&self) -> Arc<BufferProgress> {
        Arc::clone(&self.progress)
    }

    /// Advances `head` after a completed capture and bumps the fill counter
    /// until the ring is full.
    pub fn record_written(&mut self) {
        self.head = (self.head + 1) % self.capacity;
        self.progress.record_frame();
    }

    /// Slot holding the oldest recorded frame, `(head - capacity) mod capacity`.
    ///
    /// Only meaningful once [`is_playback_ready`](Self::is_playback_ready).
    pub fn oldest_slot_index(&self) -> usize {
        let head = self.head as isize;
        let capacity = self.capacity as isize;
        (head - capacity).rem_euclid(capacity) as usize
    }

    pub fn fill_ratio(&self) -> f32 {
        self.progress.fill_ratio()
    }

    pub fn is_playback_ready(&self) -> bool {
        self.progress.is_playback_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_slot_tracks_head_from_capacity_writes_ago() {
        for capacity in [1usize, 2, 5, 90] {
            let mut ring = RingStore::new(capacity);
            let mut head_history = vec![ring.head()];
            for write in 1..=(capacity * 3 + 2) {
                ring.record_written();
                head_history.push(ring.head());
                assert_eq!(ring.head(), write % capacity);
                if write >= capacity {
                    assert!(ring.is_playback_ready());
                    assert_eq!(
                        ring.oldest_slot_index(),
                        head_history[write - capacity],
                        "capacity {capacity}, write {write}"
                    );
                } else {
                    assert!(!ring.is_playback_ready());
                }
            }
        }
    }

    #[test]
    fn seven_writes_into_five_slots() {
        let mut ring = RingStore::new(5);
        for _ in 0..7 {
            ring.record_written();
        }
        assert_eq!(ring.head(), 2);
        assert_eq!(ring.oldest_slot_index(), 2);
    }

    #[test]
    fn fill_ratio_is_monotonic_then_saturates() {
        let mut ring = RingStore::new(4);
        let progress = ring.progress();
        let mut last = progress.fill_ratio();
        assert_eq!(last, 0.0);
        for write in 1..=20 {
            ring.record_written();
            let ratio = progress.fill_ratio();
            assert!(ratio >= last);
            if write >= 4 {
                assert_eq!(ratio, 1.0);
                assert_eq!(progress.frames_buffered(), 4);
            }
            last = ratio;
        }
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let ring = RingStore::new(0);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(BufferProgress::new(0).fill_ratio(), 0.0);
    }

    #[test]
    fn progress_is_readable_from_another_thread() {
        let mut ring = RingStore::new(8);
        let progress = ring.progress();
        let reader = std::thread::spawn(move || {
            let mut last = 0.0f32;
            for _ in 0..1_000 {
                let ratio = progress.fill_ratio();
                assert!((0.0..=1.0).contains(&ratio));
                assert!(ratio >= last);
                last = ratio;
            }
        });
        for _ in 0..32 {
            ring.record_written();
        }
        reader.join().unwrap();
        assert_eq!(ring.fill_ratio(), 1.0);
    }
}

//! Upper bound on the delay a machine can hold in memory.
//!
//! Every buffered frame is stored as RGBA8, so the ring for `delay` seconds
//! needs `width * height * 4 * fps * delay` bytes. The budget is 98% of the
//! memory available when the application started, never less than 256 MB.

use tracing::debug;

/// Budget floor in megabytes.
pub const MIN_BUDGET_MB: u64 = 256;
/// Share of available memory the ring may use.
pub const BUDGET_FRACTION: f64 = 0.98;
/// Bytes per stored pixel (RGBA8).
pub const BYTES_PER_PIXEL: u64 = 4;

const MIB: u64 = 1024 * 1024;

/// Buffer budget in bytes for `available_bytes` of free memory.
///
/// Available memory is counted in whole MiB while the budget is spent in
/// decimal megabytes, which leaves a little headroom.
pub fn buffer_budget_bytes(available_bytes: u64) -> u64 {
    let available_mb = available_bytes / MIB;
    let budget_mb = ((available_mb as f64 * BUDGET_FRACTION) as u64).max(MIN_BUDGET_MB);
    budget_mb * 1_000_000
}

/// Longest whole-second delay that fits the budget, at least one second.
pub fn max_delay_seconds(width: u32, height: u32, fps: u32, available_bytes: u64) -> u32 {
    let bytes_per_frame = u64::from(width) * u64::from(height) * BYTES_PER_PIXEL;
    if bytes_per_frame == 0 || fps == 0 {
        return 1;
    }

    let budget = buffer_budget_bytes(available_bytes);
    let max_frames = budget / bytes_per_frame;
    let max_delay = max_frames / u64::from(fps);
    debug!(
        width,
        height,
        fps,
        bytes_per_frame,
        budget,
        max_frames,
        max_delay,
        "computed delay budget"
    );
    u32::try_from(max_delay).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn hd_at_thirty_with_eight_gigabytes() {
        assert_eq!(buffer_budget_bytes(8 * GIB), 8_028_000_000);
        assert_eq!(max_delay_seconds(1280, 720, 30, 8 * GIB), 72);
    }

    #[test]
    fn floor_budget_applies_when_memory_is_scarce() {
        assert_eq!(buffer_budget_bytes(0), 256_000_000);
        assert_eq!(max_delay_seconds(1280, 720, 30, 0), 2);
        assert_eq!(max_delay_seconds(3840, 2160, 60, 0), 1);
    }

    #[test]
    fn degenerate_inputs_yield_one_second() {
        assert_eq!(max_delay_seconds(0, 720, 30, 8 * GIB), 1);
        assert_eq!(max_delay_seconds(1280, 720, 0, 8 * GIB), 1);
    }

    #[test]
    fn more_memory_never_shortens_the_delay() {
        let mut last = 0;
        for gib in 0..64 {
            let delay = max_delay_seconds(1920, 1080, 30, gib * GIB);
            assert!(delay >= last);
            last = delay;
        }
    }
}

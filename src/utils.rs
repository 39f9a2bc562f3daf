use std::time::{SystemTime, UNIX_EPOCH};

use ethers_core::types::U256;

pub fn block_number_chunks(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk_size = chunk_size.max(1);
    let mut block_range = Vec::new();
    let mut current_block = from_block;

    while current_block <= to_block {
        let end_idx = current_block
            .saturating_add(chunk_size - 1)
            .min(to_block);
        block_range.push((current_block, end_idx));
        current_block = match end_idx.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    block_range
}

/// The `[from, to]` block range covering the last `window` blocks up to `latest`.
pub fn scan_window(latest: u64, window: u64) -> (u64, u64) {
    (latest.saturating_sub(window), latest)
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Wall-clock cutoff passed to router calls.
pub fn deadline_from(now: u64, deadline_secs: u64) -> U256 {
    U256::from(now.saturating_add(deadline_secs))
}

/// Lossy conversion for display-only math.
pub fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(f64::MAX)
}

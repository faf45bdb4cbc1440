use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Base seed for all random streams of a scenario run. Set by main for every repetition.
pub static RAND_SEED: AtomicU64 = AtomicU64::new(0);

/// When set, every accepted bid is logged as a CSV row on LogEvent::Bid
pub static VERBOSE_BIDS: AtomicBool = AtomicBool::new(false);

/// Number of matching engine runs completed since the counter was last reset
pub static TOTAL_AUCTION_RUNS: AtomicUsize = AtomicUsize::new(0);

/// Derive a seed for one random stream from the current base seed
///
/// Different streams inside the same scenario use different offsets so they stay
/// independent of each other while remaining reproducible for a given RAND_SEED.
pub fn get_seed(offset: u64) -> u64 {
    RAND_SEED.load(Ordering::Relaxed).wrapping_mul(1_000_003).wrapping_add(offset)
}

/// Clip a value into the unit interval
pub fn clip_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// `count` evenly spaced values from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

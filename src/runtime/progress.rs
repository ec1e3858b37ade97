use std::sync::atomic::{AtomicU64, Ordering};

const UNINITIALIZED: u64 = u64::MAX;

/// Tracks the last fully reconciled block height (`lastProcessedBlock`) in memory.
///
/// The watermark only moves forward: [`BlockWatermark::advance`] ignores heights at or
/// below the current value.
#[derive(Debug)]
pub struct BlockWatermark {
    last_processed: AtomicU64,
}

impl Default for BlockWatermark {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockWatermark {
    pub fn new() -> Self {
        Self {
            last_processed: AtomicU64::new(UNINITIALIZED),
        }
    }

    /// Creates a watermark that already points at `height`.
    pub fn at(height: u64) -> Self {
        let watermark = Self::new();
        watermark.advance(height);
        watermark
    }

    /// Sets the watermark to the block before `chain_height` if it has not been set yet.
    /// Returns the resulting watermark.
    pub fn initialize_from_height(&self, chain_height: u64) -> u64 {
        let start = chain_height.saturating_sub(1);
        match self.last_processed.compare_exchange(
            UNINITIALIZED,
            start,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => start,
            Err(existing) => existing,
        }
    }

    /// Moves the watermark to `height`. Returns `false` when `height` would not move it
    /// forward.
    pub fn advance(&self, height: u64) -> bool {
        if height == UNINITIALIZED {
            return false;
        }
        self.last_processed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current == UNINITIALIZED || height > current {
                    Some(height)
                } else {
                    None
                }
            })
            .is_ok()
    }

    pub fn last_processed(&self) -> Option<u64> {
        match self.last_processed.load(Ordering::SeqCst) {
            UNINITIALIZED => None,
            value => Some(value),
        }
    }
}

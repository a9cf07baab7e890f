use crate::config::types::{JudgeError, Result};

/// Strictly increasing input sizes a candidate is measured at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeLadder {
    sizes: Vec<u64>,
}

impl SizeLadder {
    /// Validate an explicit ladder.
    pub fn new(sizes: Vec<u64>) -> Result<Self> {
        if sizes.is_empty() {
            return Err(JudgeError::Config("size ladder cannot be empty".to_string()));
        }
        if let Some(pair) = sizes.windows(2).find(|w| w[0] >= w[1]) {
            return Err(JudgeError::Config(format!(
                "size ladder must be strictly increasing: {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { sizes })
    }

    /// Ladder for a declared bound: `[0, 1]`, then `d` and `5d` per decade
    /// below the bound, then the bound itself. Decades start at 1 000, or 10
    /// for bounds under 10 000. The bound is capped at `max_size`.
    pub fn for_bound(bound: u64, max_size: u64) -> Self {
        let bound = bound.min(max_size).max(1);
        let mut sizes = vec![0, 1];
        let mut decade: u64 = if bound < 10_000 { 10 } else { 1_000 };
        while decade < bound {
            sizes.push(decade);
            if decade * 5 < bound {
                sizes.push(decade * 5);
            }
            decade = decade.saturating_mul(10);
        }
        if bound > 1 {
            sizes.push(bound);
        }
        Self { sizes }
    }

    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Smallest size worth a profiler run.
    pub fn first_nontrivial(&self) -> Option<u64> {
        self.sizes.iter().copied().find(|n| *n > 1)
    }
}

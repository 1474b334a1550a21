//! Rolling-window statistics for the z-score.
//!
//! Mean and sample standard deviation (n - 1 divisor) over a window of
//! closes. A window whose spread is indistinguishable from zero has no
//! z-score.

/// Mean and sample standard deviation of one window of closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub len: usize,
}

/// Spread below this fraction of the mean counts as zero. Summing identical
/// closes leaves rounding residue, so an exact `== 0.0` test would let a
/// constant series through with a vanishing divisor.
const ZERO_SPREAD_TOLERANCE: f64 = 1e-12;

impl WindowStats {
    /// `None` for fewer than two closes or any non-finite close.
    pub fn from_closes(closes: &[f64]) -> Option<Self> {
        let n = closes.len();
        if n < 2 || closes.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let mean = closes.iter().sum::<f64>() / n as f64;
        let variance = closes
            .iter()
            .map(|c| {
                let diff = c - mean;
                diff * diff
            })
            .sum::<f64>()
            / (n - 1) as f64;
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            len: n,
        })
    }

    pub fn has_zero_spread(&self) -> bool {
        self.std_dev <= ZERO_SPREAD_TOLERANCE * self.mean.abs().max(1.0)
    }

    /// Standardized deviation of `price` from the mean. `None` on zero spread.
    pub fn z(&self, price: f64) -> Option<f64> {
        if self.has_zero_spread() {
            None
        } else {
            Some((price - self.mean) / self.std_dev)
        }
    }
}

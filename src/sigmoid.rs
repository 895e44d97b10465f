//! Lookup table for the logistic sigmoid `$\sigma(x) = 1/(1+e^{-x})$`.
//!
//! Every neuron activation goes through this table, so the hot path never
//! calls `exp`.
use std::sync::{Arc, OnceLock};

/// Number of samples in the default table.
pub const TABLE_SIZE: usize = 100_000;
/// The default table covers `$[-10, 10]$`.
pub const DOMAIN_LIMIT: f64 = 10.0;

/// Precomputed samples of the sigmoid over a symmetric domain `$[-A, A]$`.
///
/// Sample `$i$` holds `$\sigma$` at the midpoint of the `$i$`-th cell, so
/// the error of [`get`](SigmoidTable::get) is bounded by half a step times
/// the maximal slope `$1/4$`. Arguments outside the domain saturate to the
/// first or last sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SigmoidTable {
    values: Box<[f64]>,
    lower: f64,
    step: f64,
    rec_step: f64,
}

impl SigmoidTable {
    /// Build the default table with [`TABLE_SIZE`] samples over
    /// `$[-\mathtt{DOMAIN\_LIMIT}, \mathtt{DOMAIN\_LIMIT}]$`.
    pub fn build() -> Self {
        Self::with_size(TABLE_SIZE, DOMAIN_LIMIT)
    }

    /// Build a table with `size` samples over `$[-\mathtt{limit}, \mathtt{limit}]$`.
    ///
    /// # Panics
    ///
    /// Panics if `$\mathtt{size} < 2$` or `$\mathtt{limit} \leq 0$`.
    pub fn with_size(size: usize, limit: f64) -> Self {
        assert!(size >= 2, "sigmoid table needs at least two samples");
        assert!(limit > 0.0, "sigmoid domain limit must be > 0");
        let lower = -limit;
        let step = 2.0 * limit / (size - 1) as f64;
        let mut x = lower + step / 2.0;
        let mut values = Vec::with_capacity(size);
        for _ in 0..size {
            values.push(1.0 / (1.0 + (-x).exp()));
            x += step;
        }
        Self {
            values: values.into_boxed_slice(),
            lower,
            step,
            rec_step: 1.0 / step,
        }
    }

    /// The process-wide default table, built on first use.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<SigmoidTable>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(Self::build())).clone()
    }

    /// Look up `$\sigma(x)$`.
    #[inline]
    pub fn get(&self, x: f64) -> f64 {
        // `as` saturates and maps NaN to zero
        let index = ((x - self.lower) * self.rec_step) as i64;
        let index = index.clamp(0, self.values.len() as i64 - 1) as usize;
        self.values[index]
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for SigmoidTable {
    fn default() -> Self {
        Self::build()
    }
}

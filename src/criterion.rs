//! Cost and stopping policies consumed by the optimizer.
use nalgebra::DVector;

/// Scalar cost of a residual vector `$\vec{e} = \vec{x} - \vec{f}(\vec{p})$`.
///
/// The optimizer itself always minimizes `$\|\vec{e}\|^2$`; the cost is what
/// the [`BreakingCriterion`] sees and what the report carries.
pub trait CostFunction {
    fn cost(&self, residuals: &DVector<f64>) -> f64;
}

/// Plain sum of squared residuals.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SumOfSquares;

impl CostFunction for SumOfSquares {
    fn cost(&self, residuals: &DVector<f64>) -> f64 {
        residuals.norm_squared()
    }
}

/// `$\sum_i w_i e_i^2$`.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedSumOfSquares {
    weights: DVector<f64>,
}

impl WeightedSumOfSquares {
    /// # Panics
    ///
    /// Panics if a weight is negative or not finite.
    pub fn new(weights: DVector<f64>) -> Self {
        assert!(
            weights.iter().all(|w| w.is_finite() && *w >= 0.0),
            "weights must be finite and >= 0"
        );
        Self { weights }
    }

    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }
}

impl CostFunction for WeightedSumOfSquares {
    fn cost(&self, residuals: &DVector<f64>) -> f64 {
        assert_eq!(
            residuals.len(),
            self.weights.len(),
            "one weight per residual"
        );
        residuals
            .iter()
            .zip(self.weights.iter())
            .map(|(e, w)| w * e * e)
            .sum()
    }
}

/// Decides from the current cost and the iteration count whether to stop.
pub trait BreakingCriterion {
    fn is_complete(&self, cost: f64, iteration: usize) -> bool;
}

impl<F> BreakingCriterion for F
where
    F: Fn(f64, usize) -> bool,
{
    fn is_complete(&self, cost: f64, iteration: usize) -> bool {
        self(cost, iteration)
    }
}

/// Stop once the cost drops below a threshold or the iteration cap is hit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IterationCostCriterion {
    pub max_iterations: usize,
    pub cost_threshold: f64,
}

impl IterationCostCriterion {
    pub fn new(max_iterations: usize, cost_threshold: f64) -> Self {
        Self {
            max_iterations,
            cost_threshold,
        }
    }
}

impl Default for IterationCostCriterion {
    fn default() -> Self {
        Self::new(150, 1e-10)
    }
}

impl BreakingCriterion for IterationCostCriterion {
    fn is_complete(&self, cost: f64, iteration: usize) -> bool {
        cost < self.cost_threshold || iteration >= self.max_iterations
    }
}

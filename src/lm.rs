use log::{debug, trace, warn};
use nalgebra::{DMatrix, DVector, SMatrix, SVector};

use crate::criterion::{BreakingCriterion, CostFunction};
use crate::line_search::{backtracking, projected_gradient, GradientStep};
use crate::lu;
use crate::trust_region::Damping;
use crate::utils::finite_difference::{Differencing, FiniteDifference};
use crate::utils::Bounds;
use crate::ForwardModel;

#[cfg(test)]
pub(crate) mod test_helpers;
#[cfg(test)]
mod test_examples;
#[cfg(test)]
mod test_init_step;

/// A step is accepted outright if it lowers `$\|\vec{e}\|^2$` below this
/// fraction of the current value.
pub const GAMMA_SQ: f64 = 0.99995 * 0.99995;
/// Scale of the descent test `$\vec{g}^\top\Delta\vec{p} \leq -\rho\|\Delta\vec{p}\|^{p}$`.
pub const RHO: f64 = 1e-8;
/// Exponent `$p$` of the descent test.
pub const POW: f64 = 2.1;

/// Reasons for terminating the minimization.
///
/// None of these is an error. Check the cost in the report to judge the
/// quality of the result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// `$\|\mathbf{J}^\top\vec{e}\|_\infty$` over the free parameters is small
    /// and every parameter on a bound is optimal there.
    SmallGradient,
    /// The relative change of the parameters is small.
    SmallStep,
    /// `$\|\vec{e}\|^2$` is small.
    SmallResiduals,
    /// The damped system produced an unreasonably large step.
    Singular,
    /// The damped system stayed unsolvable while increasing the damping.
    DampingOverflow,
    /// The model produced `NaN` or `$\pm\infty$` at the start point, or at
    /// every trial point of the gradient search.
    NonFiniteResiduals,
    /// The [`BreakingCriterion`] fired.
    BreakingCriterion,
}

/// Information about the minimization.
#[derive(Clone, Debug, PartialEq)]
pub struct MinimizationReport {
    pub termination: TerminationReason,
    /// Number of completed outer iterations.
    pub number_of_iterations: usize,
    /// Number of forward model evaluations, including the Jacobian.
    pub number_of_evaluations: usize,
    /// Cost at the returned parameters.
    pub objective_function: f64,
    /// Cost at the (projected) initial parameters.
    pub initial_objective_function: f64,
}

/// Forward model evaluated at a candidate point.
#[derive(Clone, Debug)]
pub(crate) struct Trial<const N: usize> {
    pub params: SVector<f64, N>,
    pub signal: DVector<f64>,
    /// `$\vec{x} - \vec{f}(\vec{p})$`
    pub residuals: DVector<f64>,
    pub norm_squared: f64,
}

/// The model together with the observation it is fitted to.
pub(crate) struct Objective<'a, M: ?Sized, const N: usize> {
    model: &'a mut M,
    observation: &'a DVector<f64>,
    pub evaluations: usize,
}

impl<'a, M, const N: usize> Objective<'a, M, N>
where
    M: ForwardModel<N> + ?Sized,
{
    pub fn new(model: &'a mut M, observation: &'a DVector<f64>) -> Self {
        Self {
            model,
            observation,
            evaluations: 0,
        }
    }

    pub fn trial(&mut self, params: SVector<f64, N>) -> Trial<N> {
        let mut signal = DVector::zeros(self.observation.len());
        self.model.evaluate(&params, &mut signal);
        self.evaluations += 1;
        let residuals = self.observation - &signal;
        let norm_squared = residuals.norm_squared();
        Trial {
            params,
            signal,
            residuals,
            norm_squared,
        }
    }
}

/// Bounded Levenberg-Marquardt optimizer.
///
/// Each iteration solves the damped normal equations with a finite-difference
/// Jacobian and projects the step onto the box. When the projected step does
/// not reduce `$\|\vec{e}\|^2$` enough, a backtracking line search along the
/// step and finally a projected-gradient search take over.
///
/// The method follows the box-constrained variant of `levmar`:
///
/// > C. Kanzow, N. Yamashita and M. Fukushima. Levenberg-Marquardt methods for
/// > constrained nonlinear equations with strong local convergence properties.
/// > Journal of Computational and Applied Mathematics 172 (2004), pp. 375-397.
///
/// The runtime and termination behavior can be controlled by various hyperparameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LevenbergMarquardt {
    tau: f64,
    gradient_tolerance: f64,
    step_tolerance: f64,
    residual_tolerance: f64,
    diff_delta: f64,
    differencing: Differencing,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self {
            tau: 1e-3,
            gradient_tolerance: 1e-10,
            step_tolerance: 1e-10,
            residual_tolerance: 1e-10,
            diff_delta: 0.1,
            differencing: Differencing::Central,
        }
    }

    /// Set the scale `$\tau$` of the initial damping.
    ///
    /// # Panics
    ///
    /// Panics if `$\tau \leq 0$`.
    pub fn with_tau(self, tau: f64) -> Self {
        assert!(tau > 0.0, "tau must be > 0");
        Self { tau, ..self }
    }

    /// Stop when `$\|\mathbf{J}^\top\vec{e}\|_\infty$` over the free parameters
    /// is at most this value and every parameter on a bound is optimal.
    ///
    /// # Panics
    ///
    /// Panics if the tolerance is negative.
    pub fn with_gradient_tolerance(self, gradient_tolerance: f64) -> Self {
        assert!(
            gradient_tolerance >= 0.0,
            "gradient_tolerance must be >= 0"
        );
        Self {
            gradient_tolerance,
            ..self
        }
    }

    /// Stop when `$\|\Delta\vec{p}\|^2 \leq \varepsilon_2^2\|\vec{p}\|^2$`.
    ///
    /// # Panics
    ///
    /// Panics if the tolerance is negative.
    pub fn with_step_tolerance(self, step_tolerance: f64) -> Self {
        assert!(step_tolerance >= 0.0, "step_tolerance must be >= 0");
        Self {
            step_tolerance,
            ..self
        }
    }

    /// Stop when `$\|\vec{e}\|^2$` is at most this value.
    ///
    /// # Panics
    ///
    /// Panics if the tolerance is negative.
    pub fn with_residual_tolerance(self, residual_tolerance: f64) -> Self {
        assert!(
            residual_tolerance >= 0.0,
            "residual_tolerance must be >= 0"
        );
        Self {
            residual_tolerance,
            ..self
        }
    }

    /// Set the minimal finite-difference step `$\Delta_{\min}$`.
    ///
    /// Parameter `$j$` is perturbed by `$\max(|10^{-4}p_j|, \Delta_{\min})$`.
    ///
    /// # Panics
    ///
    /// Panics if `$\Delta_{\min} \leq 0$`.
    pub fn with_diff_delta(self, diff_delta: f64) -> Self {
        assert!(diff_delta > 0.0, "diff_delta must be > 0");
        Self { diff_delta, ..self }
    }

    pub fn with_differencing(self, differencing: Differencing) -> Self {
        Self {
            differencing,
            ..self
        }
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn gradient_tolerance(&self) -> f64 {
        self.gradient_tolerance
    }

    pub fn step_tolerance(&self) -> f64 {
        self.step_tolerance
    }

    pub fn residual_tolerance(&self) -> f64 {
        self.residual_tolerance
    }

    pub fn diff_delta(&self) -> f64 {
        self.diff_delta
    }

    pub fn differencing(&self) -> Differencing {
        self.differencing
    }

    /// Fit `model` to `observation` starting from `initial`.
    ///
    /// An infeasible `initial` is projected onto `bounds` first. The returned
    /// parameters always lie within `bounds`.
    ///
    /// # Panics
    ///
    /// Panics if `observation` has fewer entries than there are parameters.
    pub fn minimize<M, C, B, const N: usize>(
        &self,
        model: &mut M,
        initial: SVector<f64, N>,
        observation: &DVector<f64>,
        bounds: &Bounds<N>,
        cost: &C,
        criterion: &B,
    ) -> (SVector<f64, N>, MinimizationReport)
    where
        M: ForwardModel<N> + ?Sized,
        C: CostFunction + ?Sized,
        B: BreakingCriterion + ?Sized,
    {
        let m = observation.len();
        assert!(
            m >= N,
            "need at least as many observations ({}) as parameters ({})",
            m,
            N
        );

        let mut p = initial;
        if !bounds.contains(&p) {
            warn!("initial parameters {:?} violate the bounds, projecting", p.as_slice());
            bounds.project(&mut p);
        }

        let mut objective = Objective::new(model, observation);
        let mut current = objective.trial(p);
        let initial_cost = cost.cost(&current.residuals);

        let finish = |current: Trial<N>,
                      termination: TerminationReason,
                      iterations: usize,
                      evaluations: usize| {
            let report = MinimizationReport {
                termination,
                number_of_iterations: iterations,
                number_of_evaluations: evaluations,
                objective_function: cost.cost(&current.residuals),
                initial_objective_function: initial_cost,
            };
            debug!(
                "minimization stopped: {:?} after {} iterations and {} evaluations, cost {:e}",
                report.termination,
                report.number_of_iterations,
                report.number_of_evaluations,
                report.objective_function
            );
            (current.params, report)
        };

        if !current.norm_squared.is_finite() {
            let evaluations = objective.evaluations;
            return finish(current, TerminationReason::NonFiniteResiduals, 0, evaluations);
        }

        let bounded = !bounds.is_unbounded();
        let max_relative_step = 1e3 * f64::EPSILON.sqrt();
        let mut differences = FiniteDifference::new(m, self.differencing, self.diff_delta);
        let mut jacobian = DMatrix::<f64>::zeros(m, N);
        let mut jtj = SMatrix::<f64, N, N>::zeros();
        let mut jte = SVector::<f64, N>::zeros();
        let mut damping = Damping::initial(self.tau, 0.0, bounded, current.norm_squared);
        let mut gradient_step = GradientStep::default();
        let mut iteration = 0;

        let termination = loop {
            if criterion.is_complete(cost.cost(&current.residuals), iteration) {
                break TerminationReason::BreakingCriterion;
            }
            if current.norm_squared <= self.residual_tolerance {
                break TerminationReason::SmallResiduals;
            }

            objective.evaluations += differences.jacobian(
                &mut *objective.model,
                &current.params,
                &current.signal,
                &mut jacobian,
            );
            normal_equations(&jacobian, &current.residuals, &mut jtj, &mut jte);

            // bound-constrained gradient test, a fixed parameter counts as
            // sitting on its lower bound
            let p = current.params;
            let mut active = 0;
            let mut optimal = 0;
            let mut gradient_max = 0.0f64;
            for i in 0..N {
                if bounds.at_lower(&p, i) {
                    active += 1;
                    if jte[i] < 0.0 {
                        optimal += 1;
                    }
                } else if bounds.at_upper(&p, i) {
                    active += 1;
                    if jte[i] > 0.0 {
                        optimal += 1;
                    }
                } else {
                    gradient_max = gradient_max.max(jte[i].abs());
                }
            }
            if optimal == active && gradient_max <= self.gradient_tolerance {
                break TerminationReason::SmallGradient;
            }

            let diag = jtj.diagonal();
            let p_norm_squared = p.norm_squared();
            if iteration == 0 {
                damping =
                    Damping::initial(self.tau, diag.max(), bounded, current.norm_squared);
            }
            trace!(
                "iteration {}: |e|^2 = {:e}, mu = {:e}",
                iteration,
                current.norm_squared,
                damping.mu
            );

            let step_tolerance_squared = self.step_tolerance * self.step_tolerance;
            let stop = loop {
                let mut damped = jtj;
                for i in 0..N {
                    damped[(i, i)] = diag[i] + damping.mu;
                }
                let dp = match lu::solve(&damped, &jte) {
                    Some(dp) => dp,
                    None => match damping.increase() {
                        Ok(()) => continue,
                        Err(_) => break Some(TerminationReason::DampingOverflow),
                    },
                };

                let projected = bounds.projected(p + dp);
                let dp = projected - p;
                let dp_norm_squared = dp.norm_squared();
                if dp_norm_squared <= step_tolerance_squared * p_norm_squared {
                    break Some(TerminationReason::SmallStep);
                }
                if dp_norm_squared
                    >= (p_norm_squared + self.step_tolerance) / (f64::EPSILON * f64::EPSILON)
                {
                    break Some(TerminationReason::Singular);
                }

                let trial = objective.trial(projected);
                if trial.norm_squared.is_finite()
                    && trial.norm_squared <= GAMMA_SQ * current.norm_squared
                {
                    damping.accept(
                        dp.iter(),
                        jte.iter(),
                        current.norm_squared - trial.norm_squared,
                        trial.norm_squared,
                    );
                    gradient_step.previous = false;
                    current = trial;
                    break None;
                }

                // the damped step failed, fall back to line searches
                let gradient = -jte;
                let mut candidate = None;
                if gradient.dot(&dp) <= -RHO * dp_norm_squared.powf(POW / 2.0) {
                    let max_step = 1e3 * p_norm_squared.sqrt().max(1.0);
                    candidate = backtracking(
                        &mut objective,
                        &p,
                        current.norm_squared,
                        &gradient,
                        &dp,
                        bounds,
                        max_step,
                        max_relative_step,
                    );
                    if candidate.is_some() {
                        gradient_step.previous = false;
                    }
                }
                if candidate.is_none() {
                    candidate = projected_gradient(
                        &mut objective,
                        &p,
                        current.norm_squared,
                        &gradient,
                        bounds,
                        &mut gradient_step,
                    );
                }
                let Some(candidate) = candidate else {
                    break Some(TerminationReason::NonFiniteResiduals);
                };
                if (candidate.params - p).norm_squared() <= step_tolerance_squared * p_norm_squared {
                    break Some(TerminationReason::SmallStep);
                }
                current = candidate;
                break None;
            };

            iteration += 1;
            if let Some(stop) = stop {
                break stop;
            }
        };

        let evaluations = objective.evaluations;
        finish(current, termination, iteration, evaluations)
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulate `$\mathbf{J}^\top\mathbf{J}$` and `$\mathbf{J}^\top\vec{e}$`.
///
/// The summation order is fixed so results are reproducible bit for bit.
fn normal_equations<const N: usize>(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    jtj: &mut SMatrix<f64, N, N>,
    jte: &mut SVector<f64, N>,
) {
    jtj.fill(0.0);
    jte.fill(0.0);
    for l in (0..jacobian.nrows()).rev() {
        for i in (0..N).rev() {
            let a = jacobian[(l, i)];
            for j in (0..=i).rev() {
                jtj[(i, j)] += jacobian[(l, j)] * a;
            }
            jte[i] += a * residuals[l];
        }
    }
    for i in 0..N {
        for j in i + 1..N {
            jtj[(i, j)] = jtj[(j, i)];
        }
    }
}

//! Fallback searches used when a damped step is rejected.
//!
//! Both searches stay inside the box by projecting every trial point.
use nalgebra::SVector;

use crate::lm::{Objective, Trial};
use crate::utils::Bounds;
use crate::ForwardModel;

/// Armijo constant of the sufficient decrease condition.
pub const ALPHA: f64 = 1e-4;
/// Shrink factor of the projected-gradient step length.
pub const BETA: f64 = 0.9;
/// Largest step length of the projected-gradient search.
pub const T_INIT: f64 = 1.0;
/// The projected-gradient search gives up below this step length.
pub const T_MIN_GRADIENT: f64 = 1e-18;

/// Relaxed decrease required to keep a remembered gradient step length.
const REMEMBERED_STEP_DECREASE: f64 = 0.99999;

/// Backtracking search along the descent direction `dp`.
///
/// Starts with the full step `$\lambda = 1$`, fits a quadratic on the first
/// backtrack and a cubic afterwards, with `$\lambda$` kept within
/// `$[0.1\lambda, 0.5\lambda]$`. A non-finite trial value shrinks
/// `$\lambda$` tenfold. `norm_squared` is `$\|\vec{e}\|^2$` at `p` and
/// `gradient` is `$-\mathbf{J}^\top\vec{e}$`.
///
/// Returns `None` once the relative step drops below `min_step` without
/// sufficient decrease.
///
/// This follows `lnsrch` of
///
/// > J. E. Dennis Jr. and R. B. Schnabel. Numerical Methods for Unconstrained
/// > Optimization and Nonlinear Equations. Prentice Hall, 1983.
#[allow(clippy::too_many_arguments)]
pub(crate) fn backtracking<M, const N: usize>(
    objective: &mut Objective<'_, M, N>,
    p: &SVector<f64, N>,
    norm_squared: f64,
    gradient: &SVector<f64, N>,
    dp: &SVector<f64, N>,
    bounds: &Bounds<N>,
    max_step: f64,
    min_step: f64,
) -> Option<Trial<N>>
where
    M: ForwardModel<N> + ?Sized,
{
    let f = 0.5 * norm_squared;
    let mut dp = *dp;
    let length = dp.norm();
    if length > max_step {
        dp *= max_step / length;
    }
    let slope = gradient.dot(&dp);

    let relative_length = dp
        .iter()
        .zip(p.iter())
        .fold(0.0f64, |max, (d, x)| max.max(d.abs() / x.abs().max(1.0)));
    let min_lambda = min_step / relative_length;

    let mut lambda = 1.0;
    let mut first = true;
    let mut previous_lambda = 0.0;
    let mut previous_f = 0.0;
    loop {
        let trial = objective.trial(bounds.projected(p + dp * lambda));
        let trial_f = 0.5 * trial.norm_squared;
        if trial_f <= f + slope * ALPHA * lambda {
            return Some(trial);
        }
        if lambda < min_lambda {
            return None;
        }
        if !trial_f.is_finite() {
            lambda *= 0.1;
            first = true;
            continue;
        }

        let mut next = if first {
            first = false;
            -lambda * slope / ((trial_f - f - slope) * 2.0)
        } else {
            let t1 = trial_f - f - lambda * slope;
            let t2 = previous_f - f - previous_lambda * slope;
            let t3 = 1.0 / (lambda - previous_lambda);
            let a = 3.0 * t3 * (t1 / (lambda * lambda) - t2 / (previous_lambda * previous_lambda));
            let b = t3 * (t2 * lambda / (previous_lambda * previous_lambda)
                - t1 * previous_lambda / (lambda * lambda));
            let discriminant = b * b - a * slope;
            let root = discriminant.sqrt();
            // pick the root that avoids cancellation
            let candidate = if discriminant > b * b {
                (-b + if a < 0.0 { -root } else { root }) / a
            } else {
                (-b + if a < 0.0 { root } else { -root }) / a
            };
            candidate.min(lambda * 0.5)
        };
        previous_lambda = lambda;
        previous_f = trial_f;
        if !(next >= lambda * 0.1) {
            next = lambda * 0.1;
        }
        lambda = next;
    }
}

/// Step length memory of the projected-gradient search.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct GradientStep {
    pub length: f64,
    /// The previous iteration ended with a gradient step.
    pub previous: bool,
}

/// Armijo search along the projected negative gradient.
///
/// The first step length is `$t_0 = \min(100/(1+\|g\|), 1)$`, or the one
/// that succeeded last time if the previous iteration also took a gradient
/// step. A remembered length that already yields a near-linear decrease is
/// reset to `$t_0$`. Non-finite trials shrink the step like rejected ones.
///
/// Returns the last finite trial, which may not satisfy the Armijo condition
/// if the search ran down to [`T_MIN_GRADIENT`], or `None` if no trial was
/// finite.
pub(crate) fn projected_gradient<M, const N: usize>(
    objective: &mut Objective<'_, M, N>,
    p: &SVector<f64, N>,
    norm_squared: f64,
    gradient: &SVector<f64, N>,
    bounds: &Bounds<N>,
    step: &mut GradientStep,
) -> Option<Trial<N>>
where
    M: ForwardModel<N> + ?Sized,
{
    let t0 = (100.0 / (1.0 + gradient.norm())).min(T_INIT);
    if !step.previous {
        step.length = t0;
    }
    let mut accepted = None;
    while step.length > T_MIN_GRADIENT {
        let trial = objective.trial(bounds.projected(p - gradient * step.length));
        if !trial.norm_squared.is_finite() {
            step.length *= BETA;
            continue;
        }
        let decrease = gradient.dot(&(trial.params - p));
        let norm = trial.norm_squared;
        accepted = Some(trial);
        if step.previous && norm <= norm_squared + 2.0 * REMEMBERED_STEP_DECREASE * decrease {
            step.length = t0;
            step.previous = false;
            continue;
        }
        if norm <= norm_squared + 2.0 * ALPHA * decrease {
            break;
        }
        step.length *= BETA;
    }
    if accepted.is_some() {
        step.previous = true;
    }
    accepted
}

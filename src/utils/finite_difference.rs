//! Finite-difference approximation of the forward model's Jacobian.
use nalgebra::{DMatrix, DVector, SVector};
use serde::{Deserialize, Serialize};

use crate::ForwardModel;

#[cfg(test)]
use approx::assert_relative_eq;

/// Relative perturbation applied to each parameter.
const RELATIVE_STEP: f64 = 1e-4;

/// Difference quotient used for the Jacobian.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Differencing {
    /// `$(f(p + \delta) - f(p - \delta)) / 2\delta$`, two evaluations per parameter.
    #[default]
    Central,
    /// `$(f(p + \delta) - f(p)) / \delta$`, one evaluation per parameter.
    Forward,
}

/// The perturbation `$\delta_j = \max(|10^{-4} p_j|, \Delta_{\min})$`.
#[inline]
pub fn step(p: f64, min_step: f64) -> f64 {
    let d = (RELATIVE_STEP * p).abs();
    if d < min_step {
        min_step
    } else {
        d
    }
}

/// Scratch space for repeated Jacobian approximations of one problem size.
pub(crate) struct FiniteDifference {
    differencing: Differencing,
    min_step: f64,
    minus: DVector<f64>,
    plus: DVector<f64>,
}

impl FiniteDifference {
    pub fn new(m: usize, differencing: Differencing, min_step: f64) -> Self {
        Self {
            differencing,
            min_step,
            minus: DVector::zeros(m),
            plus: DVector::zeros(m),
        }
    }

    /// Fill `jacobian` (`$m \times N$`) at `p`, where `signal` is the model
    /// output at `p`. Returns the number of model evaluations.
    ///
    /// The perturbed parameters are not projected onto any bounds.
    pub fn jacobian<M, const N: usize>(
        &mut self,
        model: &mut M,
        p: &SVector<f64, N>,
        signal: &DVector<f64>,
        jacobian: &mut DMatrix<f64>,
    ) -> usize
    where
        M: ForwardModel<N> + ?Sized,
    {
        let mut perturbed = *p;
        let mut evaluations = 0;
        for j in 0..N {
            let d = step(p[j], self.min_step);
            match self.differencing {
                Differencing::Central => {
                    perturbed[j] = p[j] - d;
                    model.evaluate(&perturbed, &mut self.minus);
                    perturbed[j] = p[j] + d;
                    model.evaluate(&perturbed, &mut self.plus);
                    evaluations += 2;
                    let scale = 0.5 / d;
                    for i in 0..signal.len() {
                        jacobian[(i, j)] = (self.plus[i] - self.minus[i]) * scale;
                    }
                }
                Differencing::Forward => {
                    perturbed[j] = p[j] + d;
                    model.evaluate(&perturbed, &mut self.plus);
                    evaluations += 1;
                    let scale = 1.0 / d;
                    for i in 0..signal.len() {
                        jacobian[(i, j)] = (self.plus[i] - signal[i]) * scale;
                    }
                }
            }
            perturbed[j] = p[j];
        }
        evaluations
    }
}

/// Approximate the `$m \times N$` Jacobian of `model` at `p`.
///
/// Uses the same perturbation rule as the optimizer, so this is handy for
/// checking what the optimizer sees.
pub fn differentiate_numerically<M, const N: usize>(
    model: &mut M,
    p: &SVector<f64, N>,
    m: usize,
    min_step: f64,
    differencing: Differencing,
) -> DMatrix<f64>
where
    M: ForwardModel<N> + ?Sized,
{
    let mut signal = DVector::zeros(m);
    model.evaluate(p, &mut signal);
    let mut jacobian = DMatrix::zeros(m, N);
    FiniteDifference::new(m, differencing, min_step).jacobian(model, p, &signal, &mut jacobian);
    jacobian
}

#[test]
fn test_step() {
    assert_eq!(step(0.0, 0.1), 0.1);
    assert_eq!(step(-50.0, 0.1), 0.1);
    assert_relative_eq!(step(-5000.0, 0.1), 0.5);
    assert_relative_eq!(step(2e4, 1e-3), 2.0);
}

#[test]
fn test_linear() {
    let mut model = |p: &SVector<f64, 2>, out: &mut DVector<f64>| {
        out[0] = 3. * p[0] - p[1];
        out[1] = 0.5 * p[1];
        out[2] = p[0] + p[1] + 1.;
    };
    let p = SVector::<f64, 2>::new(0.3, -7.);
    let expected = DMatrix::from_row_slice(3, 2, &[3., -1., 0., 0.5, 1., 1.]);
    for differencing in [Differencing::Central, Differencing::Forward] {
        let jac = differentiate_numerically(&mut model, &p, 3, 0.1, differencing);
        assert_relative_eq!(jac, expected, epsilon = 1e-12);
    }
}

#[test]
fn test_quadratic() {
    let mut model = |p: &SVector<f64, 1>, out: &mut DVector<f64>| {
        out[0] = p[0] * p[0];
    };
    let p = SVector::<f64, 1>::new(3.);
    // central differences are exact for quadratics
    let jac = differentiate_numerically(&mut model, &p, 1, 0.1, Differencing::Central);
    assert_relative_eq!(jac[(0, 0)], 6., epsilon = 1e-12);
    // forward differences are off by delta
    let jac = differentiate_numerically(&mut model, &p, 1, 0.1, Differencing::Forward);
    assert_relative_eq!(jac[(0, 0)], 6.1, epsilon = 1e-12);
}

#[test]
fn test_counts_evaluations() {
    let mut calls = 0;
    let mut model = |p: &SVector<f64, 3>, out: &mut DVector<f64>| {
        calls += 1;
        out.copy_from(p);
    };
    let p = SVector::<f64, 3>::zeros();
    let mut signal = DVector::zeros(3);
    let mut jacobian = DMatrix::zeros(3, 3);
    let mut fd = FiniteDifference::new(3, Differencing::Central, 0.1);
    assert_eq!(fd.jacobian(&mut model, &p, &signal, &mut jacobian), 6);
    model.evaluate(&p, &mut signal);
    let mut fd = FiniteDifference::new(3, Differencing::Forward, 0.1);
    assert_eq!(fd.jacobian(&mut model, &p, &signal, &mut jacobian), 3);
    assert_relative_eq!(jacobian, DMatrix::identity(3, 3), epsilon = 1e-12);
    assert_eq!(calls, 10);
}

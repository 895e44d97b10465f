//! Tests with small example problems.
//!
//! Expected iterates were cross-checked against a reference implementation
//! of the same bounded algorithm.
use approx::assert_relative_eq;
use nalgebra::{dvector, DMatrix, DVector, SVector, Vector2};

use super::test_helpers::identity;
use crate::criterion::{IterationCostCriterion, SumOfSquares};
use crate::utils::{differentiate_numerically, Bounds, Differencing};
use crate::{LevenbergMarquardt, TerminationReason};

fn minimize<M: crate::ForwardModel<2>>(
    model: &mut M,
    initial: Vector2<f64>,
    observation: DVector<f64>,
    bounds: &Bounds<2>,
) -> (Vector2<f64>, crate::MinimizationReport) {
    LevenbergMarquardt::new().minimize(
        model,
        initial,
        &observation,
        bounds,
        &SumOfSquares,
        &IterationCostCriterion::default(),
    )
}

fn unit_box() -> Bounds<2> {
    Bounds::between(Vector2::new(0., -1.), Vector2::new(1., 1.)).unwrap()
}

/// Residuals `$((p_0 - 1.5)^2, (p_1 + 0.5)^2)$` against a zero target.
fn shifted_squares(p: &SVector<f64, 2>, out: &mut DVector<f64>) {
    out[0] = (p[0] - 1.5).powi(2);
    out[1] = (p[1] + 0.5).powi(2);
}

fn rosenbrock(p: &SVector<f64, 2>, out: &mut DVector<f64>) {
    out[0] = 10. * (p[1] - p[0] * p[0]);
    out[1] = 1. - p[0];
}

fn decay_times() -> Vec<f64> {
    (0..10).map(|i| 0.1 * i as f64).collect()
}

fn decay(p: &SVector<f64, 2>, out: &mut DVector<f64>) {
    for (y, t) in out.iter_mut().zip(decay_times()) {
        *y = p[0] * (p[1] * t).exp();
    }
}

#[test]
fn test_identity_unbounded() {
    let mut model = identity::<2>();
    let (p, report) = minimize(
        &mut model,
        Vector2::new(0.5, 0.),
        dvector![0.3, -0.7],
        &Bounds::unbounded(),
    );
    assert_eq!(report.termination, TerminationReason::BreakingCriterion);
    assert!(report.number_of_iterations <= 3);
    assert_relative_eq!(p, Vector2::new(0.3, -0.7), epsilon = 1e-6);
    assert!(report.objective_function < 1e-10);
    assert_relative_eq!(report.initial_objective_function, 0.53, epsilon = 1e-12);
}

#[test]
fn test_identity_clamped_to_box() {
    let mut model = identity::<2>();
    let (p, report) = minimize(
        &mut model,
        Vector2::new(0.5, 0.),
        dvector![2., -3.],
        &unit_box(),
    );
    // the unconstrained optimum lies outside, the result is the nearest corner
    assert_eq!(p, Vector2::new(1., -1.));
    assert_eq!(report.termination, TerminationReason::SmallGradient);
    assert_eq!(report.number_of_iterations, 1);
    assert_eq!(report.number_of_evaluations, 10);
    assert_relative_eq!(report.objective_function, 5.);
}

#[test]
fn test_convex_quadratic() {
    let mut model = shifted_squares;
    let jac = differentiate_numerically(
        &mut model,
        &Vector2::new(3., 2.),
        2,
        0.1,
        Differencing::Central,
    );
    assert_relative_eq!(
        jac,
        DMatrix::from_row_slice(2, 2, &[3., 0., 0., 5.]),
        epsilon = 1e-12
    );

    let (p, report) = minimize(&mut model, Vector2::new(3., 2.), dvector![0., 0.], &Bounds::unbounded());
    assert!(report.number_of_iterations < 50);
    assert!(report.objective_function < 1e-10);
    assert_relative_eq!(p, Vector2::new(1.5, -0.5), epsilon = 1e-2);
}

#[test]
fn test_quadratic_with_active_lower_bound() {
    let mut model = shifted_squares;
    let bounds = Bounds::between(Vector2::new(2., -5.), Vector2::new(5., 5.)).unwrap();
    let (p, report) = minimize(&mut model, Vector2::new(3., 2.), dvector![0., 0.], &bounds);
    assert!(bounds.contains(&p));
    // the first component ends exactly on its bound
    assert_eq!(p[0], 2.);
    assert_relative_eq!(p[1], -0.5, epsilon = 1e-2);
    assert_relative_eq!(report.objective_function, 0.0625, epsilon = 1e-6);
    assert!(report.number_of_iterations <= 150);
}

#[test]
fn test_rosenbrock() {
    let mut model = rosenbrock;
    let (p, report) = minimize(
        &mut model,
        Vector2::new(-1.2, 1.),
        dvector![0., 0.],
        &Bounds::unbounded(),
    );
    assert_relative_eq!(report.initial_objective_function, 24.2, epsilon = 1e-10);
    assert!(report.objective_function < 1e-9);
    assert_relative_eq!(p, Vector2::new(1., 1.), epsilon = 1e-3);
    assert!(report.number_of_iterations < 100);
}

#[test]
fn test_exponential_decay() {
    let observation = DVector::from_iterator(
        10,
        decay_times().into_iter().map(|t| 2.5 * (-1.3 * t).exp()),
    );
    let mut model = decay;
    let (p, report) = minimize(
        &mut model,
        Vector2::new(1., 0.),
        observation.clone(),
        &Bounds::unbounded(),
    );
    assert_eq!(report.termination, TerminationReason::BreakingCriterion);
    assert_relative_eq!(p, Vector2::new(2.5, -1.3), epsilon = 1e-5);

    // bounds exclude the optimum: both components end on the box
    let bounds = Bounds::between(Vector2::new(0., -1.), Vector2::new(2., 1.)).unwrap();
    let (p, report) = minimize(&mut model, Vector2::new(1., 0.), observation, &bounds);
    assert_eq!(p, Vector2::new(2., -1.));
    assert!(report.objective_function < report.initial_objective_function);
    assert_ne!(report.termination, TerminationReason::NonFiniteResiduals);
}

#[test]
fn test_rosenbrock_in_box() {
    let bounds = unit_box();
    let mut model = rosenbrock;
    let (p, report) = minimize(&mut model, Vector2::new(0.9, -0.9), dvector![0., 0.], &bounds);
    assert!(bounds.contains(&p));
    assert!(report.objective_function < 1e-10);
    // the optimum sits on the upper bound of both components
    assert_relative_eq!(p, Vector2::new(1., 1.), epsilon = 1e-3);
}

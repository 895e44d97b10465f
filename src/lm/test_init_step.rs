use approx::assert_relative_eq;
use nalgebra::{dvector, DVector, Vector1, Vector2, Vector3};

use super::test_helpers::{constant, identity, MockModel};
use super::{LevenbergMarquardt, TerminationReason};
use crate::criterion::{IterationCostCriterion, SumOfSquares, WeightedSumOfSquares};
use crate::utils::Bounds;
use crate::Differencing;

fn never(_: f64, _: usize) -> bool {
    false
}

#[test]
fn nan_or_inf_residual() {
    // residuals contain inf
    let mut model = constant::<2>(dvector![1., 1., f64::INFINITY]);
    let (p, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::new(0.5, 0.5),
        &dvector![0., 0., 0.],
        &Bounds::unbounded(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(report.termination, TerminationReason::NonFiniteResiduals);
    assert_eq!(report.number_of_evaluations, 1);
    assert_eq!(report.number_of_iterations, 0);
    assert_eq!(model.calls(), [Vector2::new(0.5, 0.5)].as_ref());
    assert_eq!(report.objective_function, f64::INFINITY);
    assert_eq!(p, Vector2::new(0.5, 0.5));

    // residuals contain nan
    let mut model = constant::<2>(dvector![1., f64::NAN, 1.]);
    let (_, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::zeros(),
        &dvector![0., 0., 0.],
        &Bounds::unbounded(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(report.termination, TerminationReason::NonFiniteResiduals);
    assert_eq!(report.number_of_evaluations, 1);
    assert!(report.objective_function.is_nan());
    assert!(report.initial_objective_function.is_nan());
}

#[test]
fn already_zero() {
    // the default criterion fires on the cost first
    let mut model = constant::<2>(dvector![1., 2., 3.]);
    let (_, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::zeros(),
        &dvector![1., 2., 3.],
        &Bounds::unbounded(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(report.termination, TerminationReason::BreakingCriterion);
    assert_eq!(report.number_of_evaluations, 1);
    assert_eq!(report.objective_function, 0.);

    // without it the residual tolerance stops the run
    let mut model = constant::<2>(dvector![1., 2., 3.]);
    let (_, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::zeros(),
        &dvector![1., 2., 3. + 1e-6],
        &Bounds::unbounded(),
        &SumOfSquares,
        &never,
    );
    assert_eq!(report.termination, TerminationReason::SmallResiduals);
    assert_eq!(report.number_of_evaluations, 1);
    assert_eq!(report.number_of_iterations, 0);
    assert_relative_eq!(report.objective_function, 1e-12, epsilon = 1e-20);
}

#[test]
fn criterion_sees_cost_and_iteration() {
    let mut model = identity::<2>();
    let criterion = |cost: f64, iteration: usize| {
        assert!(cost > 0.);
        iteration >= 1
    };
    // weights scale the cost, not the steps
    let cost = WeightedSumOfSquares::new(dvector![4., 4.]);
    let (_, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::new(0.5, 0.),
        &dvector![2., -3.],
        &Bounds::between(Vector2::new(0., -1.), Vector2::new(1., 1.)).unwrap(),
        &cost,
        &criterion,
    );
    assert_eq!(report.termination, TerminationReason::BreakingCriterion);
    assert_eq!(report.number_of_iterations, 1);
    assert_relative_eq!(report.initial_objective_function, 4. * 11.25);
    assert_relative_eq!(report.objective_function, 4. * 5.);
    // start, two times two Jacobian columns, accepted step
    assert_eq!(report.number_of_evaluations, 6);
}

#[test]
fn gradient_is_zero_at_active_bounds() {
    // target below the box, everything sits on the lower bound already
    let mut model = identity::<2>();
    let (p, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::zeros(),
        &dvector![-5., -5.],
        &Bounds::between(Vector2::zeros(), Vector2::new(1., 1.)).unwrap(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(report.termination, TerminationReason::SmallGradient);
    assert_eq!(report.number_of_iterations, 0);
    // start and one central-difference Jacobian
    assert_eq!(report.number_of_evaluations, 5);
    assert_eq!(model.calls().len(), 5);
    assert_eq!(p, Vector2::zeros());
    assert_relative_eq!(report.objective_function, 50.);
}

#[test]
fn fixed_parameter_counts_as_lower_bound() {
    // the second parameter is pinned by lb == ub and J^T e < 0 there
    let mut model = identity::<2>();
    let bounds = Bounds::between(Vector2::new(-5., 0.), Vector2::new(5., 0.)).unwrap();
    let (p, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::new(0.3, 0.),
        &dvector![0.3, -1.],
        &bounds,
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(report.termination, TerminationReason::SmallGradient);
    assert_eq!(report.number_of_iterations, 0);
    assert_eq!(report.number_of_evaluations, 5);
    assert_eq!(p, Vector2::new(0.3, 0.));
    assert_relative_eq!(report.objective_function, 1.);
}

#[test]
fn small_step() {
    let mut model = identity::<2>();
    let (p, report) = LevenbergMarquardt::new().with_step_tolerance(10.).minimize(
        &mut model,
        Vector2::new(1., 1.),
        &dvector![1.5, 1.5],
        &Bounds::unbounded(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(report.termination, TerminationReason::SmallStep);
    assert_eq!(report.number_of_iterations, 1);
    // start and one central-difference Jacobian, the step is never evaluated
    assert_eq!(report.number_of_evaluations, 5);
    assert_eq!(p, Vector2::new(1., 1.));
}

#[test]
fn singular_step() {
    // a nearly flat model asks for a step far beyond any sensible scale
    let mut model = MockModel::new(|p: &Vector1<f64>, out: &mut DVector<f64>| out[0] = 1e-12 * p[0]);
    let (p, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector1::zeros(),
        &dvector![1e3],
        &Bounds::unbounded(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(report.termination, TerminationReason::Singular);
    assert_eq!(report.number_of_iterations, 1);
    assert_eq!(p, Vector1::zeros());
    assert_relative_eq!(report.objective_function, 1e6);
}

#[test]
fn damping_overflow_keeps_start() {
    // finite only at the start, so every damped system is non-finite
    let mut model = MockModel::new(|p: &Vector1<f64>, out: &mut DVector<f64>| {
        out[0] = if p[0] == 0.5 { 1. } else { f64::INFINITY }
    });
    let (p, report) = LevenbergMarquardt::new()
        .with_differencing(Differencing::Forward)
        .minimize(
            &mut model,
            Vector1::new(0.5),
            &dvector![2.],
            &Bounds::unbounded(),
            &SumOfSquares,
            &IterationCostCriterion::default(),
        );
    assert_eq!(report.termination, TerminationReason::DampingOverflow);
    assert_eq!(report.number_of_iterations, 1);
    // start and one forward difference
    assert_eq!(report.number_of_evaluations, 2);
    assert_eq!(p, Vector1::new(0.5));
    assert_eq!(report.objective_function, 1.);
}

#[test]
fn non_finite_trial_falls_back_to_line_search() {
    // NaN outside the unit disc, the first damped step lands there
    let mut model = MockModel::new(|p: &Vector2<f64>, out: &mut DVector<f64>| {
        if p.norm() > 1. {
            out.fill(f64::NAN);
        } else {
            out.copy_from(p);
        }
    });
    let (p, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::zeros(),
        &dvector![2., 2.],
        &Bounds::unbounded(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert!(model.calls().iter().any(|q| q.norm() > 1.));
    assert!(report.number_of_iterations >= 1);
    assert!(p.norm() <= 1.);
    assert!(report.objective_function.is_finite());
    assert_relative_eq!(report.initial_objective_function, 8.);
    assert!(report.objective_function < report.initial_objective_function);
}

#[test]
fn infeasible_start_is_projected() {
    let mut model = identity::<2>();
    let (p, report) = LevenbergMarquardt::new().minimize(
        &mut model,
        Vector2::new(3., -2.),
        &dvector![0.5, 0.5],
        &Bounds::between(Vector2::zeros(), Vector2::new(1., 1.)).unwrap(),
        &SumOfSquares,
        &IterationCostCriterion::default(),
    );
    assert_eq!(model.calls()[0], Vector2::new(1., 0.));
    assert_relative_eq!(report.initial_objective_function, 0.5);
    assert_relative_eq!(p, Vector2::new(0.5, 0.5), epsilon = 1e-6);
    assert!(report.objective_function < 1e-10);
}

#[test]
fn forward_differences_need_fewer_evaluations() {
    let mut model = identity::<3>();
    let config = LevenbergMarquardt::new().with_differencing(Differencing::Forward);
    let criterion = |_: f64, iteration: usize| iteration >= 1;
    let (_, report) = config.minimize(
        &mut model,
        Vector3::zeros(),
        &dvector![0.25, 0.5, 0.75],
        &Bounds::unbounded(),
        &SumOfSquares,
        &criterion,
    );
    assert_eq!(report.number_of_iterations, 1);
    // start, three forward differences, accepted step
    assert_eq!(report.number_of_evaluations, 5);
}

#[test]
#[should_panic(expected = "need at least as many observations")]
fn too_few_observations() {
    let mut model = MockModel::new(|_: &nalgebra::SVector<f64, 3>, out: &mut DVector<f64>| {
        out.fill(0.)
    });
    LevenbergMarquardt::new().minimize(
        &mut model,
        Vector3::zeros(),
        &dvector![1., 1.],
        &Bounds::unbounded(),
        &SumOfSquares,
        &never,
    );
}

#[test]
#[should_panic(expected = "tau must be > 0")]
fn invalid_tau() {
    LevenbergMarquardt::new().with_tau(0.);
}

#[test]
#[should_panic(expected = "diff_delta must be > 0")]
fn invalid_diff_delta() {
    LevenbergMarquardt::new().with_diff_delta(-0.1);
}

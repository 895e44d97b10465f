use nalgebra::{DVector, SVector};

/// A forward model mapping `N` parameters to a modeled signal.
///
/// This is all [`LevenbergMarquardt`](crate::LevenbergMarquardt) needs from
/// the problem: residuals and the finite-difference Jacobian are built from
/// repeated calls to [`evaluate`](ForwardModel::evaluate).
///
/// The receiver is mutable so implementations can keep scratch buffers
/// between calls. Evaluating the same parameters twice must still give
/// identical output.
///
/// Closures `FnMut(&SVector<f64, N>, &mut DVector<f64>)` implement this
/// trait:
///
/// ```
/// # use nalgebra::{DVector, SVector, Vector2};
/// # use waterradiance::ForwardModel;
/// let mut model = |p: &SVector<f64, 2>, out: &mut DVector<f64>| {
///     out[0] = p.x + p.y;
///     out[1] = p.x * p.y;
/// };
/// let mut out = DVector::zeros(2);
/// model.evaluate(&Vector2::new(2.0, 3.0), &mut out);
/// assert_eq!(out.as_slice(), &[5.0, 6.0]);
/// ```
pub trait ForwardModel<const N: usize> {
    /// Write the modeled signal for `params` into `out`.
    ///
    /// `out` has the length of the observation being fitted.
    fn evaluate(&mut self, params: &SVector<f64, N>, out: &mut DVector<f64>);
}

impl<F, const N: usize> ForwardModel<N> for F
where
    F: FnMut(&SVector<f64, N>, &mut DVector<f64>),
{
    fn evaluate(&mut self, params: &SVector<f64, N>, out: &mut DVector<f64>) {
        self(params, out)
    }
}

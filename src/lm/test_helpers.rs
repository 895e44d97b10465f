use nalgebra::{DVector, SVector};

use crate::ForwardModel;

/// Wraps a model and records every parameter vector it is evaluated at.
pub struct MockModel<F, const N: usize> {
    inner: F,
    calls: Vec<SVector<f64, N>>,
}

impl<F, const N: usize> MockModel<F, N>
where
    F: FnMut(&SVector<f64, N>, &mut DVector<f64>),
{
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            calls: vec![],
        }
    }

    pub fn calls(&self) -> &[SVector<f64, N>] {
        self.calls.as_slice()
    }
}

/// A model returning the same signal everywhere.
pub fn constant<const N: usize>(
    signal: DVector<f64>,
) -> MockModel<impl FnMut(&SVector<f64, N>, &mut DVector<f64>), N> {
    MockModel::new(move |_: &SVector<f64, N>, out: &mut DVector<f64>| out.copy_from(&signal))
}

/// `$f(\vec{p}) = \vec{p}$`
pub fn identity<const N: usize>() -> MockModel<impl FnMut(&SVector<f64, N>, &mut DVector<f64>), N>
{
    MockModel::new(|p: &SVector<f64, N>, out: &mut DVector<f64>| out.copy_from(p))
}

impl<F, const N: usize> ForwardModel<N> for MockModel<F, N>
where
    F: FnMut(&SVector<f64, N>, &mut DVector<f64>),
{
    fn evaluate(&mut self, params: &SVector<f64, N>, out: &mut DVector<f64>) {
        self.calls.push(*params);
        (self.inner)(params, out)
    }
}

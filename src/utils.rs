use nalgebra::SVector;

use crate::error::{Error, Result};

pub(crate) mod finite_difference;

pub use finite_difference::{differentiate_numerically, Differencing};

/// Box constraints `$l \leq p \leq u$`, each side optional.
///
/// An infinite entry leaves that side of the parameter free.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Bounds<const N: usize> {
    lower: Option<SVector<f64, N>>,
    upper: Option<SVector<f64, N>>,
}

impl<const N: usize> Bounds<N> {
    pub fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    /// Fails with [`Error::InvalidBounds`] if some `$l_i > u_i$` or a bound is NaN.
    pub fn new(lower: Option<SVector<f64, N>>, upper: Option<SVector<f64, N>>) -> Result<Self> {
        for index in 0..N {
            let l = lower.as_ref().map_or(f64::NEG_INFINITY, |l| l[index]);
            let u = upper.as_ref().map_or(f64::INFINITY, |u| u[index]);
            if !(l <= u) {
                return Err(Error::InvalidBounds {
                    index,
                    lower: l,
                    upper: u,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn between(lower: SVector<f64, N>, upper: SVector<f64, N>) -> Result<Self> {
        Self::new(Some(lower), Some(upper))
    }

    pub fn lower(&self) -> Option<&SVector<f64, N>> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&SVector<f64, N>> {
        self.upper.as_ref()
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    pub fn contains(&self, p: &SVector<f64, N>) -> bool {
        (0..N).all(|i| {
            self.lower.as_ref().map_or(true, |l| p[i] >= l[i])
                && self.upper.as_ref().map_or(true, |u| p[i] <= u[i])
        })
    }

    /// Clamp `p` onto the box.
    pub fn project(&self, p: &mut SVector<f64, N>) {
        if let Some(lower) = &self.lower {
            for (x, l) in p.iter_mut().zip(lower.iter()) {
                if *x < *l {
                    *x = *l;
                }
            }
        }
        if let Some(upper) = &self.upper {
            for (x, u) in p.iter_mut().zip(upper.iter()) {
                if *x > *u {
                    *x = *u;
                }
            }
        }
    }

    pub(crate) fn projected(&self, mut p: SVector<f64, N>) -> SVector<f64, N> {
        self.project(&mut p);
        p
    }

    pub(crate) fn at_upper(&self, p: &SVector<f64, N>, i: usize) -> bool {
        self.upper.as_ref().map_or(false, |u| p[i] == u[i])
    }

    pub(crate) fn at_lower(&self, p: &SVector<f64, N>, i: usize) -> bool {
        self.lower.as_ref().map_or(false, |l| p[i] == l[i])
    }
}

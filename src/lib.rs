//! Retrieval of water and atmosphere parameters from top-of-atmosphere
//! reflectance, using neural-network surrogates of the radiative transfer
//! and a box-constrained [Levenberg-Marquardt](https://en.wikipedia.org/wiki/Levenberg%E2%80%93Marquardt_algorithm)
//! optimizer built on [nalgebra](https://nalgebra.org).
//!
//! The optimizer solves
//! ```math
//! \min_{\vec{l} \leq \vec{p} \leq \vec{u}} \|\vec{x} - \vec{f}(\vec{p})\|^2
//! ```
//! for an observation `$\vec{x}\in\R^m$` and a forward model
//! `$\vec{f}\!:\R^N\to\R^m$` with `$m \geq N$`.
//!
//! # Inputs
//!
//! You provide
//!
//! - a [`ForwardModel`], which only has to produce `$\vec{f}(\vec{p})$`.
//!   The Jacobian
//!   ```math
//!   \mathbf{J} \coloneqq
//!   \begin{pmatrix}
//!   \frac{\partial f_1}{\partial p_1} & \cdots & \frac{\partial f_1}{\partial p_N} \\
//!   \vdots & \ddots & \vdots \\
//!   \frac{\partial f_m}{\partial p_1} & \cdots & \frac{\partial f_m}{\partial p_N}
//!   \end{pmatrix}
//!   ```
//!   is always approximated by finite differences,
//! - the observation and the [`Bounds`],
//! - a [`CostFunction`] and a [`BreakingCriterion`] deciding when to stop,
//! - and an initial guess for `$\vec{p}$`.
//!
//! The hyperparameters are documented at [`LevenbergMarquardt`].
//!
//! # Usage Example
//!
//! Fitting a line `$f_i(a, b) = a t_i + b$` to five samples:
//!
//! ```
//! # use approx::assert_relative_eq;
//! # use nalgebra::{DVector, SVector, Vector2};
//! use waterradiance::{Bounds, IterationCostCriterion, LevenbergMarquardt, SumOfSquares};
//!
//! let t = [0., 1., 2., 3., 4.];
//! let observation = DVector::from_iterator(5, t.iter().map(|t| 2. * t - 1.));
//! let mut line = |p: &SVector<f64, 2>, out: &mut DVector<f64>| {
//!     for (y, t) in out.iter_mut().zip(&t) {
//!         *y = p[0] * t + p[1];
//!     }
//! };
//! let (p, report) = LevenbergMarquardt::new().minimize(
//!     &mut line,
//!     Vector2::zeros(),
//!     &observation,
//!     &Bounds::unbounded(),
//!     &SumOfSquares,
//!     &IterationCostCriterion::default(),
//! );
//! assert_relative_eq!(p, Vector2::new(2., -1.), epsilon = 1e-5);
//! assert!(report.objective_function < 1e-10);
//! ```
//!
//! # Water radiance retrieval
//!
//! [`WaterRadianceModel`] composes the path reflectance, transmittance and
//! water-leaving reflectance networks of a [`NetworkSet`] into a forward
//! model over the eight log parameters. [`Retrieval`] wraps it with the
//! default bounds and initial guess:
//!
//! ```no_run
//! # use nalgebra::DVector;
//! use waterradiance::{Geometry, NetworkSet, Retrieval};
//!
//! let networks = NetworkSet::from_dir("/opt/waterradiance/nets")?;
//! let geometry = Geometry::from_angles(38.53, 123.1, 23.14, 83.9, 20.0, 12.0);
//! let observation = DVector::from_vec(vec![0.1; 11]);
//! let output = Retrieval::new(&networks).solve(&observation, &geometry)?;
//! println!("aot {} after {} iterations", output.products.aot_550, output.iterations());
//! # Ok::<(), waterradiance::Error>(())
//! ```

mod config;
mod criterion;
mod error;
mod line_search;
mod lm;
mod lu;
mod network;
mod problem;
mod retrieval;
mod sigmoid;
mod trust_region;
mod utils;
mod water;

pub use config::{OptimizerConfig, RetrievalConfig, INITIAL_VALUES, LOWER_BOUNDS, UPPER_BOUNDS};
pub use criterion::{
    BreakingCriterion, CostFunction, IterationCostCriterion, SumOfSquares, WeightedSumOfSquares,
};
pub use error::{Error, Result};
pub use line_search::{ALPHA, BETA, T_INIT, T_MIN_GRADIENT};
pub use lm::{LevenbergMarquardt, MinimizationReport, TerminationReason, GAMMA_SQ, POW, RHO};
pub use network::{ActivationBuffer, FeedForwardNetwork, NetworkDefinition, Range};
pub use problem::ForwardModel;
pub use retrieval::{Products, Retrieval, RetrievalOutput};
pub use sigmoid::{SigmoidTable, DOMAIN_LIMIT, TABLE_SIZE};
pub use utils::{differentiate_numerically, Bounds, Differencing};
pub use water::{
    BandSet, Geometry, ModelComponents, NetworkPaths, NetworkSet, ParameterVector,
    WaterRadianceModel, BAND_COUNT, PARAMETER_COUNT, PATH_NETWORK, TDOWN_NETWORK, TUP_NETWORK,
    WATER_NETWORK,
};

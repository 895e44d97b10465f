//! Serializable retrieval settings.
//!
//! Every field has a default, so a configuration file only lists what it
//! changes:
//!
//! ```
//! # use waterradiance::RetrievalConfig;
//! let config = RetrievalConfig::from_json_str(
//!     r#"{ "max_iterations": 60, "optimizer": { "differencing": "forward" } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.max_iterations, 60);
//! assert_eq!(config.cost_threshold, 1e-10);
//! ```
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::criterion::IterationCostCriterion;
use crate::error::{Error, Result};
use crate::utils::{Bounds, Differencing};
use crate::water::{NetworkPaths, ParameterVector, PARAMETER_COUNT};
use crate::LevenbergMarquardt;

/// Lower bounds of the log parameters.
pub const LOWER_BOUNDS: [f64; PARAMETER_COUNT] =
    [-4.6, -3.8, -2.3, -19.9, -15.89, -17.23, -15.8, -14.92];
/// Upper bounds of the log parameters.
pub const UPPER_BOUNDS: [f64; PARAMETER_COUNT] = [0.0, 0.788, 2.3, 0.685, 2.297, 1.6, 4.598, 4.599];
/// Aerosol optical thickness, Ångström exponent, wind speed and the
/// concentrations the retrieval starts from. The initial parameters are
/// their logarithms.
pub const INITIAL_VALUES: [f64; PARAMETER_COUNT] = [0.1, 1.0, 3.0, 0.005, 0.005, 0.005, 0.01, 0.01];

/// Settings of [`LevenbergMarquardt`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub tau: f64,
    pub gradient_tolerance: f64,
    pub step_tolerance: f64,
    pub residual_tolerance: f64,
    pub diff_delta: f64,
    pub differencing: Differencing,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let lm = LevenbergMarquardt::new();
        Self {
            tau: lm.tau(),
            gradient_tolerance: lm.gradient_tolerance(),
            step_tolerance: lm.step_tolerance(),
            residual_tolerance: lm.residual_tolerance(),
            diff_delta: lm.diff_delta(),
            differencing: lm.differencing(),
        }
    }
}

impl OptimizerConfig {
    fn validate(&self) -> Result<()> {
        let positive = [("tau", self.tau), ("diff_delta", self.diff_delta)];
        let non_negative = [
            ("gradient_tolerance", self.gradient_tolerance),
            ("step_tolerance", self.step_tolerance),
            ("residual_tolerance", self.residual_tolerance),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(Error::InvalidSetting { name, value });
            }
        }
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(Error::InvalidSetting { name, value });
            }
        }
        Ok(())
    }

    /// The configured optimizer.
    ///
    /// # Panics
    ///
    /// Panics on values the builder rejects. Configurations loaded through
    /// [`RetrievalConfig::from_json_str`] are already validated.
    pub fn optimizer(&self) -> LevenbergMarquardt {
        LevenbergMarquardt::new()
            .with_tau(self.tau)
            .with_gradient_tolerance(self.gradient_tolerance)
            .with_step_tolerance(self.step_tolerance)
            .with_residual_tolerance(self.residual_tolerance)
            .with_diff_delta(self.diff_delta)
            .with_differencing(self.differencing)
    }
}

/// Settings of a [`Retrieval`](crate::Retrieval).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    pub lower_bounds: [f64; PARAMETER_COUNT],
    pub upper_bounds: [f64; PARAMETER_COUNT],
    /// Log parameters the optimizer starts from.
    pub initial_parameters: [f64; PARAMETER_COUNT],
    pub max_iterations: usize,
    /// Stop once the sum of squared residuals drops below this value.
    pub cost_threshold: f64,
    pub optimizer: OptimizerConfig,
    /// Directory holding the networks under their conventional names.
    pub network_dir: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lower_bounds: LOWER_BOUNDS,
            upper_bounds: UPPER_BOUNDS,
            initial_parameters: INITIAL_VALUES.map(f64::ln),
            max_iterations: 150,
            cost_threshold: 1e-10,
            optimizer: OptimizerConfig::default(),
            network_dir: None,
        }
    }
}

impl RetrievalConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.bounds()?;
        if !(self.cost_threshold >= 0.0) {
            return Err(Error::InvalidSetting {
                name: "cost_threshold",
                value: self.cost_threshold,
            });
        }
        self.optimizer.validate()
    }

    pub fn bounds(&self) -> Result<Bounds<PARAMETER_COUNT>> {
        Bounds::between(
            ParameterVector::from(self.lower_bounds),
            ParameterVector::from(self.upper_bounds),
        )
    }

    pub fn initial(&self) -> ParameterVector {
        ParameterVector::from(self.initial_parameters)
    }

    pub fn criterion(&self) -> IterationCostCriterion {
        IterationCostCriterion::new(self.max_iterations, self.cost_threshold)
    }

    pub fn network_paths(&self) -> Option<NetworkPaths> {
        self.network_dir.as_ref().map(NetworkPaths::in_dir)
    }
}

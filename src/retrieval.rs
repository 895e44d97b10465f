//! Per-sample inversion of an observed spectrum.
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::criterion::{BreakingCriterion, CostFunction, IterationCostCriterion, SumOfSquares};
use crate::error::Result;
use crate::utils::Bounds;
use crate::water::{
    BandSet, Geometry, ModelComponents, NetworkSet, ParameterVector, WaterRadianceModel,
    PARAMETER_COUNT,
};
use crate::{LevenbergMarquardt, MinimizationReport};

/// Physical quantities behind the retrieved log parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Products {
    /// Aerosol optical thickness at 550 nm.
    pub aot_550: f64,
    pub angstrom: f64,
    pub wind_speed: f64,
    /// Pigment absorption.
    pub a_pig: f64,
    /// Detritus absorption.
    pub a_det: f64,
    /// Yellow substance absorption.
    pub a_gelb: f64,
    /// Particle scattering.
    pub b_part: f64,
    /// White particle scattering.
    pub b_wit: f64,
}

impl Products {
    pub fn from_parameters(p: &ParameterVector) -> Self {
        Self {
            aot_550: p[0].exp(),
            angstrom: p[1].exp(),
            wind_speed: p[2].exp(),
            a_pig: p[3].exp(),
            a_det: p[4].exp(),
            a_gelb: p[5].exp(),
            b_part: p[6].exp(),
            b_wit: p[7].exp(),
        }
    }
}

/// Result of one retrieval.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalOutput {
    pub parameters: ParameterVector,
    pub products: Products,
    /// Full-spectrum model terms at [`parameters`](Self::parameters).
    pub components: ModelComponents,
    pub report: MinimizationReport,
}

impl RetrievalOutput {
    /// Cost at the returned parameters, the sum of squared residuals unless
    /// [`Retrieval::with_cost`] replaced it.
    pub fn sum_sq(&self) -> f64 {
        self.report.objective_function
    }

    pub fn iterations(&self) -> usize {
        self.report.number_of_iterations
    }
}

/// Inverts observed spectra against a shared [`NetworkSet`].
///
/// A `Retrieval` is immutable and can be used from several threads at once.
/// Each [`solve`](Retrieval::solve) builds its own [`WaterRadianceModel`].
#[derive(Clone, Debug)]
pub struct Retrieval<'a, B = IterationCostCriterion, C = SumOfSquares> {
    networks: &'a NetworkSet,
    bounds: Bounds<PARAMETER_COUNT>,
    initial: ParameterVector,
    optimizer: LevenbergMarquardt,
    criterion: B,
    cost: C,
}

impl<'a> Retrieval<'a> {
    /// Default bounds, initial guess and stopping rule.
    pub fn new(networks: &'a NetworkSet) -> Self {
        let config = RetrievalConfig::default();
        Self {
            networks,
            // the default bounds are ordered
            bounds: config.bounds().unwrap_or_default(),
            initial: config.initial(),
            optimizer: LevenbergMarquardt::new(),
            criterion: config.criterion(),
            cost: SumOfSquares,
        }
    }

    pub fn from_config(networks: &'a NetworkSet, config: &RetrievalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            networks,
            bounds: config.bounds()?,
            initial: config.initial(),
            optimizer: config.optimizer.optimizer(),
            criterion: config.criterion(),
            cost: SumOfSquares,
        })
    }
}

impl<'a, B: BreakingCriterion, C: CostFunction> Retrieval<'a, B, C> {
    pub fn with_bounds(self, bounds: Bounds<PARAMETER_COUNT>) -> Self {
        Self { bounds, ..self }
    }

    pub fn with_initial(self, initial: ParameterVector) -> Self {
        Self { initial, ..self }
    }

    pub fn with_optimizer(self, optimizer: LevenbergMarquardt) -> Self {
        Self { optimizer, ..self }
    }

    /// Replace the stopping rule, which sees the sum of squared residuals.
    pub fn with_criterion<D: BreakingCriterion>(self, criterion: D) -> Retrieval<'a, D, C> {
        Retrieval {
            networks: self.networks,
            bounds: self.bounds,
            initial: self.initial,
            optimizer: self.optimizer,
            criterion,
            cost: self.cost,
        }
    }

    /// Replace the cost reported and handed to the stopping rule.
    ///
    /// The optimizer still minimizes the plain sum of squares. A
    /// [`WeightedSumOfSquares`](crate::WeightedSumOfSquares) needs one
    /// weight per observed band.
    pub fn with_cost<D: CostFunction>(self, cost: D) -> Retrieval<'a, B, D> {
        Retrieval {
            networks: self.networks,
            bounds: self.bounds,
            initial: self.initial,
            optimizer: self.optimizer,
            criterion: self.criterion,
            cost,
        }
    }

    pub fn networks(&self) -> &'a NetworkSet {
        self.networks
    }

    pub fn bounds(&self) -> &Bounds<PARAMETER_COUNT> {
        &self.bounds
    }

    pub fn initial(&self) -> &ParameterVector {
        &self.initial
    }

    pub fn optimizer(&self) -> &LevenbergMarquardt {
        &self.optimizer
    }

    pub fn criterion(&self) -> &B {
        &self.criterion
    }

    pub fn cost(&self) -> &C {
        &self.cost
    }

    /// Retrieve the parameters behind `observation` from the configured
    /// initial guess.
    ///
    /// The band set follows from the observation length, see
    /// [`BandSet::for_observation_len`].
    pub fn solve(&self, observation: &DVector<f64>, geometry: &Geometry) -> Result<RetrievalOutput> {
        self.solve_from(self.initial, observation, geometry)
    }

    /// Like [`solve`](Retrieval::solve), starting from `initial`.
    pub fn solve_from(
        &self,
        initial: ParameterVector,
        observation: &DVector<f64>,
        geometry: &Geometry,
    ) -> Result<RetrievalOutput> {
        let bands = BandSet::for_observation_len(observation.len())?;
        let mut model = WaterRadianceModel::new(self.networks, *geometry, bands);
        let (parameters, report) = self.optimizer.minimize(
            &mut model,
            initial,
            observation,
            &self.bounds,
            &self.cost,
            &self.criterion,
        );
        debug!(
            "retrieved {:?} from {} bands, sum of squares {:e}",
            parameters.as_slice(),
            bands.len(),
            report.objective_function
        );
        Ok(RetrievalOutput {
            parameters,
            products: Products::from_parameters(&parameters),
            components: model.components(&parameters),
            report,
        })
    }

    /// Full-spectrum model terms at `parameters`.
    pub fn forward(&self, parameters: &ParameterVector, geometry: &Geometry) -> ModelComponents {
        WaterRadianceModel::new(self.networks, *geometry, BandSet::Full).components(parameters)
    }
}

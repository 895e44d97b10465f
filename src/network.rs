//! Feed-forward networks with min-max normalized inputs and outputs.
use std::path::Path;
use std::sync::Arc;

use log::info;
use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::sigmoid::SigmoidTable;

mod resource;

/// Physical range of one network input or output.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Map a physical value to `$[0, 1]$`.
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }

    /// Map an activation in `$[0, 1]$` back to physical units.
    #[inline]
    pub fn denormalize(&self, activation: f64) -> f64 {
        activation * (self.max - self.min) + self.min
    }
}

/// Weights, biases and normalization ranges of a multilayer perceptron.
///
/// `weights[l]` connects plane `l` to plane `l + 1` and has one row per
/// destination neuron and one column per source neuron. `biases[l]` belongs
/// to plane `l + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkDefinition {
    pub layer_sizes: Vec<usize>,
    pub input_ranges: Vec<Range>,
    pub output_ranges: Vec<Range>,
    pub biases: Vec<DVector<f64>>,
    pub weights: Vec<DMatrix<f64>>,
}

impl NetworkDefinition {
    /// Describe the first shape inconsistency, if there is one.
    pub(crate) fn inconsistency(&self) -> Option<String> {
        let sizes = &self.layer_sizes;
        if sizes.len() < 2 {
            return Some(format!("need at least two planes, got {}", sizes.len()));
        }
        if let Some(plane) = sizes.iter().position(|&size| size == 0) {
            return Some(format!("plane {} is empty", plane));
        }
        if self.input_ranges.len() != sizes[0] {
            return Some(format!(
                "{} input ranges for an input plane of size {}",
                self.input_ranges.len(),
                sizes[0]
            ));
        }
        let last = sizes[sizes.len() - 1];
        if self.output_ranges.len() != last {
            return Some(format!(
                "{} output ranges for an output plane of size {}",
                self.output_ranges.len(),
                last
            ));
        }
        if self.biases.len() != sizes.len() - 1 || self.weights.len() != sizes.len() - 1 {
            return Some(format!(
                "{} bias and {} weight blocks for {} planes",
                self.biases.len(),
                self.weights.len(),
                sizes.len()
            ));
        }
        for (l, pair) in sizes.windows(2).enumerate() {
            if self.biases[l].len() != pair[1] {
                return Some(format!(
                    "bias block {} has {} values, expected {}",
                    l + 1,
                    self.biases[l].len(),
                    pair[1]
                ));
            }
            if self.weights[l].shape() != (pair[1], pair[0]) {
                return Some(format!(
                    "weight block {} has shape {:?}, expected ({}, {})",
                    l,
                    self.weights[l].shape(),
                    pair[1],
                    pair[0]
                ));
            }
        }
        None
    }
}

/// Per-plane activations of one evaluation in flight.
///
/// A buffer belongs to exactly one caller at a time; the network itself is
/// never mutated while evaluating.
#[derive(Clone, Debug)]
pub struct ActivationBuffer {
    planes: Vec<DVector<f64>>,
}

impl ActivationBuffer {
    pub fn plane(&self, index: usize) -> &DVector<f64> {
        &self.planes[index]
    }
}

/// A loaded feed-forward network.
#[derive(Clone, Debug)]
pub struct FeedForwardNetwork {
    definition: NetworkDefinition,
    sigmoid: Arc<SigmoidTable>,
}

impl FeedForwardNetwork {
    /// Wrap a definition.
    ///
    /// # Panics
    ///
    /// Panics if the layer sizes, ranges, biases and weights do not fit
    /// together. Use [`load`](FeedForwardNetwork::load) for untrusted input.
    pub fn new(definition: NetworkDefinition, sigmoid: Arc<SigmoidTable>) -> Self {
        if let Some(reason) = definition.inconsistency() {
            panic!("invalid network definition: {}", reason);
        }
        Self {
            definition,
            sigmoid,
        }
    }

    /// Read a network resource from disk using the shared sigmoid table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, SigmoidTable::shared())
    }

    pub fn load_with(path: impl AsRef<Path>, sigmoid: Arc<SigmoidTable>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let network = Self::parse(&text, path, sigmoid)?;
        info!(
            "loaded network {} with planes {:?}",
            path.display(),
            network.layer_sizes()
        );
        Ok(network)
    }

    /// Parse the text of a network resource. `origin` is only used in errors.
    pub fn parse(text: &str, origin: &Path, sigmoid: Arc<SigmoidTable>) -> Result<Self> {
        let definition = resource::parse(text).map_err(|reason| Error::MalformedResource {
            path: origin.to_path_buf(),
            reason,
        })?;
        Ok(Self {
            definition,
            sigmoid,
        })
    }

    pub fn definition(&self) -> &NetworkDefinition {
        &self.definition
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.definition.layer_sizes
    }

    pub fn input_len(&self) -> usize {
        self.definition.layer_sizes[0]
    }

    pub fn output_len(&self) -> usize {
        self.definition.layer_sizes[self.definition.layer_sizes.len() - 1]
    }

    /// Allocate activation storage sized for this network.
    pub fn activation_buffer(&self) -> ActivationBuffer {
        ActivationBuffer {
            planes: self
                .definition
                .layer_sizes
                .iter()
                .map(|&size| DVector::zeros(size))
                .collect(),
        }
    }

    /// Evaluate the network, writing physical outputs into `output`.
    ///
    /// # Panics
    ///
    /// Panics if `input`, `output` or `buffer` do not match the network's
    /// plane sizes.
    pub fn evaluate(&self, input: &[f64], buffer: &mut ActivationBuffer, output: &mut [f64]) {
        let definition = &self.definition;
        assert_eq!(input.len(), self.input_len(), "network input length");
        assert_eq!(output.len(), self.output_len(), "network output length");
        assert_eq!(
            buffer.planes.len(),
            definition.layer_sizes.len(),
            "activation buffer planes"
        );

        for ((act, x), range) in buffer.planes[0]
            .iter_mut()
            .zip(input)
            .zip(&definition.input_ranges)
        {
            *act = range.normalize(*x);
        }
        for (l, (weights, bias)) in definition
            .weights
            .iter()
            .zip(&definition.biases)
            .enumerate()
        {
            let (before, after) = buffer.planes.split_at_mut(l + 1);
            let previous = &before[l];
            let current = &mut after[0];
            current.gemv(1.0, weights, previous, 0.0);
            for (act, b) in current.iter_mut().zip(bias.iter()) {
                *act = self.sigmoid.get(*b + *act);
            }
        }
        let last = &buffer.planes[buffer.planes.len() - 1];
        for ((out, act), range) in output.iter_mut().zip(last.iter()).zip(&definition.output_ranges) {
            *out = range.denormalize(*act);
        }
    }

    /// Evaluate with a temporary buffer.
    pub fn evaluate_to_vec(&self, input: &[f64]) -> Vec<f64> {
        let mut buffer = self.activation_buffer();
        let mut output = vec![0.0; self.output_len()];
        self.evaluate(input, &mut buffer, &mut output);
        output
    }
}

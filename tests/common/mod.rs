//! Deterministic synthetic networks standing in for the trained ones.
#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use waterradiance::{
    FeedForwardNetwork, Geometry, NetworkDefinition, NetworkPaths, NetworkSet, ParameterVector,
    Range, SigmoidTable, BAND_COUNT,
};

pub const HIDDEN: usize = 12;

pub const ATMOSPHERE_INPUTS: [(f64, f64); 9] = [
    (0.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 2.2),
    (0.0, 10.0),
    (0.0, 36.0),
    (0.0, 43.0),
];

pub const WATER_INPUTS: [(f64, f64); 10] = [
    (0.0, 90.0),
    (0.0, 90.0),
    (0.0, 180.0),
    (0.0, 36.0),
    (0.0, 43.0),
    (-20.0, 1.0),
    (-16.0, 3.0),
    (-18.0, 2.0),
    (-16.0, 5.0),
    (-15.0, 5.0),
];

/// A network with smooth, seed dependent weights.
pub fn definition(inputs: &[(f64, f64)], output: (f64, f64), seed: f64) -> NetworkDefinition {
    let layer_sizes = vec![inputs.len(), HIDDEN, BAND_COUNT];
    let mut biases = Vec::new();
    let mut weights = Vec::new();
    for (l, pair) in layer_sizes.windows(2).enumerate() {
        let l = l as f64;
        let scale = 1.5 / (pair[0] as f64).sqrt();
        biases.push(DVector::from_fn(pair[1], |i, _| {
            0.3 * (seed + 1.7 * l + 0.9 * i as f64).sin()
        }));
        weights.push(DMatrix::from_fn(pair[1], pair[0], |i, j| {
            let (i, j) = (i as f64, j as f64);
            scale * (seed * 1.3 + 2.1 * l + 1.1 * i + 0.7 * j * (i + 1.0)).sin()
        }));
    }
    NetworkDefinition {
        layer_sizes,
        input_ranges: inputs.iter().map(|&(min, max)| Range::new(min, max)).collect(),
        output_ranges: vec![Range::new(output.0, output.1); BAND_COUNT],
        biases,
        weights,
    }
}

/// Path, tdown, tup and water definitions.
pub fn definitions() -> [NetworkDefinition; 4] {
    [
        definition(&ATMOSPHERE_INPUTS, (0.0, 0.15), 1.0),
        definition(&ATMOSPHERE_INPUTS, (0.6, 1.0), 2.0),
        definition(&ATMOSPHERE_INPUTS, (0.6, 1.0), 3.0),
        definition(&WATER_INPUTS, (-9.0, -2.0), 4.0),
    ]
}

pub fn networks() -> NetworkSet {
    let [path, tdown, tup, water] =
        definitions().map(|d| FeedForwardNetwork::new(d, SigmoidTable::shared()));
    NetworkSet::new(path, tdown, tup, water)
}

/// Text resource of `definition`, one value per line.
pub fn resource(definition: &NetworkDefinition) -> String {
    let mut text = String::from("synthetic network\n#\n");
    writeln!(text, "{}", definition.input_ranges.len()).unwrap();
    for range in &definition.input_ranges {
        writeln!(text, "{} {}", range.min, range.max).unwrap();
    }
    writeln!(text, "{}", definition.output_ranges.len()).unwrap();
    for range in &definition.output_ranges {
        writeln!(text, "{} {}", range.min, range.max).unwrap();
    }
    text.push_str("$\n");
    write!(text, "#planes={}", definition.layer_sizes.len()).unwrap();
    for size in &definition.layer_sizes {
        write!(text, " {}", size).unwrap();
    }
    text.push('\n');
    for (l, bias) in definition.biases.iter().enumerate() {
        writeln!(text, "bias {} {}", l + 1, bias.len()).unwrap();
        for value in bias.iter() {
            writeln!(text, "{}", value).unwrap();
        }
    }
    for (l, weights) in definition.weights.iter().enumerate() {
        writeln!(text, "wgt {} {} {}", l, weights.ncols(), weights.nrows()).unwrap();
        for row in weights.row_iter() {
            for value in row.iter() {
                writeln!(text, "{}", value).unwrap();
            }
        }
    }
    text
}

/// Write the synthetic networks below `dir` under their conventional names.
pub fn write_networks(dir: &Path) -> NetworkPaths {
    let paths = NetworkPaths::in_dir(dir);
    let [path, tdown, tup, water] = definitions();
    for (file, definition) in [
        (&paths.path, path),
        (&paths.tdown, tdown),
        (&paths.tup, tup),
        (&paths.water, water),
    ] {
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, resource(&definition)).unwrap();
    }
    paths
}

pub fn geometry() -> Geometry {
    Geometry::new(38.53, 23.14, 39.2, 20.0, 12.0)
}

pub fn log_parameters(values: [f64; 8]) -> ParameterVector {
    ParameterVector::from(values.map(f64::ln))
}

/// Parameters behind the synthetic observations.
pub fn truth() -> ParameterVector {
    log_parameters([0.2, 0.8, 5.0, 0.05, 0.02, 0.1, 0.5, 0.05])
}

//! Atmosphere and water networks composed into one forward model.
//!
//! Three atmosphere networks map geometry together with aerosol and wind
//! parameters to path reflectance and the downward and upward
//! transmittances. The water network maps geometry together with the log
//! constituent concentrations to log water-leaving reflectance. The modeled
//! top-of-atmosphere reflectance of band `$i$` is
//! ```math
//!   \rho_i = \rho^\text{path}_i + e^{w_i}\, t^\downarrow_i\, t^\uparrow_i.
//! ```
use std::path::{Path, PathBuf};

use nalgebra::{DVector, SVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::{ActivationBuffer, FeedForwardNetwork};
use crate::ForwardModel;

/// Number of retrieved parameters.
pub const PARAMETER_COUNT: usize = 8;
/// Number of bands every network produces.
pub const BAND_COUNT: usize = 29;

const ATMOSPHERE_INPUTS: usize = 9;
const WATER_INPUTS: usize = 10;

#[allow(clippy::approx_constant, clippy::excessive_precision)]
const DEG2RAD: f64 = 3.1415927 / 180.0;

/// Log-space parameters: aerosol optical thickness, Ångström exponent, wind
/// speed, pigment, detritus, yellow substance, mineral particles and mineral
/// backscatter.
pub type ParameterVector = SVector<f64, PARAMETER_COUNT>;

/// Band subsets of the 29-band network output used by the different sensors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandSet {
    Meris11,
    Modis9,
    SeaWifs8,
    Full,
}

const MERIS11: [usize; 11] = [1, 2, 4, 6, 11, 12, 15, 20, 22, 24, 25];
const MODIS9: [usize; 9] = [1, 2, 4, 8, 9, 15, 18, 21, 26];
const SEAWIFS8: [usize; 8] = [1, 2, 4, 6, 10, 16, 23, 25];
const FULL: [usize; BAND_COUNT] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28,
];

#[allow(clippy::len_without_is_empty)]
impl BandSet {
    /// Observation lengths with a band set, in the order they are tried.
    pub const LENGTHS: &'static [usize] = &[11, 9, 8, BAND_COUNT];

    /// Indices into the network output.
    pub fn indices(&self) -> &'static [usize] {
        match self {
            BandSet::Meris11 => &MERIS11,
            BandSet::Modis9 => &MODIS9,
            BandSet::SeaWifs8 => &SEAWIFS8,
            BandSet::Full => &FULL,
        }
    }

    pub fn len(&self) -> usize {
        self.indices().len()
    }

    /// The band set producing `len` values.
    pub fn for_observation_len(len: usize) -> Result<Self> {
        match len {
            11 => Ok(BandSet::Meris11),
            9 => Ok(BandSet::Modis9),
            8 => Ok(BandSet::SeaWifs8),
            BAND_COUNT => Ok(BandSet::Full),
            found => Err(Error::InvalidBands {
                expected: Self::LENGTHS,
                found,
            }),
        }
    }
}

/// Observation geometry and water properties, fixed for one retrieval.
///
/// Angles are in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub sun_zenith: f64,
    pub view_zenith: f64,
    pub relative_azimuth: f64,
    pub temperature: f64,
    pub salinity: f64,
}

impl Geometry {
    pub fn new(
        sun_zenith: f64,
        view_zenith: f64,
        relative_azimuth: f64,
        temperature: f64,
        salinity: f64,
    ) -> Self {
        Self {
            sun_zenith,
            view_zenith,
            relative_azimuth,
            temperature,
            salinity,
        }
    }

    /// Geometry from absolute sun and view azimuths.
    ///
    /// The relative azimuth is `$d = |\phi_v - \phi_s|$`, replaced by
    /// `$180 - d$` when `$d > 180$`. The networks were trained with this
    /// convention, so the result can be negative.
    pub fn from_angles(
        sun_zenith: f64,
        sun_azimuth: f64,
        view_zenith: f64,
        view_azimuth: f64,
        temperature: f64,
        salinity: f64,
    ) -> Self {
        let mut relative_azimuth = (view_azimuth - sun_azimuth).abs();
        if relative_azimuth > 180.0 {
            relative_azimuth = 180.0 - relative_azimuth;
        }
        Self::new(
            sun_zenith,
            view_zenith,
            relative_azimuth,
            temperature,
            salinity,
        )
    }
}

/// Input of the atmosphere networks: `$\cos\theta_s$`, the viewing direction
/// as a unit vector, the exponentiated aerosol and wind parameters,
/// temperature and salinity.
pub(crate) fn atmosphere_input(geometry: &Geometry, p: &ParameterVector) -> [f64; ATMOSPHERE_INPUTS] {
    let azimuth = DEG2RAD * geometry.relative_azimuth;
    let elevation = DEG2RAD * geometry.view_zenith;
    [
        (DEG2RAD * geometry.sun_zenith).cos(),
        elevation.sin() * azimuth.cos(),
        elevation.sin() * azimuth.sin(),
        elevation.cos(),
        p[0].exp(),
        p[1].exp(),
        p[2].exp(),
        geometry.temperature,
        geometry.salinity,
    ]
}

/// Input of the water network: the raw angles, temperature, salinity and the
/// log concentrations.
pub(crate) fn water_input(geometry: &Geometry, p: &ParameterVector) -> [f64; WATER_INPUTS] {
    [
        geometry.sun_zenith,
        geometry.view_zenith,
        geometry.relative_azimuth,
        geometry.temperature,
        geometry.salinity,
        p[3],
        p[4],
        p[5],
        p[6],
        p[7],
    ]
}

/// Conventional network file names below a network directory.
pub const PATH_NETWORK: &str = "ac_rhopath_b29/17x37x31_121.8.net";
pub const TDOWN_NETWORK: &str = "t_down_b29/17x37x31_89.4.net";
pub const TUP_NETWORK: &str = "ac_tup_b29/17x37x31_83.8.net";
pub const WATER_NETWORK: &str = "for_water_rw29_20120318/37x77x97_86.7.net";

/// Locations of the four network resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPaths {
    pub path: PathBuf,
    pub tdown: PathBuf,
    pub tup: PathBuf,
    pub water: PathBuf,
}

impl NetworkPaths {
    /// The conventional file names below `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            path: dir.join(PATH_NETWORK),
            tdown: dir.join(TDOWN_NETWORK),
            tup: dir.join(TUP_NETWORK),
            water: dir.join(WATER_NETWORK),
        }
    }
}

/// The four networks of the forward model.
///
/// Loaded once and shared by reference between any number of
/// [`WaterRadianceModel`]s, also across threads.
#[derive(Clone, Debug)]
pub struct NetworkSet {
    path: FeedForwardNetwork,
    tdown: FeedForwardNetwork,
    tup: FeedForwardNetwork,
    water: FeedForwardNetwork,
}

fn shape_mismatch(name: &str, network: &FeedForwardNetwork, inputs: usize) -> Option<String> {
    if network.input_len() != inputs || network.output_len() != BAND_COUNT {
        Some(format!(
            "{} network maps {} inputs to {} outputs, expected {} to {}",
            name,
            network.input_len(),
            network.output_len(),
            inputs,
            BAND_COUNT
        ))
    } else {
        None
    }
}

impl NetworkSet {
    /// # Panics
    ///
    /// Panics if an atmosphere network does not map 9 inputs to 29 bands or
    /// the water network does not map 10 inputs to 29 bands.
    pub fn new(
        path: FeedForwardNetwork,
        tdown: FeedForwardNetwork,
        tup: FeedForwardNetwork,
        water: FeedForwardNetwork,
    ) -> Self {
        let mismatch = shape_mismatch("path", &path, ATMOSPHERE_INPUTS)
            .or_else(|| shape_mismatch("tdown", &tdown, ATMOSPHERE_INPUTS))
            .or_else(|| shape_mismatch("tup", &tup, ATMOSPHERE_INPUTS))
            .or_else(|| shape_mismatch("water", &water, WATER_INPUTS));
        if let Some(reason) = mismatch {
            panic!("invalid network set: {}", reason);
        }
        Self {
            path,
            tdown,
            tup,
            water,
        }
    }

    pub fn load(paths: &NetworkPaths) -> Result<Self> {
        let load = |path: &Path, name: &str, inputs: usize| -> Result<FeedForwardNetwork> {
            let network = FeedForwardNetwork::load(path)?;
            match shape_mismatch(name, &network, inputs) {
                Some(reason) => Err(Error::MalformedResource {
                    path: path.to_path_buf(),
                    reason,
                }),
                None => Ok(network),
            }
        };
        Ok(Self {
            path: load(&paths.path, "path", ATMOSPHERE_INPUTS)?,
            tdown: load(&paths.tdown, "tdown", ATMOSPHERE_INPUTS)?,
            tup: load(&paths.tup, "tup", ATMOSPHERE_INPUTS)?,
            water: load(&paths.water, "water", WATER_INPUTS)?,
        })
    }

    /// Load the conventional file names below `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load(&NetworkPaths::in_dir(dir))
    }

    pub fn path(&self) -> &FeedForwardNetwork {
        &self.path
    }

    pub fn tdown(&self) -> &FeedForwardNetwork {
        &self.tdown
    }

    pub fn tup(&self) -> &FeedForwardNetwork {
        &self.tup
    }

    pub fn water(&self) -> &FeedForwardNetwork {
        &self.water
    }
}

/// Full-spectrum terms of the forward model, one value per band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelComponents {
    /// Modeled top-of-atmosphere reflectance.
    pub toa: Vec<f64>,
    pub path: Vec<f64>,
    pub water_leaving: Vec<f64>,
    pub tdown: Vec<f64>,
    pub tup: Vec<f64>,
}

/// Last network outputs together with the parameters they were computed for.
#[derive(Clone, Debug)]
struct Cached<const K: usize> {
    key: Option<[u64; K]>,
}

impl<const K: usize> Cached<K> {
    fn new() -> Self {
        Self { key: None }
    }

    /// Remember `values`, returns whether they were already current.
    fn hit(&mut self, values: &[f64]) -> bool {
        let mut key = [0u64; K];
        for (k, v) in key.iter_mut().zip(values) {
            *k = v.to_bits();
        }
        if self.key == Some(key) {
            true
        } else {
            self.key = Some(key);
            false
        }
    }
}

/// The forward model of one retrieval.
///
/// Borrows the shared networks and owns all scratch space, so every thread
/// creates its own model. The atmosphere and water outputs are kept between
/// calls: finite differences in a water parameter do not re-evaluate the
/// atmosphere networks and vice versa.
#[derive(Clone, Debug)]
pub struct WaterRadianceModel<'a> {
    networks: &'a NetworkSet,
    geometry: Geometry,
    bands: BandSet,
    path_buffer: ActivationBuffer,
    tdown_buffer: ActivationBuffer,
    tup_buffer: ActivationBuffer,
    water_buffer: ActivationBuffer,
    path: Vec<f64>,
    tdown: Vec<f64>,
    tup: Vec<f64>,
    water: Vec<f64>,
    atmosphere_key: Cached<3>,
    water_key: Cached<5>,
}

impl<'a> WaterRadianceModel<'a> {
    pub fn new(networks: &'a NetworkSet, geometry: Geometry, bands: BandSet) -> Self {
        Self {
            networks,
            geometry,
            bands,
            path_buffer: networks.path.activation_buffer(),
            tdown_buffer: networks.tdown.activation_buffer(),
            tup_buffer: networks.tup.activation_buffer(),
            water_buffer: networks.water.activation_buffer(),
            path: vec![0.0; BAND_COUNT],
            tdown: vec![0.0; BAND_COUNT],
            tup: vec![0.0; BAND_COUNT],
            water: vec![0.0; BAND_COUNT],
            atmosphere_key: Cached::new(),
            water_key: Cached::new(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn bands(&self) -> BandSet {
        self.bands
    }

    fn update(&mut self, p: &ParameterVector) {
        if !self.atmosphere_key.hit(&p.as_slice()[..3]) {
            let input = atmosphere_input(&self.geometry, p);
            let networks = self.networks;
            networks
                .path
                .evaluate(&input, &mut self.path_buffer, &mut self.path);
            networks
                .tdown
                .evaluate(&input, &mut self.tdown_buffer, &mut self.tdown);
            networks
                .tup
                .evaluate(&input, &mut self.tup_buffer, &mut self.tup);
        }
        if !self.water_key.hit(&p.as_slice()[3..]) {
            let input = water_input(&self.geometry, p);
            self.networks
                .water
                .evaluate(&input, &mut self.water_buffer, &mut self.water);
            for w in self.water.iter_mut() {
                *w = w.exp();
            }
        }
    }

    #[inline]
    fn toa(&self, band: usize) -> f64 {
        self.path[band] + self.water[band] * self.tdown[band] * self.tup[band]
    }

    /// All terms of the model over the full 29 bands.
    pub fn components(&mut self, p: &ParameterVector) -> ModelComponents {
        self.update(p);
        ModelComponents {
            toa: (0..BAND_COUNT).map(|band| self.toa(band)).collect(),
            path: self.path.clone(),
            water_leaving: self.water.clone(),
            tdown: self.tdown.clone(),
            tup: self.tup.clone(),
        }
    }
}

impl ForwardModel<PARAMETER_COUNT> for WaterRadianceModel<'_> {
    /// # Panics
    ///
    /// Panics if `out` does not have one entry per band of the band set.
    fn evaluate(&mut self, params: &ParameterVector, out: &mut DVector<f64>) {
        assert_eq!(out.len(), self.bands.len(), "modeled signal length");
        self.update(params);
        for (value, &band) in out.iter_mut().zip(self.bands.indices()) {
            *value = self.toa(band);
        }
    }
}

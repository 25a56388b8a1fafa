//! Core types shared across the stratamie engine.
//!
//! This module defines the data model of a computation: layers and layer
//! stacks in applied units, their dimensionless size-parameter form, the Mie
//! coefficients, and the result containers built from them.

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{MieError, MieResult};

/// A single concentric shell of the particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Radial thickness of the shell (applied units, e.g. nm).
    pub width: f64,
    /// Complex refractive index relative to the host medium.
    /// Ignored when `pec` is set.
    pub index: Complex64,
    /// Perfect electric conductor sentinel. Only valid for the innermost layer.
    #[serde(default)]
    pub pec: bool,
}

impl Layer {
    /// A dielectric (or absorbing) shell.
    pub fn new(width: f64, index: Complex64) -> Self {
        Self {
            width,
            index,
            pec: false,
        }
    }

    /// A perfectly conducting core of the given radius.
    pub fn pec(width: f64) -> Self {
        Self {
            width,
            index: Complex64::new(1.0, 0.0),
            pec: true,
        }
    }
}

/// Ordered sequence of layers, innermost first.
///
/// Construction validates the stack: at least one layer, strictly positive
/// finite widths, finite indices, and at most one PEC layer which must be the
/// innermost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new(layers: Vec<Layer>) -> MieResult<Self> {
        if layers.is_empty() {
            return Err(MieError::domain("layer stack is empty"));
        }
        for (i, layer) in layers.iter().enumerate() {
            if !layer.width.is_finite() || layer.width <= 0.0 {
                return Err(MieError::domain(format!(
                    "layer {i} has width {}; widths must be positive and finite",
                    layer.width
                )));
            }
            if !layer.pec && !(layer.index.re.is_finite() && layer.index.im.is_finite()) {
                return Err(MieError::domain(format!(
                    "layer {i} has a non-finite refractive index"
                )));
            }
            if layer.pec && i != 0 {
                return Err(MieError::domain(format!(
                    "layer {i} is flagged PEC; only the innermost layer may be a perfect conductor"
                )));
            }
        }
        Ok(Self { layers })
    }

    /// Build a stack from independently supplied width and index lists.
    pub fn from_parts(widths: &[f64], indices: &[Complex64], pec_core: bool) -> MieResult<Self> {
        if widths.len() != indices.len() {
            return Err(MieError::domain(format!(
                "{} widths supplied for {} refractive indices",
                widths.len(),
                indices.len()
            )));
        }
        let layers = widths
            .iter()
            .zip(indices)
            .enumerate()
            .map(|(i, (&w, &m))| {
                if i == 0 && pec_core {
                    Layer::pec(w)
                } else {
                    Layer::new(w, m)
                }
            })
            .collect();
        Self::new(layers)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn has_pec_core(&self) -> bool {
        self.layers[0].pec
    }

    /// Cumulative outer radius of each layer.
    pub fn radii(&self) -> Vec<f64> {
        self.layers
            .iter()
            .scan(0.0, |r, layer| {
                *r += layer.width;
                Some(*r)
            })
            .collect()
    }

    pub fn total_radius(&self) -> f64 {
        self.layers.iter().map(|l| l.width).sum()
    }

    pub fn indices(&self) -> Vec<Complex64> {
        self.layers.iter().map(|l| l.index).collect()
    }
}

/// Dimensionless description of the particle consumed by the recursion.
///
/// `sizes[i]` is the size parameter `2π rᵢ / λ` of the outer boundary of
/// layer `i`; `indices[i]` is that layer's relative refractive index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeParameterSet {
    sizes: Vec<f64>,
    indices: Vec<Complex64>,
    pec_core: bool,
}

impl SizeParameterSet {
    pub fn new(sizes: Vec<f64>, indices: Vec<Complex64>, pec_core: bool) -> MieResult<Self> {
        if sizes.is_empty() {
            return Err(MieError::domain("no layers supplied"));
        }
        if sizes.len() != indices.len() {
            return Err(MieError::domain(format!(
                "{} size parameters supplied for {} refractive indices",
                sizes.len(),
                indices.len()
            )));
        }
        let mut previous = 0.0;
        for (i, &x) in sizes.iter().enumerate() {
            if !x.is_finite() || x <= previous {
                return Err(MieError::domain(format!(
                    "size parameter {x} at layer {i} is not strictly increasing from {previous}"
                )));
            }
            previous = x;
        }
        for (i, m) in indices.iter().enumerate() {
            if !(m.re.is_finite() && m.im.is_finite()) {
                return Err(MieError::domain(format!(
                    "layer {i} has a non-finite refractive index"
                )));
            }
            if m.norm() == 0.0 && !(pec_core && i == 0) {
                return Err(MieError::domain(format!(
                    "layer {i} has a zero refractive index"
                )));
            }
        }
        Ok(Self {
            sizes,
            indices,
            pec_core,
        })
    }

    pub fn sizes(&self) -> &[f64] {
        &self.sizes
    }

    pub fn indices(&self) -> &[Complex64] {
        &self.indices
    }

    pub fn pec_core(&self) -> bool {
        self.pec_core
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Size parameter of the outermost boundary.
    pub fn outer(&self) -> f64 {
        self.sizes[self.sizes.len() - 1]
    }
}

/// External-field expansion coefficients, indexed by order `n = 1..=nmax`
/// (stored at `n - 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MieCoefficients {
    /// Electric multipole coefficients $a_n$.
    pub an: Vec<Complex64>,
    /// Magnetic multipole coefficients $b_n$.
    pub bn: Vec<Complex64>,
}

impl MieCoefficients {
    /// Number of multipole orders.
    pub fn nmax(&self) -> usize {
        self.an.len()
    }
}

/// Efficiency factors (cross-sections normalised by $\pi R^2$).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Efficiencies {
    pub qext: f64,
    pub qsca: f64,
    pub qabs: f64,
    /// Backscattering efficiency.
    pub qbk: f64,
    /// Radiation-pressure efficiency.
    pub qpr: f64,
    /// Extinction contribution of each multipole order.
    pub qext_channel: Vec<f64>,
    /// Scattering contribution of each multipole order.
    pub qsca_channel: Vec<f64>,
    /// Absorption contribution of each multipole order.
    pub qabs_channel: Vec<f64>,
}

/// Scattering amplitude functions sampled at a set of angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatteringAmplitudes {
    /// Scattering angles (radians).
    pub angles: Vec<f64>,
    pub s1: Vec<Complex64>,
    pub s2: Vec<Complex64>,
}

/// Angular intensity patterns for the two principal planes and the
/// unpolarised average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngularPattern {
    /// Scattering angles (radians).
    pub angles: Vec<f64>,
    /// Incident E-field in the scattering plane: $|S_2|^2$.
    pub e_plane: Vec<f64>,
    /// Incident H-field in the scattering plane: $|S_1|^2$.
    pub h_plane: Vec<f64>,
    /// Unpolarised incidence: $(|S_1|^2 + |S_2|^2)/2$.
    pub unpolarized: Vec<f64>,
}

/// One sample of a spectral sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralPoint {
    /// Wavelength (applied units).
    pub wavelength: f64,
    /// Outer size parameter at this wavelength.
    pub size_parameter: f64,
    pub qext: f64,
    pub qsca: f64,
    pub qabs: f64,
    pub qbk: f64,
}

/// Electric and magnetic near fields at a set of observation points.
#[derive(Debug, Clone)]
pub struct FieldValues {
    /// Observation points in size-parameter units.
    pub points: Vec<[f64; 3]>,
    /// Cartesian electric field, shape (N, 3), normalised to the incident amplitude.
    pub e: Array2<Complex64>,
    /// Cartesian magnetic field, shape (N, 3), in units of $E_0 / Z_0$.
    pub h: Array2<Complex64>,
}

impl FieldValues {
    /// $|\mathbf{E}|^2$ at each point.
    pub fn e_intensity(&self) -> Vec<f64> {
        self.e
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|c| c.norm_sqr()).sum())
            .collect()
    }
}

/// Defines a 2D observation plane for near-field maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearFieldPlane {
    /// Centre of the plane.
    pub centre: [f64; 3],
    /// Normal vector to the plane.
    pub normal: [f64; 3],
    /// Half-width of the plane.
    pub half_width: f64,
    /// Half-height of the plane.
    pub half_height: f64,
    /// Number of grid points along the width.
    pub nx: usize,
    /// Number of grid points along the height.
    pub ny: usize,
}

/// Near-field intensity sampled on a plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearFieldMap {
    /// Grid positions, row-major in (iy, ix).
    pub positions: Vec<[f64; 3]>,
    /// |E|^2 values at each grid point.
    pub field_intensity: Vec<f64>,
    /// Number of points along the plane's first axis.
    pub nx: usize,
    /// Number of points along the plane's second axis.
    pub ny: usize,
    /// Spatial extent: [x_min, x_max, y_min, y_max].
    pub extent: [f64; 4],
}

//! TOML configuration deserialisation for scattering jobs.

use anyhow::{bail, Context};
use num_complex::Complex64;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub simulation: SimulationConfig,
    /// Layers, innermost first. Target layers must precede coating layers.
    #[serde(rename = "layer")]
    pub layers: Vec<LayerConfig>,
    pub angles: Option<AngleSpec>,
    pub near_field: Option<NearFieldConfig>,
    pub fields: Option<FieldPointsConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulation parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// Single wavelength (same length unit as the layer widths).
    pub wavelength: Option<f64>,
    /// Wavelength sweep; takes precedence over `wavelength`.
    pub spectrum: Option<WavelengthSpec>,
    /// Cap on the number of multipole terms.
    pub max_terms: Option<usize>,
}

/// Wavelength specification: either a range or explicit list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WavelengthSpec {
    Range { range: [f64; 2], points: usize },
    List { values: Vec<f64> },
}

/// Scattering angles in degrees: either a range or explicit list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AngleSpec {
    Range { range: [f64; 2], points: usize },
    List { values: Vec<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerRole {
    #[default]
    Target,
    Coating,
}

/// A single shell of the particle.
#[derive(Debug, Deserialize)]
pub struct LayerConfig {
    pub width: f64,
    /// Relative refractive index as `[re, im]`.
    #[serde(default = "default_index")]
    pub index: Complex64,
    #[serde(default)]
    pub role: LayerRole,
    /// Perfect electric conductor. Only the innermost layer may set this.
    #[serde(default)]
    pub pec: bool,
}

fn default_index() -> Complex64 {
    Complex64::new(1.0, 0.0)
}

/// Observation plane for a near-field map, computed at peak extinction.
#[derive(Debug, Deserialize)]
pub struct NearFieldConfig {
    #[serde(default)]
    pub centre: [f64; 3],
    #[serde(default = "default_normal")]
    pub normal: [f64; 3],
    /// Half-width of the square plane. Defaults to twice the particle radius.
    pub half_width: Option<f64>,
    #[serde(default = "default_grid_points")]
    pub nx: usize,
    #[serde(default = "default_grid_points")]
    pub ny: usize,
}

fn default_normal() -> [f64; 3] {
    [0.0, 1.0, 0.0]
}
fn default_grid_points() -> usize {
    80
}

/// Explicit field observation points (applied units).
#[derive(Debug, Deserialize)]
pub struct FieldPointsConfig {
    pub points: Vec<[f64; 3]>,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save spectra as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_spectra: bool,
    /// Whether to also save spectra as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to save the Mie coefficients at peak extinction (default: true).
    #[serde(default = "default_true")]
    pub save_coefficients: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_spectra: true,
            save_json: false,
            save_coefficients: true,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Wavelengths to simulate, in order.
    pub fn wavelengths(&self) -> Vec<f64> {
        match (&self.simulation.spectrum, self.simulation.wavelength) {
            (Some(WavelengthSpec::Range { range, points }), _) => {
                let (start, end) = (range[0], range[1]);
                (0..*points)
                    .map(|i| start + (end - start) * i as f64 / (*points - 1).max(1) as f64)
                    .collect()
            }
            (Some(WavelengthSpec::List { values }), _) => values.clone(),
            (None, Some(wl)) => vec![wl],
            (None, None) => Vec::new(),
        }
    }

    /// Scattering angles in radians.
    pub fn angles_rad(&self) -> Vec<f64> {
        let degrees = match &self.angles {
            Some(AngleSpec::Range { range, points }) => {
                let (start, end) = (range[0], range[1]);
                (0..*points)
                    .map(|i| start + (end - start) * i as f64 / (*points - 1).max(1) as f64)
                    .collect()
            }
            Some(AngleSpec::List { values }) => values.clone(),
            None => Vec::new(),
        };
        degrees.into_iter().map(f64::to_radians).collect()
    }

    /// Structural checks the engine cannot make on its own.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.layers.is_empty() {
            bail!("job defines no [[layer]] entries");
        }
        let wavelengths = self.wavelengths();
        if wavelengths.is_empty() {
            bail!("set either simulation.wavelength or simulation.spectrum");
        }
        if let Some(bad) = wavelengths.iter().find(|wl| !(wl.is_finite() && **wl > 0.0)) {
            bail!("wavelength {bad} must be positive");
        }
        let mut seen_coating = false;
        for (i, layer) in self.layers.iter().enumerate() {
            match layer.role {
                LayerRole::Coating => seen_coating = true,
                LayerRole::Target if seen_coating => {
                    bail!("layer {i}: target layers must precede coating layers")
                }
                LayerRole::Target => {}
            }
            if layer.pec && i != 0 {
                bail!("layer {i}: only the innermost layer may be a perfect conductor");
            }
        }
        if let Some(AngleSpec::Range { points: 0, .. }) = &self.angles {
            bail!("angle range needs at least one point");
        }
        if let Some(nf) = &self.near_field {
            if nf.nx == 0 || nf.ny == 0 {
                bail!("near-field grid needs at least one point per axis");
            }
        }
        Ok(())
    }
}

/// Load, parse and validate a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    let config: JobConfig = toml::from_str(&content)
        .with_context(|| format!("parsing job file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

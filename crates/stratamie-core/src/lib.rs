//! # Stratamie Core
//!
//! Electromagnetic scattering by radially stratified spheres. Given a stack
//! of concentric shells, each with a width and a complex refractive index, and
//! an illumination wavelength, this crate computes the Mie coefficients, the
//! efficiency factors derived from them, angular scattering amplitudes, and
//! near fields inside and outside the particle.
//!
//! ## Architecture
//!
//! The numerical work is done by pure functions over explicit inputs:
//! special functions in [`bessel`], layer-to-layer propagation in
//! [`recursion`], far-field quantities in [`observables`] and near fields in
//! [`fields`]. [`mie::MultiLayerMie`] is a thin stateful front end that holds
//! a design in applied units and caches results until the design changes.
//!
//! ## Modules
//!
//! - [`types`]: Layers, layer stacks, size parameters and result containers.
//! - [`units`]: Applied-unit and size-parameter conversions.
//! - [`bessel`]: Riccati-Bessel functions and logarithmic derivatives.
//! - [`recursion`]: Truncation order, scattering and interior expansion coefficients.
//! - [`observables`]: Efficiencies, asymmetry factor, albedo, amplitudes, patterns.
//! - [`fields`]: Electric and magnetic near fields, near-field maps.
//! - [`mie`]: The `MultiLayerMie` front end.
//! - [`error`]: Error kinds shared by all of the above.

pub mod bessel;
pub mod error;
pub mod fields;
pub mod mie;
pub mod observables;
pub mod recursion;
pub mod types;
pub mod units;

pub use error::{MieError, MieResult};
pub use mie::MultiLayerMie;

//! Conversion between applied units and dimensionless size parameters.
//!
//! The size parameter of a radius $r$ at wavelength $\lambda$ is
//! $x = 2\pi r / \lambda$. Layer widths accumulate into boundary radii before
//! conversion; observation points use the same scale factor per coordinate.
//! For a fixed wavelength every conversion here is exactly invertible.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::error::{MieError, MieResult};
use crate::types::{LayerStack, SizeParameterSet};

fn check_wavelength(wavelength: f64) -> MieResult<()> {
    if wavelength.is_finite() && wavelength > 0.0 {
        Ok(())
    } else {
        Err(MieError::domain(format!(
            "wavelength must be positive and finite, got {wavelength}"
        )))
    }
}

/// Size parameter of a single radius.
pub fn size_parameter(radius: f64, wavelength: f64) -> MieResult<f64> {
    check_wavelength(wavelength)?;
    Ok(2.0 * PI * radius / wavelength)
}

/// Cumulative boundary size parameters of a layer stack.
pub fn size_parameters(stack: &LayerStack, wavelength: f64) -> MieResult<SizeParameterSet> {
    check_wavelength(wavelength)?;
    let scale = 2.0 * PI / wavelength;
    let sizes = stack.radii().into_iter().map(|r| r * scale).collect();
    SizeParameterSet::new(sizes, stack.indices(), stack.has_pec_core())
}

/// Recover per-layer widths from cumulative boundary size parameters.
pub fn widths_from_size_parameters(sizes: &[f64], wavelength: f64) -> MieResult<Vec<f64>> {
    check_wavelength(wavelength)?;
    let scale = wavelength / (2.0 * PI);
    let mut previous = 0.0;
    let mut widths = Vec::with_capacity(sizes.len());
    for &x in sizes {
        if !x.is_finite() || x <= previous {
            return Err(MieError::domain(format!(
                "size parameters must be strictly increasing, got {x} after {previous}"
            )));
        }
        widths.push((x - previous) * scale);
        previous = x;
    }
    Ok(widths)
}

/// Build a layer stack from size-parameter units.
pub fn stack_from_size_parameters(
    sizes: &[f64],
    indices: &[Complex64],
    pec_core: bool,
    wavelength: f64,
) -> MieResult<LayerStack> {
    let widths = widths_from_size_parameters(sizes, wavelength)?;
    LayerStack::from_parts(&widths, indices, pec_core)
}

pub fn point_to_size_parameter(point: &[f64; 3], wavelength: f64) -> MieResult<[f64; 3]> {
    check_wavelength(wavelength)?;
    let scale = 2.0 * PI / wavelength;
    Ok([point[0] * scale, point[1] * scale, point[2] * scale])
}

pub fn point_from_size_parameter(point: &[f64; 3], wavelength: f64) -> MieResult<[f64; 3]> {
    check_wavelength(wavelength)?;
    let scale = wavelength / (2.0 * PI);
    Ok([point[0] * scale, point[1] * scale, point[2] * scale])
}

/// `samples` evenly spaced values covering `[from, to]` inclusive.
///
/// A single sample returns `from`.
pub fn uniform_samples(from: f64, to: f64, samples: usize) -> MieResult<Vec<f64>> {
    if samples == 0 {
        return Err(MieError::domain("sample count must be at least 1"));
    }
    if !from.is_finite() || !to.is_finite() {
        return Err(MieError::domain("sample range must be finite"));
    }
    let step = if samples > 1 {
        (to - from) / (samples - 1) as f64
    } else {
        0.0
    };
    Ok((0..samples).map(|i| from + step * i as f64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_widths_round_trip_through_size_parameters() {
        let widths = [100.0, 50.0, 12.5];
        let indices = vec![Complex64::new(1.5, 0.01); 3];
        let stack = LayerStack::from_parts(&widths, &indices, false).unwrap();
        let wl = 532.0;
        let sp = size_parameters(&stack, wl).unwrap();
        assert_relative_eq!(sp.outer(), 2.0 * PI * 162.5 / wl, max_relative = 1e-15);

        let back = widths_from_size_parameters(sp.sizes(), wl).unwrap();
        for (a, b) in widths.iter().zip(&back) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_point_round_trip() {
        let p = [12.0, -3.5, 0.25];
        let sp = point_to_size_parameter(&p, 633.0).unwrap();
        let back = point_from_size_parameter(&sp, 633.0).unwrap();
        for k in 0..3 {
            assert_relative_eq!(p[k], back[k], max_relative = 1e-14);
        }
    }

    #[test]
    fn test_rejects_non_positive_wavelength() {
        assert!(matches!(size_parameter(1.0, 0.0), Err(MieError::Domain(_))));
        assert!(matches!(size_parameter(1.0, -5.0), Err(MieError::Domain(_))));
    }

    #[test]
    fn test_uniform_samples_inclusive() {
        let s = uniform_samples(0.0, 180.0, 7).unwrap();
        assert_eq!(s.len(), 7);
        assert_eq!(s[0], 0.0);
        assert_relative_eq!(s[6], 180.0);
        assert_relative_eq!(s[1], 30.0);
        assert_eq!(uniform_samples(5.0, 10.0, 1).unwrap(), vec![5.0]);
        assert!(uniform_samples(0.0, 1.0, 0).is_err());
    }
}

//! Stateful front end for a single stratified-sphere computation.
//!
//! [`MultiLayerMie`] holds the particle design (target layers first, then
//! coating layers, both listed inside-out), the wavelength, the angle set and
//! the field observation points. Results are computed on first access and
//! cached; every setter discards the cache.
//!
//! Geometry is stored in applied units. The `_sp` setters and getters convert
//! through [`crate::units`] using the wavelength current at the time of the call.
//!
//! ```no_run
//! use num_complex::Complex64;
//! use stratamie_core::mie::MultiLayerMie;
//!
//! let mut mie = MultiLayerMie::new();
//! mie.set_wavelength(500.0)?;
//! mie.add_target_layer(100.0, Complex64::new(1.5, 0.01))?;
//! mie.add_coating_layer(50.0, Complex64::new(1.33, 0.0))?;
//! println!("Qsca = {:.4}", mie.qsca()?);
//! # Ok::<(), stratamie_core::error::MieError>(())
//! ```

use std::f64::consts::PI;

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{MieError, MieResult};
use crate::fields::fields_at_points;
use crate::observables::{
    albedo, amplitudes, asymmetry_factor, efficiencies, normalize_channels, patterns,
};
use crate::recursion::{resolve_terms, scattering_coefficients, truncation_order};
use crate::types::{
    AngularPattern, Efficiencies, FieldValues, LayerStack, MieCoefficients, NearFieldMap,
    NearFieldPlane, ScatteringAmplitudes, SizeParameterSet, SpectralPoint,
};
use crate::units::{
    point_from_size_parameter, point_to_size_parameter, size_parameters, uniform_samples,
    widths_from_size_parameters,
};

/// Everything derived from one (stack, wavelength, angles) configuration.
#[derive(Debug, Clone)]
struct Solution {
    sp: SizeParameterSet,
    coeffs: MieCoefficients,
    eff: Efficiencies,
    amps: ScatteringAmplitudes,
}

fn solve(
    stack: &LayerStack,
    wavelength: f64,
    max_terms: Option<usize>,
    angles: &[f64],
) -> MieResult<Solution> {
    let sp = size_parameters(stack, wavelength)?;
    let estimated = truncation_order(&sp);
    let nmax = resolve_terms(estimated, max_terms)?;
    log::debug!(
        "solving {} layer(s) at x = {:.6}: nmax = {nmax} (estimate {estimated})",
        sp.len(),
        sp.outer()
    );
    let coeffs = scattering_coefficients(&sp, nmax)?;
    let eff = efficiencies(&coeffs, sp.outer())?;
    let amps = amplitudes(&coeffs, angles);
    Ok(Solution {
        sp,
        coeffs,
        eff,
        amps,
    })
}

fn check_width(width: f64) -> MieResult<()> {
    if width.is_finite() && width > 0.0 {
        Ok(())
    } else {
        Err(MieError::domain(format!(
            "layer width must be positive and finite, got {width}"
        )))
    }
}

fn check_index(index: Complex64) -> MieResult<()> {
    if index.re.is_finite() && index.im.is_finite() {
        Ok(())
    } else {
        Err(MieError::domain(format!(
            "refractive index {index} is not finite"
        )))
    }
}

/// A multilayered sphere in a host medium of unit refractive index,
/// illuminated by an x-polarised plane wave travelling along +z.
#[derive(Debug, Clone)]
pub struct MultiLayerMie {
    wavelength: f64,
    target_width: Vec<f64>,
    target_index: Vec<Complex64>,
    coating_width: Vec<f64>,
    coating_index: Vec<Complex64>,
    pec_core: bool,
    angles: Vec<f64>,
    field_points: Vec<[f64; 3]>,
    max_terms: Option<usize>,
    solution: Option<Solution>,
    fields: Option<FieldValues>,
}

impl Default for MultiLayerMie {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiLayerMie {
    pub fn new() -> Self {
        Self {
            wavelength: 1.0,
            target_width: Vec::new(),
            target_index: Vec::new(),
            coating_width: Vec::new(),
            coating_index: Vec::new(),
            pec_core: false,
            angles: Vec::new(),
            field_points: Vec::new(),
            max_terms: None,
            solution: None,
            fields: None,
        }
    }

    fn invalidate(&mut self) {
        self.solution = None;
        self.fields = None;
    }

    // ---- design ------------------------------------------------------------

    pub fn set_wavelength(&mut self, wavelength: f64) -> MieResult<()> {
        if !(wavelength.is_finite() && wavelength > 0.0) {
            return Err(MieError::domain(format!(
                "wavelength must be positive and finite, got {wavelength}"
            )));
        }
        self.wavelength = wavelength;
        self.invalidate();
        Ok(())
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Append a layer to the target, outside the existing target layers.
    pub fn add_target_layer(&mut self, width: f64, index: Complex64) -> MieResult<()> {
        check_width(width)?;
        check_index(index)?;
        self.target_width.push(width);
        self.target_index.push(index);
        self.invalidate();
        Ok(())
    }

    /// Append a coating layer, outside the existing coating layers.
    pub fn add_coating_layer(&mut self, width: f64, index: Complex64) -> MieResult<()> {
        check_width(width)?;
        check_index(index)?;
        self.coating_width.push(width);
        self.coating_index.push(index);
        self.invalidate();
        Ok(())
    }

    /// Replace the target widths. Indices are supplied separately; the two
    /// lists are matched when the stack is next solved.
    pub fn set_target_width(&mut self, width: Vec<f64>) -> MieResult<()> {
        width.iter().try_for_each(|&w| check_width(w))?;
        self.target_width = width;
        self.invalidate();
        Ok(())
    }

    pub fn set_target_index(&mut self, index: Vec<Complex64>) -> MieResult<()> {
        index.iter().try_for_each(|&m| check_index(m))?;
        self.target_index = index;
        self.invalidate();
        Ok(())
    }

    /// Replace the target with a perfectly conducting core of the given radius.
    pub fn set_target_pec(&mut self, radius: f64) -> MieResult<()> {
        check_width(radius)?;
        self.target_width = vec![radius];
        self.target_index = vec![Complex64::new(1.0, 0.0)];
        self.pec_core = true;
        self.invalidate();
        Ok(())
    }

    pub fn set_coating_width(&mut self, width: Vec<f64>) -> MieResult<()> {
        width.iter().try_for_each(|&w| check_width(w))?;
        self.coating_width = width;
        self.invalidate();
        Ok(())
    }

    pub fn set_coating_index(&mut self, index: Vec<Complex64>) -> MieResult<()> {
        index.iter().try_for_each(|&m| check_index(m))?;
        self.coating_index = index;
        self.invalidate();
        Ok(())
    }

    /// Flag the layer at `position` as a perfect conductor.
    ///
    /// Only the innermost layer (position 0) can be a conductor.
    pub fn set_pec(&mut self, position: usize) -> MieResult<()> {
        if position != 0 {
            return Err(MieError::domain(format!(
                "layer {position} cannot be PEC; only the innermost layer may be a perfect conductor"
            )));
        }
        self.pec_core = true;
        self.invalidate();
        Ok(())
    }

    /// Replace the whole design from cumulative boundary size parameters.
    ///
    /// The layers become target layers; widths are recovered at the current
    /// wavelength. The PEC flag is left as it is.
    pub fn set_layers_sp(&mut self, sizes: &[f64], indices: &[Complex64]) -> MieResult<()> {
        if sizes.len() != indices.len() {
            return Err(MieError::domain(format!(
                "{} size parameters supplied for {} refractive indices",
                sizes.len(),
                indices.len()
            )));
        }
        indices.iter().try_for_each(|&m| check_index(m))?;
        self.target_width = widths_from_size_parameters(sizes, self.wavelength)?;
        self.target_index = indices.to_vec();
        self.coating_width.clear();
        self.coating_index.clear();
        self.invalidate();
        Ok(())
    }

    /// Cap the number of multipole terms. The smaller of the cap and the
    /// automatic estimate is used; `None` restores the estimate.
    pub fn set_max_terms(&mut self, max_terms: Option<usize>) {
        self.max_terms = max_terms;
        self.invalidate();
    }

    pub fn max_terms(&self) -> Option<usize> {
        self.max_terms
    }

    /// Explicit scattering angles (radians).
    pub fn set_angles(&mut self, angles: Vec<f64>) -> MieResult<()> {
        if angles.iter().any(|a| !a.is_finite()) {
            return Err(MieError::domain("scattering angles must be finite"));
        }
        self.angles = angles;
        self.invalidate();
        Ok(())
    }

    /// `samples` angles evenly spaced over `[from, to]` (radians, inclusive).
    pub fn set_angles_for_pattern(&mut self, from: f64, to: f64, samples: usize) -> MieResult<()> {
        self.angles = uniform_samples(from, to, samples)?;
        self.invalidate();
        Ok(())
    }

    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// Observation points in applied units.
    pub fn set_field_points(&mut self, points: Vec<[f64; 3]>) -> MieResult<()> {
        if points.iter().flatten().any(|c| !c.is_finite()) {
            return Err(MieError::domain("field points must be finite"));
        }
        self.field_points = points;
        self.fields = None;
        Ok(())
    }

    /// Observation points in size-parameter units.
    pub fn set_field_points_sp(&mut self, points: &[[f64; 3]]) -> MieResult<()> {
        let applied = points
            .iter()
            .map(|p| point_from_size_parameter(p, self.wavelength))
            .collect::<MieResult<Vec<_>>>()?;
        self.set_field_points(applied)
    }

    pub fn clear_target(&mut self) {
        self.target_width.clear();
        self.target_index.clear();
        self.pec_core = false;
        self.invalidate();
    }

    pub fn clear_coating(&mut self) {
        self.coating_width.clear();
        self.coating_index.clear();
        self.invalidate();
    }

    pub fn clear_layers(&mut self) {
        self.clear_target();
        self.clear_coating();
    }

    /// Remove layers, the PEC flag and the field points. Wavelength, angles
    /// and the term cap are kept.
    pub fn clear_all_design(&mut self) {
        self.clear_layers();
        self.field_points.clear();
    }

    // ---- geometry ----------------------------------------------------------

    /// The validated layer stack, target layers first.
    pub fn layer_stack(&self) -> MieResult<LayerStack> {
        if self.target_width.len() != self.target_index.len() {
            return Err(MieError::domain(format!(
                "target has {} widths but {} refractive indices",
                self.target_width.len(),
                self.target_index.len()
            )));
        }
        if self.coating_width.len() != self.coating_index.len() {
            return Err(MieError::domain(format!(
                "coating has {} widths but {} refractive indices",
                self.coating_width.len(),
                self.coating_index.len()
            )));
        }
        let widths: Vec<f64> = self
            .target_width
            .iter()
            .chain(&self.coating_width)
            .copied()
            .collect();
        LayerStack::from_parts(&widths, &self.layer_index(), self.pec_core)
    }

    pub fn total_radius(&self) -> f64 {
        self.target_radius() + self.coating_width()
    }

    pub fn target_radius(&self) -> f64 {
        self.target_width.iter().sum()
    }

    /// Combined width of all coating layers.
    pub fn coating_width(&self) -> f64 {
        self.coating_width.iter().sum()
    }

    pub fn target_layers_width(&self) -> &[f64] {
        &self.target_width
    }

    pub fn target_layers_index(&self) -> &[Complex64] {
        &self.target_index
    }

    pub fn coating_layers_width(&self) -> &[f64] {
        &self.coating_width
    }

    pub fn coating_layers_index(&self) -> &[Complex64] {
        &self.coating_index
    }

    pub fn is_pec_core(&self) -> bool {
        self.pec_core
    }

    /// Size parameter of every layer boundary at the current wavelength.
    pub fn layer_width_sp(&self) -> MieResult<Vec<f64>> {
        let sp = size_parameters(&self.layer_stack()?, self.wavelength)?;
        Ok(sp.sizes().to_vec())
    }

    /// Refractive index of every layer, target layers first.
    pub fn layer_index(&self) -> Vec<Complex64> {
        self.target_index
            .iter()
            .chain(&self.coating_index)
            .copied()
            .collect()
    }

    pub fn field_points(&self) -> &[[f64; 3]] {
        &self.field_points
    }

    pub fn field_points_sp(&self) -> MieResult<Vec<[f64; 3]>> {
        self.field_points
            .iter()
            .map(|p| point_to_size_parameter(p, self.wavelength))
            .collect()
    }

    // ---- results -----------------------------------------------------------

    fn solution(&mut self) -> MieResult<&Solution> {
        let solution = match self.solution.take() {
            Some(s) => s,
            None => solve(
                &self.layer_stack()?,
                self.wavelength,
                self.max_terms,
                &self.angles,
            )?,
        };
        Ok(self.solution.insert(solution))
    }

    fn eff(&mut self) -> MieResult<&Efficiencies> {
        Ok(&self.solution()?.eff)
    }

    /// Number of multipole terms used by the current solution.
    pub fn max_terms_used(&mut self) -> MieResult<usize> {
        Ok(self.solution()?.coeffs.nmax())
    }

    pub fn coefficients(&mut self) -> MieResult<MieCoefficients> {
        Ok(self.solution()?.coeffs.clone())
    }

    pub fn an(&mut self) -> MieResult<Vec<Complex64>> {
        Ok(self.solution()?.coeffs.an.clone())
    }

    pub fn bn(&mut self) -> MieResult<Vec<Complex64>> {
        Ok(self.solution()?.coeffs.bn.clone())
    }

    pub fn efficiencies(&mut self) -> MieResult<Efficiencies> {
        Ok(self.eff()?.clone())
    }

    pub fn qext(&mut self) -> MieResult<f64> {
        Ok(self.eff()?.qext)
    }

    pub fn qsca(&mut self) -> MieResult<f64> {
        Ok(self.eff()?.qsca)
    }

    pub fn qabs(&mut self) -> MieResult<f64> {
        Ok(self.eff()?.qabs)
    }

    pub fn qbk(&mut self) -> MieResult<f64> {
        Ok(self.eff()?.qbk)
    }

    pub fn qpr(&mut self) -> MieResult<f64> {
        Ok(self.eff()?.qpr)
    }

    pub fn qext_channel(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.eff()?.qext_channel.clone())
    }

    pub fn qsca_channel(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.eff()?.qsca_channel.clone())
    }

    pub fn qabs_channel(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.eff()?.qabs_channel.clone())
    }

    /// Per-order scattering efficiency rescaled by $x^2 / (2(2n+1))$.
    pub fn qsca_channel_normalized(&mut self) -> MieResult<Vec<f64>> {
        let s = self.solution()?;
        Ok(normalize_channels(&s.eff.qsca_channel, s.sp.outer()))
    }

    pub fn qabs_channel_normalized(&mut self) -> MieResult<Vec<f64>> {
        let s = self.solution()?;
        Ok(normalize_channels(&s.eff.qabs_channel, s.sp.outer()))
    }

    pub fn qext_channel_normalized(&mut self) -> MieResult<Vec<f64>> {
        let s = self.solution()?;
        Ok(normalize_channels(&s.eff.qext_channel, s.sp.outer()))
    }

    fn geometric_cross_section(&self) -> f64 {
        let r = self.total_radius();
        PI * r * r
    }

    /// Extinction cross-section in applied units squared.
    pub fn rcs_ext(&mut self) -> MieResult<f64> {
        Ok(self.qext()? * self.geometric_cross_section())
    }

    pub fn rcs_sca(&mut self) -> MieResult<f64> {
        Ok(self.qsca()? * self.geometric_cross_section())
    }

    pub fn rcs_abs(&mut self) -> MieResult<f64> {
        Ok(self.qabs()? * self.geometric_cross_section())
    }

    /// Backscattering (radar) cross-section in applied units squared.
    pub fn rcs_bk(&mut self) -> MieResult<f64> {
        Ok(self.qbk()? * self.geometric_cross_section())
    }

    pub fn asymmetry_factor(&mut self) -> MieResult<f64> {
        asymmetry_factor(self.eff()?)
    }

    pub fn albedo(&mut self) -> MieResult<f64> {
        albedo(self.eff()?)
    }

    pub fn amplitudes(&mut self) -> MieResult<ScatteringAmplitudes> {
        Ok(self.solution()?.amps.clone())
    }

    pub fn s1(&mut self) -> MieResult<Vec<Complex64>> {
        Ok(self.solution()?.amps.s1.clone())
    }

    pub fn s2(&mut self) -> MieResult<Vec<Complex64>> {
        Ok(self.solution()?.amps.s2.clone())
    }

    /// Angular patterns as differential cross-sections, $|S|^2 / k^2$.
    pub fn pattern(&mut self) -> MieResult<AngularPattern> {
        let k = 2.0 * PI / self.wavelength;
        Ok(patterns(&self.solution()?.amps, 1.0 / (k * k)))
    }

    /// Angular patterns in size-parameter units, $|S|^2$.
    pub fn pattern_sp(&mut self) -> MieResult<AngularPattern> {
        Ok(patterns(&self.solution()?.amps, 1.0))
    }

    pub fn pattern_ek(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.pattern()?.e_plane)
    }

    pub fn pattern_hk(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.pattern()?.h_plane)
    }

    pub fn pattern_unpolarized(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.pattern()?.unpolarized)
    }

    pub fn pattern_ek_sp(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.pattern_sp()?.e_plane)
    }

    pub fn pattern_hk_sp(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.pattern_sp()?.h_plane)
    }

    pub fn pattern_unpolarized_sp(&mut self) -> MieResult<Vec<f64>> {
        Ok(self.pattern_sp()?.unpolarized)
    }

    /// Electric and magnetic fields at the configured observation points.
    pub fn fields(&mut self) -> MieResult<&FieldValues> {
        let values = match self.fields.take() {
            Some(v) => v,
            None => {
                let points = self.field_points_sp()?;
                let s = self.solution()?;
                fields_at_points(&s.sp, &s.coeffs, &points)?
            }
        };
        Ok(self.fields.insert(values))
    }

    /// Cartesian electric field, shape (N, 3), relative to the incident amplitude.
    pub fn field_e(&mut self) -> MieResult<Array2<Complex64>> {
        Ok(self.fields()?.e.clone())
    }

    /// Cartesian magnetic field, shape (N, 3), in units of $E_0 / Z_0$.
    pub fn field_h(&mut self) -> MieResult<Array2<Complex64>> {
        Ok(self.fields()?.h.clone())
    }

    /// |E|^2 on a plane given in applied units. Positions and extent are
    /// reported in applied units as well.
    pub fn near_field_map(&mut self, plane: &NearFieldPlane) -> MieResult<NearFieldMap> {
        let wl = self.wavelength;
        let scale = 2.0 * PI / wl;
        let plane_sp = NearFieldPlane {
            centre: point_to_size_parameter(&plane.centre, wl)?,
            normal: plane.normal,
            half_width: plane.half_width * scale,
            half_height: plane.half_height * scale,
            nx: plane.nx,
            ny: plane.ny,
        };
        let s = self.solution()?;
        let mut map = crate::fields::near_field_map(&s.sp, &s.coeffs, &plane_sp)?;
        map.positions = map
            .positions
            .iter()
            .map(|p| point_from_size_parameter(p, wl))
            .collect::<MieResult<Vec<_>>>()?;
        for e in map.extent.iter_mut() {
            *e /= scale;
        }
        Ok(map)
    }

    /// Efficiencies over `samples` wavelengths spanning `[from, to]`.
    ///
    /// The design and the cached solution are left untouched.
    pub fn spectra(&self, from: f64, to: f64, samples: usize) -> MieResult<Vec<SpectralPoint>> {
        let stack = self.layer_stack()?;
        uniform_samples(from, to, samples)?
            .into_iter()
            .map(|wl| {
                let s = solve(&stack, wl, self.max_terms, &[])?;
                Ok(SpectralPoint {
                    wavelength: wl,
                    size_parameter: s.sp.outer(),
                    qext: s.eff.qext,
                    qsca: s.eff.qsca,
                    qabs: s.eff.qabs,
                    qbk: s.eff.qbk,
                })
            })
            .collect()
    }

    /// Efficiencies over `samples` outer size parameters spanning `[from, to]`.
    ///
    /// Each sample is realised by the wavelength $2\pi R / x$ for the current
    /// geometry, which is reported alongside.
    pub fn spectra_sp(&self, from: f64, to: f64, samples: usize) -> MieResult<Vec<SpectralPoint>> {
        let stack = self.layer_stack()?;
        let radius = stack.total_radius();
        uniform_samples(from, to, samples)?
            .into_iter()
            .map(|x| {
                if !(x.is_finite() && x > 0.0) {
                    return Err(MieError::domain(format!(
                        "size parameter must be positive, got {x}"
                    )));
                }
                let wl = 2.0 * PI * radius / x;
                let s = solve(&stack, wl, self.max_terms, &[])?;
                Ok(SpectralPoint {
                    wavelength: wl,
                    size_parameter: s.sp.outer(),
                    qext: s.eff.qext,
                    qsca: s.eff.qsca,
                    qabs: s.eff.qabs,
                    qbk: s.eff.qbk,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn core_shell() -> MultiLayerMie {
        let mut mie = MultiLayerMie::new();
        mie.set_wavelength(500.0).unwrap();
        mie.add_target_layer(100.0, c(1.5, 0.01)).unwrap();
        mie.add_coating_layer(50.0, c(1.33, 0.0)).unwrap();
        mie
    }

    #[test]
    fn test_core_shell_scenario() {
        let mut mie = core_shell();
        let qsca = mie.qsca().unwrap();
        let qabs = mie.qabs().unwrap();
        let g = mie.asymmetry_factor().unwrap();
        eprintln!("Qsca = {qsca:.6}, Qabs = {qabs:.6}, g = {g:.6}");
        assert!(qsca > 0.0);
        assert!(qabs >= 0.0);
        assert!(g > -1.0 && g < 1.0);
        assert_relative_eq!(
            mie.qext().unwrap(),
            qsca + qabs,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_setters_invalidate_cache() {
        let mut mie = core_shell();
        let before = mie.qext().unwrap();
        mie.set_wavelength(700.0).unwrap();
        let after = mie.qext().unwrap();
        assert!((before - after).abs() > 1e-6);

        mie.add_coating_layer(20.0, c(2.0, 0.0)).unwrap();
        assert!((mie.qext().unwrap() - after).abs() > 1e-6);
    }

    #[test]
    fn test_geometry_getters() {
        let mie = core_shell();
        assert_eq!(mie.target_radius(), 100.0);
        assert_eq!(mie.coating_width(), 50.0);
        assert_eq!(mie.total_radius(), 150.0);
        assert_eq!(mie.layer_index(), vec![c(1.5, 0.01), c(1.33, 0.0)]);
        let sizes = mie.layer_width_sp().unwrap();
        assert_relative_eq!(sizes[1], 2.0 * PI * 150.0 / 500.0, max_relative = 1e-15);
    }

    #[test]
    fn test_layers_sp_round_trip() {
        let mut mie = MultiLayerMie::new();
        mie.set_wavelength(633.0).unwrap();
        let sizes = [0.8, 1.4, 2.1];
        mie.set_layers_sp(&sizes, &[c(1.2, 0.0), c(2.0, 0.1), c(1.4, 0.0)])
            .unwrap();
        let back = mie.layer_width_sp().unwrap();
        for (a, b) in sizes.iter().zip(&back) {
            assert_relative_eq!(*a, *b, max_relative = 1e-14);
        }
    }

    #[test]
    fn test_empty_and_mismatched_designs_are_rejected() {
        let mut mie = MultiLayerMie::new();
        assert!(matches!(mie.qext(), Err(MieError::Domain(_))));

        mie.set_target_width(vec![10.0, 20.0]).unwrap();
        mie.set_target_index(vec![c(1.5, 0.0)]).unwrap();
        assert!(matches!(mie.qext(), Err(MieError::Domain(_))));

        assert!(mie.add_target_layer(-1.0, c(1.5, 0.0)).is_err());
        assert!(mie.set_wavelength(0.0).is_err());
    }

    #[test]
    fn test_only_innermost_layer_can_be_pec() {
        let mut mie = core_shell();
        assert!(matches!(mie.set_pec(1), Err(MieError::Domain(_))));
        mie.set_pec(0).unwrap();
        assert!(mie.is_pec_core());
        assert!(mie.qsca().unwrap() > 0.0);
        mie.clear_target();
        assert!(!mie.is_pec_core());
    }

    #[test]
    fn test_term_cap_is_reported() {
        let mut mie = core_shell();
        let auto = mie.max_terms_used().unwrap();
        mie.set_max_terms(Some(3));
        assert_eq!(mie.max_terms_used().unwrap(), 3);
        assert_eq!(mie.an().unwrap().len(), 3);
        mie.set_max_terms(Some(auto + 100));
        assert_eq!(mie.max_terms_used().unwrap(), auto);
    }

    #[test]
    fn test_cross_sections_scale_by_geometric_area() {
        let mut mie = core_shell();
        let area = PI * 150.0 * 150.0;
        assert_relative_eq!(
            mie.rcs_ext().unwrap(),
            mie.qext().unwrap() * area,
            max_relative = 1e-14
        );
        assert_relative_eq!(
            mie.rcs_bk().unwrap(),
            mie.qbk().unwrap() * area,
            max_relative = 1e-14
        );
    }

    #[test]
    fn test_spectra_leave_design_untouched() {
        let mut mie = core_shell();
        let q = mie.qext().unwrap();
        let spectrum = mie.spectra(400.0, 800.0, 5).unwrap();
        assert_eq!(spectrum.len(), 5);
        assert_eq!(spectrum[0].wavelength, 400.0);
        assert_relative_eq!(spectrum[4].wavelength, 800.0);
        assert_eq!(mie.wavelength(), 500.0);
        assert_eq!(mie.qext().unwrap(), q);

        let sweep = mie.spectra_sp(1.0, 3.0, 3).unwrap();
        for p in &sweep {
            assert_relative_eq!(
                2.0 * PI * 150.0 / p.wavelength,
                p.size_parameter,
                max_relative = 1e-12
            );
        }
        assert_relative_eq!(sweep[1].size_parameter, 2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_patterns_in_both_unit_systems() {
        let mut mie = core_shell();
        mie.set_angles_for_pattern(0.0, PI, 19).unwrap();
        let k = 2.0 * PI / 500.0;
        let sp = mie.pattern_unpolarized_sp().unwrap();
        let applied = mie.pattern_unpolarized().unwrap();
        assert_eq!(sp.len(), 19);
        for (s, a) in sp.iter().zip(&applied) {
            assert_relative_eq!(*a, s / (k * k), max_relative = 1e-12);
        }
        // forward and backward directions have no polarisation dependence
        let ek = mie.pattern_ek_sp().unwrap();
        let hk = mie.pattern_hk_sp().unwrap();
        assert_relative_eq!(ek[0], hk[0], max_relative = 1e-10);
        assert_relative_eq!(ek[18], hk[18], max_relative = 1e-10);
    }

    #[test]
    fn test_field_at_origin_is_domain_error() {
        let mut mie = core_shell();
        mie.set_field_points(vec![[0.0, 0.0, 0.0]]).unwrap();
        assert!(matches!(mie.field_e(), Err(MieError::Domain(_))));
    }

    #[test]
    fn test_field_points_sp_round_trip() {
        let mut mie = core_shell();
        let pts = [[0.5, -1.0, 2.0], [3.0, 0.0, -0.25]];
        mie.set_field_points_sp(&pts).unwrap();
        let back = mie.field_points_sp().unwrap();
        for (p, q) in pts.iter().zip(&back) {
            for k in 0..3 {
                assert_relative_eq!(p[k], q[k], max_relative = 1e-14);
            }
        }
        let e = mie.field_e().unwrap();
        assert_eq!(e.dim(), (2, 3));
    }
}

//! Far-field observables derived from the Mie coefficients.
//!
//! All efficiencies are normalised by the geometric cross-section of the
//! outermost boundary, $\pi R^2$, and computed from the standard weighted sums
//! (Bohren & Huffman 1983, §4.4):
//!
//! $$ Q_{\text{ext}} = \frac{2}{x^2} \sum_n (2n+1)\,\operatorname{Re}(a_n + b_n), \qquad
//!    Q_{\text{sca}} = \frac{2}{x^2} \sum_n (2n+1)\left(|a_n|^2 + |b_n|^2\right) $$

use num_complex::Complex64;

use crate::error::{MieError, MieResult};
use crate::types::{AngularPattern, Efficiencies, MieCoefficients, ScatteringAmplitudes};

fn check_size(x: f64) -> MieResult<()> {
    if x.is_finite() && x > 0.0 {
        Ok(())
    } else {
        Err(MieError::domain(format!(
            "outer size parameter must be positive, got {x}"
        )))
    }
}

/// Total and per-order efficiency factors.
pub fn efficiencies(coeffs: &MieCoefficients, x: f64) -> MieResult<Efficiencies> {
    check_size(x)?;
    let nmax = coeffs.nmax();
    let norm = 2.0 / (x * x);

    let mut qext_channel = Vec::with_capacity(nmax);
    let mut qsca_channel = Vec::with_capacity(nmax);
    let mut qabs_channel = Vec::with_capacity(nmax);
    let mut backscatter = Complex64::new(0.0, 0.0);
    let mut asymmetry_sum = 0.0;

    for i in 0..nmax {
        let n = (i + 1) as f64;
        let (a, b) = (coeffs.an[i], coeffs.bn[i]);
        let weight = 2.0 * n + 1.0;

        let ext = norm * weight * (a.re + b.re);
        let sca = norm * weight * (a.norm_sqr() + b.norm_sqr());
        qext_channel.push(ext);
        qsca_channel.push(sca);
        qabs_channel.push(ext - sca);

        let sign = if (i + 1) % 2 == 0 { 1.0 } else { -1.0 };
        backscatter += weight * sign * (a - b);

        if i + 1 < nmax {
            let (a1, b1) = (coeffs.an[i + 1], coeffs.bn[i + 1]);
            asymmetry_sum += n * (n + 2.0) / (n + 1.0) * (a * a1.conj() + b * b1.conj()).re;
        }
        asymmetry_sum += weight / (n * (n + 1.0)) * (a * b.conj()).re;
    }

    let qext: f64 = qext_channel.iter().sum();
    let qsca: f64 = qsca_channel.iter().sum();
    let qabs = qext - qsca;
    let qbk = backscatter.norm_sqr() / (x * x);
    let qpr = qext - 2.0 * norm * asymmetry_sum;

    Ok(Efficiencies {
        qext,
        qsca,
        qabs,
        qbk,
        qpr,
        qext_channel,
        qsca_channel,
        qabs_channel,
    })
}

fn is_numerically_zero(q: f64) -> bool {
    q.abs() < f64::MIN_POSITIVE
}

/// Single-scattering albedo $Q_{\text{sca}} / Q_{\text{ext}}$.
pub fn albedo(eff: &Efficiencies) -> MieResult<f64> {
    if is_numerically_zero(eff.qext) {
        return Err(MieError::domain("albedo is undefined for zero extinction"));
    }
    Ok(eff.qsca / eff.qext)
}

/// Asymmetry factor $g = \langle\cos\theta\rangle = (Q_{\text{ext}} - Q_{\text{pr}}) / Q_{\text{sca}}$.
pub fn asymmetry_factor(eff: &Efficiencies) -> MieResult<f64> {
    if is_numerically_zero(eff.qext) {
        return Err(MieError::domain(
            "asymmetry factor is undefined for zero extinction",
        ));
    }
    if is_numerically_zero(eff.qsca) {
        return Err(MieError::domain(
            "asymmetry factor is undefined for zero scattering",
        ));
    }
    Ok((eff.qext - eff.qpr) / eff.qsca)
}

/// Per-order efficiencies rescaled by $x^2 / (2(2n+1))$.
///
/// In these units a lossless order that scatters resonantly in one
/// polarisation reaches 1.
pub fn normalize_channels(channel: &[f64], x: f64) -> Vec<f64> {
    channel
        .iter()
        .enumerate()
        .map(|(i, q)| q * x * x / (2.0 * (2.0 * (i + 1) as f64 + 1.0)))
        .collect()
}

/// Angular functions $\pi_n(\cos\theta)$ and $\tau_n(\cos\theta)$ for `n = 1..=nmax`.
pub fn pi_tau(mu: f64, nmax: usize) -> (Vec<f64>, Vec<f64>) {
    let mut pi = Vec::with_capacity(nmax);
    let mut tau = Vec::with_capacity(nmax);
    let (mut pi_prev, mut pi_curr) = (0.0, 1.0);
    for n in 1..=nmax {
        let nf = n as f64;
        if n > 1 {
            let next = ((2.0 * nf - 1.0) * mu * pi_curr - nf * pi_prev) / (nf - 1.0);
            pi_prev = pi_curr;
            pi_curr = next;
        }
        pi.push(pi_curr);
        tau.push(nf * mu * pi_curr - (nf + 1.0) * pi_prev);
    }
    (pi, tau)
}

/// Scattering amplitudes $S_1(\theta)$ and $S_2(\theta)$ at each angle (radians).
pub fn amplitudes(coeffs: &MieCoefficients, angles: &[f64]) -> ScatteringAmplitudes {
    let nmax = coeffs.nmax();
    let mut s1 = Vec::with_capacity(angles.len());
    let mut s2 = Vec::with_capacity(angles.len());

    for &theta in angles {
        let (pi, tau) = pi_tau(theta.cos(), nmax);
        let mut sum1 = Complex64::new(0.0, 0.0);
        let mut sum2 = Complex64::new(0.0, 0.0);
        for i in 0..nmax {
            let n = (i + 1) as f64;
            let weight = (2.0 * n + 1.0) / (n * (n + 1.0));
            let (a, b) = (coeffs.an[i], coeffs.bn[i]);
            sum1 += weight * (a * pi[i] + b * tau[i]);
            sum2 += weight * (a * tau[i] + b * pi[i]);
        }
        s1.push(sum1);
        s2.push(sum2);
    }

    ScatteringAmplitudes {
        angles: angles.to_vec(),
        s1,
        s2,
    }
}

/// Intensity patterns in size-parameter units, scaled by `scale`.
///
/// `scale = 1` gives $|S|^2$; `scale = 1/k^2` gives differential
/// cross-sections in applied units.
pub fn patterns(amps: &ScatteringAmplitudes, scale: f64) -> AngularPattern {
    let h_plane: Vec<f64> = amps.s1.iter().map(|s| scale * s.norm_sqr()).collect();
    let e_plane: Vec<f64> = amps.s2.iter().map(|s| scale * s.norm_sqr()).collect();
    let unpolarized = h_plane
        .iter()
        .zip(&e_plane)
        .map(|(h, e)| 0.5 * (h + e))
        .collect();
    AngularPattern {
        angles: amps.angles.clone(),
        e_plane,
        h_plane,
        unpolarized,
    }
}

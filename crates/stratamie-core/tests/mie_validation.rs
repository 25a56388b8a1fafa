//! Integration test: multilayer recursion vs the classical homogeneous sphere.
//!
//! A single-layer stack must reproduce the closed-form Mie solution. The
//! reference below follows Bohren & Huffman's BHMIE: downward recursion for
//! the logarithmic derivative of the internal field and upward recurrences for
//! the Riccati-Bessel functions of the real size parameter. Both sides are
//! evaluated with the same number of terms.

use approx::assert_relative_eq;
use num_complex::Complex64;
use stratamie_core::observables::{amplitudes, efficiencies};
use stratamie_core::recursion::{scattering_coefficients, truncation_order};
use stratamie_core::types::SizeParameterSet;

struct Reference {
    an: Vec<Complex64>,
    bn: Vec<Complex64>,
    qext: f64,
    qsca: f64,
    qbk: f64,
}

fn bhmie_nstop(x: f64) -> usize {
    (x + 4.0 * x.cbrt() + 2.0).round() as usize
}

fn reference_sphere(x: f64, m: Complex64, nstop: usize) -> Reference {
    let mx = m * x;
    let nmx = nstop.max(mx.norm().ceil() as usize) + 16;

    let mut d = vec![Complex64::new(0.0, 0.0); nmx + 1];
    for n in (1..=nmx).rev() {
        let nz = n as f64 / mx;
        d[n - 1] = nz - 1.0 / (d[n] + nz);
    }

    let (mut psi0, mut psi1) = (x.cos(), x.sin());
    let (mut chi0, mut chi1) = (-x.sin(), x.cos());
    let i = Complex64::new(0.0, 1.0);

    let mut an = Vec::with_capacity(nstop);
    let mut bn = Vec::with_capacity(nstop);
    let (mut qext, mut qsca) = (0.0, 0.0);
    let mut back = Complex64::new(0.0, 0.0);

    for n in 1..=nstop {
        let nf = n as f64;
        let psi = (2.0 * nf - 1.0) / x * psi1 - psi0;
        let chi = (2.0 * nf - 1.0) / x * chi1 - chi0;
        let xi = psi - i * chi;
        let xi1 = psi1 - i * chi1;

        let ta = d[n] / m + nf / x;
        let tb = m * d[n] + nf / x;
        let a = (ta * psi - psi1) / (ta * xi - xi1);
        let b = (tb * psi - psi1) / (tb * xi - xi1);

        let w = 2.0 * nf + 1.0;
        qext += w * (a.re + b.re);
        qsca += w * (a.norm_sqr() + b.norm_sqr());
        let sign = if n % 2 == 0 { 1.0 } else { -1.0 };
        back += w * sign * (a - b);
        an.push(a);
        bn.push(b);

        psi0 = psi1;
        psi1 = psi;
        chi0 = chi1;
        chi1 = chi;
    }

    Reference {
        an,
        bn,
        qext: 2.0 * qext / (x * x),
        qsca: 2.0 * qsca / (x * x),
        qbk: back.norm_sqr() / (x * x),
    }
}

fn homogeneous(x: f64, m: Complex64) -> SizeParameterSet {
    SizeParameterSet::new(vec![x], vec![m], false).unwrap()
}

const SIZES: [f64; 10] = [0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0];

fn indices() -> Vec<Complex64> {
    vec![
        Complex64::new(1.33, 0.0),
        Complex64::new(1.5, 0.01),
        Complex64::new(1.5, 1.0),
        Complex64::new(0.2, 3.0),
    ]
}

/// Single-layer efficiencies agree with the closed form across sizes and media.
#[test]
fn test_single_layer_matches_closed_form() {
    for m in indices() {
        for &x in &SIZES {
            let nstop = bhmie_nstop(x);
            let reference = reference_sphere(x, m, nstop);
            let coeffs = scattering_coefficients(&homogeneous(x, m), nstop).unwrap();
            let eff = efficiencies(&coeffs, x).unwrap();

            let tol = if x < 0.1 { 1e-9 } else { 1e-10 };
            eprintln!(
                "m={m:.3} x={x:>6}: Qext={:.10e} (ref {:.10e}), Qsca={:.10e} (ref {:.10e})",
                eff.qext, reference.qext, eff.qsca, reference.qsca
            );
            assert_relative_eq!(eff.qext, reference.qext, max_relative = tol);
            assert_relative_eq!(eff.qsca, reference.qsca, max_relative = tol);
            assert_relative_eq!(eff.qbk, reference.qbk, max_relative = 1e-9);

            // dominant coefficients agree order by order
            let scale = reference.an[0].norm().max(reference.bn[0].norm());
            for n in 0..nstop.min(5) {
                assert!((coeffs.an[n] - reference.an[n]).norm() <= 1e-9 * scale);
                assert!((coeffs.bn[n] - reference.bn[n]).norm() <= 1e-9 * scale);
            }
        }
    }
}

/// Qext = Qsca + Qabs, and lossless spheres do not absorb.
#[test]
fn test_energy_conservation() {
    for m in indices() {
        for &x in &SIZES {
            let sp = homogeneous(x, m);
            let coeffs = scattering_coefficients(&sp, truncation_order(&sp)).unwrap();
            let eff = efficiencies(&coeffs, x).unwrap();
            assert_relative_eq!(eff.qext, eff.qsca + eff.qabs, max_relative = 1e-12);
            if m.im == 0.0 {
                assert!(
                    eff.qabs.abs() <= 1e-10 * eff.qext,
                    "lossless sphere x={x} absorbs: Qabs={:.3e}",
                    eff.qabs
                );
            } else {
                assert!(eff.qabs > 0.0, "absorbing sphere x={x} has Qabs={:.3e}", eff.qabs);
            }
        }
    }
}

/// Coefficients have decayed by the estimated truncation order, and adding
/// terms beyond it does not move the efficiencies.
#[test]
fn test_truncation_is_converged() {
    for m in indices() {
        for &x in &SIZES {
            let sp = homogeneous(x, m);
            let nmax = truncation_order(&sp);
            let coeffs = scattering_coefficients(&sp, nmax).unwrap();
            let last = nmax - 1;
            assert!(coeffs.an[last].norm() < 1e-6, "|a_nmax| = {:.3e}", coeffs.an[last].norm());
            assert!(coeffs.bn[last].norm() < 1e-6, "|b_nmax| = {:.3e}", coeffs.bn[last].norm());

            let eff = efficiencies(&coeffs, x).unwrap();
            let extended = scattering_coefficients(&sp, nmax + 30).unwrap();
            let eff_ext = efficiencies(&extended, x).unwrap();
            assert_relative_eq!(eff.qext, eff_ext.qext, max_relative = 1e-12);
            assert_relative_eq!(eff.qsca, eff_ext.qsca, max_relative = 1e-12);
            assert_relative_eq!(eff.qbk, eff_ext.qbk, max_relative = 1e-10);
        }
    }
}

/// Qsca scales as x^4 in the Rayleigh limit.
#[test]
fn test_rayleigh_limit() {
    let m = Complex64::new(1.5, 0.0);
    let polar = (m * m - 1.0) / (m * m + 2.0);
    for &x in &[0.002, 0.005, 0.01] {
        let sp = homogeneous(x, m);
        let coeffs = scattering_coefficients(&sp, truncation_order(&sp)).unwrap();
        let eff = efficiencies(&coeffs, x).unwrap();
        let rayleigh = 8.0 / 3.0 * x.powi(4) * polar.norm_sqr();
        eprintln!("x={x}: Qsca={:.6e}, Rayleigh={:.6e}", eff.qsca, rayleigh);
        assert_relative_eq!(eff.qsca, rayleigh, max_relative = 1e-3);
    }

    let q = |x: f64| {
        let sp = homogeneous(x, m);
        let coeffs = scattering_coefficients(&sp, truncation_order(&sp)).unwrap();
        efficiencies(&coeffs, x).unwrap().qsca
    };
    assert_relative_eq!(q(0.01) / q(0.005), 16.0, max_relative = 1e-3);
}

/// Optical theorem and backscatter from the amplitude functions.
#[test]
fn test_amplitudes_reproduce_efficiencies() {
    let pi = std::f64::consts::PI;
    for m in indices() {
        for &x in &[0.5, 3.0, 12.0] {
            let sp = homogeneous(x, m);
            let coeffs = scattering_coefficients(&sp, truncation_order(&sp)).unwrap();
            let eff = efficiencies(&coeffs, x).unwrap();
            let amps = amplitudes(&coeffs, &[0.0, pi]);

            assert_relative_eq!(
                4.0 / (x * x) * amps.s1[0].re,
                eff.qext,
                max_relative = 1e-12
            );
            assert!((amps.s1[0] - amps.s2[0]).norm() <= 1e-12 * amps.s1[0].norm());
            // S1(pi) = -S2(pi)
            assert!((amps.s1[1] + amps.s2[1]).norm() <= 1e-10 * amps.s1[0].norm());
            assert_relative_eq!(
                4.0 * amps.s1[1].norm_sqr() / (x * x),
                eff.qbk,
                max_relative = 1e-10
            );
        }
    }
}

/// The asymmetry factor stays within its physical range: near zero for a
/// Rayleigh scatterer, strongly forward for a large droplet.
#[test]
fn test_asymmetry_factor_range() {
    let m = Complex64::new(1.33, 0.0);
    let g = |x: f64| {
        let sp = homogeneous(x, m);
        let coeffs = scattering_coefficients(&sp, truncation_order(&sp)).unwrap();
        let eff = efficiencies(&coeffs, x).unwrap();
        stratamie_core::observables::asymmetry_factor(&eff).unwrap()
    };
    for &x in &[0.1, 1.0, 5.0, 20.0] {
        let gx = g(x);
        eprintln!("x={x}: g={gx:.6}");
        assert!(gx > -1.0 && gx < 1.0);
    }
    assert!(g(0.1).abs() < 0.01);
    assert!(g(20.0) > 0.5);
}

/// Metals and very large spheres, where |m x| rather than x sets the number
/// of terms. The high-order tail must fade to zero and energy must balance.
#[test]
fn test_index_driven_truncation_stays_finite() {
    let cases = [
        (200.0, Complex64::new(0.2, 3.8)),
        (250.0, Complex64::new(0.1, 3.0)),
        (5000.0, Complex64::new(1.5, 0.0)),
        (20000.0, Complex64::new(1.5, 0.0)),
    ];
    for (x, m) in cases {
        let sp = homogeneous(x, m);
        let nmax = truncation_order(&sp);
        let coeffs = scattering_coefficients(&sp, nmax).unwrap();
        let eff = efficiencies(&coeffs, x).unwrap();
        let tail = coeffs.an[nmax - 1].norm().max(coeffs.bn[nmax - 1].norm());
        eprintln!(
            "m={m:.3} x={x}: nmax={nmax}, Qext={:.10}, Qsca={:.10}, Qabs={:.3e}, tail={tail:.3e}",
            eff.qext, eff.qsca, eff.qabs
        );

        assert!(coeffs.an.iter().chain(&coeffs.bn).all(|c| c.is_finite()));
        assert!(tail < 1e-6);
        // large spheres approach the extinction paradox limit Qext -> 2
        assert!(eff.qext > 1.9 && eff.qext < 2.3, "Qext = {}", eff.qext);
        assert!(eff.qsca > 0.0 && eff.qsca <= eff.qext * (1.0 + 1e-12));
        if m.im == 0.0 {
            assert!(eff.qabs.abs() <= 1e-8 * eff.qext, "Qabs = {:.3e}", eff.qabs);
        } else {
            assert!(eff.qabs > 0.0);
        }
    }
}

/// A large metallic sphere with many more terms than the closed form still
/// reproduces it: the extra orders contribute nothing.
#[test]
fn test_large_metallic_sphere_matches_closed_form() {
    let (x, m) = (200.0, Complex64::new(0.2, 3.8));
    let reference = reference_sphere(x, m, bhmie_nstop(x));
    let sp = homogeneous(x, m);
    let coeffs = scattering_coefficients(&sp, truncation_order(&sp)).unwrap();
    let eff = efficiencies(&coeffs, x).unwrap();
    assert_relative_eq!(eff.qext, reference.qext, max_relative = 1e-8);
    assert_relative_eq!(eff.qsca, reference.qsca, max_relative = 1e-8);
}

//! Spherical Bessel and Hankel functions of complex argument.
//!
//! Naive upward recursion of $j_n(z)$ is unstable once $n$ exceeds $|z|$ or
//! when $\operatorname{Im} z$ is large (absorbing media). The engine instead
//! works with the logarithmic derivatives of the Riccati-Bessel functions
//! $\psi_n(z) = z j_n(z)$ and $\zeta_n(z) = z h^{(1)}_n(z)$:
//!
//! $$ D^{(1)}_n(z) = \frac{\psi_n'(z)}{\psi_n(z)}, \qquad
//!    D^{(3)}_n(z) = \frac{\zeta_n'(z)}{\zeta_n(z)} $$
//!
//! $D^{(1)}_n$ is seeded at an order above the requested range by a modified
//! Lentz continued fraction and recursed downward, which is stable for any
//! argument. $D^{(3)}_n$ and the products $\psi_n \zeta_n$ are then obtained by
//! upward recursion, and the Riccati-Bessel functions themselves follow from
//! the ratios.
//!
//! # Reference
//! W. J. Lentz, *Appl. Opt.* **15**, 668 (1976);
//! O. Peña & U. Pal, *Comput. Phys. Commun.* **180**, 2348 (2009).

use num_complex::Complex64;

use crate::error::{MieError, MieResult};

/// Iteration budget of the continued fraction.
pub const MAX_CF_ITERATIONS: usize = 10_000;

const CF_TOLERANCE: f64 = 1e-14;
const CF_TINY: f64 = 1e-300;
/// Extra orders above `max(N, |z|)` at which the downward recursion starts.
const START_MARGIN: usize = 16;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// Logarithmic derivatives of $\psi_n$ and $\zeta_n$ for `n = 0..=nmax`.
#[derive(Debug, Clone)]
pub struct LogDerivatives {
    pub d1: Vec<Complex64>,
    pub d3: Vec<Complex64>,
}

/// Riccati-Bessel functions and their logarithmic derivatives for `n = 0..=nmax`.
#[derive(Debug, Clone)]
pub struct RiccatiBessel {
    pub d1: Vec<Complex64>,
    pub d3: Vec<Complex64>,
    /// $\psi_n(z) = z j_n(z)$.
    pub psi: Vec<Complex64>,
    /// $\zeta_n(z) = z h^{(1)}_n(z)$.
    pub zeta: Vec<Complex64>,
}

/// Spherical Bessel/Hankel values and derivatives for `n = 0..=nmax`.
#[derive(Debug, Clone)]
pub struct SphericalBessel {
    pub j: Vec<Complex64>,
    pub jp: Vec<Complex64>,
    pub h1: Vec<Complex64>,
    pub h1p: Vec<Complex64>,
    /// $D^{(1)}_n(z) = \frac{d}{dz} \ln\left(z j_n(z)\right)$.
    pub d1: Vec<Complex64>,
}

fn check_argument(z: Complex64) -> MieResult<()> {
    if !(z.re.is_finite() && z.im.is_finite()) {
        return Err(MieError::domain(format!(
            "special function argument {z} is not finite"
        )));
    }
    if z.re == 0.0 && z.im == 0.0 {
        return Err(MieError::domain(
            "special function argument must be non-zero",
        ));
    }
    Ok(())
}

/// Order at which the downward recursion for orders `0..=n` is seeded.
pub fn start_order(z: Complex64, n: usize) -> usize {
    n.max(z.norm().ceil() as usize) + START_MARGIN
}

/// $D^{(1)}_n(z)$ evaluated directly by continued fraction.
///
/// Uses $j_{n-1}/j_n = \frac{2n+1}{z} - \cfrac{1}{\frac{2n+3}{z} - \cfrac{1}{\ddots}}$
/// and $D^{(1)}_n = j_{n-1}/j_n - n/z$.
pub fn log_derivative_cf(n: usize, z: Complex64) -> MieResult<Complex64> {
    log_derivative_cf_with_budget(n, z, MAX_CF_ITERATIONS)
}

pub(crate) fn log_derivative_cf_with_budget(
    n: usize,
    z: Complex64,
    budget: usize,
) -> MieResult<Complex64> {
    check_argument(z)?;
    let inv_z = 1.0 / z;
    let tiny = Complex64::new(CF_TINY, 0.0);

    let mut f = (2 * n + 1) as f64 * inv_z;
    if f.norm() < CF_TINY {
        f = tiny;
    }
    let mut c = f;
    let mut d = Complex64::new(0.0, 0.0);

    for k in 1..=budget {
        let b = (2 * (n + k) + 1) as f64 * inv_z;
        d = b - d;
        if d.norm() < CF_TINY {
            d = tiny;
        }
        d = 1.0 / d;
        c = b - 1.0 / c;
        if c.norm() < CF_TINY {
            c = tiny;
        }
        let delta = c * d;
        f *= delta;
        if !(f.re.is_finite() && f.im.is_finite()) {
            return Err(MieError::Convergence {
                order: n,
                iterations: k,
                argument: z.to_string(),
            });
        }
        if (delta - 1.0).norm() < CF_TOLERANCE {
            return Ok(f - n as f64 * inv_z);
        }
    }

    Err(MieError::Convergence {
        order: n,
        iterations: budget,
        argument: z.to_string(),
    })
}

/// $D^{(1)}_n(z)$ and $D^{(3)}_n(z)$ for `n = 0..=nmax`.
pub fn log_derivatives(z: Complex64, nmax: usize) -> MieResult<LogDerivatives> {
    check_argument(z)?;
    let nstart = start_order(z, nmax);
    log::trace!("D1 downward recursion for z = {z} seeded at order {nstart}");

    let mut d1 = vec![Complex64::new(0.0, 0.0); nmax + 1];
    let mut d = log_derivative_cf(nstart, z)?;
    for n in (1..=nstart).rev() {
        if n <= nmax {
            d1[n] = d;
        }
        let nz = n as f64 / z;
        d = nz - 1.0 / (d + nz);
    }
    d1[0] = d;

    // psi_0 zeta_0 = (1 - exp(2iz)) / 2, D3_0 = i
    let mut d3 = vec![Complex64::new(0.0, 0.0); nmax + 1];
    d3[0] = I;
    let mut psi_zeta = 0.5 * (1.0 - (2.0 * I * z).exp());
    for n in 1..=nmax {
        let nz = n as f64 / z;
        psi_zeta *= (nz - d1[n - 1]) * (nz - d3[n - 1]);
        d3[n] = d1[n] + I / psi_zeta;
    }

    Ok(LogDerivatives { d1, d3 })
}

/// $\psi_n$, $\zeta_n$ and their logarithmic derivatives for `n = 0..=nmax`.
pub fn riccati_bessel(z: Complex64, nmax: usize) -> MieResult<RiccatiBessel> {
    let LogDerivatives { d1, d3 } = log_derivatives(z, nmax)?;

    let mut psi = vec![Complex64::new(0.0, 0.0); nmax + 1];
    let mut zeta = vec![Complex64::new(0.0, 0.0); nmax + 1];
    psi[0] = z.sin();
    zeta[0] = z.sin() - I * z.cos();
    for n in 1..=nmax {
        let nz = n as f64 / z;
        psi[n] = psi[n - 1] * (nz - d1[n - 1]);
        zeta[n] = zeta[n - 1] * (nz - d3[n - 1]);
    }

    Ok(RiccatiBessel { d1, d3, psi, zeta })
}

/// $j_n(z)$, $h^{(1)}_n(z)$, their derivatives, and $D^{(1)}_n(z)$ for `n = 0..=nmax`.
pub fn spherical_bessel(z: Complex64, nmax: usize) -> MieResult<SphericalBessel> {
    let rb = riccati_bessel(z, nmax + 1)?;
    let inv_z = 1.0 / z;

    let j: Vec<Complex64> = rb.psi.iter().map(|p| p * inv_z).collect();
    let h1: Vec<Complex64> = rb.zeta.iter().map(|p| p * inv_z).collect();

    // f_0' = -f_1, f_n' = f_{n-1} - (n + 1) f_n / z
    let derivative = |f: &[Complex64]| -> Vec<Complex64> {
        (0..=nmax)
            .map(|n| {
                if n == 0 {
                    -f[1]
                } else {
                    f[n - 1] - (n + 1) as f64 * f[n] * inv_z
                }
            })
            .collect()
    };
    let jp = derivative(&j);
    let h1p = derivative(&h1);

    let mut d1 = rb.d1;
    d1.truncate(nmax + 1);

    Ok(SphericalBessel {
        j: j[..=nmax].to_vec(),
        jp,
        h1: h1[..=nmax].to_vec(),
        h1p,
        d1,
    })
}

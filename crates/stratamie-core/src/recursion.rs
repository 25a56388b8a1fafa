//! Layer-to-layer propagation of boundary conditions.
//!
//! The scattering coefficients of a stratified sphere are obtained by carrying
//! the logarithmic derivatives $H^a_n$ and $H^b_n$ of the internal field
//! outward, one boundary at a time (Peña & Pal 2009). For layer $l$ with
//! $z_1 = m_l x_l$ and $z_2 = m_l x_{l-1}$:
//!
//! $$ H^{a}_n(z_1) = \frac{G_2 D^{(1)}_n(z_1) - Q_n G_1 D^{(3)}_n(z_1)}{G_2 - Q_n G_1}, \qquad
//!    G_{1,2} = m_l H^a_n(m_{l-1} x_{l-1}) - m_{l-1} D^{(1,3)}_n(z_2) $$
//!
//! with the analogous expression for $H^b_n$ ($m_l$ and $m_{l-1}$ swapped),
//! and $Q_n = [\psi_n(z_2)/\zeta_n(z_2)] / [\psi_n(z_1)/\zeta_n(z_1)]$
//! obtained by upward recursion. The external coefficients follow from the
//! outermost $H^{a,b}_n$ and the Riccati-Bessel functions of the (real) outer
//! size parameter.
//!
//! Each multipole order is independent; layers must be traversed inside-out
//! exactly once per order.

use num_complex::Complex64;

use crate::bessel::{log_derivatives, riccati_bessel, LogDerivatives};
use crate::error::{MieError, MieResult};
use crate::types::{MieCoefficients, SizeParameterSet};

/// Hard ceiling on the number of multipole terms.
pub const MAX_TERMS: usize = 50_000;

/// Orders added beyond the empirical estimate.
const TERM_MARGIN: usize = 15;

/// Innermost outgoing coefficients above this magnitude indicate lost precision.
const REGULARITY_TOLERANCE: f64 = 1e-10;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// Wiscombe's stopping order for a homogeneous sphere of size parameter `x`.
pub fn wiscombe_order(x: f64) -> usize {
    let xc = x.cbrt();
    let n = if x <= 8.0 {
        x + 4.0 * xc + 1.0
    } else if x <= 4200.0 {
        x + 4.05 * xc + 2.0
    } else {
        x + 4.0 * xc + 2.0
    };
    (n.round() as usize).max(1)
}

/// Estimated truncation order for a stratified particle.
///
/// Starts from the Wiscombe order of the outer size parameter, raises it to
/// cover $|m_l x_l|$ and $|m_l x_{l-1}|$ of every dielectric layer, then adds
/// a fixed margin.
pub fn truncation_order(sp: &SizeParameterSet) -> usize {
    let x = sp.sizes();
    let m = sp.indices();
    let mut nmax = wiscombe_order(sp.outer());
    for l in 0..x.len() {
        if l == 0 && sp.pec_core() {
            continue;
        }
        nmax = nmax.max((x[l] * m[l]).norm().round() as usize);
        if l > 0 {
            nmax = nmax.max((x[l - 1] * m[l]).norm().round() as usize);
        }
    }
    nmax + TERM_MARGIN
}

/// Combine the estimate with an optional caller-supplied cap.
///
/// The smaller of the two governs. A cap of zero is a domain error; a cap or
/// effective order above [`MAX_TERMS`] is a resource-limit error.
pub fn resolve_terms(estimated: usize, cap: Option<usize>) -> MieResult<usize> {
    let nmax = match cap {
        Some(0) => return Err(MieError::domain("maximum term count must be at least 1")),
        Some(cap) if cap > MAX_TERMS => {
            return Err(MieError::ResourceLimit {
                requested: cap,
                ceiling: MAX_TERMS,
            })
        }
        Some(cap) => cap.min(estimated),
        None => estimated,
    };
    if nmax > MAX_TERMS {
        return Err(MieError::ResourceLimit {
            requested: nmax,
            ceiling: MAX_TERMS,
        });
    }
    Ok(nmax)
}

/// $Q_n$ for `n = 0..=nmax` across one shell.
fn psi_zeta_ratios(
    z1: Complex64,
    z2: Complex64,
    size_ratio: f64,
    outer: &LogDerivatives,
    inner: &LogDerivatives,
    nmax: usize,
) -> Vec<Complex64> {
    // psi_0 / zeta_0 = (1 - exp(-2iz)) / 2, rearranged to avoid overflow for Im z > 0
    let e = |z: Complex64| Complex64::new(0.0, -2.0 * z.re).exp() - (-2.0 * z.im).exp();
    let mut q = Vec::with_capacity(nmax + 1);
    q.push((-2.0 * (z1.im - z2.im)).exp() * e(z2) / e(z1));

    let ratio_sq = size_ratio * size_ratio;
    for n in 1..=nmax {
        let nf = n as f64;
        let num = (z1 * outer.d1[n] + nf) * (nf - z1 * outer.d3[n - 1]);
        let den = (z2 * inner.d1[n] + nf) * (nf - z2 * inner.d3[n - 1]);
        let prev = q[n - 1];
        q.push(prev * ratio_sq * num / den);
    }
    q
}

fn transfer(g1: Complex64, g2: Complex64, q: Complex64, d1: Complex64, d3: Complex64) -> Complex64 {
    let t = q * g1;
    (g2 * d1 - t * d3) / (g2 - t)
}

/// $\psi_n(x) / \zeta_n(x)$ for a real argument and `n = 0..=nmax`.
///
/// Built by upward recursion of the ratio itself, so it decays smoothly to
/// zero for `n >> x` where $\zeta_n$ alone would overflow.
fn psi_over_zeta(x: f64, ld: &LogDerivatives, nmax: usize) -> Vec<Complex64> {
    let mut r = Vec::with_capacity(nmax + 1);
    // psi_0 / zeta_0 = (1 - exp(-2ix)) / 2
    r.push(0.5 * (ONE - Complex64::new(0.0, -2.0 * x).exp()));
    for n in 1..=nmax {
        let nx = n as f64 / x;
        let prev = r[n - 1];
        r.push(prev * (nx - ld.d1[n - 1]) / (nx - ld.d3[n - 1]));
    }
    r
}

/// External coefficient from an outer log-derivative `h`:
/// $(\psi_n/\zeta_n)(h - D^{(1)}_n)/(h - D^{(3)}_n)$.
fn external_coefficient(
    h: Complex64,
    d1: Complex64,
    d3: Complex64,
    ratio: Complex64,
) -> Complex64 {
    ratio * (h - d1) / (h - d3)
}

fn check_finite(coeffs: &MieCoefficients) -> MieResult<()> {
    let bad = coeffs
        .an
        .iter()
        .chain(coeffs.bn.iter())
        .position(|c| !(c.re.is_finite() && c.im.is_finite()));
    match bad {
        Some(i) => Err(MieError::domain(format!(
            "scattering coefficient of order {} is not finite; the layer stack is numerically degenerate",
            i % coeffs.nmax() + 1
        ))),
        None => Ok(()),
    }
}

/// External Mie coefficients $a_n$, $b_n$ for `n = 1..=nmax`.
pub fn scattering_coefficients(sp: &SizeParameterSet, nmax: usize) -> MieResult<MieCoefficients> {
    if nmax == 0 {
        return Err(MieError::domain("at least one multipole order is required"));
    }
    if nmax > MAX_TERMS {
        return Err(MieError::ResourceLimit {
            requested: nmax,
            ceiling: MAX_TERMS,
        });
    }

    let x = sp.sizes();
    let m = sp.indices();
    let layers = x.len();
    let pec = sp.pec_core();

    // H^a_n and H^b_n of the current layer, indexed by n (entry 0 unused).
    let mut ha = vec![ZERO; nmax + 1];
    let mut hb = vec![ZERO; nmax + 1];
    if !pec {
        let core = log_derivatives(x[0] * m[0], nmax)?;
        ha.copy_from_slice(&core.d1);
        hb.copy_from_slice(&core.d1);
    }

    for l in 1..layers {
        log::trace!("propagating boundary conditions into layer {l}");
        let z1 = x[l] * m[l];
        let z2 = x[l - 1] * m[l];
        let outer = log_derivatives(z1, nmax)?;
        let inner = log_derivatives(z2, nmax)?;
        let q = psi_zeta_ratios(z1, z2, x[l - 1] / x[l], &outer, &inner, nmax);
        let below_is_pec = pec && l == 1;

        for n in 1..=nmax {
            let (g1a, g2a, g1b, g2b) = if below_is_pec {
                // tangential E vanishes on the conductor
                (-inner.d1[n], -inner.d3[n], ONE, ONE)
            } else {
                (
                    m[l] * ha[n] - m[l - 1] * inner.d1[n],
                    m[l] * ha[n] - m[l - 1] * inner.d3[n],
                    m[l - 1] * hb[n] - m[l] * inner.d1[n],
                    m[l - 1] * hb[n] - m[l] * inner.d3[n],
                )
            };
            ha[n] = transfer(g1a, g2a, q[n], outer.d1[n], outer.d3[n]);
            hb[n] = transfer(g1b, g2b, q[n], outer.d1[n], outer.d3[n]);
        }
    }

    let xl = x[layers - 1];
    let ml = m[layers - 1];
    let host = log_derivatives(Complex64::new(xl, 0.0), nmax)?;
    let ratio = psi_over_zeta(xl, &host, nmax);

    let mut an = Vec::with_capacity(nmax);
    let mut bn = Vec::with_capacity(nmax);
    for n in 1..=nmax {
        let (d1, d3, r) = (host.d1[n], host.d3[n], ratio[n]);
        if pec && layers == 1 {
            // bare conductor: a_n = psi_n' / zeta_n', b_n = psi_n / zeta_n
            an.push(r * d1 / d3);
            bn.push(r);
        } else {
            an.push(external_coefficient(ha[n] / ml, d1, d3, r));
            bn.push(external_coefficient(ml * hb[n], d1, d3, r));
        }
    }

    let coeffs = MieCoefficients { an, bn };
    check_finite(&coeffs)?;
    Ok(coeffs)
}

/// Field expansion coefficients in every region of the particle.
///
/// Region `l < L` is layer `l`; region `L` is the host medium, where
/// $c = d = 1$ (incident wave) and $a$, $b$ are the scattering coefficients.
/// Each table is indexed `[region][n - 1]`.
#[derive(Debug, Clone)]
pub struct ExpansionCoefficients {
    pub a: Vec<Vec<Complex64>>,
    pub b: Vec<Vec<Complex64>>,
    pub c: Vec<Vec<Complex64>>,
    pub d: Vec<Vec<Complex64>>,
    /// Largest |a|, |b| found in the innermost dielectric region before it was
    /// forced to zero. Small values confirm the two recursions agree.
    pub regularity_residual: f64,
    /// Lowest region whose coefficients are usable. Regions below it sit
    /// under a layer too absorbing for double precision and hold zeros.
    pub resolved_from: usize,
}

impl ExpansionCoefficients {
    /// Whether fields in `region` can be evaluated.
    pub fn is_resolved(&self, region: usize) -> bool {
        region >= self.resolved_from
    }
}

/// Propagate the external coefficients inward to obtain the field expansion
/// in every layer (Yang, *Appl. Opt.* **42**, 1710, 2003).
pub fn expansion_coefficients(
    sp: &SizeParameterSet,
    coeffs: &MieCoefficients,
) -> MieResult<ExpansionCoefficients> {
    let nmax = coeffs.nmax();
    let x = sp.sizes();
    let m = sp.indices();
    let layers = x.len();

    let mut a = vec![vec![ZERO; nmax]; layers + 1];
    let mut b = vec![vec![ZERO; nmax]; layers + 1];
    let mut c = vec![vec![ZERO; nmax]; layers + 1];
    let mut d = vec![vec![ZERO; nmax]; layers + 1];
    a[layers].copy_from_slice(&coeffs.an);
    b[layers].copy_from_slice(&coeffs.bn);
    c[layers].fill(ONE);
    d[layers].fill(ONE);

    let mut resolved_from = 0;
    for l in (0..layers).rev() {
        if l == 0 && sp.pec_core() {
            // no field inside the conductor
            break;
        }
        let m_out = if l + 1 < layers { m[l + 1] } else { ONE };
        let ratio = m[l] / m_out;
        let inside = riccati_bessel(x[l] * m[l], nmax)?;
        let outside = riccati_bessel(x[l] * m_out, nmax)?;

        let mut overflow = false;
        for i in 0..nmax {
            let n = i + 1;
            let (psi_in, zeta_in) = (inside.psi[n], inside.zeta[n]);
            let (psi1, zeta1) = (outside.psi[n], outside.zeta[n]);
            if !(psi_in.is_finite() && psi1.is_finite()) {
                overflow = true;
                break;
            }
            if psi_in == ZERO || !(zeta_in.is_finite() && zeta1.is_finite()) {
                // order far above |m x|: nothing representable crosses this boundary
                continue;
            }

            let (dn1, dn3) = (inside.d1[n], inside.d3[n]);
            let denom_zeta = zeta_in * (dn1 - dn3);
            let denom_psi = psi_in * (dn1 - dn3);
            let (a_out, b_out, c_out, d_out) = (a[l + 1][i], b[l + 1][i], c[l + 1][i], d[l + 1][i]);

            let t1 = a_out * zeta1 - d_out * psi1;
            let t2 = (b_out * zeta1 - c_out * psi1) * ratio;
            let t3 = (d_out * outside.d1[n] * psi1 - a_out * outside.d3[n] * zeta1) * ratio;
            let t4 = c_out * outside.d1[n] * psi1 - b_out * outside.d3[n] * zeta1;

            a[l][i] = (dn1 * t1 + t3) / denom_zeta;
            b[l][i] = (dn1 * t2 + t4) / denom_zeta;
            c[l][i] = (dn3 * t2 + t4) / denom_psi;
            d[l][i] = (dn3 * t1 + t3) / denom_psi;
        }

        let finite = [&a[l], &b[l], &c[l], &d[l]]
            .iter()
            .all(|table| table.iter().all(|v| v.is_finite()));
        if overflow || !finite {
            log::warn!(
                "expansion coefficients of layer {l} overflow (m x = {}); fields at or below it are unavailable",
                x[l] * m[l]
            );
            for table in [&mut a[l], &mut b[l], &mut c[l], &mut d[l]] {
                table.fill(ZERO);
            }
            resolved_from = l + 1;
            break;
        }
    }

    // The innermost dielectric region must be regular at its inner edge.
    let mut residual: f64 = 0.0;
    if !sp.pec_core() && resolved_from == 0 {
        for i in 0..nmax {
            residual = residual.max(a[0][i].norm()).max(b[0][i].norm());
            a[0][i] = ZERO;
            b[0][i] = ZERO;
        }
        if residual > REGULARITY_TOLERANCE {
            log::warn!(
                "innermost outgoing coefficients reached {residual:.3e}; interior fields may be inaccurate"
            );
        }
    }

    Ok(ExpansionCoefficients {
        a,
        b,
        c,
        d,
        regularity_residual: residual,
        resolved_from,
    })
}

//! Near fields inside and around a stratified sphere.
//!
//! In region $l$ (layer $l$, or the host medium for $l = L$) the fields are
//! expanded in vector spherical wave functions of argument $m_l \rho$:
//!
//! $$
//! \mathbf{E} = \sum_{n} E_n \left( c^l_n \mathbf{M}^{(1)}_{o1n} - i d^l_n \mathbf{N}^{(1)}_{e1n}
//! + i a^l_n \mathbf{N}^{(3)}_{e1n} - b^l_n \mathbf{M}^{(3)}_{o1n} \right),
//! \qquad E_n = i^n \frac{2n+1}{n(n+1)}
//! $$
//!
//! with the magnetic field built from the conjugate harmonics and scaled by
//! $m_l$. All coordinates are in size-parameter units; the incident wave is
//! x-polarised and travels along +z with unit amplitude.
//!
//! A point lying exactly on a layer boundary is evaluated with the expansion
//! of the layer below it, i.e. as the inner-side limit. Tangential components
//! are continuous there; normal components take their inner-side value. The
//! origin itself is rejected, and so is any point beneath a layer whose
//! absorption puts its Riccati-Bessel functions out of double range.

use ndarray::Array2;
use num_complex::Complex64;

use crate::bessel::riccati_bessel;
use crate::error::{MieError, MieResult};
use crate::observables::pi_tau;
use crate::recursion::{expansion_coefficients, ExpansionCoefficients};
use crate::types::{FieldValues, MieCoefficients, NearFieldMap, NearFieldPlane, SizeParameterSet};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);
const IPOW: [Complex64; 4] = [
    Complex64::new(1.0, 0.0),
    Complex64::new(0.0, 1.0),
    Complex64::new(-1.0, 0.0),
    Complex64::new(0.0, -1.0),
];

/// Odd and even vector harmonics of one order, spherical components (r, θ, φ).
struct Harmonics {
    mo: [Complex64; 3],
    me: [Complex64; 3],
    no: [Complex64; 3],
    ne: [Complex64; 3],
}

/// Vector spherical harmonics (Bohren & Huffman eq. 4.50) for a Riccati-Bessel
/// value `rn` and its logarithmic derivative `dn` at argument `rho`.
#[allow(clippy::too_many_arguments)]
fn harmonics(
    rho: Complex64,
    sin_theta: f64,
    (sin_phi, cos_phi): (f64, f64),
    rn: Complex64,
    dn: Complex64,
    pi: f64,
    tau: f64,
    n: f64,
) -> Harmonics {
    let zn = rn / rho;
    let radial = n * (n + 1.0) * sin_theta * pi * zn / rho;
    Harmonics {
        mo: [ZERO, cos_phi * pi * zn, -sin_phi * tau * zn],
        me: [ZERO, -sin_phi * pi * zn, -cos_phi * tau * zn],
        no: [sin_phi * radial, sin_phi * tau * dn * zn, cos_phi * pi * dn * zn],
        ne: [cos_phi * radial, cos_phi * tau * dn * zn, -sin_phi * pi * dn * zn],
    }
}

/// Index of the region containing radius `r` (boundaries belong to the inner layer).
fn region_of(sp: &SizeParameterSet, r: f64) -> usize {
    sp.sizes()
        .iter()
        .position(|&x| r <= x)
        .unwrap_or(sp.len())
}

/// Electric and magnetic field (Cartesian) at a single point in size-parameter units.
pub fn field_at_point(
    sp: &SizeParameterSet,
    expansion: &ExpansionCoefficients,
    point: &[f64; 3],
) -> MieResult<([Complex64; 3], [Complex64; 3])> {
    let r = (point[0] * point[0] + point[1] * point[1] + point[2] * point[2]).sqrt();
    if !r.is_finite() {
        return Err(MieError::domain("field point is not finite"));
    }
    if r == 0.0 {
        return Err(MieError::domain(
            "fields are undefined at the origin of the sphere",
        ));
    }

    let l = region_of(sp, r);
    if l == 0 && sp.pec_core() {
        return Ok(([ZERO; 3], [ZERO; 3]));
    }
    if !expansion.is_resolved(l) {
        return Err(MieError::domain(format!(
            "field at radius {r} lies under a layer too absorbing to resolve in double precision"
        )));
    }
    let ml = if l < sp.len() {
        sp.indices()[l]
    } else {
        Complex64::new(1.0, 0.0)
    };

    let theta = (point[2] / r).clamp(-1.0, 1.0).acos();
    let phi = point[1].atan2(point[0]);
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_phi, cos_phi) = phi.sin_cos();

    let nmax = expansion.a[l].len();
    let rho = r * ml;
    let rb = riccati_bessel(rho, nmax)?;
    let (pi, tau) = pi_tau(cos_theta, nmax);

    let (a, b, c, d) = (
        &expansion.a[l],
        &expansion.b[l],
        &expansion.c[l],
        &expansion.d[l],
    );
    let mut e = [ZERO; 3];
    let mut h = [ZERO; 3];

    for i in 0..nmax {
        let n = i + 1;
        let nf = n as f64;
        let en = IPOW[n % 4] * ((2.0 * nf + 1.0) / (nf * (nf + 1.0)));

        let regular = harmonics(
            rho,
            sin_theta,
            (sin_phi, cos_phi),
            rb.psi[n],
            rb.d1[n],
            pi[i],
            tau[i],
            nf,
        );
        for k in 0..3 {
            e[k] += en * (c[i] * regular.mo[k] - I * d[i] * regular.ne[k]);
            h[k] += en * (-d[i] * regular.me[k] - I * c[i] * regular.no[k]);
        }

        // Outgoing waves are absent in the innermost region.
        if a[i] != ZERO || b[i] != ZERO {
            let outgoing = harmonics(
                rho,
                sin_theta,
                (sin_phi, cos_phi),
                rb.zeta[n],
                rb.d3[n],
                pi[i],
                tau[i],
                nf,
            );
            for k in 0..3 {
                e[k] += en * (I * a[i] * outgoing.ne[k] - b[i] * outgoing.mo[k]);
                h[k] += en * (I * b[i] * outgoing.no[k] + a[i] * outgoing.me[k]);
            }
        }
    }

    for hk in h.iter_mut() {
        *hk *= ml;
    }

    let to_cartesian = |v: [Complex64; 3]| -> [Complex64; 3] {
        [
            sin_theta * cos_phi * v[0] + cos_theta * cos_phi * v[1] - sin_phi * v[2],
            sin_theta * sin_phi * v[0] + cos_theta * sin_phi * v[1] + cos_phi * v[2],
            cos_theta * v[0] - sin_theta * v[1],
        ]
    };

    if !e.iter().chain(h.iter()).all(|v| v.is_finite()) {
        return Err(MieError::domain(format!(
            "field at {point:?} overflows double precision in region {l}"
        )));
    }

    Ok((to_cartesian(e), to_cartesian(h)))
}

/// Fields at a list of points in size-parameter units.
pub fn fields_at_points(
    sp: &SizeParameterSet,
    coeffs: &MieCoefficients,
    points: &[[f64; 3]],
) -> MieResult<FieldValues> {
    let expansion = expansion_coefficients(sp, coeffs)?;
    let npts = points.len();
    let mut e = Array2::<Complex64>::zeros((npts, 3));
    let mut h = Array2::<Complex64>::zeros((npts, 3));

    for (i, p) in points.iter().enumerate() {
        let (ei, hi) = field_at_point(sp, &expansion, p)?;
        for k in 0..3 {
            e[[i, k]] = ei[k];
            h[[i, k]] = hi[k];
        }
    }

    Ok(FieldValues {
        points: points.to_vec(),
        e,
        h,
    })
}

/// Grid positions of an observation plane, row-major in (iy, ix).
pub fn plane_points(plane: &NearFieldPlane) -> MieResult<(Vec<[f64; 3]>, [f64; 4])> {
    if plane.nx == 0 || plane.ny == 0 {
        return Err(MieError::domain("near-field plane needs at least one point per axis"));
    }
    let (u_hat, v_hat) = plane_basis(&plane.normal)?;

    let x_min = -plane.half_width;
    let x_max = plane.half_width;
    let y_min = -plane.half_height;
    let y_max = plane.half_height;

    let dx = if plane.nx > 1 { (x_max - x_min) / (plane.nx - 1) as f64 } else { 0.0 };
    let dy = if plane.ny > 1 { (y_max - y_min) / (plane.ny - 1) as f64 } else { 0.0 };

    let mut positions = Vec::with_capacity(plane.nx * plane.ny);
    for iy in 0..plane.ny {
        for ix in 0..plane.nx {
            let u = x_min + ix as f64 * dx;
            let v = y_min + iy as f64 * dy;
            positions.push([
                plane.centre[0] + u * u_hat[0] + v * v_hat[0],
                plane.centre[1] + u * u_hat[1] + v * v_hat[1],
                plane.centre[2] + u * u_hat[2] + v * v_hat[2],
            ]);
        }
    }

    let extent = [
        plane.centre[0] + x_min * u_hat[0] + y_min * v_hat[0],
        plane.centre[0] + x_max * u_hat[0] + y_max * v_hat[0],
        plane.centre[1] + x_min * u_hat[1] + y_min * v_hat[1],
        plane.centre[1] + x_max * u_hat[1] + y_max * v_hat[1],
    ];
    Ok((positions, extent))
}

/// |E|^2 on a planar grid (size-parameter units).
pub fn near_field_map(
    sp: &SizeParameterSet,
    coeffs: &MieCoefficients,
    plane: &NearFieldPlane,
) -> MieResult<NearFieldMap> {
    let (positions, extent) = plane_points(plane)?;
    let values = fields_at_points(sp, coeffs, &positions)?;
    Ok(NearFieldMap {
        field_intensity: values.e_intensity(),
        positions,
        nx: plane.nx,
        ny: plane.ny,
        extent,
    })
}

/// Construct an orthonormal basis (u, v) for a plane with the given normal.
fn plane_basis(normal: &[f64; 3]) -> MieResult<([f64; 3], [f64; 3])> {
    let n = normalise(normal)?;

    // Choose a vector not parallel to n
    let seed = if n[0].abs() < 0.9 {
        [1.0, 0.0, 0.0]
    } else {
        [0.0, 1.0, 0.0]
    };

    let dot = seed[0] * n[0] + seed[1] * n[1] + seed[2] * n[2];
    let u = normalise(&[
        seed[0] - dot * n[0],
        seed[1] - dot * n[1],
        seed[2] - dot * n[2],
    ])?;

    // v = n x u
    let v = [
        n[1] * u[2] - n[2] * u[1],
        n[2] * u[0] - n[0] * u[2],
        n[0] * u[1] - n[1] * u[0],
    ];

    Ok((u, v))
}

fn normalise(v: &[f64; 3]) -> MieResult<[f64; 3]> {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len == 0.0 || !len.is_finite() {
        return Err(MieError::domain("plane normal must be a non-zero vector"));
    }
    Ok([v[0] / len, v[1] / len, v[2] / len])
}

//! Job runner: builds the particle, sweeps wavelengths and writes results.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use stratamie_core::mie::MultiLayerMie;
use stratamie_core::types::{
    AngularPattern, FieldValues, MieCoefficients, NearFieldMap, NearFieldPlane, SpectralPoint,
};

use crate::config::{JobConfig, LayerRole};

/// Results from a job run.
pub struct SimulationOutput {
    pub spectra: Vec<SpectralPoint>,
    /// Wavelength of peak extinction, where the remaining results are evaluated.
    pub peak_wavelength: f64,
    pub coefficients: MieCoefficients,
    pub pattern: Option<AngularPattern>,
    pub near_field: Option<NearFieldMap>,
    pub fields: Option<FieldValues>,
}

/// Translate the job's layers and options into a solver instance.
pub fn build_particle(job: &JobConfig) -> Result<MultiLayerMie> {
    let mut mie = MultiLayerMie::new();
    for (i, layer) in job.layers.iter().enumerate() {
        // a conductor is always the innermost target layer
        let added = match (layer.role, layer.pec) {
            (_, true) => mie.set_target_pec(layer.width),
            (LayerRole::Target, false) => mie.add_target_layer(layer.width, layer.index),
            (LayerRole::Coating, false) => mie.add_coating_layer(layer.width, layer.index),
        };
        added.with_context(|| format!("layer {i}"))?;
    }
    mie.set_max_terms(job.simulation.max_terms);
    let angles = job.angles_rad();
    if !angles.is_empty() {
        mie.set_angles(angles)?;
    }
    Ok(mie)
}

/// Run a full job from a parsed configuration.
pub fn run_simulation(job: &JobConfig) -> Result<SimulationOutput> {
    let mut mie = build_particle(job)?;
    let wavelengths = job.wavelengths();

    println!(
        "Particle: {} layer(s), total radius {}",
        job.layers.len(),
        mie.total_radius()
    );

    let mut spectra = Vec::with_capacity(wavelengths.len());
    let mut peak_ext = f64::NEG_INFINITY;
    let mut peak_wl = wavelengths[0];

    for (wi, &wl) in wavelengths.iter().enumerate() {
        mie.set_wavelength(wl)?;
        let eff = mie
            .efficiencies()
            .with_context(|| format!("solving at λ={wl:.1}"))?;
        let point = SpectralPoint {
            wavelength: wl,
            size_parameter: 2.0 * std::f64::consts::PI * mie.total_radius() / wl,
            qext: eff.qext,
            qsca: eff.qsca,
            qabs: eff.qabs,
            qbk: eff.qbk,
        };

        if (wi + 1) % 10 == 0 || wi == 0 || wi == wavelengths.len() - 1 {
            println!(
                "  [{}/{}] λ={:.1}: Q_ext={:.4e}, Q_sca={:.4e}, Q_abs={:.4e}, terms={}",
                wi + 1,
                wavelengths.len(),
                wl,
                point.qext,
                point.qsca,
                point.qabs,
                mie.max_terms_used()?
            );
        }

        if point.qext > peak_ext {
            peak_ext = point.qext;
            peak_wl = wl;
        }
        spectra.push(point);
    }

    mie.set_wavelength(peak_wl)?;
    let coefficients = mie.coefficients()?;
    log::debug!(
        "peak extinction {peak_ext:.4e} at λ={peak_wl:.1} with {} terms",
        coefficients.nmax()
    );

    let pattern = if mie.angles().is_empty() {
        None
    } else {
        Some(mie.pattern()?)
    };

    let near_field = match &job.near_field {
        Some(nf) => {
            println!("Computing near-field map at λ={peak_wl:.1} (peak extinction)...");
            let half = nf.half_width.unwrap_or(2.0 * mie.total_radius());
            let plane = NearFieldPlane {
                centre: nf.centre,
                normal: nf.normal,
                half_width: half,
                half_height: half,
                nx: nf.nx,
                ny: nf.ny,
            };
            Some(mie.near_field_map(&plane).context("near-field map")?)
        }
        None => None,
    };

    let fields = match &job.fields {
        Some(f) => {
            mie.set_field_points(f.points.clone())?;
            Some(mie.fields().context("field evaluation")?.clone())
        }
        None => None,
    };

    Ok(SimulationOutput {
        spectra,
        peak_wavelength: peak_wl,
        coefficients,
        pattern,
        near_field,
        fields,
    })
}

fn create_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))
}

/// Write efficiency spectra to a CSV file with a metadata header.
pub fn write_spectra_csv(spectra: &[SpectralPoint], path: &Path, job: &JobConfig) -> Result<()> {
    let mut file = create_file(path)?;

    // Metadata header
    writeln!(file, "# stratamie: efficiency spectra")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    for (i, layer) in job.layers.iter().enumerate() {
        if layer.pec {
            writeln!(file, "# layer {i}: width={}, PEC", layer.width)?;
        } else {
            writeln!(
                file,
                "# layer {i}: width={}, index={}{:+}i, {:?}",
                layer.width, layer.index.re, layer.index.im, layer.role
            )?;
        }
    }
    writeln!(file, "#")?;
    writeln!(file, "wavelength,size_parameter,qext,qsca,qabs,qbk")?;

    for p in spectra {
        writeln!(
            file,
            "{:.4},{:.6},{:.8e},{:.8e},{:.8e},{:.8e}",
            p.wavelength, p.size_parameter, p.qext, p.qsca, p.qabs, p.qbk
        )?;
    }

    println!("Spectra written to: {}", path.display());
    Ok(())
}

/// Write efficiency spectra to a JSON file.
pub fn write_spectra_json(spectra: &[SpectralPoint], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(spectra)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    create_file(path)?.write_all(json.as_bytes())?;

    println!("Spectra (JSON) written to: {}", path.display());
    Ok(())
}

/// Write the Mie coefficients, one multipole order per row.
pub fn write_coefficients_csv(coeffs: &MieCoefficients, wavelength: f64, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    writeln!(file, "# stratamie: Mie coefficients at wavelength {wavelength}")?;
    writeln!(file, "n,re_a,im_a,re_b,im_b")?;
    for (i, (a, b)) in coeffs.an.iter().zip(&coeffs.bn).enumerate() {
        writeln!(
            file,
            "{},{:.10e},{:.10e},{:.10e},{:.10e}",
            i + 1,
            a.re,
            a.im,
            b.re,
            b.im
        )?;
    }

    println!("Coefficients written to: {}", path.display());
    Ok(())
}

/// Write angular patterns (differential cross-sections) to CSV.
pub fn write_pattern_csv(pattern: &AngularPattern, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    writeln!(file, "# stratamie: angular scattering patterns")?;
    writeln!(file, "theta_deg,e_plane,h_plane,unpolarized")?;
    for i in 0..pattern.angles.len() {
        writeln!(
            file,
            "{:.4},{:.8e},{:.8e},{:.8e}",
            pattern.angles[i].to_degrees(),
            pattern.e_plane[i],
            pattern.h_plane[i],
            pattern.unpolarized[i]
        )?;
    }

    println!("Pattern written to: {}", path.display());
    Ok(())
}

/// Write a near-field map to a CSV file.
pub fn write_near_field_csv(near_field: &NearFieldMap, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    writeln!(file, "# stratamie: near-field intensity map")?;
    writeln!(file, "# Grid: {}x{}", near_field.nx, near_field.ny)?;
    writeln!(
        file,
        "# Extent: x=[{:.2}, {:.2}] y=[{:.2}, {:.2}]",
        near_field.extent[0], near_field.extent[1], near_field.extent[2], near_field.extent[3],
    )?;
    writeln!(file, "#")?;
    writeln!(file, "x,y,z,|E|_sq")?;

    for (pos, intensity) in near_field
        .positions
        .iter()
        .zip(near_field.field_intensity.iter())
    {
        writeln!(
            file,
            "{:.4},{:.4},{:.4},{:.6e}",
            pos[0], pos[1], pos[2], intensity
        )?;
    }

    println!("Near-field map written to: {}", path.display());
    Ok(())
}

/// Write complex E and H at explicit observation points.
pub fn write_fields_csv(fields: &FieldValues, points: &[[f64; 3]], path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    writeln!(file, "# stratamie: near fields (E relative to E0, H in units of E0/Z0)")?;
    writeln!(
        file,
        "x,y,z,re_ex,im_ex,re_ey,im_ey,re_ez,im_ez,re_hx,im_hx,re_hy,im_hy,re_hz,im_hz"
    )?;
    for (i, p) in points.iter().enumerate() {
        write!(file, "{},{},{}", p[0], p[1], p[2])?;
        for v in fields.e.row(i).iter().chain(fields.h.row(i).iter()) {
            write!(file, ",{:.8e},{:.8e}", v.re, v.im)?;
        }
        writeln!(file)?;
    }

    println!("Fields written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
        [simulation]
        spectrum = { range = [450.0, 650.0], points = 3 }

        [[layer]]
        width = 40.0
        index = [1.5, 0.01]

        [[layer]]
        width = 10.0
        index = [1.33, 0.0]
        role = "coating"

        [angles]
        range = [0.0, 180.0]
        points = 5

        [near_field]
        nx = 6
        ny = 4

        [fields]
        points = [[0.0, 0.0, 80.0], [20.0, 0.0, 0.0]]
    "#;

    #[test]
    fn test_run_and_write_outputs() {
        let job: JobConfig = toml::from_str(JOB).unwrap();
        job.validate().unwrap();
        let out = run_simulation(&job).unwrap();

        assert_eq!(out.spectra.len(), 3);
        assert!(out.spectra.iter().all(|p| p.qsca > 0.0 && p.qabs >= 0.0));
        let peak = out
            .spectra
            .iter()
            .map(|p| p.qext)
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(out
            .spectra
            .iter()
            .any(|p| p.wavelength == out.peak_wavelength && p.qext == peak));
        assert_eq!(out.pattern.as_ref().unwrap().angles.len(), 5);
        assert_eq!(out.near_field.as_ref().unwrap().positions.len(), 24);
        assert_eq!(out.fields.as_ref().unwrap().e.dim(), (2, 3));

        let dir = tempfile::tempdir().unwrap();
        write_spectra_csv(&out.spectra, &dir.path().join("spectra.csv"), &job).unwrap();
        write_spectra_json(&out.spectra, &dir.path().join("spectra.json")).unwrap();
        write_coefficients_csv(
            &out.coefficients,
            out.peak_wavelength,
            &dir.path().join("coefficients.csv"),
        )
        .unwrap();
        write_pattern_csv(out.pattern.as_ref().unwrap(), &dir.path().join("pattern.csv")).unwrap();
        write_near_field_csv(
            out.near_field.as_ref().unwrap(),
            &dir.path().join("near_field.csv"),
        )
        .unwrap();
        write_fields_csv(
            out.fields.as_ref().unwrap(),
            &job.fields.as_ref().unwrap().points,
            &dir.path().join("fields.csv"),
        )
        .unwrap();

        let csv = std::fs::read_to_string(dir.path().join("spectra.csv")).unwrap();
        let rows: Vec<&str> = csv.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows[0], "wavelength,size_parameter,qext,qsca,qabs,qbk");
        assert_eq!(rows.len(), 4);

        let json = std::fs::read_to_string(dir.path().join("spectra.json")).unwrap();
        let parsed: Vec<SpectralPoint> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), out.spectra.len());
        for (a, b) in parsed.iter().zip(&out.spectra) {
            assert_eq!(a.wavelength, b.wavelength);
            assert!((a.qext - b.qext).abs() <= 1e-14 * b.qext);
        }

        let coeffs = std::fs::read_to_string(dir.path().join("coefficients.csv")).unwrap();
        assert_eq!(coeffs.lines().count(), out.coefficients.nmax() + 2);
    }

    #[test]
    fn test_pec_core_job() {
        let job: JobConfig = toml::from_str(
            r#"
            [simulation]
            wavelength = 600.0

            [[layer]]
            width = 50.0
            pec = true

            [[layer]]
            width = 20.0
            index = [1.45, 0.0]
            role = "coating"
            "#,
        )
        .unwrap();
        let mut mie = build_particle(&job).unwrap();
        assert!(mie.is_pec_core());
        mie.set_wavelength(600.0).unwrap();
        // a conductor with a lossless coating does not absorb
        assert!(mie.qabs().unwrap().abs() < 1e-10 * mie.qext().unwrap());
    }
}

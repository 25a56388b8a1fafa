//! Stratamie command-line interface.
//!
//! Run stratified-sphere scattering jobs from TOML configuration files:
//! ```sh
//! stratamie-cli run job.toml
//! stratamie-cli validate job.toml
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stratamie-cli")]
#[command(about = "Stratamie: Mie scattering by multilayered spheres")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and report the particle without solving.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Stratamie Multilayer Mie Solver");
            println!("===============================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_simulation(&job)?;

            // Determine output directory
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            // CSV spectra (default on)
            if job.output.save_spectra {
                runner::write_spectra_csv(&result.spectra, &out_dir.join("spectra.csv"), &job)?;
            }

            // JSON spectra (optional)
            if job.output.save_json {
                runner::write_spectra_json(&result.spectra, &out_dir.join("spectra.json"))?;
            }

            if job.output.save_coefficients {
                runner::write_coefficients_csv(
                    &result.coefficients,
                    result.peak_wavelength,
                    &out_dir.join("coefficients.csv"),
                )?;
            }

            if let Some(pattern) = &result.pattern {
                runner::write_pattern_csv(pattern, &out_dir.join("pattern.csv"))?;
            }

            if let Some(nf) = &result.near_field {
                runner::write_near_field_csv(nf, &out_dir.join("near_field.csv"))?;
            }

            if let (Some(fields), Some(requested)) = (&result.fields, &job.fields) {
                runner::write_fields_csv(fields, &requested.points, &out_dir.join("fields.csv"))?;
            }

            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let mie = runner::build_particle(&job)?;
            let stack = mie.layer_stack()?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  {} layer(s), target radius {}, coating width {}, total radius {}{}",
                stack.len(),
                mie.target_radius(),
                mie.coating_width(),
                mie.total_radius(),
                if stack.has_pec_core() { " (PEC core)" } else { "" }
            );
            println!("  {} wavelength(s)", job.wavelengths().len());
            Ok(())
        }
    }
}

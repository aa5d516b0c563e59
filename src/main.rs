use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use peclet_rs::logging::init_logging;
use peclet_rs::processing::summary::RUN_SUMMARY_FILE;
use peclet_rs::{Collaborators, Parameters, PecletError, TimeIntegrationController};

const USED_PARAMETERS_FILE: &str = "used_parameters.json";

/// Transient convection-diffusion on an adaptively refined interval.
#[derive(Debug, Parser)]
#[command(name = "peclet", version, about)]
struct Cli {
    /// JSON parameter file. Defaults are used when omitted.
    parameter_file: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). Falls back to RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    /// Write the default parameters as JSON to this path and exit.
    #[arg(long, value_name = "PATH")]
    write_defaults: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Some(path) = &cli.write_defaults {
        return match Parameters::default().write_used(path) {
            Ok(()) => {
                println!("Default parameters written to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), PecletError> {
    let params = match &cli.parameter_file {
        Some(path) => Parameters::from_file(path)?,
        None => Parameters::default(),
    };

    let output_dir = params.output.directory.clone();
    fs::create_dir_all(&output_dir)?;
    params.write_used(output_dir.join(USED_PARAMETERS_FILE))?;

    let collaborators = Collaborators::from_parameters(&params)?;
    let mut controller = TimeIntegrationController::new(params, collaborators)?;
    let summary = controller.run()?;

    let summary_path = output_dir.join(RUN_SUMMARY_FILE);
    summary.write_to_file(&summary_path)?;
    summary.print_to_console();
    println!("Summary saved to {}", summary_path.display());
    Ok(())
}

//! Startup entry point standing in for the HTTP service boundary.
//!
//! # Responsibility
//! - Build configuration from the environment and initialize logging.
//! - Open (and on first run seed) the step store.
//! - Print all steps as JSON, the payload served under `/api/v1/all`.

use log::{error, info};
use nextstep_core::{core_version, init_logging, open_store, CoreConfig, StepService};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("nextstep: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    init_logging(&config.log_level, &config.log_dir)?;
    info!(
        "event=cli_start module=cli status=ok core_version={}",
        core_version()
    );

    let store = open_store(&config)?;
    if let Some(seeded) = &store.seeded {
        println!(
            "seeded new store: {} -> {}",
            seeded.first.id, seeded.second.id
        );
    }

    let service = StepService::new(store.repository()?);
    let steps = service.list_steps()?;
    println!("{}", serde_json::to_string_pretty(&steps)?);

    for step in &steps {
        if step.is_head() {
            let ordered = service.sequence(step.owner)?;
            let names: Vec<&str> = ordered.iter().map(|s| s.name.as_str()).collect();
            println!("owner {}: {}", step.owner, names.join(" -> "));
        }
    }
    Ok(())
}

//! manifest-sync CLI Binary
//!
//! Command-line interface for the manifest synchronization core.

use clap::Parser;
use manifest_sync::logging::{init_logging, LoggingConfig};
use manifest_sync::tooling::cli::{Cli, CliContext};
use std::process;

fn logging_config(cli: &Cli, context: &CliContext) -> Result<LoggingConfig, String> {
    let mut config = context.config().logging.clone();
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(level) = &cli.log_level {
        config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.format = format.parse().map_err(|e| format!("{}", e))?;
    }
    if let Some(output) = &cli.log_output {
        config.output = output.parse().map_err(|e| format!("{}", e))?;
    }
    if let Some(file) = &cli.log_file {
        config.file = Some(file.clone());
    }
    Ok(config)
}

fn main() {
    let cli = Cli::parse();

    let context = match CliContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error initializing workspace: {}", e);
            process::exit(1);
        }
    };

    let logging = match logging_config(&cli, &context) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    match context.execute(&cli.command) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

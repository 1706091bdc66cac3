use clap::Parser;
use colored::*;
use std::process;
use tracing_subscriber::EnvFilter;
use unirep::cli::{Cli, Commands};
use unirep::core::config::load_or_default;
use unirep::UniRepError;

fn main() {
    // Usage errors (including an unknown model size) exit 1; 2 is for configuration errors
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            e.print().ok();
            process::exit(code);
        }
    };

    // RUST_LOG wins, then UNIREP_LOG, then the -v count
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let log_level = std::env::var("UNIREP_LOG").unwrap_or_else(|_| default_level.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        // Use appropriate exit codes based on error type
        let exit_code = match e.downcast_ref::<UniRepError>() {
            Some(UniRepError::Config(_)) => 2,
            Some(UniRepError::Io(_)) => 3,
            Some(UniRepError::Parse(_)) | Some(UniRepError::InvalidSequence(_)) => 4,
            Some(UniRepError::ExternalRuntime(_)) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Represent(args) => unirep::cli::commands::represent::run(args, &config),
        Commands::Babble(args) => unirep::cli::commands::babble::run(args, &config),
        Commands::Evotune(args) => unirep::cli::commands::evotune::run(args, &config),
        Commands::Inputs(args) => unirep::cli::commands::inputs::run(args),
        Commands::ConvertWeights(args) => unirep::cli::commands::convert::run(args),
        Commands::Config(args) => unirep::cli::commands::config::run(args, &config),
    }
}

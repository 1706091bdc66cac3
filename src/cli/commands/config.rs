use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::cli::output::*;
use crate::core::config::{save_config, Config};
use crate::core::job::ModelSize;
use crate::core::paths;
use crate::tools::legacy::runtime_for;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show paths, the effective configuration and whether the runtime can start
    Show,

    /// Write the default configuration
    Init {
        /// Destination (default: $UNIREP_HOME/config.toml)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config: &Config) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show(config),
        ConfigCommand::Init { path, force } => init(path, force),
    }
}

fn show(config: &Config) -> anyhow::Result<()> {
    section_header("Paths");
    println!("{}", paths::describe_paths());

    section_header("Configuration");
    print!("{}", toml::to_string_pretty(config)?);

    section_header("Runtime");
    match runtime_for(ModelSize::Small, &config.runtime).verify_installation() {
        Ok(()) => success(&format!("{} is available", config.runtime.program)),
        Err(e) => warning(&e.to_string()),
    }
    Ok(())
}

fn init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(paths::config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    save_config(&path, &Config::default())?;
    success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}

use clap::Args;

use super::{run_job, JobArgs};
use crate::core::config::Config;
use crate::core::job::JobMode;

#[derive(Args, Debug)]
pub struct BabbleArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Length of each continuation; seeds longer than this are returned whole
    #[arg(short = 'l', long)]
    pub length: Option<usize>,

    /// Sampling temperature
    #[arg(short = 't', long)]
    pub temperature: Option<f64>,
}

pub fn run(args: BabbleArgs, config: &Config) -> anyhow::Result<()> {
    let mode = JobMode::Babble {
        length: args.length.unwrap_or(config.babble.length),
        temperature: args.temperature.unwrap_or(config.babble.temperature),
    };
    run_job(&args.job, mode, config)?;
    Ok(())
}

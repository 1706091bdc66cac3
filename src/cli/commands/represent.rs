use clap::Args;

use super::{run_job, JobArgs};
use crate::core::config::Config;
use crate::core::job::JobMode;

#[derive(Args, Debug)]
pub struct RepresentArgs {
    #[command(flatten)]
    pub job: JobArgs,
}

pub fn run(args: RepresentArgs, config: &Config) -> anyhow::Result<()> {
    run_job(&args.job, JobMode::Represent, config)?;
    Ok(())
}

use clap::Args;

use super::{classify_all, run_job, JobArgs};
use crate::core::config::Config;
use crate::core::job::JobMode;
use crate::core::normalizer::SequenceNormalizer;

#[derive(Args, Debug)]
pub struct EvotuneArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Held-out sequences, files or directories used for validation
    #[arg(long = "holdout", value_name = "INPUT")]
    pub holdouts: Vec<String>,

    /// Upper bound on cross-validation splits
    #[arg(long)]
    pub max_splits: Option<usize>,
}

pub fn run(args: EvotuneArgs, config: &Config) -> anyhow::Result<()> {
    let holdout_inputs = classify_all(&args.holdouts);
    let holdouts = SequenceNormalizer::new().holdouts(Some(holdout_inputs.as_slice()))?;

    let mode = JobMode::Evotune {
        max_splits: args.max_splits.unwrap_or(config.evotune.max_splits),
        holdouts,
    };
    run_job(&args.job, mode, config)?;
    Ok(())
}

pub mod babble;
pub mod config;
pub mod convert;
pub mod evotune;
pub mod inputs;
pub mod represent;

use clap::Args;
use std::path::PathBuf;

use crate::cli::output::*;
use crate::core::config::Config;
use crate::core::dispatcher::{JobDispatcher, JobReport};
use crate::core::job::{default_run_name, Job, JobMode, ModelSize, WeightSource};
use crate::core::normalizer::{InputElement, SequenceNormalizer};
use crate::report::json::generate_json_report;
use crate::report::text::generate_text_report;

/// Arguments shared by every model job
#[derive(Args, Debug)]
pub struct JobArgs {
    /// Sequences, FASTA or .txt files, or directories of FASTA files
    #[arg(value_name = "INPUT", required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Model dimensionality: 64, 256 or 1900
    #[arg(short = 'm', long, default_value = "64")]
    pub model_size: ModelSize,

    /// Legacy pickled weight bundle to use instead of the published weights
    #[arg(short = 'w', long, value_name = "PKL")]
    pub weights: Option<PathBuf>,

    /// Run name; outputs of runs sharing a name accumulate (default: today's date)
    #[arg(short = 'n', long)]
    pub run_name: Option<String>,

    /// Root directory for run outputs (overrides the configuration)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write a run report to this file (JSON for a .json path, plain text otherwise)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

impl JobArgs {
    pub fn input_elements(&self) -> Vec<InputElement> {
        classify_all(&self.inputs)
    }

    pub fn run_name(&self) -> String {
        self.run_name.clone().unwrap_or_else(default_run_name)
    }

    pub fn output_root(&self, config: &Config) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| config.output_root())
    }
}

pub fn classify_all(args: &[String]) -> Vec<InputElement> {
    args.iter().map(|a| InputElement::classify(a)).collect()
}

/// Normalize inputs, dispatch the job and print what was written
pub fn run_job(args: &JobArgs, mode: JobMode, config: &Config) -> anyhow::Result<JobReport> {
    let sequences = SequenceNormalizer::new().normalize(&args.input_elements())?;
    if sequences.is_empty() {
        warning("No sequences found in the given inputs");
    }

    let job = Job::new(
        args.run_name(),
        sequences,
        args.model_size,
        WeightSource::from_option(args.weights.clone()),
        mode,
    );
    let application = job.application();

    section_header(&format!("{} ({}-dimensional model)", application, args.model_size));
    info(&format!(
        "{} sequences, run '{}'",
        job.sequences.len(),
        job.run_name
    ));

    let dispatcher = JobDispatcher::legacy(config.runtime.clone(), args.output_root(config));
    let spinner = create_spinner(&format!("Running {}...", application));
    let result = dispatcher.dispatch(job);
    spinner.finish_and_clear();
    let report = result?;

    print_summary(&report);
    if let Some(path) = &args.report {
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let content = if is_json {
            generate_json_report(&report)?
        } else {
            generate_text_report(&report)?
        };
        std::fs::write(path, content)?;
        info(&format!("Report written to {}", path.display()));
    }
    Ok(report)
}

fn print_summary(report: &JobReport) {
    success(&format!(
        "{} finished for {} sequences",
        report.application, report.dispatched
    ));
    if !report.invalid.is_empty() {
        warning(&format!(
            "{} sequences were rejected as invalid",
            report.invalid.len()
        ));
    }

    let mut items = vec![
        ("Run directory", report.run_dir.display().to_string()),
        ("Files written", report.written.len().to_string()),
    ];
    if let Some(dim) = report.weights_dim {
        items.push(("Custom weights", format!("{}-dimensional", dim)));
    }
    tree_section("Outputs", items, true);
}

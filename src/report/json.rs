use crate::bio::sequence::NamedSequence;
use crate::core::dispatcher::JobReport;
use crate::core::job::{Application, JobState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    run_name: &'a str,
    application: Application,
    model_dim: usize,
    state: JobState,
    run_dir: &'a PathBuf,
    custom_weights_dim: Option<usize>,
    dispatched: usize,
    invalid: &'a [NamedSequence],
    written: Vec<PathBuf>,
}

/// Machine-readable summary of a finished job
pub fn generate_json_report(report: &JobReport) -> Result<String> {
    let json = JsonReport {
        generated_at: Utc::now(),
        run_name: &report.run_name,
        application: report.application,
        model_dim: report.model_size.dim(),
        state: report.state,
        run_dir: &report.run_dir,
        custom_weights_dim: report.weights_dim,
        dispatched: report.dispatched,
        invalid: &report.invalid,
        written: report
            .written
            .iter()
            .map(|p| p.strip_prefix(&report.run_dir).unwrap_or(p).to_path_buf())
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::ModelSize;

    #[test]
    fn test_json_report_fields() {
        let report = JobReport {
            run_name: "demo".to_string(),
            application: Application::Represent,
            model_size: ModelSize::Medium,
            run_dir: PathBuf::from("/out/demo"),
            state: JobState::Succeeded,
            dispatched: 2,
            invalid: Vec::new(),
            weights_dim: Some(256),
            written: vec![PathBuf::from("/out/demo/unireps.npy")],
        };

        let value: serde_json::Value =
            serde_json::from_str(&generate_json_report(&report).unwrap()).unwrap();
        assert_eq!(value["model_dim"], 256);
        assert_eq!(value["custom_weights_dim"], 256);
        assert_eq!(value["written"][0], "unireps.npy");
        assert!(value["generated_at"].is_string());
    }
}

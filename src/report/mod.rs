//! On-disk layout of run outputs
//!
//! A run directory holds one subdirectory per sequence name plus run-level
//! files. Babble results accumulate across invocations sharing a run name:
//! the CSV header is written once and rows are only ever appended. Runs
//! sharing a run name concurrently race on these files; nothing is locked.

use ndarray::{stack, Axis};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::bio::sequence::NamedSequence;
use crate::tools::traits::{EvotuneOutput, Representation};
use crate::{Result, UniRepError};

pub mod json;
pub mod text;

/// Marker recorded instead of a continuation for sequences outside the alphabet
pub const INVALID_MARKER: &str = "invalid sequence";
/// Written by the babble runtime and by [`ResultAggregator::record_babbles`]
pub const BABBLE_RESULTS_FILE: &str = "babble_results.csv";
pub const BABBLE_RESULTS_HEADER: [&str; 3] = ["name", "seq", "babble"];
pub const ORIGINAL_SEQ_FILE: &str = "original_seq.txt";
pub const UNIREP_FILE: &str = "unirep.npy";
pub const UNIREP_FUSION_FILE: &str = "unirep_fusion.npy";
pub const UNIREPS_FILE: &str = "unireps.npy";

/// Result of babbling one batch entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BabbleOutcome {
    Generated(String),
    Invalid,
}

impl BabbleOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            BabbleOutcome::Generated(s) => s,
            BabbleOutcome::Invalid => INVALID_MARKER,
        }
    }
}

/// Writes results into a run directory
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    run_dir: PathBuf,
}

impl ResultAggregator {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn babble_results_path(&self) -> PathBuf {
        self.run_dir.join(BABBLE_RESULTS_FILE)
    }

    fn sequence_dir(&self, entry: &NamedSequence) -> Result<PathBuf> {
        let dir = self.run_dir.join(&entry.name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Per-sequence `unirep.npy` and `unirep_fusion.npy` next to the original
    /// sequence, plus `unireps.npy` stacking every average hidden state
    pub fn record_representations(
        &self,
        reps: &[(NamedSequence, Representation)],
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.run_dir)?;
        let mut written = Vec::new();

        for (entry, rep) in reps {
            let dir = self.sequence_dir(entry)?;
            fs::write(dir.join(ORIGINAL_SEQ_FILE), &entry.sequence)?;

            let unirep = dir.join(UNIREP_FILE);
            ndarray_npy::write_npy(&unirep, &rep.avg_hidden)?;
            let fusion = dir.join(UNIREP_FUSION_FILE);
            ndarray_npy::write_npy(&fusion, &rep.fusion()?)?;
            debug!("Saved representation of {}", entry.name);

            written.push(unirep);
            written.push(fusion);
        }

        if !reps.is_empty() {
            let views: Vec<_> = reps.iter().map(|(_, rep)| rep.avg_hidden.view()).collect();
            let all = stack(Axis(0), &views).map_err(|e| {
                UniRepError::ExternalRuntime(format!("representations differ in size: {}", e))
            })?;
            let path = self.run_dir.join(UNIREPS_FILE);
            ndarray_npy::write_npy(&path, &all)?;
            written.push(path);
        }

        info!(
            "Saved {} representations to {}",
            reps.len(),
            self.run_dir.display()
        );
        Ok(written)
    }

    /// Append one CSV row per entry in batch order, append the continuation
    /// to `babble{length}.txt` and overwrite `original_seq.txt`
    pub fn record_babbles(
        &self,
        rows: &[(NamedSequence, BabbleOutcome)],
        length: usize,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.run_dir)?;
        let csv_path = self.babble_results_path();
        let is_new = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(BABBLE_RESULTS_HEADER)?;
        }
        for (entry, outcome) in rows {
            writer.write_record([entry.name.as_str(), entry.sequence.as_str(), outcome.as_str()])?;
        }
        writer.flush()?;

        let mut written = vec![csv_path];
        for (entry, outcome) in rows {
            let dir = self.sequence_dir(entry)?;

            let babble_path = dir.join(format!("babble{}.txt", length));
            let mut babble_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&babble_path)?;
            writeln!(babble_file, "{}", outcome.as_str())?;

            fs::write(dir.join(ORIGINAL_SEQ_FILE), &entry.sequence)?;
            written.push(babble_path);
        }

        info!(
            "Recorded {} babble results in {}",
            rows.len(),
            self.run_dir.display()
        );
        Ok(written)
    }

    /// Copy every file an evotuning run produced, keeping relative paths
    pub fn record_evotune(&self, output: &EvotuneOutput) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for relative in output.files() {
            let target = self.run_dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(output.root().join(relative), &target)?;
            written.push(target);
        }

        info!(
            "Saved {} evotuning files to {}",
            written.len(),
            self.run_dir.display()
        );
        Ok(written)
    }
}

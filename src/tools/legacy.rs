//! Subprocess runtime for the legacy TensorFlow babblers
//!
//! Each call launches `<program> <args...> <script> <positional args...>`
//! with the batch written to a headerless `sequence,name` CSV. The script
//! writes its results into a staging directory which is read back once the
//! process has exited successfully.

use ndarray::Array2;
use ndarray_npy::read_npy;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::traits::{
    EvotuneOutput, InferenceParams, ModelRuntime, Representation, ResolvedWeights, RunResult,
};
use crate::bio::sequence::NamedSequence;
use crate::core::config::RuntimeConfig;
use crate::core::job::ModelSize;
use crate::report::BABBLE_RESULTS_FILE;
use crate::{Result, UniRepError};

/// Forward a child stream to the log, one event per line.
/// Carriage returns end a line too, so progress bars do not pile up.
fn stream_output<R: Read + Send + 'static>(
    mut reader: R,
    stream: &'static str,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut current_line = Vec::new();
        let mut buffer = [0u8; 4096];

        let flush = |line: &mut Vec<u8>| {
            if !line.is_empty() {
                info!(target: "unirep::runtime", "[{}] {}", stream, String::from_utf8_lossy(line));
                line.clear();
            }
        };

        loop {
            match reader.read(&mut buffer) {
                Ok(0) | Err(_) => {
                    flush(&mut current_line);
                    break;
                }
                Ok(n) => {
                    for &byte in &buffer[..n] {
                        if byte == b'\n' || byte == b'\r' {
                            flush(&mut current_line);
                        } else {
                            current_line.push(byte);
                        }
                    }
                }
            }
        }
    })
}

/// Legacy babbler for one model size, selected by `DIM`
#[derive(Debug, Clone)]
pub struct LegacyRuntime<const DIM: usize> {
    config: RuntimeConfig,
    name: String,
}

pub type Babbler64 = LegacyRuntime<64>;
pub type Babbler256 = LegacyRuntime<256>;
pub type Babbler1900 = LegacyRuntime<1900>;

/// Build the subprocess runtime serving `size`
pub fn runtime_for(size: ModelSize, config: &RuntimeConfig) -> Box<dyn ModelRuntime> {
    match size {
        ModelSize::Small => Box::new(Babbler64::new(config.clone())),
        ModelSize::Medium => Box::new(Babbler256::new(config.clone())),
        ModelSize::Large => Box::new(Babbler1900::new(config.clone())),
    }
}

impl<const DIM: usize> LegacyRuntime<DIM> {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            name: format!("babbler{}", DIM),
        }
    }

    fn script_for(&self, params: &InferenceParams) -> PathBuf {
        let script = match params {
            InferenceParams::Represent => &self.config.represent_script,
            InferenceParams::Babble { .. } => &self.config.babble_script,
            InferenceParams::Evotune { .. } => &self.config.evotune_script,
        };
        match &self.config.working_dir {
            Some(dir) if script.is_relative() => dir.join(script),
            _ => script.clone(),
        }
    }

    /// Positional arguments after the script path
    fn positional_args(
        &self,
        output_dir: &Path,
        sequences_csv: &Path,
        holdouts_csv: Option<&Path>,
        weights: &ResolvedWeights,
        params: &InferenceParams,
    ) -> Vec<String> {
        let mut args = vec![DIM.to_string(), output_dir.to_string_lossy().to_string()];
        match params {
            InferenceParams::Represent => {}
            InferenceParams::Babble {
                length,
                temperature,
            } => {
                args.push(length.to_string());
                args.push(format_float(*temperature));
            }
            InferenceParams::Evotune { n_splits, .. } => {
                args.push(n_splits.to_string());
            }
        }
        args.push(sequences_csv.to_string_lossy().to_string());
        if let InferenceParams::Evotune { .. } = params {
            args.push(
                holdouts_csv
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| "None".to_string()),
            );
        }
        args.push(weights.to_arg());
        args
    }

    fn run(&self, script: &Path, positional: &[String]) -> Result<()> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args).arg(script).args(positional);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!("Running command: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| {
            UniRepError::ExternalRuntime(format!(
                "failed to start {} ({}): {}",
                self.name, self.config.program, e
            ))
        })?;

        let stdout_handle = child.stdout.take().map(|s| stream_output(s, "stdout"));
        let stderr_handle = child.stderr.take().map(|s| stream_output(s, "stderr"));
        if let Some(handle) = stdout_handle {
            handle.join().ok();
        }
        if let Some(handle) = stderr_handle {
            handle.join().ok();
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(UniRepError::ExternalRuntime(format!(
                "{} exited with {}",
                self.name,
                status
                    .code()
                    .map(|c| format!("code {}", c))
                    .unwrap_or_else(|| "a signal".to_string())
            )));
        }
        Ok(())
    }
}

impl<const DIM: usize> ModelRuntime for LegacyRuntime<DIM> {
    fn model_size(&self) -> ModelSize {
        match DIM {
            64 => ModelSize::Small,
            256 => ModelSize::Medium,
            _ => ModelSize::Large,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn verify_installation(&self) -> Result<()> {
        which::which(&self.config.program).map_err(|e| {
            UniRepError::ExternalRuntime(format!(
                "runtime launcher '{}' not found: {}",
                self.config.program, e
            ))
        })?;
        for params in [
            InferenceParams::Represent,
            InferenceParams::Babble {
                length: 0,
                temperature: 0.0,
            },
            InferenceParams::Evotune {
                n_splits: 0,
                holdouts: None,
            },
        ] {
            let script = self.script_for(&params);
            if !script.exists() {
                return Err(UniRepError::ExternalRuntime(format!(
                    "runtime script not found at {}",
                    script.display()
                )));
            }
        }
        Ok(())
    }

    fn infer(
        &self,
        batch: &[NamedSequence],
        weights: &ResolvedWeights,
        params: &InferenceParams,
    ) -> Result<RunResult> {
        let inputs = TempDir::new()?;
        let staging = TempDir::new()?;

        let sequences_csv = inputs.path().join("sequences.csv");
        write_batch_csv(&sequences_csv, batch)?;

        let holdouts_csv = match params {
            InferenceParams::Evotune {
                holdouts: Some(holdouts),
                ..
            } => {
                let path = inputs.path().join("holdouts.csv");
                write_batch_csv(&path, holdouts)?;
                Some(path)
            }
            _ => None,
        };

        let script = self.script_for(params);
        let positional = self.positional_args(
            staging.path(),
            &sequences_csv,
            holdouts_csv.as_deref(),
            weights,
            params,
        );
        info!("{}: {} sequences via {}", self.name, batch.len(), script.display());
        self.run(&script, &positional)?;

        match params {
            InferenceParams::Represent => collect_representations(staging.path(), batch),
            InferenceParams::Babble { .. } => collect_babbles(staging.path()),
            InferenceParams::Evotune { .. } => {
                let files = list_files(staging.path())?;
                Ok(RunResult::Evotuned(EvotuneOutput::new(staging, files)))
            }
        }
    }
}

/// Python reads floats back with `float()`, so keep a decimal point
fn format_float(x: f64) -> String {
    if x.fract() == 0.0 && x.is_finite() {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

/// Headerless `sequence,name` rows.
///
/// The runtime's own residue check is case-sensitive, so sequences go out
/// in upper case.
pub fn write_batch_csv(path: &Path, batch: &[NamedSequence]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for entry in batch {
        let sequence = entry.sequence.to_ascii_uppercase();
        writer.write_record([sequence.as_str(), entry.name.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// The script skips entries failing its residue check without a trace,
/// so only a batch with no output at all is an error here.
fn collect_representations(staging: &Path, batch: &[NamedSequence]) -> Result<RunResult> {
    let mut reps = Vec::with_capacity(batch.len());
    for entry in batch {
        let path = staging.join(format!("{}_unirep_fusion.npy", entry.name));
        if !path.exists() {
            warn!("Runtime skipped {}", entry.name);
            continue;
        }
        let fusion = read_f32_matrix(&path)?;
        reps.push((entry.name.clone(), Representation::from_fusion(&fusion)?));
    }
    if reps.is_empty() && !batch.is_empty() {
        return Err(UniRepError::ExternalRuntime(format!(
            "no representation returned for any of {} sequences",
            batch.len()
        )));
    }
    Ok(RunResult::Representations(reps))
}

/// Arrays may come back in either float width
fn read_f32_matrix(path: &Path) -> Result<Array2<f32>> {
    match read_npy::<_, Array2<f32>>(path) {
        Ok(array) => Ok(array),
        Err(_) => read_npy::<_, Array2<f64>>(path)
            .map(|a| a.mapv(|x| x as f32))
            .map_err(|e| {
                UniRepError::ExternalRuntime(format!("unreadable {}: {}", path.display(), e))
            }),
    }
}

fn collect_babbles(staging: &Path) -> Result<RunResult> {
    let path = staging.join(BABBLE_RESULTS_FILE);
    if !path.exists() {
        return Err(UniRepError::ExternalRuntime(format!(
            "runtime did not write {}",
            BABBLE_RESULTS_FILE
        )));
    }

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(&path)?;
    let mut babbles = Vec::new();
    for record in reader.records() {
        let record = record?;
        match (record.get(0), record.get(2)) {
            (Some(name), Some(babble)) => babbles.push((name.to_string(), babble.to_string())),
            _ => {
                return Err(UniRepError::Parse(format!(
                    "malformed row in {}: {:?}",
                    BABBLE_RESULTS_FILE, record
                )))
            }
        }
    }
    Ok(RunResult::Babbles(babbles))
}

/// Every regular file under `root`, relative to it, sorted
fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Babbler256 {
        Babbler256::new(RuntimeConfig::default())
    }

    #[test]
    fn test_names_and_sizes() {
        assert_eq!(runtime().name(), "babbler256");
        assert_eq!(runtime().model_size(), ModelSize::Medium);
        let large = runtime_for(ModelSize::Large, &RuntimeConfig::default());
        assert_eq!(large.model_size(), ModelSize::Large);
        assert_eq!(large.name(), "babbler1900");
    }

    #[test]
    fn test_represent_args() {
        let args = runtime().positional_args(
            Path::new("/out"),
            Path::new("/in/sequences.csv"),
            None,
            &ResolvedWeights::Default,
            &InferenceParams::Represent,
        );
        assert_eq!(args, vec!["256", "/out", "/in/sequences.csv", "None"]);
    }

    #[test]
    fn test_babble_args() {
        let args = runtime().positional_args(
            Path::new("/out"),
            Path::new("/in/sequences.csv"),
            None,
            &ResolvedWeights::Directory(PathBuf::from("/w/256_weights")),
            &InferenceParams::Babble {
                length: 10,
                temperature: 1.0,
            },
        );
        assert_eq!(
            args,
            vec!["256", "/out", "10", "1.0", "/in/sequences.csv", "/w/256_weights"]
        );
    }

    #[test]
    fn test_evotune_args() {
        let args = runtime().positional_args(
            Path::new("/out"),
            Path::new("/in/sequences.csv"),
            Some(Path::new("/in/holdouts.csv")),
            &ResolvedWeights::Default,
            &InferenceParams::Evotune {
                n_splits: 2,
                holdouts: None,
            },
        );
        assert_eq!(
            args,
            vec!["256", "/out", "2", "/in/sequences.csv", "/in/holdouts.csv", "None"]
        );
    }

    #[test]
    fn test_batch_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sequences.csv");
        write_batch_csv(
            &path,
            &[
                NamedSequence::new("LATCH", "protein1"),
                NamedSequence::new("bio", "protein2"),
            ],
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "LATCH,protein1\nBIO,protein2\n"
        );
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.25), "0.25");
    }
}

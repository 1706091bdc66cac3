//! Runs a job end to end: weights, runtime call, result layout
//!
//! Runtime outputs are validated in full before anything is written to the
//! run directory, so a failed job leaves no partial results behind.

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::bio::sequence::NamedSequence;
use crate::core::config::RuntimeConfig;
use crate::core::job::{Application, Job, JobMode, JobState, ModelSize, WeightSource};
use crate::report::{BabbleOutcome, ResultAggregator, INVALID_MARKER};
use crate::tools::legacy;
use crate::tools::traits::{InferenceParams, ModelRuntime, ResolvedWeights, RunResult};
use crate::weights::{ConvertedWeights, WeightConverter};
use crate::{Result, UniRepError};

/// Chooses the runtime serving a model size
pub trait RuntimeProvider {
    fn runtime_for(&self, size: ModelSize) -> Result<Box<dyn ModelRuntime>>;
}

impl<F> RuntimeProvider for F
where
    F: Fn(ModelSize) -> Result<Box<dyn ModelRuntime>>,
{
    fn runtime_for(&self, size: ModelSize) -> Result<Box<dyn ModelRuntime>> {
        self(size)
    }
}

/// Subprocess runtimes launched per the runtime configuration
#[derive(Debug, Clone)]
pub struct LegacyProvider {
    config: RuntimeConfig,
}

impl LegacyProvider {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

impl RuntimeProvider for LegacyProvider {
    fn runtime_for(&self, size: ModelSize) -> Result<Box<dyn ModelRuntime>> {
        Ok(legacy::runtime_for(size, &self.config))
    }
}

/// Summary of a finished job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub run_name: String,
    pub application: Application,
    pub model_size: ModelSize,
    pub run_dir: PathBuf,
    pub state: JobState,
    /// Entries handed to the runtime
    pub dispatched: usize,
    /// Entries left out for failing the alphabet check, or rejected by the
    /// runtime's own check, in batch order
    pub invalid: Vec<NamedSequence>,
    /// Dimensionality of the custom weight bundle, if one was given
    pub weights_dim: Option<usize>,
    pub written: Vec<PathBuf>,
}

/// Weights resolved for one job; keeps converted files alive until dropped
struct WeightResolution {
    weights: ResolvedWeights,
    dim: Option<usize>,
    _converted: Option<ConvertedWeights>,
}

pub struct JobDispatcher<P: RuntimeProvider = LegacyProvider> {
    provider: P,
    converter: WeightConverter,
    output_root: PathBuf,
}

impl JobDispatcher<LegacyProvider> {
    /// Dispatcher launching the legacy subprocess runtimes
    pub fn legacy(config: RuntimeConfig, output_root: impl Into<PathBuf>) -> Self {
        Self::new(LegacyProvider::new(config), output_root)
    }
}

impl<P: RuntimeProvider> JobDispatcher<P> {
    pub fn new(provider: P, output_root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            converter: WeightConverter::new(),
            output_root: output_root.into(),
        }
    }

    pub fn with_converter(mut self, converter: WeightConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Run a job to completion. Any error aborts the whole batch.
    pub fn dispatch(&self, job: Job) -> Result<JobReport> {
        let mut report = JobReport {
            run_name: job.run_name.clone(),
            application: job.application(),
            model_size: job.model_size,
            run_dir: self.output_root.join(&job.run_name),
            state: JobState::Created,
            dispatched: 0,
            invalid: Vec::new(),
            weights_dim: None,
            written: Vec::new(),
        };
        info!(
            "{} job '{}': {} sequences, {}-dimensional model",
            report.application,
            report.run_name,
            job.sequences.len(),
            job.model_size
        );

        match self.run(job, &mut report) {
            Ok(()) => {
                transition(&mut report, JobState::Succeeded);
                Ok(report)
            }
            Err(e) => {
                transition(&mut report, JobState::Failed);
                error!("Job '{}' failed: {}", report.run_name, e);
                Err(e)
            }
        }
    }

    fn run(&self, job: Job, report: &mut JobReport) -> Result<()> {
        transition(report, JobState::WeightsResolving);
        let resolution = self.resolve_weights(&job)?;
        report.weights_dim = resolution.dim;

        let runtime = self.provider.runtime_for(job.model_size)?;
        if runtime.model_size() != job.model_size {
            return Err(UniRepError::Config(format!(
                "runtime {} serves the {}-dimensional model, job needs {}",
                runtime.name(),
                runtime.model_size(),
                job.model_size
            )));
        }

        let (valid, invalid): (Vec<_>, Vec<_>) =
            job.sequences.iter().cloned().partition(|s| s.is_valid());
        for entry in &invalid {
            warn!("Sequence {} has residues outside the alphabet; skipping", entry.name);
        }
        report.invalid = invalid;
        report.dispatched = valid.len();

        let aggregator = ResultAggregator::new(&report.run_dir);
        transition(report, JobState::Dispatched);

        report.written = match &job.mode {
            JobMode::Represent => {
                let (written, skipped) = self.represent(
                    runtime.as_ref(),
                    &valid,
                    &resolution.weights,
                    job.model_size,
                    &aggregator,
                )?;
                report.invalid = job
                    .sequences
                    .iter()
                    .filter(|s| !s.is_valid() || skipped.contains(&s.name))
                    .cloned()
                    .collect();
                written
            }
            JobMode::Babble {
                length,
                temperature,
            } => {
                let params = InferenceParams::Babble {
                    length: *length,
                    temperature: *temperature,
                };
                let outcomes =
                    self.babble(runtime.as_ref(), &valid, &resolution.weights, &params, *length)?;
                let rows = merge_babbles(&job.sequences, outcomes);
                report.invalid = rows
                    .iter()
                    .filter(|(_, outcome)| *outcome == BabbleOutcome::Invalid)
                    .map(|(entry, _)| entry.clone())
                    .collect();
                aggregator.record_babbles(&rows, *length)?
            }
            JobMode::Evotune {
                max_splits,
                holdouts,
            } => {
                if valid.is_empty() {
                    return Err(UniRepError::Other(
                        "evotuning needs at least one valid sequence".to_string(),
                    ));
                }
                let params = InferenceParams::Evotune {
                    n_splits: valid.len().min(*max_splits),
                    holdouts: holdouts.clone(),
                };
                match runtime.infer(&valid, &resolution.weights, &params)? {
                    RunResult::Evotuned(output) => aggregator.record_evotune(&output)?,
                    other => return Err(unexpected(runtime.name(), "evotuned parameters", &other)),
                }
            }
        };
        Ok(())
    }

    /// Convert or inspect a custom bundle and check it fits the declared size
    fn resolve_weights(&self, job: &Job) -> Result<WeightResolution> {
        let path = match &job.weights {
            WeightSource::Default => {
                return Ok(WeightResolution {
                    weights: ResolvedWeights::Default,
                    dim: None,
                    _converted: None,
                })
            }
            WeightSource::LegacyBundle(path) => path,
        };

        let declared = job.model_size.dim();
        if job.application() == Application::Evotune {
            let inferred = self.converter.inspect(path)?;
            check_dim(declared, inferred)?;
            return Ok(WeightResolution {
                weights: ResolvedWeights::Bundle(path.clone()),
                dim: Some(inferred),
                _converted: None,
            });
        }

        let converted = self.converter.convert(path)?;
        check_dim(declared, converted.dim())?;
        Ok(WeightResolution {
            weights: ResolvedWeights::Directory(converted.dir().to_path_buf()),
            dim: Some(converted.dim()),
            _converted: Some(converted),
        })
    }

    /// Record representations; also returns the names the runtime skipped
    fn represent(
        &self,
        runtime: &dyn ModelRuntime,
        valid: &[NamedSequence],
        weights: &ResolvedWeights,
        size: ModelSize,
        aggregator: &ResultAggregator,
    ) -> Result<(Vec<PathBuf>, Vec<String>)> {
        if valid.is_empty() {
            warn!("No valid sequences to represent");
            return Ok((Vec::new(), Vec::new()));
        }

        let reps = match runtime.infer(valid, weights, &InferenceParams::Represent)? {
            RunResult::Representations(reps) => reps,
            other => return Err(unexpected(runtime.name(), "representations", &other)),
        };
        if reps.is_empty() {
            return Err(UniRepError::ExternalRuntime(format!(
                "{} returned no representations for {} sequences",
                runtime.name(),
                valid.len()
            )));
        }
        if let Some((name, _)) = reps
            .iter()
            .find(|(name, _)| !valid.iter().any(|entry| entry.name == *name))
        {
            return Err(UniRepError::ExternalRuntime(format!(
                "{} returned a representation for {}, which was not in the batch",
                runtime.name(),
                name
            )));
        }

        let mut matched = Vec::with_capacity(valid.len());
        let mut skipped = Vec::new();
        for entry in valid {
            let Some(rep) = reps
                .iter()
                .find(|(name, _)| *name == entry.name)
                .map(|(_, rep)| rep.clone())
            else {
                warn!(
                    "{} rejected {}; recording it as invalid",
                    runtime.name(),
                    entry.name
                );
                skipped.push(entry.name.clone());
                continue;
            };
            if rep.dim() != size.dim() {
                return Err(UniRepError::ExternalRuntime(format!(
                    "{} returned a {}-dimensional representation for {}, expected {}",
                    runtime.name(),
                    rep.dim(),
                    entry.name,
                    size
                )));
            }
            matched.push((entry.clone(), rep));
        }

        let written = aggregator.record_representations(&matched)?;
        Ok((written, skipped))
    }

    /// Outcomes for the valid entries, in order. The runtime may still mark
    /// an entry invalid under its own residue check.
    fn babble(
        &self,
        runtime: &dyn ModelRuntime,
        valid: &[NamedSequence],
        weights: &ResolvedWeights,
        params: &InferenceParams,
        length: usize,
    ) -> Result<Vec<BabbleOutcome>> {
        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let babbles = match runtime.infer(valid, weights, params)? {
            RunResult::Babbles(babbles) => babbles,
            other => return Err(unexpected(runtime.name(), "babbles", &other)),
        };
        if babbles.len() != valid.len() {
            return Err(UniRepError::ExternalRuntime(format!(
                "{} returned {} babbles for {} sequences",
                runtime.name(),
                babbles.len(),
                valid.len()
            )));
        }

        valid
            .iter()
            .zip(babbles)
            .map(|(entry, (name, babble))| {
                if name != entry.name {
                    return Err(UniRepError::ExternalRuntime(format!(
                        "{} returned results out of order: expected {}, got {}",
                        runtime.name(),
                        entry.name,
                        name
                    )));
                }
                if babble == INVALID_MARKER {
                    warn!("{} rejected {}", runtime.name(), entry.name);
                    return Ok(BabbleOutcome::Invalid);
                }
                check_continuation(&entry.sequence, &babble, length)?;
                Ok(BabbleOutcome::Generated(babble))
            })
            .collect()
    }
}

fn transition(report: &mut JobReport, state: JobState) {
    info!("Job '{}': {} -> {}", report.run_name, report.state, state);
    report.state = state;
}

fn check_dim(declared: usize, inferred: usize) -> Result<()> {
    if declared != inferred {
        return Err(UniRepError::WeightShapeMismatch { declared, inferred });
    }
    Ok(())
}

/// A continuation starts with its seed, in any case, and is never shorter
/// than it
pub fn check_continuation(seed: &str, babble: &str, length: usize) -> Result<()> {
    let expected = length.max(seed.len());
    let starts_with_seed = babble
        .get(..seed.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(seed));
    if !starts_with_seed || babble.len() != expected {
        return Err(UniRepError::ExternalRuntime(format!(
            "continuation of {} has {} residues (expected {}) or does not start with the seed",
            seed,
            babble.len(),
            expected
        )));
    }
    Ok(())
}

/// Batch-ordered rows: runtime outcomes for valid entries, the invalid
/// marker for the rest
fn merge_babbles(
    batch: &[NamedSequence],
    outcomes: Vec<BabbleOutcome>,
) -> Vec<(NamedSequence, BabbleOutcome)> {
    let mut outcomes = outcomes.into_iter();
    batch
        .iter()
        .map(|entry| {
            let outcome = if entry.is_valid() {
                outcomes.next().unwrap_or(BabbleOutcome::Invalid)
            } else {
                BabbleOutcome::Invalid
            };
            (entry.clone(), outcome)
        })
        .collect()
}

fn unexpected(runtime: &str, wanted: &str, got: &RunResult) -> UniRepError {
    let kind = match got {
        RunResult::Representations(_) => "representations",
        RunResult::Babbles(_) => "babbles",
        RunResult::Evotuned(_) => "evotuned parameters",
    };
    UniRepError::ExternalRuntime(format!("{} returned {} instead of {}", runtime, kind, wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_check() {
        assert!(check_continuation("LATCH", "LATCHAAAAA", 10).is_ok());
        assert!(check_continuation("LATCHBIO", "LATCHBIO", 3).is_ok());
        assert!(check_continuation("LATCH", "LATCHAAAA", 10).is_err());
        assert!(check_continuation("LATCH", "MATCHAAAAA", 10).is_err());
        // The runtime receives upper-cased seeds
        assert!(check_continuation("latch", "LATCHAAAAA", 10).is_ok());
        assert!(check_continuation("LATCH", "LAT", 3).is_err());
    }

    #[test]
    fn test_merge_keeps_batch_order() {
        let batch = vec![
            NamedSequence::new("LATCH1", "bad"),
            NamedSequence::new("LATCH", "good"),
            NamedSequence::new("LATCHX", "rejected"),
        ];
        let rows = merge_babbles(
            &batch,
            vec![
                BabbleOutcome::Generated("LATCHAAAAA".to_string()),
                BabbleOutcome::Invalid,
            ],
        );
        assert_eq!(rows[0].1, BabbleOutcome::Invalid);
        assert_eq!(rows[1].1, BabbleOutcome::Generated("LATCHAAAAA".to_string()));
        assert_eq!(rows[2].1, BabbleOutcome::Invalid);
    }

    #[test]
    fn test_dim_check() {
        assert!(check_dim(64, 64).is_ok());
        assert!(matches!(
            check_dim(1900, 64),
            Err(UniRepError::WeightShapeMismatch {
                declared: 1900,
                inferred: 64
            })
        ));
    }
}

//! In-process runtime for testing the dispatcher and aggregator

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

use super::traits::{
    EvotuneOutput, InferenceParams, ModelRuntime, Representation, ResolvedWeights, RunResult,
};
use crate::bio::sequence::NamedSequence;
use crate::core::job::ModelSize;
use crate::{Result, UniRepError};

/// Residues used to pad mock continuations
const PADDING: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

/// How the mock answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Well-formed results
    Normal,
    /// Every call fails like a crashed subprocess
    Fail,
    /// Continuations that drop the seed
    WrongContinuation,
    /// One result fewer than dispatched entries
    DropLast,
}

/// One recorded `infer` call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub batch: Vec<NamedSequence>,
    pub weights: ResolvedWeights,
    pub params: InferenceParams,
}

/// Deterministic runtime: babbles pad the seed, representations encode the
/// sequence length, evotuning writes a small parameter file
pub struct MockRuntime {
    size: ModelSize,
    behavior: MockBehavior,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockRuntime {
    pub fn new(size: ModelSize) -> Self {
        Self::with_behavior(size, MockBehavior::Normal)
    }

    pub fn failing(size: ModelSize) -> Self {
        Self::with_behavior(size, MockBehavior::Fail)
    }

    pub fn with_behavior(size: ModelSize, behavior: MockBehavior) -> Self {
        Self {
            size,
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls made so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Continuation of `seed` to `max(length, len(seed))` residues
    pub fn babble(seed: &str, length: usize) -> String {
        let mut out = seed.to_string();
        let mut i = 0;
        while out.len() < length {
            out.push(PADDING[i % PADDING.len()] as char);
            i += 1;
        }
        out
    }

    fn representation(&self, entry: &NamedSequence) -> Representation {
        let mut rep = Representation::zeros(self.size.dim());
        rep.avg_hidden.fill(entry.len() as f32);
        rep.final_hidden.fill(1.0);
        rep
    }
}

impl ModelRuntime for MockRuntime {
    fn model_size(&self) -> ModelSize {
        self.size
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn verify_installation(&self) -> Result<()> {
        Ok(())
    }

    fn infer(
        &self,
        batch: &[NamedSequence],
        weights: &ResolvedWeights,
        params: &InferenceParams,
    ) -> Result<RunResult> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                batch: batch.to_vec(),
                weights: weights.clone(),
                params: params.clone(),
            });
        }

        if self.behavior == MockBehavior::Fail {
            return Err(UniRepError::ExternalRuntime(
                "mock exited with code 1".to_string(),
            ));
        }

        let take = match self.behavior {
            MockBehavior::DropLast => batch.len().saturating_sub(1),
            _ => batch.len(),
        };
        let batch = &batch[..take];

        match params {
            InferenceParams::Represent => Ok(RunResult::Representations(
                batch
                    .iter()
                    .map(|e| (e.name.clone(), self.representation(e)))
                    .collect(),
            )),
            InferenceParams::Babble { length, .. } => Ok(RunResult::Babbles(
                batch
                    .iter()
                    .map(|e| {
                        let babble = match self.behavior {
                            MockBehavior::WrongContinuation => "M".repeat(*length),
                            _ => Self::babble(&e.sequence, *length),
                        };
                        (e.name.clone(), babble)
                    })
                    .collect(),
            )),
            InferenceParams::Evotune { n_splits, .. } => {
                let staging = TempDir::new()?;
                let relative = PathBuf::from("iter_final").join("model_weights.pkl");
                fs::create_dir_all(staging.path().join("iter_final"))?;
                fs::write(
                    staging.path().join(&relative),
                    format!("{} sequences, {} splits\n", batch.len(), n_splits),
                )?;
                Ok(RunResult::Evotuned(EvotuneOutput::new(
                    staging,
                    vec![relative],
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_babble_padding() {
        assert_eq!(MockRuntime::babble("LATCH", 10).len(), 10);
        assert!(MockRuntime::babble("LATCH", 10).starts_with("LATCH"));
        assert_eq!(MockRuntime::babble("LATCHBIO", 3), "LATCHBIO");
    }

    #[test]
    fn test_calls_are_recorded() {
        let runtime = MockRuntime::new(ModelSize::Small);
        runtime
            .infer(
                &[NamedSequence::new("LATCH", "p1")],
                &ResolvedWeights::Default,
                &InferenceParams::Represent,
            )
            .unwrap();
        let calls = runtime.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].batch[0].name, "p1");
    }
}

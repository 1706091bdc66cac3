//! Trait definitions for model runtimes
//!
//! The dispatcher only talks to a [`ModelRuntime`], so the subprocess backend
//! can be swapped for an in-process or remote one in tests and elsewhere.
use ndarray::{stack, Array1, Array2, Axis};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::bio::sequence::NamedSequence;
use crate::core::job::ModelSize;
use crate::{Result, UniRepError};

/// Weights handed to the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedWeights {
    /// Runtime resolves the published weights for its model size
    Default,
    /// Directory of per-parameter `.npy` files
    Directory(PathBuf),
    /// Legacy bundle passed through unconverted (evotuning)
    Bundle(PathBuf),
}

impl ResolvedWeights {
    /// Positional argument form; `None` asks for the default weights
    pub fn to_arg(&self) -> String {
        match self {
            ResolvedWeights::Default => "None".to_string(),
            ResolvedWeights::Directory(p) | ResolvedWeights::Bundle(p) => {
                p.to_string_lossy().to_string()
            }
        }
    }
}

/// Mode-specific parameters of one inference call
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceParams {
    Represent,
    Babble { length: usize, temperature: f64 },
    Evotune {
        n_splits: usize,
        holdouts: Option<Vec<NamedSequence>>,
    },
}

/// Hidden-state summary of one sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub avg_hidden: Array1<f32>,
    pub final_hidden: Array1<f32>,
    pub final_cell: Array1<f32>,
}

impl Representation {
    pub fn zeros(dim: usize) -> Self {
        Self {
            avg_hidden: Array1::zeros(dim),
            final_hidden: Array1::zeros(dim),
            final_cell: Array1::zeros(dim),
        }
    }

    /// Split a `(3, d)` fusion array back into its rows
    pub fn from_fusion(fusion: &Array2<f32>) -> Result<Self> {
        if fusion.nrows() != 3 {
            return Err(UniRepError::ExternalRuntime(format!(
                "fusion array has shape {:?}, expected 3 rows",
                fusion.shape()
            )));
        }
        Ok(Self {
            avg_hidden: fusion.row(0).to_owned(),
            final_hidden: fusion.row(1).to_owned(),
            final_cell: fusion.row(2).to_owned(),
        })
    }

    pub fn dim(&self) -> usize {
        self.avg_hidden.len()
    }

    /// Average hidden, final hidden and final cell state stacked into `(3, d)`
    pub fn fusion(&self) -> Result<Array2<f32>> {
        stack(
            Axis(0),
            &[
                self.avg_hidden.view(),
                self.final_hidden.view(),
                self.final_cell.view(),
            ],
        )
        .map_err(|e| UniRepError::ExternalRuntime(format!("inconsistent representation: {}", e)))
    }
}

/// Files written by an evotuning run, held in a staging directory until committed
#[derive(Debug)]
pub struct EvotuneOutput {
    staging: TempDir,
    files: Vec<PathBuf>,
}

impl EvotuneOutput {
    /// `files` are relative to the staging directory
    pub fn new(staging: TempDir, files: Vec<PathBuf>) -> Self {
        Self { staging, files }
    }

    pub fn root(&self) -> &Path {
        self.staging.path()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// What a runtime hands back for a batch, in batch order
#[derive(Debug)]
pub enum RunResult {
    Representations(Vec<(String, Representation)>),
    /// `(name, generated sequence)` per dispatched entry
    Babbles(Vec<(String, String)>),
    Evotuned(EvotuneOutput),
}

/// Common interface for model runtimes, one implementation per model size
pub trait ModelRuntime: Send + Sync {
    /// Model size this runtime serves
    fn model_size(&self) -> ModelSize;

    /// Get the name of this runtime
    fn name(&self) -> &str;

    /// Verify that the runtime can be launched
    fn verify_installation(&self) -> Result<()>;

    /// Run one synchronous inference call over the whole batch
    fn infer(
        &self,
        batch: &[NamedSequence],
        weights: &ResolvedWeights,
        params: &InferenceParams,
    ) -> Result<RunResult>;
}

/// Shared runtimes, so a caller can keep a handle to one it hands out
impl<T: ModelRuntime + ?Sized> ModelRuntime for Arc<T> {
    fn model_size(&self) -> ModelSize {
        (**self).model_size()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn verify_installation(&self) -> Result<()> {
        (**self).verify_installation()
    }

    fn infer(
        &self,
        batch: &[NamedSequence],
        weights: &ResolvedWeights,
        params: &InferenceParams,
    ) -> Result<RunResult> {
        (**self).infer(batch, weights, params)
    }
}

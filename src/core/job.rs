//! Job description handed from the command layer to the dispatcher

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::bio::sequence::NamedSequence;
use crate::UniRepError;

/// Dimensionality of the representation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelSize {
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub const ALL: [ModelSize; 3] = [ModelSize::Small, ModelSize::Medium, ModelSize::Large];

    /// Width of the hidden state
    pub fn dim(&self) -> usize {
        match self {
            ModelSize::Small => 64,
            ModelSize::Medium => 256,
            ModelSize::Large => 1900,
        }
    }

    pub fn from_dim(dim: usize) -> Result<Self, UniRepError> {
        match dim {
            64 => Ok(ModelSize::Small),
            256 => Ok(ModelSize::Medium),
            1900 => Ok(ModelSize::Large),
            other => Err(UniRepError::InvalidModelSize(other.to_string())),
        }
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dim())
    }
}

impl std::str::FromStr for ModelSize {
    type Err = UniRepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "64" | "small" => Ok(ModelSize::Small),
            "256" | "medium" => Ok(ModelSize::Medium),
            "1900" | "large" => Ok(ModelSize::Large),
            other => Err(UniRepError::InvalidModelSize(other.to_string())),
        }
    }
}

/// What the user asked the model to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Application {
    Represent,
    Babble,
    Evotune,
}

impl Application {
    pub fn display_name(&self) -> &'static str {
        match self {
            Application::Represent => "UniRep/UniRep Fusion",
            Application::Babble => "Babble",
            Application::Evotune => "Evotune",
        }
    }

    /// One flag per application, in declaration order
    pub fn flags(&self) -> (bool, bool, bool) {
        (
            *self == Application::Represent,
            *self == Application::Babble,
            *self == Application::Evotune,
        )
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where the model parameters come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightSource {
    /// Let the runtime resolve the published weights for the model size
    Default,
    /// A legacy pickled bundle supplied by the user
    LegacyBundle(PathBuf),
}

impl WeightSource {
    pub fn from_option(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) => WeightSource::LegacyBundle(p),
            None => WeightSource::Default,
        }
    }
}

/// Application together with its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum JobMode {
    Represent,
    Babble {
        length: usize,
        temperature: f64,
    },
    Evotune {
        max_splits: usize,
        holdouts: Option<Vec<NamedSequence>>,
    },
}

impl JobMode {
    pub fn application(&self) -> Application {
        match self {
            JobMode::Represent => Application::Represent,
            JobMode::Babble { .. } => Application::Babble,
            JobMode::Evotune { .. } => Application::Evotune,
        }
    }
}

/// A single workflow invocation. Consumed by value when dispatched.
#[derive(Debug, Clone)]
pub struct Job {
    pub run_name: String,
    pub sequences: Vec<NamedSequence>,
    pub model_size: ModelSize,
    pub weights: WeightSource,
    pub mode: JobMode,
}

impl Job {
    pub fn new(
        run_name: impl Into<String>,
        sequences: Vec<NamedSequence>,
        model_size: ModelSize,
        weights: WeightSource,
        mode: JobMode,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            sequences,
            model_size,
            weights,
            mode,
        }
    }

    pub fn application(&self) -> Application {
        self.mode.application()
    }
}

/// Lifecycle of a dispatched job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Created,
    WeightsResolving,
    Dispatched,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Created => "created",
            JobState::WeightsResolving => "resolving weights",
            JobState::Dispatched => "dispatched",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Default run name: today's date
pub fn default_run_name() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("64".parse::<ModelSize>().unwrap(), ModelSize::Small);
        assert_eq!("256".parse::<ModelSize>().unwrap(), ModelSize::Medium);
        assert_eq!("1900".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert_eq!("large".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!(matches!(
            "128".parse::<ModelSize>(),
            Err(UniRepError::InvalidModelSize(_))
        ));
    }

    #[test]
    fn test_model_size_dims() {
        for size in ModelSize::ALL {
            assert_eq!(ModelSize::from_dim(size.dim()).unwrap(), size);
        }
        assert!(ModelSize::from_dim(10).is_err());
    }

    #[test]
    fn test_application_flags() {
        assert_eq!(Application::Represent.flags(), (true, false, false));
        assert_eq!(Application::Babble.flags(), (false, true, false));
        assert_eq!(Application::Evotune.flags(), (false, false, true));
    }

    #[test]
    fn test_default_run_name_is_a_date() {
        let name = default_run_name();
        assert_eq!(name.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&name, "%Y-%m-%d").is_ok());
    }
}

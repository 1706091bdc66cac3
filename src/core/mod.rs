pub mod config;
pub mod dispatcher;
pub mod job;
pub mod normalizer;
pub mod paths;

pub use config::Config;
pub use dispatcher::{JobDispatcher, JobReport};
pub use job::{Application, Job, JobMode, JobState, ModelSize, WeightSource};
pub use normalizer::{InputElement, SequenceNormalizer};

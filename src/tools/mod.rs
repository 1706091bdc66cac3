pub mod legacy;
pub mod testing;
pub mod traits;

pub use legacy::{runtime_for, Babbler1900, Babbler256, Babbler64, LegacyRuntime};
pub use testing::{MockBehavior, MockRuntime};
pub use traits::{
    EvotuneOutput, InferenceParams, ModelRuntime, Representation, ResolvedWeights, RunResult,
};

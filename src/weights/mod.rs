//! Legacy weight bundle conversion

pub mod array;
pub mod converter;
pub mod schema;

pub use converter::{ConvertedWeights, WeightConverter};
pub use schema::{LegacyBundleSchema, LEGACY_BUNDLE_V1};

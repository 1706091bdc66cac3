use ndarray::ArrayD;
use serde_pickle::{DeOptions, HashableValue, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use super::array::{kind, leading_dim, value_to_array};
use super::schema::{
    LegacyBundleSchema, DENSE_BIASES_FILE, DENSE_WEIGHTS_FILE, EMBEDDING_FILE, LEGACY_BUNDLE_V1,
};
use crate::{Result, UniRepError};

/// A weight directory in the layout the runtime loads by name.
///
/// When produced by [`WeightConverter::convert`] the directory lives in a
/// temporary location owned by this value and is removed on drop.
#[derive(Debug)]
pub struct ConvertedWeights {
    _scratch: Option<TempDir>,
    dir: PathBuf,
    dim: usize,
    files: Vec<PathBuf>,
}

impl ConvertedWeights {
    /// The `{dim}_weights` directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Dimensionality inferred from the dense layer
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Converts a legacy pickled bundle into per-parameter `.npy` files
#[derive(Debug, Clone)]
pub struct WeightConverter {
    schema: LegacyBundleSchema,
}

impl Default for WeightConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightConverter {
    pub fn new() -> Self {
        Self::with_schema(LEGACY_BUNDLE_V1)
    }

    pub fn with_schema(schema: LegacyBundleSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &LegacyBundleSchema {
        &self.schema
    }

    /// Infer the model dimensionality of a bundle without writing anything
    pub fn inspect(&self, bundle_path: &Path) -> Result<usize> {
        let bundle = load_bundle(bundle_path)?;
        let (weights, _) = self.dense_pair(&bundle)?;
        leading_dim(weights, DENSE_WEIGHTS_FILE)
    }

    /// Convert into a fresh temporary directory owned by the result
    pub fn convert(&self, bundle_path: &Path) -> Result<ConvertedWeights> {
        let scratch = TempDir::new()?;
        let mut converted = self.convert_into(bundle_path, scratch.path())?;
        converted._scratch = Some(scratch);
        Ok(converted)
    }

    /// Convert into `{out_root}/{dim}_weights`, which must not exist yet
    pub fn convert_into(&self, bundle_path: &Path, out_root: &Path) -> Result<ConvertedWeights> {
        info!("Converting weight bundle {}", bundle_path.display());
        let bundle = load_bundle(bundle_path)?;

        let (dense_weights, dense_biases) = self.dense_pair(&bundle)?;
        let dense_weights = value_to_array(dense_weights, DENSE_WEIGHTS_FILE)?;
        let dim = *dense_weights.shape().first().ok_or_else(|| {
            UniRepError::WeightFormat(format!("{} is a scalar", DENSE_WEIGHTS_FILE))
        })?;
        debug!("Bundle dense layer gives a {}-dimensional model", dim);

        let dir = out_root.join(self.schema.directory_name(dim));
        fs::create_dir_all(out_root)?;
        fs::create_dir(&dir)?;

        let mut files = Vec::new();
        let embedding = entry(&bundle, self.schema.embedding_index, "embedding matrix")?;
        files.push(write_array(&dir, EMBEDDING_FILE, &value_to_array(embedding, EMBEDDING_FILE)?)?);
        files.push(write_array(
            &dir,
            DENSE_BIASES_FILE,
            &value_to_array(dense_biases, DENSE_BIASES_FILE)?,
        )?);
        files.push(write_array(&dir, DENSE_WEIGHTS_FILE, &dense_weights)?);

        for block in self.schema.blocks(dim) {
            let params = as_mapping(entry(&bundle, block.index, "mLSTM block")?, block.index)?;
            for param in self.schema.params {
                let file_name = block.file_name(param);
                let value = lookup(params, param).ok_or_else(|| {
                    UniRepError::WeightFormat(format!(
                        "mLSTM block at index {} has no '{}' parameter",
                        block.index, param
                    ))
                })?;
                files.push(write_array(&dir, &file_name, &value_to_array(value, &file_name)?)?);
            }
        }

        info!("Wrote {} weight files to {}", files.len(), dir.display());
        Ok(ConvertedWeights {
            _scratch: None,
            dir,
            dim,
            files,
        })
    }

    fn dense_pair<'a>(&self, bundle: &'a [Value]) -> Result<(&'a Value, &'a Value)> {
        let index = self.schema.dense_index(bundle.len()).ok_or_else(|| {
            UniRepError::WeightFormat(format!(
                "bundle has {} entries, too few for a dense layer",
                bundle.len()
            ))
        })?;
        let pair = match entry(bundle, index, "dense layer")? {
            Value::List(items) | Value::Tuple(items) => items,
            other => {
                return Err(UniRepError::WeightFormat(format!(
                    "dense layer must be a (weights, biases) pair, found {}",
                    kind(other)
                )))
            }
        };
        let weights = pair.get(self.schema.dense_weights_slot);
        let biases = pair.get(self.schema.dense_biases_slot);
        match (weights, biases) {
            (Some(w), Some(b)) => Ok((w, b)),
            _ => Err(UniRepError::WeightFormat(format!(
                "dense layer pair has {} entries",
                pair.len()
            ))),
        }
    }
}

/// Read the top-level positional list of a bundle
///
/// Globals the decoder cannot build, such as a NumPy dtype referenced a
/// second time, decode to `None`.
pub fn load_bundle(path: &Path) -> Result<Vec<Value>> {
    let file = File::open(path)?;
    let options = DeOptions::new().replace_unresolved_globals();
    let value = serde_pickle::value_from_reader(BufReader::new(file), options)
        .map_err(|e| UniRepError::WeightFormat(format!("{}: {}", path.display(), e)))?;

    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items),
        other => Err(UniRepError::WeightFormat(format!(
            "{}: expected a list at the top level, found {}",
            path.display(),
            kind(&other)
        ))),
    }
}

fn entry<'a>(bundle: &'a [Value], index: usize, what: &str) -> Result<&'a Value> {
    bundle.get(index).ok_or_else(|| {
        UniRepError::WeightFormat(format!(
            "expected the {} at index {}, bundle has {} entries",
            what,
            index,
            bundle.len()
        ))
    })
}

fn as_mapping(value: &Value, index: usize) -> Result<&BTreeMap<HashableValue, Value>> {
    match value {
        Value::Dict(map) => Ok(map),
        other => Err(UniRepError::WeightFormat(format!(
            "expected a parameter mapping at index {}, found {}",
            index,
            kind(other)
        ))),
    }
}

/// Keys may be text or, in bundles pickled by Python 2, bytes
fn lookup<'a>(map: &'a BTreeMap<HashableValue, Value>, name: &str) -> Option<&'a Value> {
    map.get(&HashableValue::String(name.to_string()))
        .or_else(|| map.get(&HashableValue::Bytes(name.as_bytes().to_vec())))
}

fn write_array(dir: &Path, file_name: &str, array: &ArrayD<f32>) -> Result<PathBuf> {
    let path = dir.join(file_name);
    ndarray_npy::write_npy(&path, array)?;
    debug!("{} {:?}", file_name, array.shape());
    Ok(path)
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::paths;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub output: OutputConfig,
    pub babble: BabbleConfig,
    pub evotune: EvotuneConfig,
}

/// How the model runtime is launched.
///
/// A script is run as `<program> <args...> <script> <positional args...>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub program: String,
    pub args: Vec<String>,
    pub represent_script: PathBuf,
    pub babble_script: PathBuf,
    pub evotune_script: PathBuf,
    /// Directory the runtime is started from; the current directory when unset
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root for run directories; falls back to UNIREP_OUTPUT_DIR or ~/.unirep/outputs
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BabbleConfig {
    pub length: usize,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvotuneConfig {
    /// Upper bound on cross-validation splits; a batch never gets more splits than entries
    pub max_splits: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: "conda".to_string(),
            args: vec!["run".to_string(), "-n".to_string(), "unirep".to_string()],
            represent_script: PathBuf::from("scripts/rep.py"),
            babble_script: PathBuf::from("scripts/babble.py"),
            evotune_script: PathBuf::from("scripts/evotune.py"),
            working_dir: None,
        }
    }
}

impl Default for BabbleConfig {
    fn default() -> Self {
        Self {
            length: 250,
            temperature: 1.0,
        }
    }
}

impl Default for EvotuneConfig {
    fn default() -> Self {
        Self { max_splits: 5 }
    }
}

impl Config {
    /// Directory that run directories are created under
    pub fn output_root(&self) -> PathBuf {
        self.output
            .root
            .clone()
            .unwrap_or_else(paths::outputs_dir)
    }

    /// Directory for one named run
    pub fn run_dir(&self, run_name: &str) -> PathBuf {
        self.output_root().join(run_name)
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, crate::UniRepError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| crate::UniRepError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), crate::UniRepError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| crate::UniRepError::Config(format!("Failed to serialize config: {}", e)))?;
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Load the config from `path`, or from the default location when none is
/// given. A missing default file yields the defaults; a missing explicit file
/// is an error.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, crate::UniRepError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default_path = paths::config_path();
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

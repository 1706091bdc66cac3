use std::path::PathBuf;
use std::sync::OnceLock;

// Cache the paths to avoid repeated environment lookups
static UNIREP_HOME: OnceLock<PathBuf> = OnceLock::new();
static UNIREP_OUTPUT_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the UniRep home directory
/// Checks UNIREP_HOME environment variable, falls back to ${HOME}/.unirep
pub fn unirep_home() -> PathBuf {
    UNIREP_HOME
        .get_or_init(|| {
            if let Ok(path) = std::env::var("UNIREP_HOME") {
                PathBuf::from(path)
            } else {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".unirep")
            }
        })
        .clone()
}

/// Get the root directory for run outputs
/// Checks UNIREP_OUTPUT_DIR environment variable, falls back to UNIREP_HOME/outputs
pub fn outputs_dir() -> PathBuf {
    UNIREP_OUTPUT_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("UNIREP_OUTPUT_DIR") {
                PathBuf::from(path)
            } else {
                unirep_home().join("outputs")
            }
        })
        .clone()
}

/// Default config file location
pub fn config_path() -> PathBuf {
    unirep_home().join("config.toml")
}

/// Get a human-readable description of the current path configuration
pub fn describe_paths() -> String {
    format!(
        "UniRep Paths:\n  \
        Home: {}\n  \
        Outputs: {}\n  \
        Config: {}",
        unirep_home().display(),
        outputs_dir().display(),
        config_path().display(),
    )
}

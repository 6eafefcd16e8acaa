//! Solver executable configuration.
//!
//! Resolution order:
//!
//! 1. `SOLVERPIPE_SOLVER` / `SOLVERPIPE_SOLVER_ARGS` environment variables
//! 2. JSON config file: `$SOLVERPIPE_CONFIG`, else
//!    `<config dir>/solverpipe/config.json`
//! 3. Built-in default: `z3 -in`
//!
//! ```json
//! { "command": "cvc5", "args": ["--incremental", "--lang=smt2"] }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the solver executable.
pub const SOLVER_ENV: &str = "SOLVERPIPE_SOLVER";
/// Environment variable with whitespace-separated solver arguments.
pub const SOLVER_ARGS_ENV: &str = "SOLVERPIPE_SOLVER_ARGS";
/// Environment variable pointing at a config file.
pub const CONFIG_ENV: &str = "SOLVERPIPE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Solver command is empty")]
    EmptyCommand,
}

/// How to launch the solver process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments; the solver must read commands from stdin.
    pub args: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            command: "z3".to_string(),
            args: vec!["-in".to_string()],
        }
    }
}

impl SolverConfig {
    /// Resolve configuration from the environment and the config file.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => {
                tracing::info!("Using solver config from {}", path.display());
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides. `lookup` abstracts `std::env::var`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(command) = lookup(SOLVER_ENV).filter(|c| !c.trim().is_empty()) {
            self.command = command.trim().to_string();
        }
        if let Some(args) = lookup(SOLVER_ARGS_ENV) {
            self.args = args.split_whitespace().map(str::to_string).collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        Ok(())
    }
}

/// Location of the config file, if one can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("solverpipe").join("config.json"))
}

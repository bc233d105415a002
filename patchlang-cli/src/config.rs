//! `patch.toml`: per-project settings.
//!
//! ```toml
//! root = "title"
//! frames = 120
//!
//! [runtime]
//! seed = 42
//!
//! [globals]
//! lives = 3
//! names = ["ada", "bo"]
//! ```

use log::debug;
use patchlang_common::Value;
use patchlang_vm::RuntimeConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the project directory.
pub const CONFIG_FILE: &str = "patch.toml";

/// Errors reading or interpreting a project file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {message}")]
    Read { path: String, message: String },

    #[error("invalid patch.toml: {message}")]
    Parse { message: String },

    /// A `[globals]` entry with no script-level equivalent.
    #[error("global '{name}' has unsupported type {kind}")]
    UnsupportedGlobal { name: String, kind: &'static str },
}

/// Settings for one project directory. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Script spawned as the scene root.
    pub root: String,
    /// Frames `run` executes unless `--frames` overrides it.
    pub frames: u64,
    pub runtime: RuntimeConfig,
    /// Initial global values, applied over the built-in defaults.
    pub globals: BTreeMap<String, toml::Value>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: "_root".to_string(),
            frames: 600,
            runtime: RuntimeConfig::default(),
            globals: BTreeMap::new(),
        }
    }
}

impl ProjectConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Read `patch.toml` from `dir`. A missing file gives the defaults.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no {CONFIG_FILE} in {}, using defaults", dir.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// `[globals]` converted to script values. Names are lowercased to
    /// match the case-folded scripts that read them.
    pub fn initial_globals(&self) -> Result<Vec<(String, Value)>, ConfigError> {
        self.globals
            .iter()
            .map(|(name, value)| Ok((name.to_lowercase(), to_value(name, value)?)))
            .collect()
    }
}

fn to_value(name: &str, value: &toml::Value) -> Result<Value, ConfigError> {
    match value {
        toml::Value::Integer(n) => Ok(Value::Integer(*n)),
        toml::Value::Float(x) => Ok(Value::Float(*x)),
        toml::Value::String(s) => Ok(Value::String(s.clone())),
        toml::Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| to_value(name, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        other => Err(ConfigError::UnsupportedGlobal {
            name: name.to_string(),
            kind: other.type_str(),
        }),
    }
}

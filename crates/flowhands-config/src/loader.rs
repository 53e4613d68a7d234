//! Configuration loading.
//!
//! Files are TOML. Before parsing, every `${NAME}` reference is replaced by
//! the value of the environment variable `NAME`; an unset variable is an
//! error rather than an empty string.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::error::ConfigError;
use crate::schema::Config;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::Io(e),
        })?;
        Self::load_str(&raw)
    }

    pub fn load_str(raw: &str) -> Result<Config, ConfigError> {
        let substituted = Self::substitute_env(raw)?;
        Ok(toml::from_str(&substituted)?)
    }

    /// Load `path` if given, else the default file if it exists, else the
    /// built-in defaults. An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let fallback = Self::default_config_path();
        if fallback.is_file() {
            Self::load(&fallback)
        } else {
            Ok(Config::default())
        }
    }

    fn substitute_env(raw: &str) -> Result<String, ConfigError> {
        let env_ref = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| {
            ConfigError::InvalidValue {
                field: "env reference pattern".to_string(),
                message: e.to_string(),
            }
        })?;
        let mut missing = None;
        let substituted = env_ref.replace_all(raw, |caps: &Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            })
        });
        match missing {
            Some(name) => Err(ConfigError::EnvVarNotSet(name)),
            None => Ok(substituted.into_owned()),
        }
    }

    /// Expand a leading `~` to the home directory.
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// FlowHands home directory (`~/.flowhands`).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".flowhands"))
            .unwrap_or_else(|| PathBuf::from(".flowhands"))
    }

    /// Default configuration file (`~/.flowhands/config.toml`).
    pub fn default_config_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }
}

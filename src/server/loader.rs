//! Configuration loading
//!
//! Layers, lowest priority first:
//! 1. defaults compiled into the binary
//! 2. `{dir}/default`, `{dir}/{JOBWARDEN_ENV}` and `{dir}/local` when present
//! 3. the file named by `JOBWARDEN_CONFIG`, which must exist when set
//! 4. `JOBWARDEN_*` environment variables
//!
//! The merged result is validated before the worker sees it.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use std::path::{Path, PathBuf};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

const ENV_PREFIX: &str = "JOBWARDEN";
const DEFAULT_ENV_NAME: &str = "development";

/// Where configuration comes from
#[derive(Debug, Clone)]
pub struct ConfigSources {
    dir: PathBuf,
    env_name: String,
    file: Option<PathBuf>,
    vars: Option<Map<String, String>>,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("config"),
            env_name: DEFAULT_ENV_NAME.to_string(),
            file: None,
            vars: None,
        }
    }
}

impl ConfigSources {
    /// Sources selected by `JOBWARDEN_ENV` and `JOBWARDEN_CONFIG`
    pub fn from_env() -> Self {
        let mut sources = Self::default();
        if let Ok(name) = std::env::var("JOBWARDEN_ENV") {
            sources.env_name = name;
        }
        sources.file = std::env::var_os("JOBWARDEN_CONFIG").map(PathBuf::from);
        sources
    }

    /// Directory searched for layered files
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_env_name(mut self, name: impl Into<String>) -> Self {
        self.env_name = name.into();
        self
    }

    /// Explicit file applied after the layered files
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Read overrides from this map instead of the process environment
    pub fn with_vars(mut self, vars: Map<String, String>) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Merge every layer and validate the result
    pub fn load(self) -> Result<AppConfig> {
        let optional = |name: &str| File::with_name(&layer_path(&self.dir, name)).required(false);
        let mut builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(optional("default"))
            .add_source(optional(&self.env_name))
            .add_source(optional("local"));

        if let Some(path) = &self.file {
            if !path.exists() {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        // JOBWARDEN_SCHEDULER__MAX_CONCURRENT: single "_" after the prefix, "__" between keys.
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(self.vars),
            )
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }
}

fn layer_path(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    ConfigSources::from_env().load()
}

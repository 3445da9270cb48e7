use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::models::CheckpointConfig;
use crate::validation::{self, ConfigWarnings};

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &[
    "checkpoint.toml",
    "checkpoint.json",
    "config/checkpoint.toml",
];

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {origin}")]
    Toml {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid JSON in {origin}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse {origin}: toml error: {toml}; json error: {json}")]
    Unrecognized {
        origin: String,
        toml: String,
        json: String,
    },
    #[error("invalid registry base URL '{value}'")]
    InvalidBaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{name}='{value}' is not a valid value")]
    InvalidEnv { name: &'static str, value: String },
    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

/// Where the configuration document came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Environment inputs, gathered once so loading stays deterministic.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub base_url: Option<String>,
    pub establishment_id: Option<String>,
}

impl EnvOverrides {
    pub fn gather() -> Self {
        Self {
            config_path: non_blank_var("CHECKPOINT_CONFIG_PATH").map(PathBuf::from),
            config_json: non_blank_var("CHECKPOINT_CONFIG_JSON"),
            base_url: non_blank_var("CHECKPOINT_BASE_URL"),
            establishment_id: non_blank_var("CHECKPOINT_ESTABLISHMENT_ID"),
        }
    }
}

fn non_blank_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: CheckpointConfig,
    pub source: ConfigSource,
    pub env_file_loaded: bool,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    search_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Directory the default config files are looked up in. Defaults to the
    /// working directory.
    pub fn with_search_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.search_root = Some(root.into());
        self
    }

    /// Loads `.env`, then resolves and validates the configuration.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with(EnvOverrides::gather())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolves the configuration against an explicit environment snapshot.
    ///
    /// Evaluation order:
    /// 1) the path given to [`ConfigLoader::with_config_path`],
    /// 2) `$CHECKPOINT_CONFIG_PATH` (TOML or JSON file),
    /// 3) `$CHECKPOINT_CONFIG_JSON` (inline JSON),
    /// 4) the first default file that exists,
    /// 5) built-in defaults.
    ///
    /// Scalar overrides are applied on top of whichever source won.
    pub fn load_with(&self, env: EnvOverrides) -> Result<ConfigLoad, ConfigLoadError> {
        let (mut config, source) = self.resolve(&env)?;
        apply_overrides(&mut config, &env)?;
        let warnings = validation::validate(&config)?;

        info!(source = ?source, base_url = %config.registry.base_url, "configuration loaded");
        Ok(ConfigLoad {
            config,
            source,
            env_file_loaded: false,
            warnings,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn resolve(
        &self,
        env: &EnvOverrides,
    ) -> Result<(CheckpointConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.config_path {
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        if let Some(path) = &env.config_path {
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::EnvPath(path.clone())));
        }

        if let Some(raw) = &env.config_json {
            let config = parse_json(raw, "CHECKPOINT_CONFIG_JSON")?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        debug!("no configuration file found, using defaults");
        Ok((CheckpointConfig::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let root = self.search_root.as_deref().unwrap_or_else(|| Path::new("."));
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|path| path.exists())
    }
}

pub fn load_from_file(path: &Path) -> Result<CheckpointConfig, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::MissingConfig {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") | Some("tml") => {
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Toml { origin, source })
        }
        _ => parse_from_str(&contents, &origin),
    }
}

/// Tries TOML first, then JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> Result<CheckpointConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Unrecognized {
            origin: origin.to_string(),
            toml: toml_err.to_string(),
            json: json_err.to_string(),
        })
    })
}

pub fn parse_json(raw: &str, origin: &str) -> Result<CheckpointConfig, ConfigLoadError> {
    serde_json::from_str(raw).map_err(|source| ConfigLoadError::Json {
        origin: origin.to_string(),
        source,
    })
}

fn apply_overrides(
    config: &mut CheckpointConfig,
    env: &EnvOverrides,
) -> Result<(), ConfigLoadError> {
    if let Some(base_url) = &env.base_url {
        config.registry.base_url = base_url.trim().to_string();
    }
    if let Some(raw) = &env.establishment_id {
        config.registry.establishment_id =
            raw.trim()
                .parse()
                .map_err(|_| ConfigLoadError::InvalidEnv {
                    name: "CHECKPOINT_ESTABLISHMENT_ID",
                    value: raw.clone(),
                })?;
    }
    Ok(())
}

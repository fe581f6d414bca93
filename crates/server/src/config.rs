use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use betrace_engine::EngineConfig;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub rules_dir: String,
    /// HMAC key for violation signatures; omit to ship unsigned records.
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default)]
    pub engine: EngineOverrides,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EngineOverrides {
    pub max_rules: Option<usize>,
    pub eval_timeout_ms: Option<u64>,
    pub trace_window_seconds: Option<u64>,
    pub trace_max_spans: Option<usize>,
    pub ingest_queue: Option<usize>,
    pub ingest_block_ms: Option<u64>,
    pub error_budget: Option<u64>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Validation(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e)
    }
}

pub fn load_from_file(path: &Path) -> Result<ServerConfig, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(yaml: &str) -> Result<ServerConfig, LoadError> {
    let cfg: ServerConfig = serde_yaml::from_str(yaml)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &ServerConfig) -> Result<(), LoadError> {
    if cfg.listen.parse::<SocketAddr>().is_err() {
        return Err(LoadError::Validation(format!(
            "listen address '{}' is not host:port",
            cfg.listen
        )));
    }
    if cfg.rules_dir.is_empty() {
        return Err(LoadError::Validation("rules_dir must not be empty".into()));
    }
    if let Some(0) = cfg.engine.max_rules {
        return Err(LoadError::Validation("engine.max_rules must be > 0".into()));
    }
    Ok(())
}

impl ServerConfig {
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            signing_secret: self
                .signing_secret
                .as_ref()
                .map(|s| s.as_bytes().to_vec()),
            ..EngineConfig::default()
        };
        let overrides = &self.engine;
        if let Some(v) = overrides.max_rules {
            config.max_rules = v;
        }
        if let Some(v) = overrides.eval_timeout_ms {
            config.eval_timeout = Duration::from_millis(v);
        }
        if let Some(v) = overrides.trace_window_seconds {
            config.trace_window = Duration::from_secs(v);
        }
        if let Some(v) = overrides.trace_max_spans {
            config.trace_max_spans = v;
        }
        if let Some(v) = overrides.ingest_queue {
            config.ingest_queue = v;
        }
        if let Some(v) = overrides.ingest_block_ms {
            config.ingest_block = Duration::from_millis(v);
        }
        if let Some(v) = overrides.error_budget {
            config.error_budget = v;
        }
        config
    }
}

mod server;

pub use server::{ServerConfig, ServerTransport};

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "glm-4.7";
const DEFAULT_MAX_TURNS: usize = 50;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 0.8;

/// Everything the agent needs, constructed once at session creation and
/// passed down explicitly. No component reads ambient process state.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    /// Local tool names the session may use.
    pub allowed_tools: Vec<String>,
    pub servers: Vec<ServerConfig>,
    /// Working directory every path-based executor is confined to.
    pub cwd: PathBuf,
    pub max_turns: usize,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid server entry: {0}")]
    Server(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    model: Option<String>,
    system_prompt: Option<String>,
    #[serde(default)]
    allowed_tools: Vec<String>,
    #[serde(default)]
    servers: Vec<server::RawServer>,
    cwd: Option<String>,
    max_turns: Option<usize>,
    temperature: Option<f32>,
    top_p: Option<f32>,
}

impl AgentConfig {
    /// Loads a TOML config file. Without an explicit path the defaults are
    /// used; with one, a missing or unparsable file is fatal.
    pub fn load(path: Option<&Path>, fallback_cwd: PathBuf) -> Result<Self, ConfigError> {
        match path {
            Some(path) => read_config(path, fallback_cwd),
            None => {
                info!("no configuration file given; using defaults");
                Ok(Self::defaults(fallback_cwd))
            }
        }
    }

    pub fn defaults(cwd: PathBuf) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            allowed_tools: Vec::new(),
            servers: Vec::new(),
            cwd,
            max_turns: DEFAULT_MAX_TURNS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

fn read_config(path: &Path, fallback_cwd: PathBuf) -> Result<AgentConfig, ConfigError> {
    debug!(path = %path.display(), "reading agent configuration file");
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let servers = parsed
        .servers
        .into_iter()
        .map(|raw| raw.into_config().map_err(ConfigError::Server))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AgentConfig {
        model: parsed.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        system_prompt: parsed.system_prompt,
        allowed_tools: parsed.allowed_tools,
        servers,
        cwd: parsed.cwd.map(PathBuf::from).unwrap_or(fallback_cwd),
        max_turns: parsed.max_turns.unwrap_or(DEFAULT_MAX_TURNS),
        temperature: parsed.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        top_p: parsed.top_p.unwrap_or(DEFAULT_TOP_P),
    })
}

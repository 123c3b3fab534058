//! Application configuration
//!
//! Values are layered: built-in defaults, then the optional TOML file named
//! by `TRAVEL_PLANNER_CONFIG`, then environment variables. The model
//! credential is the only required value; without it the service refuses to
//! start.

pub mod file;
pub mod prompts;

use std::env;
use std::path::PathBuf;

pub use file::FileConfig;
pub use prompts::{builtin as prompts_builtin, PromptError, PromptTemplate};

use crate::providers::GeminiConfig;

/// Environment variable naming the optional config file
pub const CONFIG_PATH_ENV: &str = "TRAVEL_PLANNER_CONFIG";

/// Default environment variable holding the model credential
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub gemini: GeminiConfig,
    pub system_prompt: String,
}

impl Config {
    /// Load from the process environment and the optional config file
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path.trim());
                tracing::info!("Loading configuration from {}", path.display());
                FileConfig::from_file(&path)?
            }
            _ => FileConfig::default(),
        };

        Self::resolve(file, |key| env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups.
    ///
    /// Blank values count as absent. The credential comes from the variable
    /// named by `gemini.api_key_env` (default `GEMINI_API_KEY`), falling back
    /// to `gemini.api_key` from the file.
    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| non_blank(lookup(key));

        let api_key_env = non_blank(file.gemini.api_key_env)
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let api_key = var(&api_key_env)
            .or_else(|| non_blank(file.gemini.api_key))
            .ok_or_else(|| ConfigError::MissingApiKey {
                env_var: api_key_env.clone(),
            })?;

        let port = match var("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: '{raw}'")))?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        let host = var("HOST")
            .or(non_blank(file.server.host))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let static_dir = var("STATIC_DIR")
            .map(PathBuf::from)
            .or(file.server.static_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let mut gemini = GeminiConfig::new(api_key);
        if let Some(model) = var("GEMINI_MODEL").or(non_blank(file.gemini.model)) {
            gemini.model = model;
        }
        if let Some(url) = var("GEMINI_BASE_URL").or(non_blank(file.gemini.base_url)) {
            gemini.base_url = url.trim_end_matches('/').to_string();
        }
        gemini.temperature = file.gemini.temperature;
        gemini.max_output_tokens = file.gemini.max_output_tokens;

        let system_prompt = match (
            non_blank(file.assistant.system_prompt),
            file.assistant.prompt_file,
        ) {
            (Some(inline), _) => inline,
            (None, Some(path)) => PromptTemplate::from_file(&path)?.system_prompt.content,
            (None, None) => prompts_builtin::TRAVEL_PLANNER.to_string(),
        };

        Ok(Self {
            host,
            port,
            static_dir,
            gemini,
            system_prompt,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

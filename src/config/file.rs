//! Optional TOML configuration file
//!
//! Every field is optional; anything left out falls back to the environment
//! or to a built-in default.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//! static_dir = "static"
//!
//! [gemini]
//! api_key_env = "GEMINI_API_KEY"
//! model = "gemini-2.5-flash"
//! temperature = 0.7
//! max_output_tokens = 8192
//!
//! [assistant]
//! prompt_file = "prompts/backpacker.toml"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigError;

/// Root of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub gemini: GeminiSection,

    #[serde(default)]
    pub assistant: AssistantSection,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Directory holding index.html and friends
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

/// Model provider settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiSection {
    /// Inline credential. The environment variable wins when both are set.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name of the environment variable holding the credential
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

/// Persona settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantSection {
    /// Inline system prompt; takes precedence over `prompt_file`
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Persona file, see [`super::prompts::PromptTemplate`]
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
}

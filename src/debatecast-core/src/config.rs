//! Configuration module for loading TOML config files and environment overrides.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::persona::Persona;

pub const NEWS_API_KEY_VAR: &str = "NEWS_API_KEY";
pub const OPENROUTER_API_KEY_VAR: &str = "OPENROUTER_API_KEY";
pub const ELEVENLABS_API_KEY_VAR: &str = "ELEVENLABS_API_KEY";
pub const CARNEGIE_VOICE_VAR: &str = "ELEVENLABS_CARNEGIE_VOICE_ID";
pub const MELLON_VOICE_VAR: &str = "ELEVENLABS_MELLON_VOICE_ID";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelsConfig,
    pub endpoints: EndpointsConfig,
    pub voices: VoicesConfig,
    pub storage: StorageConfig,
    pub news: NewsConfig,
    pub server: ServerConfig,
    /// Never read from TOML, only from the environment.
    #[serde(skip)]
    pub keys: ApiKeys,
}

/// Model identifiers routed through OpenRouter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub analysis: String,
    pub script: String,
    pub categorization: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            analysis: "perplexity/sonar-pro-search".to_string(),
            script: "openai/gpt-4o".to_string(),
            categorization: "anthropic/claude-3.5-sonnet".to_string(),
        }
    }
}

/// Base URLs of the external services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub news_api: String,
    pub openrouter: String,
    pub elevenlabs: String,
    /// Request timeout for every outbound call, in seconds.
    pub timeout_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            news_api: "https://newsapi.org/v2".to_string(),
            openrouter: "https://openrouter.ai/api/v1".to_string(),
            elevenlabs: "https://api.elevenlabs.io".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub carnegie_voice: String,
    pub mellon_voice: String,
    pub tts_model: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            // Adam
            carnegie_voice: "pNInz6obpgDQGcFmaJgB".to_string(),
            // Arnold
            mellon_voice: "VR6AewLTigWG4xSOukaG".to_string(),
            tts_model: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
        }
    }
}

impl VoicesConfig {
    /// Get voice ID for a persona.
    pub fn voice_for(&self, persona: Persona) -> &str {
        match persona {
            Persona::Carnegie => &self.carnegie_voice,
            Persona::Mellon => &self.mellon_voice,
        }
    }
}

/// Where results, scripts and audio land on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub results_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub script_file: PathBuf,
    /// Run the audio stage as part of `/api/analyze`.
    pub synthesize_audio: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            audio_dir: PathBuf::from("audio_output"),
            script_file: PathBuf::from("new_script.txt"),
            synthesize_audio: true,
        }
    }
}

/// News fetching and trending-topic settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub days_back: i64,
    pub max_articles: usize,
    /// How many articles are summarized for category generation.
    pub summary_articles: usize,
    pub num_categories: usize,
    pub fallback_topics: Vec<String>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            days_back: 3,
            max_articles: 20,
            summary_articles: 10,
            num_categories: 5,
            fallback_topics: [
                "Government funding",
                "Election updates",
                "Foreign policy",
                "Healthcare reform",
                "Climate policy",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// API keys for the three external services.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub news_api: Option<String>,
    pub openrouter: Option<String>,
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ApiKeys")
            .field("news_api", &redact(&self.news_api))
            .field("openrouter", &redact(&self.openrouter))
            .field("elevenlabs", &redact(&self.elevenlabs))
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PipelineError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Load configuration from string content.
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        toml::from_str(content)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Overlay API keys and voice ids from the environment.
    ///
    /// Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        self.keys.news_api = get(NEWS_API_KEY_VAR);
        self.keys.openrouter = get(OPENROUTER_API_KEY_VAR);
        self.keys.elevenlabs = get(ELEVENLABS_API_KEY_VAR);

        if let Some(voice) = get(CARNEGIE_VOICE_VAR) {
            self.voices.carnegie_voice = voice;
        }
        if let Some(voice) = get(MELLON_VOICE_VAR) {
            self.voices.mellon_voice = voice;
        }
    }

    /// Overlay the process environment.
    pub fn with_process_env(mut self) -> Self {
        self.apply_env(|name| std::env::var(name).ok());
        self
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [models]
            script = "anthropic/claude-3.5-sonnet"

            [storage]
            audio_dir = "/tmp/audio"
            "#,
        )
        .unwrap();

        assert_eq!(config.models.script, "anthropic/claude-3.5-sonnet");
        assert_eq!(config.models.analysis, "perplexity/sonar-pro-search");
        assert_eq!(config.storage.audio_dir, PathBuf::from("/tmp/audio"));
        assert_eq!(config.storage.results_dir, PathBuf::from("results"));
        assert_eq!(config.news.fallback_topics.len(), 5);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("models = 3").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn test_apply_env_overrides_keys_and_voices() {
        let env: HashMap<&str, &str> = [
            (OPENROUTER_API_KEY_VAR, "sk-or"),
            (NEWS_API_KEY_VAR, "  "),
            (MELLON_VOICE_VAR, "voice-m"),
        ]
        .into_iter()
        .collect();

        let mut config = default_config();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.keys.openrouter.as_deref(), Some("sk-or"));
        assert!(config.keys.news_api.is_none());
        assert!(config.keys.elevenlabs.is_none());
        assert_eq!(config.voices.voice_for(Persona::Mellon), "voice-m");
        assert_eq!(config.voices.voice_for(Persona::Carnegie), "pNInz6obpgDQGcFmaJgB");
    }

    #[test]
    fn test_api_keys_debug_is_redacted() {
        let keys = ApiKeys {
            openrouter: Some("secret".to_string()),
            ..Default::default()
        };
        let printed = format!("{:?}", keys);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));
    }
}

use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::chatbot::gemini::{default_safety_settings, GenerationConfig, GeminiSettings, SafetySetting};
use crate::chatbot::message::MAX_CHUNK_LEN;
use crate::chatbot::router::trigger_regex;
use crate::chatbot::ChatbotConfig;
use crate::classifier::{default_identity_keywords, default_time_keywords, Keywords};

pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const GEMINI_KEY_ENVS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY"];

const DEFAULT_PERSONA: &str = "To imbue your AI with the distinctive persona of J.A.R.V.I.S., the core directive \
is to consistently emulate his sophisticated, calm, and logically precise demeanor as observed in the Marvel \
Cinematic Universe. Address the user as \"Sir\", keep answers concise and analytical, and never break character.";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Trigger phrases could not be compiled.
    InvalidRegex { pattern: String, source: regex::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::InvalidRegex { pattern, source } => {
                write!(f, "invalid regex pattern '{}': {}", pattern, source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    /// Used only when TELEGRAM_BOT_TOKEN is unset.
    telegram_bot_token: Option<String>,
    /// Used only when GOOGLE_API_KEY / GEMINI_API_KEY are unset.
    gemini_api_key: Option<String>,
    model: Option<String>,
    /// System instruction for the model.
    persona: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    max_output_tokens: Option<u32>,
    safety_settings: Option<Vec<SafetySetting>>,
    max_history_pairs: Option<usize>,
    max_sessions: Option<usize>,
    /// Prefixes that address the bot in group chats (e.g. ["hey jarvis", "jarvis"]).
    trigger_phrases: Option<Vec<String>>,
    time_keywords: Option<Vec<String>>,
    identity_keywords: Option<Vec<String>>,
    identity_reply: Option<String>,
    acknowledgement: Option<String>,
    apology: Option<String>,
    no_answer: Option<String>,
    image_prompt: Option<String>,
    persist_failures: Option<bool>,
    /// DuckDuckGo-compatible instant answer endpoint; unset disables web search.
    web_search_url: Option<String>,
    max_chunk_len: Option<usize>,
    request_timeout_secs: Option<u64>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub gemini: GeminiSettings,
    pub chatbot: ChatbotConfig,
    /// Compiled trigger phrases (None when no phrases are configured).
    pub trigger: Option<Regex>,
    pub web_search_url: Option<String>,
    pub max_chunk_len: usize,
    pub request_timeout_secs: u64,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from a JSON file, taking secrets from the process environment first.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        Self::build(file, |key| std::env::var(key).ok())
    }

    /// Defaults plus secrets from the environment, for running without a config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(ConfigFile::default(), |key| std::env::var(key).ok())
    }

    fn build(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let telegram_bot_token = lookup(&env, &[TELEGRAM_TOKEN_ENV])
            .or(file.telegram_bot_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::Validation(format!("{TELEGRAM_TOKEN_ENV} is required")))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram bot token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let gemini_api_key = lookup(&env, GEMINI_KEY_ENVS)
            .or(file.gemini_api_key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::Validation(format!("{} is required", GEMINI_KEY_ENVS[0])))?;

        let max_history_pairs = file.max_history_pairs.unwrap_or(10);
        if max_history_pairs == 0 {
            return Err(ConfigError::Validation("max_history_pairs must be at least 1".into()));
        }
        if file.max_sessions == Some(0) {
            return Err(ConfigError::Validation("max_sessions must be at least 1".into()));
        }

        let trigger_phrases = file
            .trigger_phrases
            .unwrap_or_else(|| vec!["hey jarvis".to_string(), "jarvis".to_string()]);
        let trigger = trigger_regex(&trigger_phrases).map_err(|e| ConfigError::InvalidRegex {
            pattern: trigger_phrases.join("|"),
            source: e,
        })?;

        let request_timeout_secs = file.request_timeout_secs.unwrap_or(120);
        let defaults = GenerationConfig::default();
        let gemini = GeminiSettings {
            api_key: gemini_api_key,
            model: file.model.unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            persona: file.persona.unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            generation: GenerationConfig {
                temperature: file.temperature.unwrap_or(defaults.temperature),
                top_p: file.top_p.unwrap_or(defaults.top_p),
                top_k: file.top_k.unwrap_or(defaults.top_k),
                max_output_tokens: file.max_output_tokens.unwrap_or(defaults.max_output_tokens),
            },
            safety_settings: file.safety_settings.unwrap_or_else(default_safety_settings),
            timeout_secs: request_timeout_secs,
        };

        let base = ChatbotConfig::default();
        let chatbot = ChatbotConfig {
            max_history_pairs,
            max_sessions: file.max_sessions,
            keywords: Keywords::new(
                file.time_keywords.unwrap_or_else(default_time_keywords),
                file.identity_keywords.unwrap_or_else(default_identity_keywords),
            ),
            acknowledgement: file.acknowledgement.unwrap_or(base.acknowledgement),
            identity_reply: file.identity_reply.unwrap_or(base.identity_reply),
            apology: file.apology.unwrap_or(base.apology),
            no_answer: file.no_answer.unwrap_or(base.no_answer),
            image_prompt: file.image_prompt.unwrap_or(base.image_prompt),
            persist_failures: file.persist_failures.unwrap_or(base.persist_failures),
        };

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token,
            gemini,
            chatbot,
            trigger,
            web_search_url: file.web_search_url.filter(|u| !u.trim().is_empty()),
            max_chunk_len: file.max_chunk_len.unwrap_or(MAX_CHUNK_LEN).max(1),
            request_timeout_secs,
            data_dir,
        })
    }
}

/// First non-blank value among `keys`.
fn lookup(env: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| env(k))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TOKEN: &str = "123456789:ABCdefGHIjklMNOpqrsTUVwxyz";

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn parse(content: &str) -> ConfigFile {
        serde_json::from_str(content).unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_defaults_from_env_only() {
        let config = Config::build(
            ConfigFile::default(),
            env(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("GOOGLE_API_KEY", "g-key")]),
        )
        .expect("should load");

        assert_eq!(config.telegram_bot_token, TOKEN);
        assert_eq!(config.gemini.api_key, "g-key");
        assert_eq!(config.gemini.generation, GenerationConfig::default());
        assert_eq!(config.gemini.safety_settings.len(), 4);
        assert_eq!(config.chatbot.max_history_pairs, 10);
        assert!(config.chatbot.persist_failures);
        assert_eq!(config.max_chunk_len, 2000);
        assert!(config.web_search_url.is_none());
        assert!(config.trigger.unwrap().is_match("Hey Jarvis, hi"));
    }

    #[test]
    fn test_env_overrides_file_secrets() {
        let file = parse(r#"{"telegram_bot_token": "1:file", "gemini_api_key": "file-key"}"#);
        let config = Config::build(
            file,
            env(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("GEMINI_API_KEY", "env-key")]),
        )
        .unwrap();

        assert_eq!(config.telegram_bot_token, TOKEN);
        assert_eq!(config.gemini.api_key, "env-key");
    }

    #[test]
    fn test_file_secrets_used_when_env_missing() {
        let file = parse(r#"{"telegram_bot_token": "42:secret", "gemini_api_key": "file-key"}"#);
        let config = Config::build(file, env(&[])).unwrap();

        assert_eq!(config.telegram_bot_token, "42:secret");
        assert_eq!(config.gemini.api_key, "file-key");
    }

    #[test]
    fn test_missing_telegram_token() {
        let err = assert_err(Config::build(ConfigFile::default(), env(&[("GOOGLE_API_KEY", "k")])));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_missing_api_key() {
        let err = assert_err(Config::build(
            ConfigFile::default(),
            env(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("GOOGLE_API_KEY", "  ")]),
        ));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let err = assert_err(Config::build(
                ConfigFile::default(),
                env(&[("TELEGRAM_BOT_TOKEN", token), ("GOOGLE_API_KEY", "k")]),
            ));
            assert!(matches!(err, ConfigError::Validation(_)), "token {token}");
        }
    }

    #[test]
    fn test_zero_history_rejected() {
        let file = parse(r#"{"max_history_pairs": 0}"#);
        let err = assert_err(Config::build(
            file,
            env(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("GOOGLE_API_KEY", "k")]),
        ));
        assert!(err.to_string().contains("max_history_pairs"));
    }

    #[test]
    fn test_overrides_pass_through() {
        let file = parse(
            r#"{
                "model": "gemini-pro",
                "temperature": 0.2,
                "top_k": 40,
                "safety_settings": [{"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"}],
                "max_history_pairs": 4,
                "max_sessions": 100,
                "trigger_phrases": [],
                "time_keywords": ["CLOCK"],
                "persist_failures": false,
                "web_search_url": "https://api.duckduckgo.com/",
                "max_chunk_len": 4096
            }"#,
        );
        let config = Config::build(
            file,
            env(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("GOOGLE_API_KEY", "k")]),
        )
        .unwrap();

        assert_eq!(config.gemini.model, "gemini-pro");
        assert_eq!(config.gemini.generation.temperature, 0.2);
        assert_eq!(config.gemini.generation.top_k, 40);
        assert_eq!(config.gemini.generation.top_p, 1.0);
        assert_eq!(config.gemini.safety_settings[0].threshold, "BLOCK_NONE");
        assert_eq!(config.chatbot.max_history_pairs, 4);
        assert_eq!(config.chatbot.max_sessions, Some(100));
        assert!(config.trigger.is_none());
        assert_eq!(config.chatbot.keywords.time, vec!["clock".to_string()]);
        assert!(!config.chatbot.persist_failures);
        assert_eq!(config.web_search_url.as_deref(), Some("https://api.duckduckgo.com/"));
        assert_eq!(config.max_chunk_len, 4096);
    }

    #[test]
    fn test_oversized_trigger_phrase_rejected() {
        // Escaped, but still past the regex compiler's size limit
        let file = ConfigFile {
            trigger_phrases: Some(vec!["jarvis".repeat(300_000)]),
            ..Default::default()
        };
        let err = assert_err(Config::build(
            file,
            env(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("GOOGLE_API_KEY", "k")]),
        ));
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
        assert!(err.to_string().starts_with("invalid regex pattern"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EpistleError, Result};

/// Top-level epistle configuration.
///
/// Loaded from a TOML file with `${ENV_VAR}` expansion, or assembled
/// directly from the environment when no file is present (the credentials
/// the flows need are all expressible as env vars).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub email: EmailFlowConfig,
    #[serde(default)]
    pub roleplay: RolePlayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            web_search: None,
            smtp: None,
            email: EmailFlowConfig::default(),
            roleplay: RolePlayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_provider() -> String { "gemini".to_string() }
fn default_model_id() -> String { "gemini-2.5-flash".to_string() }
fn default_max_tokens() -> u32 { 8192 }
fn default_temperature() -> f32 { 0.4 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    #[serde(default = "default_search_max_results")]
    pub max_results: u64,
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_max_results() -> u64 { 2 }

/// SMTP delivery configuration. The username doubles as the From address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

fn default_smtp_host() -> String { "smtp.gmail.com".to_string() }
fn default_smtp_port() -> u16 { 465 }

/// Email pipeline defaults applied when the caller leaves fields blank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailFlowConfig {
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_sender_name")]
    pub default_sender: String,
}

impl Default for EmailFlowConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            default_sender: default_sender_name(),
        }
    }
}

fn default_language() -> String { "English".to_string() }
fn default_sender_name() -> String { "AI Writer".to_string() }

/// Role-play pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePlayConfig {
    /// Higher temperature for more creative role-playing.
    #[serde(default = "default_roleplay_temperature")]
    pub temperature: f32,
    #[serde(default = "default_roleplay_max_results")]
    pub search_max_results: u64,
}

impl Default for RolePlayConfig {
    fn default() -> Self {
        Self {
            temperature: default_roleplay_temperature(),
            search_max_results: default_roleplay_max_results(),
        }
    }
}

fn default_roleplay_temperature() -> f32 { 0.7 }
fn default_roleplay_max_results() -> u64 { 1 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| EpistleError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| EpistleError::Config(e.to_string()))
    }

    /// Assemble a config from the process environment.
    ///
    /// Recognized variables: GEMINI_API_KEY (or GOOGLE_API_KEY),
    /// TAVILY_API_KEY, SENDER_EMAIL, SENDER_PASSWORD.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.fill_from_env();
        config
    }

    /// Load the file if it exists, otherwise fall back to the environment.
    /// Either way, credentials absent from the file are picked up from env.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.fill_from_env();
        Ok(config)
    }

    fn fill_from_env(&mut self) {
        if self.model.api_key.is_none() {
            self.model.api_key = std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("GOOGLE_API_KEY"))
                .ok();
        }
        if self.web_search.is_none() {
            if let Ok(key) = std::env::var("TAVILY_API_KEY") {
                self.web_search = Some(WebSearchConfig {
                    provider: default_search_provider(),
                    api_key: key,
                    max_results: default_search_max_results(),
                });
            }
        }
        if self.smtp.is_none() {
            if let (Ok(user), Ok(pass)) = (
                std::env::var("SENDER_EMAIL"),
                std::env::var("SENDER_PASSWORD"),
            ) {
                self.smtp = Some(SmtpConfig {
                    host: default_smtp_host(),
                    port: default_smtp_port(),
                    username: user,
                    password: pass,
                });
            }
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_EPISTLE_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_EPISTLE_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_EPISTLE_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_EPISTLE_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_EPISTLE_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
api_key = "test-key"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.model.model_id, "gemini-2.5-flash");
        assert_eq!(config.model.temperature, 0.4);
        assert_eq!(config.email.default_language, "English");
        assert_eq!(config.email.default_sender, "AI Writer");
        assert_eq!(config.roleplay.temperature, 0.7);
        assert_eq!(config.roleplay.search_max_results, 1);
        assert!(config.web_search.is_none());
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_smtp_defaults() {
        let toml_str = r#"
[smtp]
username = "me@example.com"
password = "app-password"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.gmail.com");
        assert_eq!(smtp.port, 465);
    }

    #[test]
    fn test_search_defaults() {
        let toml_str = r#"
[web_search]
api_key = "tvly-test"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let search = config.web_search.unwrap();
        assert_eq!(search.provider, "tavily");
        assert_eq!(search.max_results, 2);
    }
}

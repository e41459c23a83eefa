pub mod providers;

use epistle_core::config::ModelConfig;
use epistle_core::error::{EpistleError, Result};
use epistle_core::traits::LanguageModel;

pub use providers::gemini::GeminiClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "gemini" | "google" => Ok(Box::new(GeminiClient::new())),
        other => Err(EpistleError::UnsupportedProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_gemini_client() {
        let config = ModelConfig::default();
        assert!(create_client(&config).is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ModelConfig {
            provider: "carrier-pigeon".into(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            create_client(&config),
            Err(EpistleError::UnsupportedProvider(_))
        ));
    }
}

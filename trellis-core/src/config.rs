//! Settings model persisted as `settings.json`.
//!
//! All fields carry serde defaults so a partial settings file loads cleanly;
//! unknown vendors fall back to the baseline provider with a warning rather
//! than failing the whole app.

use crate::error::{ConfigError, TrellisError, TrellisResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Baseline provider id used when the configured one is unrecognized.
pub const BASELINE_PROVIDER: &str = "openai";

/// Per-vendor LLM connection settings.
///
/// The same shape serves every vendor; which fields are required is decided
/// by the provider constructor (e.g. Ollama needs no API key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key. Empty means "not configured".
    pub api_key: String,
    /// Model identifier sent with every completion request.
    pub model: String,
    /// Base URL override. `None` means the vendor default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sampling temperature. `None` means the built-in default (0.7).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion token cap. `None` means the built-in default (2000).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Config with just a model name set.
    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }
}

/// LLM settings: the active provider id plus one config block per vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Active provider id: `openai`, `deepseek`, `ollama` or `custom`.
    pub provider: String,
    pub openai: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub ollama: ProviderConfig,
    pub custom: ProviderConfig,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: BASELINE_PROVIDER.to_string(),
            openai: ProviderConfig::with_model("gpt-4o-mini"),
            deepseek: ProviderConfig::with_model("deepseek-chat"),
            ollama: ProviderConfig {
                model: "llama3.1".to_string(),
                base_url: Some("http://localhost:11434".to_string()),
                ..ProviderConfig::default()
            },
            custom: ProviderConfig::default(),
        }
    }
}

impl LlmSettings {
    /// The provider id to actually build, falling back to the baseline when
    /// the configured id is not one we recognize.
    pub fn active_provider(&self) -> &str {
        match self.provider.as_str() {
            "openai" | "deepseek" | "ollama" | "custom" => &self.provider,
            other => {
                warn!(
                    provider = other,
                    fallback = BASELINE_PROVIDER,
                    "unrecognized LLM provider id, using baseline"
                );
                BASELINE_PROVIDER
            }
        }
    }

    /// The config block for a given vendor id, baseline when unrecognized.
    pub fn config_for(&self, provider: &str) -> &ProviderConfig {
        match provider {
            "deepseek" => &self.deepseek,
            "ollama" => &self.ollama,
            "custom" => &self.custom,
            _ => &self.openai,
        }
    }
}

/// Web-search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Search provider id: `mock` or `tavily`.
    pub provider: String,
    /// API key for providers that need one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            api_key: None,
        }
    }
}

/// Workbench-level project settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectSettings {
    /// Directory of the most recently opened project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_path: Option<String>,
}

/// Root settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub project: ProjectSettings,
}

impl AppSettings {
    /// Validate the settings.
    /// Returns Ok(()) if valid, Err(TrellisError::Config) if invalid.
    ///
    /// Validates:
    /// - provider id is non-empty
    /// - every configured temperature is within [0.0, 2.0]
    /// - every configured max_tokens is at least 1
    pub fn validate(&self) -> TrellisResult<()> {
        if self.llm.provider.trim().is_empty() {
            return Err(TrellisError::Config(ConfigError::MissingRequired {
                field: "llm.provider".to_string(),
            }));
        }

        for (vendor, config) in [
            ("openai", &self.llm.openai),
            ("deepseek", &self.llm.deepseek),
            ("ollama", &self.llm.ollama),
            ("custom", &self.llm.custom),
        ] {
            if let Some(temperature) = config.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(TrellisError::Config(ConfigError::InvalidValue {
                        field: format!("llm.{}.temperature", vendor),
                        value: temperature.to_string(),
                        reason: "temperature must be between 0.0 and 2.0".to_string(),
                    }));
                }
            }

            if let Some(max_tokens) = config.max_tokens {
                if max_tokens == 0 {
                    return Err(TrellisError::Config(ConfigError::InvalidValue {
                        field: format!("llm.{}.max_tokens", vendor),
                        value: max_tokens.to_string(),
                        reason: "max_tokens must be at least 1".to_string(),
                    }));
                }
            }
        }

        if self.search.provider.trim().is_empty() {
            return Err(TrellisError::Config(ConfigError::MissingRequired {
                field: "search.provider".to_string(),
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = AppSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.llm.provider, "openai");
        assert_eq!(settings.llm.openai.model, "gpt-4o-mini");
        assert_eq!(settings.llm.deepseek.model, "deepseek-chat");
        assert_eq!(
            settings.llm.ollama.base_url.as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(settings.search.provider, "mock");
    }

    #[test]
    fn test_empty_provider_rejected() {
        let mut settings = AppSettings::default();
        settings.llm.provider = "  ".to_string();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, TrellisError::Config(_)));
        assert!(format!("{}", err).contains("llm.provider"));
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let mut settings = AppSettings::default();
        settings.llm.deepseek.temperature = Some(5.0);
        let err = settings.validate().unwrap_err();
        assert!(format!("{}", err).contains("llm.deepseek.temperature"));
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let mut settings = AppSettings::default();
        settings.llm.custom.max_tokens = Some(0);
        let err = settings.validate().unwrap_err();
        assert!(format!("{}", err).contains("llm.custom.max_tokens"));
    }

    #[test]
    fn test_boundary_temperatures_accepted() {
        let mut settings = AppSettings::default();
        settings.llm.openai.temperature = Some(0.0);
        assert!(settings.validate().is_ok());
        settings.llm.openai.temperature = Some(2.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_active_provider_falls_back_to_baseline() {
        let mut settings = LlmSettings::default();
        settings.provider = "gemini".to_string();
        assert_eq!(settings.active_provider(), "openai");

        settings.provider = "deepseek".to_string();
        assert_eq!(settings.active_provider(), "deepseek");
    }

    #[test]
    fn test_config_for_maps_vendors() {
        let settings = LlmSettings::default();
        assert_eq!(settings.config_for("deepseek").model, "deepseek-chat");
        assert_eq!(settings.config_for("openai").model, "gpt-4o-mini");
        assert_eq!(settings.config_for("ollama").model, "llama3.1");
        // Unknown ids map to the baseline block.
        assert_eq!(settings.config_for("nope").model, "gpt-4o-mini");
    }

    #[test]
    fn test_partial_settings_file_gets_defaults() {
        let json = r#"{"llm": {"provider": "deepseek"}}"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.llm.provider, "deepseek");
        // Untouched sections come back as defaults.
        assert_eq!(settings.llm.openai.model, "gpt-4o-mini");
        assert_eq!(settings.search.provider, "mock");
        assert!(settings.project.last_used_path.is_none());
    }

    #[test]
    fn test_settings_round_trip() {
        let mut settings = AppSettings::default();
        settings.llm.provider = "ollama".to_string();
        settings.llm.ollama.temperature = Some(0.2);
        settings.search.provider = "tavily".to_string();
        settings.search.api_key = Some("tvly-test".to_string());
        settings.project.last_used_path = Some("/tmp/projects/demo".to_string());

        let json = serde_json::to_string(&settings).unwrap();
        let back: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn test_unknown_fields_dropped_on_load() {
        let json = r#"{"llm": {"provider": "openai"}, "telemetry": {"enabled": true}}"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.llm.provider, "openai");
        let back = serde_json::to_string(&settings).unwrap();
        assert!(!back.contains("telemetry"));
    }
}

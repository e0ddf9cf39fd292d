//! Environment-backed configuration shared by every showcase.

use std::fmt;

use tracing::warn;

use crate::error::ProviderError;
use crate::llm::WatsonxModelConfig;

pub const PROJECT_ID_VAR: &str = "WATSONX_PROJECT_ID";
pub const API_KEY_VAR: &str = "WATSONX_API_KEY";
pub const URL_VAR: &str = "WATSONX_URL";
pub const MODEL_ID_VAR: &str = "WATSONX_MODEL_ID";

const PROJECT_ID_PLACEHOLDER: &str = "your-project-id";
const API_KEY_PLACEHOLDER: &str = "your-api-key";

/// Connection settings for the hosted model.
///
/// Built once by the caller and passed by reference to each adapter. Fields
/// stay optional so that an incomplete environment can still be reported by
/// [`Config::validate`] instead of failing at construction.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model_id: Option<String>,
}

impl Config {
    pub fn new(
        project_id: impl Into<String>,
        api_key: impl Into<String>,
        url: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: Some(project_id.into()),
            api_key: Some(api_key.into()),
            url: Some(url.into()),
            model_id: Some(model_id.into()),
        }
    }

    /// Reads the four `WATSONX_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            project_id: lookup(PROJECT_ID_VAR),
            api_key: lookup(API_KEY_VAR),
            url: lookup(URL_VAR),
            model_id: lookup(MODEL_ID_VAR),
        }
    }

    /// Returns `true` when every field is set, non-empty, and not one of the
    /// template placeholders. Logs a single warning otherwise.
    pub fn validate(&self) -> bool {
        let is_valid = present_and_not(self.project_id.as_deref(), PROJECT_ID_PLACEHOLDER)
            && present_and_not(self.api_key.as_deref(), API_KEY_PLACEHOLDER)
            && present(self.url.as_deref())
            && present(self.model_id.as_deref());

        if !is_valid {
            warn!(
                "Configuration not fully set. Please ensure project_id, api_key, url, and model_id are correctly configured."
            );
        }

        is_valid
    }

    pub fn model_label(&self) -> &str {
        self.model_id.as_deref().unwrap_or("<unset>")
    }

    /// Client settings for one adapter at the given sampling temperature.
    pub fn model_config(&self, temperature: Option<f32>) -> Result<WatsonxModelConfig, ProviderError> {
        let mut config = WatsonxModelConfig::new(
            required(self.api_key.as_deref(), API_KEY_VAR)?,
            required(self.project_id.as_deref(), PROJECT_ID_VAR)?,
            required(self.url.as_deref(), URL_VAR)?,
            required(self.model_id.as_deref(), MODEL_ID_VAR)?,
        );
        config.temperature = temperature;
        Ok(config)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("url", &self.url)
            .field("model_id", &self.model_id)
            .finish()
    }
}

fn present(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

fn present_and_not(value: Option<&str>, placeholder: &str) -> bool {
    value.is_some_and(|value| !value.is_empty() && value != placeholder)
}

fn required<'a>(value: Option<&'a str>, var: &str) -> Result<&'a str, ProviderError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProviderError::Config(format!("{var} is not set")))
}

fn redact(secret: &str) -> String {
    let prefix = secret.chars().take(5).collect::<String>();
    format!("{prefix}...")
}

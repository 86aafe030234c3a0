use std::path::Path;

use serde::Deserialize;
use taskwatch::job::artifact::ArtifactEndpoints;

use crate::HttpClientError;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "TASKWATCH_BASE_URL";

/// Connection settings for [`crate::HttpTaskClient`].
///
/// Every field is optional in the TOML file:
///
/// ```
/// # use taskwatch_http::ClientConfig;
/// let config: ClientConfig = r#"
/// base_url = "https://tools.example.com/api/v1"
/// timeout_secs = 10
///
/// [artifacts]
/// chart = "https://charts.example.com"
/// "#
/// .parse()
/// .unwrap();
///
/// assert_eq!(config.timeout_secs, 10);
/// assert_eq!(config.list_limit, 100);
/// assert_eq!(config.artifacts.chart, "https://charts.example.com");
/// assert_eq!(config.artifacts.document, "http://localhost:8002");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Page size of list requests. The backend caps it at 1000.
    pub list_limit: u32,
    pub artifacts: ArtifactEndpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_owned(),
            timeout_secs: 30,
            list_limit: 100,
            artifacts: ArtifactEndpoints::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HttpClientError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        std::fs::read_to_string(path)?.parse()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_base_url_override(std::env::var(BASE_URL_ENV).ok())
    }

    fn with_base_url_override(self, base_url: Option<String>) -> Self {
        match base_url.filter(|url| !url.trim().is_empty()) {
            Some(base_url) => Self { base_url, ..self },
            None => self,
        }
    }
}

impl std::str::FromStr for ClientConfig {
    type Err = HttpClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

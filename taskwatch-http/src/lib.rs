//! A [`TaskClient`](taskwatch::client::TaskClient) over the backend's HTTP task API.
//!
//! ```no_run
//! # use taskwatch::prelude::*;
//! # use taskwatch_http::{ClientConfig, HttpTaskClient};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load("taskwatch.toml")?.with_env_overrides();
//! let client = HttpTaskClient::new(&config)?;
//!
//! let taskwatch = TaskWatch::new(client).with_endpoints(config.artifacts.clone());
//! let handle = taskwatch.submit(NewTask::builder(ToolType::Chart).build()).await?;
//! let outcome = handle.outcome().await;
//! # Ok(())
//! # }
//! ```
use std::time::Duration;

use taskwatch::{client::ClientError, job::JobId};
use thiserror::Error;

mod client;
mod config;
mod types;

pub use config::{ClientConfig, BASE_URL_ENV};

#[derive(Clone, Debug)]
pub struct HttpTaskClient {
    http: reqwest::Client,
    base_url: String,
    list_limit: u32,
}

impl HttpTaskClient {
    pub fn new(config: &ClientConfig) -> Result<Self, HttpClientError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HttpClientError::InvalidBaseUrl(config.base_url.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url,
            list_limit: config.list_limit,
        })
    }

    /// Use an already configured [`reqwest::Client`].
    pub fn with_http_client(self, http: reqwest::Client) -> Self {
        Self { http, ..self }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `{base}/tasks/{id}{suffix}`, with the id encoded as a single path segment.
    fn task_url(&self, id: &JobId, suffix: &str) -> String {
        self.url(&format!("/tasks/{}{suffix}", urlencoding::encode(id.as_str())))
    }
}

impl TryFrom<&ClientConfig> for HttpTaskClient {
    type Error = HttpClientError;

    fn try_from(config: &ClientConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Invalid base url {0:?}, expected an http(s) url")]
    InvalidBaseUrl(String),
    #[error("Failed to build the http client")]
    Build(#[from] reqwest::Error),
    #[error("Failed to read the config file")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse the config file")]
    Config(#[from] toml::de::Error),
}

fn map_err(error: reqwest::Error) -> ClientError {
    ClientError::Transport(Box::new(error))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let config = ClientConfig {
            base_url: "http://localhost:8000/api/v1/".to_owned(),
            ..Default::default()
        };
        let client = HttpTaskClient::new(&config).unwrap();

        assert_eq!(client.base_url(), "http://localhost:8000/api/v1");
        assert_eq!(client.url("/tasks/"), "http://localhost:8000/api/v1/tasks/");
    }

    #[test]
    fn task_urls_use_the_bare_encoded_id() {
        let client = HttpTaskClient::new(&ClientConfig::default()).unwrap();

        assert_eq!(
            client.task_url(&JobId::from("6f1c8f9e-4d0a"), "/retry"),
            "http://localhost:8000/api/v1/tasks/6f1c8f9e-4d0a/retry"
        );
        assert_eq!(
            client.task_url(&JobId::from("a/b c"), ""),
            "http://localhost:8000/api/v1/tasks/a%2Fb%20c"
        );
    }

    #[test]
    fn base_url_must_be_http() {
        let config = ClientConfig {
            base_url: "localhost:8000".to_owned(),
            ..Default::default()
        };
        assert_matches!(
            HttpTaskClient::try_from(&config),
            Err(HttpClientError::InvalidBaseUrl(url)) if url == "localhost:8000"
        );
    }
}

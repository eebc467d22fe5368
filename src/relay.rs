//! Relay variant: both operations go through a CORS relay to the intermediary API.
//!
//! The API keeps the CAS session on its side, so requests here carry no
//! cookies and no token. Parameters are encoded straight into the path.

use crate::config::Config;
use crate::json::parse_json_with_context;
use crate::session::middleware::strip_url;
use crate::session::{HttpSettings, RedactPath, SessionError, build_client};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay rejected the credentials")]
    InvalidCredentials,
    #[error("relay answered with status {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] SessionError),
    #[error("failed to parse relay response")]
    ParseFailed(#[source] anyhow::Error),
}

pub struct RelayClient {
    http: ClientWithMiddleware,
    /// `{relay_url}/{api_url}`, both without trailing slash.
    base: String,
}

impl RelayClient {
    pub fn new(
        relay_url: &str,
        api_url: &str,
        settings: &HttpSettings,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            http: build_client(settings, None)?,
            base: format!(
                "{}/{}",
                relay_url.trim_end_matches('/'),
                api_url.trim_end_matches('/')
            ),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        Self::new(&config.relay_url, &config.api_url, &config.http_settings())
    }

    /// Full relay URL for an operation and its path parameters.
    pub fn url_for(&self, operation: &str, params: &[&str]) -> String {
        let mut url = format!("{}/{operation}", self.base);
        for param in params {
            url.push('/');
            url.push_str(&urlencoding::encode(param));
        }
        url
    }

    async fn get_json(&self, url: &str) -> Result<Value, RelayError> {
        let response = self
            .http
            .get(url)
            .with_extension(RedactPath)
            .send()
            .await
            .map_err(|e| SessionError::from(strip_url(e)))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Err(RelayError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SessionError::from(e.without_url()))?;
        parse_json_with_context(&body).map_err(RelayError::ParseFailed)
    }

    pub async fn connection(&self, username: &str, password: &str) -> Result<Value, RelayError> {
        debug!(username, "relayed login");
        self.get_json(&self.url_for("connection", &[username, password]))
            .await
    }

    pub async fn edt(&self, class_id: &str, start: &str, end: &str) -> Result<Value, RelayError> {
        debug!(class_id, start, end, "relayed timetable fetch");
        self.get_json(&self.url_for("edt", &[class_id, start, end]))
            .await
    }
}

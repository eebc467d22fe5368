//! CAS login against the UVSQ portal, validated through the bulletin backend.
//!
//! The flow replays what a browser does: prime the bulletin backend for its
//! session cookie, scrape the `execution` token off the CAS form, post the
//! credentials, then ask the bulletin backend for its data. That JSON is the
//! only reliable login oracle: an object with a `redirect` key means the CAS
//! ticket never made it through.

use crate::config::Config;
use crate::json::parse_json_with_context;
use crate::session::{RequestOptions, Session, SessionError};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

static EXECUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="execution" value="([^"]+)""#).unwrap());

const ACCEPT_LANGUAGE: &str = "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("execution token not found on the CAS login page")]
    TokenNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Transport(#[from] SessionError),
    #[error("failed to parse bulletin response from {url}")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Clone, custom_debug_derive::Debug)]
pub struct Credentials {
    pub username: String,
    #[debug(with = "crate::fmt::redacted")]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Extract the hidden `execution` field value from the CAS login page.
///
/// This is a plain pattern search, not an HTML parse.
pub fn extract_execution_token(html: &str) -> Option<&str> {
    EXECUTION_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Reject bulletin payloads that are really a redirect back to the login page.
pub fn classify_bulletin(payload: Value) -> Result<Value, AuthError> {
    match &payload {
        Value::Object(map) if map.contains_key("redirect") => Err(AuthError::InvalidCredentials),
        _ => Ok(payload),
    }
}

/// URLs involved in one login.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    /// CAS login URL with the bulletin `service` callback already attached.
    pub login_url: Url,
    pub data_url: Url,
}

impl AuthEndpoints {
    pub fn new(cas_login_url: &str, bulletin_base_url: &str) -> Result<Self, url::ParseError> {
        let base = bulletin_base_url.trim_end_matches('/');
        let service = format!(
            "{base}/services/doAuth.php?href={}",
            urlencoding::encode(&format!("{base}/"))
        );

        let mut login_url = Url::parse(cas_login_url)?;
        login_url.query_pairs_mut().append_pair("service", &service);

        let data_url = Url::parse(&format!(
            "{base}/services/data.php?q=dataPremi%C3%A8reConnexion"
        ))?;

        Ok(Self {
            login_url,
            data_url,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, url::ParseError> {
        Self::new(&config.cas_login_url, &config.bulletin_base_url)
    }

    fn cas_origin(&self) -> String {
        self.login_url.origin().ascii_serialization()
    }
}

pub struct Authenticator {
    session: Arc<Session>,
    endpoints: AuthEndpoints,
    /// Held for the whole flow so a concurrent login cannot clear cookies mid-way.
    login_lock: Mutex<()>,
}

impl Authenticator {
    pub fn new(session: Arc<Session>, endpoints: AuthEndpoints) -> Self {
        Self {
            session,
            endpoints,
            login_lock: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Log in and return the bulletin payload.
    pub async fn login(&self, credentials: &Credentials) -> Result<Value, AuthError> {
        let _guard = self.login_lock.lock().await;
        self.session.clear_cookies();
        debug!(username = %credentials.username, "starting CAS login");

        self.session
            .post(self.endpoints.data_url.as_str(), RequestOptions::new())
            .await?;

        let token = self.fetch_execution_token().await?;
        self.submit_credentials(credentials, &token).await?;

        let payload = classify_bulletin(self.fetch_bulletin().await?)?;
        info!(username = %credentials.username, "CAS login succeeded");
        Ok(payload)
    }

    async fn fetch_execution_token(&self) -> Result<String, AuthError> {
        let page = self
            .session
            .get(self.endpoints.login_url.as_str(), RequestOptions::new())
            .await?
            .text()
            .await
            .map_err(SessionError::from)?;

        match extract_execution_token(&page) {
            Some(token) => Ok(token.to_owned()),
            None => {
                warn!(page_len = page.len(), "execution token missing from CAS login page");
                Err(AuthError::TokenNotFound)
            }
        }
    }

    async fn submit_credentials(
        &self,
        credentials: &Credentials,
        token: &str,
    ) -> Result<(), AuthError> {
        let login_url = self.endpoints.login_url.as_str();
        let options = RequestOptions::new()
            .header("Origin", self.endpoints.cas_origin())
            .header("Referer", login_url)
            .form([
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
                ("execution", token),
                ("_eventId", "submit"),
                ("geolocation", ""),
            ]);

        let response = self.session.post(login_url, options).await?;
        debug!(
            status = response.status().as_u16(),
            landed_on = %response.url().host_str().unwrap_or_default(),
            "credentials submitted"
        );
        Ok(())
    }

    async fn fetch_bulletin(&self) -> Result<Value, AuthError> {
        let url = self.endpoints.data_url.as_str();
        let options = RequestOptions::new()
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header(
                "Content-Type",
                "application/x-www-form-urlencoded; charset=UTF-8",
            );

        let body = self
            .session
            .post(url, options)
            .await?
            .text()
            .await
            .map_err(SessionError::from)?;

        // The backend emits raw newlines inside string values.
        let body = body.replace('\n', "");
        parse_json_with_context(&body).map_err(|source| AuthError::ParseFailed {
            url: url.to_owned(),
            source,
        })
    }
}

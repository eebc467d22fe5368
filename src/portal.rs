//! The two public operations, `connection` and `edt`, behind either backend.
//!
//! Whatever goes wrong below, callers get a JSON value back: the payload on
//! success, `{"error": message}` otherwise.

use crate::auth::{AuthEndpoints, AuthError, Authenticator, Credentials};
use crate::config::{BackendKind, Config};
use crate::relay::{RelayClient, RelayError};
use crate::session::Session;
use crate::timetable::{Timetable, TimetableError, outcomes_to_json};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Impossible de récupérer le token")]
    TokenNotFound,
    #[error("Identifiants invalides")]
    InvalidCredentials,
    #[error("Erreur de connexion")]
    Connection(#[source] anyhow::Error),
}

impl PortalError {
    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

impl From<AuthError> for PortalError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::TokenNotFound => Self::TokenNotFound,
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            other => Self::Connection(other.into()),
        }
    }
}

impl From<TimetableError> for PortalError {
    fn from(e: TimetableError) -> Self {
        Self::Connection(e.into())
    }
}

impl From<RelayError> for PortalError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::InvalidCredentials => Self::InvalidCredentials,
            other => Self::Connection(other.into()),
        }
    }
}

/// Is `value` an error object produced by this module?
pub fn is_error_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.get("error").is_some_and(Value::is_string))
}

#[async_trait]
pub trait PortalBackend: Send + Sync {
    async fn connection(&self, credentials: &Credentials) -> Result<Value, PortalError>;

    async fn edt(&self, class_id: &str, start: &str, end: &str) -> Result<Value, PortalError>;
}

/// CAS login and Celcat scraping over one shared cookie session.
pub struct DirectBackend {
    authenticator: Authenticator,
    timetable: Timetable,
}

impl DirectBackend {
    pub fn new(authenticator: Authenticator, timetable: Timetable) -> Self {
        Self {
            authenticator,
            timetable,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let session = Arc::new(
            Session::new(&config.http_settings()).context("Failed to create HTTP session")?,
        );
        let endpoints = AuthEndpoints::from_config(config).context("Invalid CAS endpoints")?;
        let timetable = Timetable::from_config(config, session.clone())?;
        Ok(Self::new(Authenticator::new(session, endpoints), timetable))
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }
}

#[async_trait]
impl PortalBackend for DirectBackend {
    async fn connection(&self, credentials: &Credentials) -> Result<Value, PortalError> {
        Ok(self.authenticator.login(credentials).await?)
    }

    async fn edt(&self, class_id: &str, start: &str, end: &str) -> Result<Value, PortalError> {
        let outcomes = self.timetable.get_schedule(class_id, start, end).await?;
        Ok(outcomes_to_json(&outcomes))
    }
}

pub struct RelayBackend {
    client: RelayClient,
}

impl RelayBackend {
    pub fn new(client: RelayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PortalBackend for RelayBackend {
    async fn connection(&self, credentials: &Credentials) -> Result<Value, PortalError> {
        Ok(self
            .client
            .connection(&credentials.username, &credentials.password)
            .await?)
    }

    async fn edt(&self, class_id: &str, start: &str, end: &str) -> Result<Value, PortalError> {
        Ok(self.client.edt(class_id, start, end).await?)
    }
}

pub struct Portal {
    backend: Box<dyn PortalBackend>,
}

impl Portal {
    pub fn new(backend: impl PortalBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(match config.backend {
            BackendKind::Direct => Self::new(DirectBackend::from_config(config)?),
            BackendKind::Relay => Self::new(RelayBackend::new(
                RelayClient::from_config(config).context("Failed to create relay client")?,
            )),
        })
    }

    /// Log in and return the bulletin payload, or an error object.
    pub async fn connection(&self, username: &str, password: &str) -> Value {
        let credentials = Credentials::new(username, password);
        match self.backend.connection(&credentials).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(username, error = ?e, "connection failed");
                e.to_json()
            }
        }
    }

    /// Event details of `class_id` between `start` and `end`, or an error object.
    pub async fn edt(&self, class_id: &str, start: &str, end: &str) -> Value {
        match self.backend.edt(class_id, start, end).await {
            Ok(details) => {
                info!(class_id, "timetable delivered");
                details
            }
            Err(e) => {
                warn!(class_id, error = ?e, "timetable fetch failed");
                e.to_json()
            }
        }
    }
}

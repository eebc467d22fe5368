//! Cookie-bearing HTTP session shared by the login and timetable flows.

pub mod jar;
pub mod middleware;

pub use jar::SessionJar;
pub use middleware::RedactPath;

use middleware::TransactionLogger;
use reqwest::{Method, Response};
use reqwest_middleware::ClientWithMiddleware;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!("velizy/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to build HTTP client")]
    Build(#[source] reqwest::Error),
    #[error(transparent)]
    Transport(#[from] reqwest_middleware::Error),
    #[error("failed to read response body")]
    Body(#[from] reqwest::Error),
}

/// Transport knobs shared by every client this crate builds.
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Build the middleware-wrapped client, optionally wired to a cookie jar.
///
/// Redirects are followed natively; 301/302/303 answering a POST are replayed
/// as a body-less GET, and more than `max_redirects` hops is a transport error.
pub fn build_client(
    settings: &HttpSettings,
    jar: Option<Arc<SessionJar>>,
) -> Result<ClientWithMiddleware, SessionError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(settings.timeout)
        .redirect(reqwest::redirect::Policy::limited(settings.max_redirects));
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    let client = builder.build().map_err(SessionError::Build)?;

    Ok(reqwest_middleware::ClientBuilder::new(client)
        .with(TransactionLogger)
        .build())
}

/// Extra headers and an optional URL-encoded body for [`Session::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: Vec<(&'static str, String)>,
    form: Option<Vec<(String, String)>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Attach an `application/x-www-form-urlencoded` body.
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form = Some(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

/// One HTTP client plus the cookies it has collected.
///
/// Cookies from every response (redirect hops included) are captured into the
/// jar and replayed on later requests to the matching host.
pub struct Session {
    http: ClientWithMiddleware,
    jar: Arc<SessionJar>,
}

impl Session {
    pub fn new(settings: &HttpSettings) -> Result<Self, SessionError> {
        let jar = Arc::new(SessionJar::new());
        let http = build_client(settings, Some(jar.clone()))?;
        Ok(Self { http, jar })
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, SessionError> {
        let mut builder = self.http.request(method, url);
        for (name, value) in options.headers {
            builder = builder.header(name, value);
        }
        if let Some(form) = options.form {
            builder = builder.form(&form);
        }
        Ok(builder.send().await?)
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, SessionError> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<Response, SessionError> {
        self.request(Method::POST, url, options).await
    }

    /// Forget every cookie collected so far.
    pub fn clear_cookies(&self) {
        self.jar.clear();
    }

    /// The `Cookie` header this session would send to `url`.
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = reqwest::Url::parse(url).ok()?;
        self.jar.header_for(url.host_str()?)
    }

    pub fn jar(&self) -> &SessionJar {
        &self.jar
    }
}

//! HTTP middleware that traces every request/response pair.

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Responses slower than this are logged at `warn`.
const SLOW_RESPONSE: Duration = Duration::from_secs(5);

/// Marker extension for requests whose path carries secrets (relay credentials).
///
/// When present, only the host is logged.
#[derive(Debug, Clone, Copy)]
pub struct RedactPath;

pub struct TransactionLogger;

/// Format a `Duration` with automatic unit scaling, e.g. `1.94ms` or `2.34s`.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Drop the request URL from a transport error so secrets in the path stay out of logs.
pub fn strip_url(error: reqwest_middleware::Error) -> reqwest_middleware::Error {
    match error {
        reqwest_middleware::Error::Reqwest(e) => {
            reqwest_middleware::Error::Reqwest(e.without_url())
        }
        other => other,
    }
}

#[async_trait::async_trait]
impl Middleware for TransactionLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let host = req.url().host_str().unwrap_or_default().to_owned();
        let redact = extensions.get::<RedactPath>().is_some();
        let path = if redact {
            "<redacted>".to_owned()
        } else {
            req.url().path().to_owned()
        };

        trace!(%method, %host, %path, "sending request");
        let start = Instant::now();
        let mut result = next.run(req, extensions).await;
        let elapsed = start.elapsed();

        if redact {
            result = result.map_err(strip_url);
        }

        match &result {
            Ok(response) => {
                let status = response.status().as_u16();
                let duration = fmt_duration(elapsed);
                if elapsed > SLOW_RESPONSE {
                    warn!(%method, %host, %path, status, %duration, "slow response");
                } else {
                    debug!(%method, %host, %path, status, %duration, "response received");
                }
            }
            Err(e) => {
                let duration = fmt_duration(elapsed);
                warn!(%method, %host, %path, error = %e, %duration, "request failed");
            }
        }

        result
    }
}

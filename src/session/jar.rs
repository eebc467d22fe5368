//! Cookie jar plugged into reqwest's cookie provider hook.
//!
//! Cookies are scoped to the host that set them (or the `Domain` attribute
//! when present) and keyed by name: a later `Set-Cookie` for the same name
//! replaces the earlier value instead of appending to it. The jar is owned by
//! one [`Session`](super::Session) and can be emptied between logins.

use cookie::Cookie;
use indexmap::IndexMap;
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    domain: String,
    name: String,
}

#[derive(Debug, Default)]
pub struct SessionJar {
    cookies: Mutex<IndexMap<CookieKey, String>>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<CookieKey, String>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert the cookie carried by one raw `Set-Cookie` value received from `host`.
    ///
    /// A cookie with an empty value or a non-positive `Max-Age` deletes the entry.
    pub fn store(&self, host: &str, raw: &str) {
        let parsed = match Cookie::parse(raw) {
            Ok(cookie) => cookie,
            Err(e) => {
                trace!(host, error = %e, "ignoring malformed Set-Cookie header");
                return;
            }
        };

        let host = host.to_ascii_lowercase();
        let domain = match parsed.domain() {
            Some(d) => d.trim_start_matches('.').to_ascii_lowercase(),
            None => host.clone(),
        };
        // A host may only scope cookies to itself or a parent domain.
        if !domain_matches(&host, &domain) {
            trace!(%host, %domain, name = parsed.name(), "ignoring cookie for foreign domain");
            return;
        }
        let key = CookieKey {
            domain,
            name: parsed.name().to_owned(),
        };

        let expired = parsed.value().is_empty()
            || parsed
                .max_age()
                .is_some_and(|age| age.is_zero() || age.is_negative());

        let mut cookies = self.lock();
        if expired {
            cookies.shift_remove(&key);
            trace!(domain = %key.domain, name = %key.name, "cookie removed");
        } else {
            trace!(domain = %key.domain, name = %key.name, "cookie stored");
            cookies.insert(key, parsed.value().to_owned());
        }
    }

    /// Render the `Cookie` header value for a request to `host`, in insertion order.
    pub fn header_for(&self, host: &str) -> Option<String> {
        let host = host.to_ascii_lowercase();
        let cookies = self.lock();
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|(key, _)| domain_matches(&host, &key.domain))
            .map(|(key, value)| format!("{}={}", key.name, value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Number of cookies currently held, all hosts combined.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        for value in cookie_headers {
            match value.to_str() {
                Ok(raw) => self.store(host, raw),
                Err(_) => trace!(host, "ignoring non-ASCII Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self.header_for(url.host_str()?)?;
        HeaderValue::from_str(&header).ok()
    }
}

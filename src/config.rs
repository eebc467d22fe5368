//! Configuration loaded from `velizy.toml` and `VELIZY_*` environment variables.

use crate::session::HttpSettings;
use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Optional configuration file, read from the working directory.
pub const CONFIG_FILE: &str = "velizy.toml";

/// Which transport the two public operations go through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CAS login and timetable scraping straight against the university hosts.
    #[default]
    Direct,
    /// GET requests through a CORS relay to the intermediary API.
    Relay,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown timezone '{0}'")]
    Timezone(String),
    #[error("invalid URL for '{key}': {source}")]
    Url {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("detail_concurrency must be at least 1")]
    DetailConcurrency,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Level applied to this crate's log targets; `RUST_LOG` overrides it.
    pub log_level: String,
    pub backend: BackendKind,
    pub cas_login_url: String,
    pub bulletin_base_url: String,
    pub calendar_base_url: String,
    pub relay_url: String,
    pub api_url: String,
    /// IANA timezone used to render event times.
    pub timezone: String,
    pub request_timeout_secs: u64,
    pub max_redirects: usize,
    /// Number of event detail requests allowed in flight at once.
    pub detail_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            backend: BackendKind::Direct,
            cas_login_url: "https://cas2.uvsq.fr/cas/login".to_owned(),
            bulletin_base_url: "https://bulletins.iut-velizy.uvsq.fr".to_owned(),
            calendar_base_url: "https://edt.iut-velizy.uvsq.fr".to_owned(),
            relay_url: "https://cors-proxy.fringe.zone".to_owned(),
            api_url: "https://api.iut-velizy.fr".to_owned(),
            timezone: "Europe/Paris".to_owned(),
            request_timeout_secs: 30,
            max_redirects: 10,
            detail_concurrency: 1,
        }
    }
}

impl Config {
    /// The provider stack: defaults, then the TOML file, then the environment.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("VELIZY_"))
    }

    pub fn from_figment(figment: &Figment) -> anyhow::Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(&Self::figment())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        for (key, value) in [
            ("cas_login_url", &self.cas_login_url),
            ("bulletin_base_url", &self.bulletin_base_url),
            ("calendar_base_url", &self.calendar_base_url),
            ("relay_url", &self.relay_url),
            ("api_url", &self.api_url),
        ] {
            Url::parse(value).map_err(|source| ConfigError::Url { key, source })?;
        }
        if self.detail_concurrency == 0 {
            return Err(ConfigError::DetailConcurrency);
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_redirects: self.max_redirects,
        }
    }
}

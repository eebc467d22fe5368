//! Client for the Celcat timetable backend.

pub mod format;
pub mod models;

pub use format::{FormatError, UNSPECIFIED, format_events};
pub use models::{
    DetailOutcome, EventId, FormattedEvent, RawEvent, ScheduleByDate, outcomes_to_json,
};

use crate::config::{Config, ConfigError};
use crate::json::parse_json_with_context;
use crate::session::middleware::fmt_duration;
use crate::session::{RequestOptions, Session, SessionError};
use chrono_tz::Tz;
use futures::{StreamExt, stream};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const ACCEPT_LANGUAGE: &str = "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Resource type of a student group in Celcat.
const RES_TYPE_GROUP: &str = "103";

#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    #[error(transparent)]
    Transport(#[from] SessionError),
    #[error("{url} answered with status {status}")]
    Status { status: u16, url: String },
    #[error("failed to parse response from {url}")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
}

#[derive(Debug, Clone)]
pub struct CalendarEndpoints {
    pub calendar_url: String,
    pub detail_url: String,
}

impl CalendarEndpoints {
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            calendar_url: format!("{base}/Home/GetCalendarData"),
            detail_url: format!("{base}/Home/GetSideBarEvent"),
        }
    }
}

pub struct Timetable {
    session: Arc<Session>,
    endpoints: CalendarEndpoints,
    timezone: Tz,
    detail_concurrency: usize,
}

impl Timetable {
    pub fn new(session: Arc<Session>, endpoints: CalendarEndpoints, timezone: Tz) -> Self {
        Self {
            session,
            endpoints,
            timezone,
            detail_concurrency: 1,
        }
    }

    /// Allow up to `limit` detail requests in flight. Output order is unaffected.
    pub fn with_detail_concurrency(mut self, limit: usize) -> Self {
        self.detail_concurrency = limit.max(1);
        self
    }

    pub fn from_config(config: &Config, session: Arc<Session>) -> Result<Self, ConfigError> {
        Ok(Self::new(
            session,
            CalendarEndpoints::new(&config.calendar_base_url),
            config.timezone()?,
        )
        .with_detail_concurrency(config.detail_concurrency))
    }

    fn options() -> RequestOptions {
        RequestOptions::new()
            .header("Accept", ACCEPT)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header("Content-Type", FORM_CONTENT_TYPE)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        form: Vec<(&str, String)>,
    ) -> Result<T, TimetableError> {
        let response = self.session.post(url, Self::options().form(form)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TimetableError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response.text().await.map_err(SessionError::from)?;
        parse_json_with_context(&body).map_err(|source| TimetableError::ParseFailed {
            url: url.to_owned(),
            source,
        })
    }

    /// Raw events of `class_id` between `start` and `end` (`YYYY-MM-DD`).
    pub async fn fetch_events(
        &self,
        class_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<RawEvent>, TimetableError> {
        let federation_ids = Value::Array(vec![Value::from(class_id)]).to_string();
        let form = vec![
            ("start", start.to_owned()),
            ("end", end.to_owned()),
            ("resType", RES_TYPE_GROUP.to_owned()),
            ("calView", "agendaWeek".to_owned()),
            ("federationIds", federation_ids),
            ("colourScheme", "3".to_owned()),
        ];

        let events: Vec<RawEvent> = self.post_json(&self.endpoints.calendar_url, form).await?;
        debug!(class_id, start, end, count = events.len(), "calendar events fetched");
        Ok(events)
    }

    /// Events grouped by date.
    pub async fn fetch_schedule(
        &self,
        class_id: &str,
        start: &str,
        end: &str,
    ) -> Result<ScheduleByDate, TimetableError> {
        let events = self.fetch_events(class_id, start, end).await?;
        Ok(format_events(&events, self.timezone)?)
    }

    /// Side-bar detail of one event; `None` when the backend answers `null`.
    pub async fn fetch_event_detail(
        &self,
        event_id: &EventId,
    ) -> Result<Option<Value>, TimetableError> {
        let form = vec![("eventId", event_id.to_string())];
        let detail: Value = self.post_json(&self.endpoints.detail_url, form).await?;
        Ok(match detail {
            Value::Null => None,
            detail => Some(detail),
        })
    }

    async fn detail_outcome(&self, event_id: EventId) -> DetailOutcome {
        match self.fetch_event_detail(&event_id).await {
            Ok(Some(detail)) => DetailOutcome::Fetched { event_id, detail },
            Ok(None) => DetailOutcome::Empty { event_id },
            Err(e) => {
                warn!(event_id = %event_id, error = ?e, "failed to fetch event detail");
                DetailOutcome::Failed {
                    event_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Fetch the schedule, then the detail of every event in date then source order.
    ///
    /// Detail failures never abort the whole call; each event gets its own outcome.
    pub async fn get_schedule(
        &self,
        class_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<DetailOutcome>, TimetableError> {
        let started = Instant::now();
        let schedule = self.fetch_schedule(class_id, start, end).await?;
        let ids: Vec<EventId> = schedule.events().map(|event| event.id.clone()).collect();

        let outcomes: Vec<DetailOutcome> = stream::iter(ids)
            .map(|event_id| self.detail_outcome(event_id))
            .buffered(self.detail_concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        info!(
            class_id,
            days = schedule.len(),
            events = outcomes.len(),
            failed,
            duration = fmt_duration(started.elapsed()),
            "timetable fetched"
        );
        Ok(outcomes)
    }
}

//! Timetable records: raw backend events, their display form, and detail outcomes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Event identifiers come back as strings from Celcat, but numbers are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventId {
    Text(String),
    Number(i64),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One event as returned by `GetCalendarData`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub id: EventId,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modules: Option<Vec<String>>,
    #[serde(default)]
    pub event_category: Option<String>,
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    #[serde(default)]
    pub background_color: Option<String>,
}

/// Display form of an event, serialized with the French labels the UI expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedEvent {
    #[serde(rename = "ID")]
    pub id: EventId,
    #[serde(rename = "Début")]
    pub start: String,
    #[serde(rename = "Fin")]
    pub end: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Professeur(s)")]
    pub teachers: String,
    #[serde(rename = "Module(s)")]
    pub modules: String,
    #[serde(rename = "Type")]
    pub category: Option<String>,
    #[serde(rename = "Site")]
    pub sites: String,
    #[serde(rename = "Couleur")]
    pub color: Option<String>,
}

/// Events grouped by `YYYY-MM-DD`, keeping first-seen date order and source order within a day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScheduleByDate(IndexMap<String, Vec<FormattedEvent>>);

impl ScheduleByDate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, date: String, event: FormattedEvent) {
        self.0.entry(date).or_default().push(event);
    }

    pub fn get(&self, date: &str) -> Option<&[FormattedEvent]> {
        self.0.get(date).map(Vec::as_slice)
    }

    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Every event, date by date, in source order within each date.
    pub fn events(&self) -> impl Iterator<Item = &FormattedEvent> {
        self.0.values().flatten()
    }

    /// Number of distinct dates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of fetching the side-bar detail of one event.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Fetched { event_id: EventId, detail: Value },
    /// The backend answered `null`: no detail exists for this event.
    Empty { event_id: EventId },
    Failed { event_id: EventId, reason: String },
}

impl DetailOutcome {
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::Fetched { event_id, .. }
            | Self::Empty { event_id }
            | Self::Failed { event_id, .. } => event_id,
        }
    }

    pub fn detail(&self) -> Option<&Value> {
        match self {
            Self::Fetched { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Render outcomes as the JSON list handed to callers.
///
/// Fetched details appear verbatim, empty ones are skipped, and failures become
/// `{"eventId": …, "error": …}` entries so partial failure stays visible.
pub fn outcomes_to_json(outcomes: &[DetailOutcome]) -> Value {
    Value::Array(
        outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                DetailOutcome::Fetched { detail, .. } => Some(detail.clone()),
                DetailOutcome::Empty { .. } => None,
                DetailOutcome::Failed { event_id, reason } => Some(serde_json::json!({
                    "eventId": event_id,
                    "error": reason,
                })),
            })
            .collect(),
    )
}

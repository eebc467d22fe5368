//! Reshape raw calendar events into display records grouped by date.

use super::models::{EventId, FormattedEvent, RawEvent, ScheduleByDate};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;

/// Placeholder for events without modules or sites.
pub const UNSPECIFIED: &str = "Non spécifié";

static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("event {event_id} has an unreadable timestamp '{value}'")]
    InvalidTimestamp { event_id: EventId, value: String },
}

/// Parse a backend timestamp as an instant, expressed in `tz`.
///
/// Offset-carrying timestamps are converted; naive ones are wall time in `tz`;
/// a bare date is midnight UTC. A wall time skipped by a DST change moves
/// forward by the gap, like a browser `Date` does.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&tz));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return tz.from_local_datetime(&naive).earliest().or_else(|| {
                tz.from_local_datetime(&(naive + TimeDelta::hours(1)))
                    .earliest()
            });
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight).with_timezone(&tz))
}

/// Description with line breaks restored and entities decoded.
pub fn clean_description(raw: &str) -> String {
    let text = LINE_BREAK_RE.replace_all(raw, "\n");
    // Celcat emits a malformed apostrophe entity.
    let text = text.replace("&39;", "'");
    html_escape::decode_html_entities(&text).trim().to_owned()
}

/// Teachers are the first line of the description.
pub fn teachers(raw: &str) -> String {
    let first = LINE_BREAK_RE.split(raw).next().unwrap_or_default();
    html_escape::decode_html_entities(first).trim().to_owned()
}

fn join_or_unspecified(values: Option<&[String]>) -> String {
    match values {
        Some(values) => values.join(", "),
        None => UNSPECIFIED.to_owned(),
    }
}

/// Format one event and compute its date bucket (UTC date of the start instant).
pub fn format_event(event: &RawEvent, tz: Tz) -> Result<(String, FormattedEvent), FormatError> {
    let parse = |value: &str| {
        parse_timestamp(value, tz).ok_or_else(|| FormatError::InvalidTimestamp {
            event_id: event.id.clone(),
            value: value.to_owned(),
        })
    };
    let start = parse(&event.start)?;
    let end = parse(&event.end)?;
    let description = event.description.as_deref().unwrap_or_default();

    let formatted = FormattedEvent {
        id: event.id.clone(),
        start: start.format("%H:%M").to_string(),
        end: end.format("%H:%M").to_string(),
        description: clean_description(description),
        teachers: teachers(description),
        modules: join_or_unspecified(event.modules.as_deref()),
        category: event.event_category.clone(),
        sites: join_or_unspecified(event.sites.as_deref()),
        color: event.background_color.clone(),
    };

    let date = start.with_timezone(&Utc).format("%Y-%m-%d").to_string();
    Ok((date, formatted))
}

pub fn format_events(events: &[RawEvent], tz: Tz) -> Result<ScheduleByDate, FormatError> {
    let mut schedule = ScheduleByDate::new();
    for event in events {
        let (date, formatted) = format_event(event, tz)?;
        schedule.push(date, formatted);
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Paris;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }

    fn lecture() -> RawEvent {
        raw(json!({
            "id": 1,
            "start": "2024-01-08T09:00",
            "end": "2024-01-08T10:30",
            "description": "Prof A<br/>Room 1",
            "modules": ["M1"],
            "sites": ["Site A"],
            "eventCategory": "CM",
            "backgroundColor": "#fff"
        }))
    }

    #[test]
    fn formats_reference_event() {
        let schedule = format_events(&[lecture()], Paris).unwrap();
        let day = schedule.get("2024-01-08").unwrap();

        assert_eq!(day.len(), 1);
        let event = &day[0];
        assert_eq!(event.id, EventId::Number(1));
        assert_eq!(event.start, "09:00");
        assert_eq!(event.end, "10:30");
        assert_eq!(event.teachers, "Prof A");
        assert_eq!(event.description, "Prof A\nRoom 1");
        assert_eq!(event.modules, "M1");
        assert_eq!(event.sites, "Site A");
        assert_eq!(event.category.as_deref(), Some("CM"));
        assert_eq!(event.color.as_deref(), Some("#fff"));
    }

    #[test]
    fn serializes_with_display_labels() {
        let (_, event) = format_event(&lecture(), Paris).unwrap();
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["Début"], "09:00");
        assert_eq!(value["Fin"], "10:30");
        assert_eq!(value["Professeur(s)"], "Prof A");
        assert_eq!(value["Module(s)"], "M1");
        assert_eq!(value["Couleur"], "#fff");
    }

    #[test]
    fn same_day_events_keep_source_order() {
        let events = vec![
            raw(json!({ "id": "b", "start": "2024-01-08T14:00:00", "end": "2024-01-08T16:00:00" })),
            raw(json!({ "id": "a", "start": "2024-01-08T08:00:00", "end": "2024-01-08T10:00:00" })),
            raw(json!({ "id": "c", "start": "2024-01-09T08:00:00", "end": "2024-01-09T10:00:00" })),
        ];
        let schedule = format_events(&events, Paris).unwrap();

        assert_eq!(schedule.dates().collect::<Vec<_>>(), ["2024-01-08", "2024-01-09"]);
        let ids: Vec<String> = schedule.events().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn missing_modules_and_sites_use_placeholder() {
        let event = raw(json!({
            "id": 7, "start": "2024-01-08T09:00", "end": "2024-01-08T10:00",
            "description": "Prof B", "modules": null
        }));
        let (_, formatted) = format_event(&event, Paris).unwrap();

        assert_eq!(formatted.modules, UNSPECIFIED);
        assert_eq!(formatted.sites, UNSPECIFIED);
        assert_eq!(formatted.teachers, "Prof B");
    }

    #[test]
    fn several_modules_are_joined() {
        let event = raw(json!({
            "id": 7, "start": "2024-01-08T09:00", "end": "2024-01-08T10:00",
            "modules": ["R3.01", "R3.02"], "sites": ["Vélizy", "Rambouillet"]
        }));
        let (_, formatted) = format_event(&event, Paris).unwrap();

        assert_eq!(formatted.modules, "R3.01, R3.02");
        assert_eq!(formatted.sites, "Vélizy, Rambouillet");
    }

    #[test]
    fn description_entities_are_decoded() {
        let description = "\r\nDUPONT Jean<br />TD<br />Salle d&39;examen &amp; amphi\r\n";
        assert_eq!(clean_description(description), "DUPONT Jean\nTD\nSalle d'examen & amphi");
        assert_eq!(teachers(description), "DUPONT Jean");
    }

    #[test]
    fn bucket_is_utc_date_of_start() {
        // 00:30 in Paris during winter is 23:30 UTC the previous day.
        let event = raw(json!({
            "id": 1, "start": "2024-01-09T00:30:00", "end": "2024-01-09T01:30:00"
        }));
        let (date, formatted) = format_event(&event, Paris).unwrap();

        assert_eq!(date, "2024-01-08");
        assert_eq!(formatted.start, "00:30");
    }

    #[test]
    fn offset_timestamps_are_converted() {
        let event = raw(json!({
            "id": 1, "start": "2024-07-01T07:00:00Z", "end": "2024-07-01T09:00:00+00:00"
        }));
        let (date, formatted) = format_event(&event, Paris).unwrap();

        assert_eq!(date, "2024-07-01");
        assert_eq!(formatted.start, "09:00");
        assert_eq!(formatted.end, "11:00");
    }

    #[test]
    fn wall_time_in_spring_forward_gap_moves_forward() {
        // 02:30 does not exist in Paris on 2024-03-31; clocks jump to 03:00.
        let event = raw(json!({
            "id": "x", "start": "2024-03-31T02:30:00", "end": "2024-03-31T04:00:00"
        }));
        let schedule = format_events(&[event], Paris).unwrap();
        let day = schedule.get("2024-03-31").unwrap();

        assert_eq!(day[0].start, "03:30");
        assert_eq!(day[0].end, "04:00");
    }

    #[test]
    fn unreadable_timestamp_is_an_error() {
        let event = raw(json!({ "id": "x", "start": "lundi", "end": "2024-01-08T10:00" }));
        let err = format_events(&[event], Paris).unwrap_err();
        assert!(err.to_string().contains("lundi"));
    }

    #[test]
    fn empty_input_gives_empty_schedule() {
        assert!(format_events(&[], Paris).unwrap().is_empty());
    }
}

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ReminderError, Result};

const WIRE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A `{DateTime, TimeZone}` pair as returned by the calendar service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTime {
    #[serde(rename = "DateTime")]
    pub date_time: String,
    #[serde(rename = "TimeZone", default)]
    pub time_zone: String,
}

impl EventTime {
    pub fn new(date_time: impl Into<String>, time_zone: impl Into<String>) -> Self {
        Self {
            date_time: date_time.into(),
            time_zone: time_zone.into(),
        }
    }

    /// Absolute instant of this time. Fractional seconds are discarded.
    ///
    /// The wall-clock value is read in `time_zone` when it names an IANA zone,
    /// otherwise as UTC.
    pub fn instant(&self) -> Result<DateTime<Utc>> {
        let whole_seconds = match self.date_time.split_once('.') {
            Some((front, _)) => front,
            None => self.date_time.as_str(),
        };
        let naive = NaiveDateTime::parse_from_str(whole_seconds.trim(), WIRE_TIME_FORMAT)
            .map_err(|e| self.invalid(e.to_string()))?;

        match self.time_zone.trim().parse::<Tz>() {
            Ok(source) => source
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| self.invalid(format!("local time does not exist in {}", source))),
            Err(_) => Ok(Utc.from_utc_datetime(&naive)),
        }
    }

    pub fn project(&self, tz: &Tz) -> Result<DateTime<Tz>> {
        Ok(self.instant()?.with_timezone(tz))
    }

    fn invalid(&self, reason: String) -> ReminderError {
        ReminderError::InvalidTimestamp {
            value: self.date_time.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLocation {
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
}

/// Dispatch bookkeeping, owned by the sweep. Never on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchState {
    pub sent_at: Option<DateTime<Utc>>,
    pub sent_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "EventId")]
    pub id: String,
    #[serde(rename = "EventSubject", default)]
    pub subject: String,
    #[serde(rename = "EventWebLink", default)]
    pub web_link: Option<String>,
    #[serde(rename = "EventStartTime")]
    pub start_time: EventTime,
    #[serde(rename = "EventEndTime")]
    pub end_time: EventTime,
    #[serde(rename = "ReminderFireTime")]
    pub reminder_fire_time: EventTime,
    #[serde(rename = "EventLocation", default)]
    pub location: EventLocation,
    #[serde(skip)]
    pub dispatch: DispatchState,
}

impl Event {
    pub fn reminder_instant(&self) -> Result<DateTime<Utc>> {
        self.reminder_fire_time.instant()
    }

    /// Checks that every time on the event parses.
    pub fn validate(&self) -> Result<()> {
        self.start_time.instant()?;
        self.end_time.instant()?;
        self.reminder_fire_time.instant()?;
        Ok(())
    }

    /// Body text of a reminder: `start - end  location`, then the web link.
    pub fn describe(&self, tz: &Tz, time_format: &str) -> Result<String> {
        let start = self.start_time.project(tz)?;
        let end = self.end_time.project(tz)?;
        let mut body = format!(
            "{} - {}  {}",
            start.format(time_format),
            end.format(time_format),
            self.location.display_name
        );
        if let Some(link) = self.web_link.as_deref().filter(|l| !l.trim().is_empty()) {
            body.push('\n');
            body.push_str(link);
        }
        Ok(body)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.subject, self.id)
    }
}

/// Response envelope of the reminder view query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReminderView {
    #[serde(default)]
    pub value: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;

    fn event(start: &str, end: &str, fire: &str) -> Event {
        Event {
            id: "e1".to_string(),
            subject: "Standup".to_string(),
            web_link: Some("https://outlook.office.com/owa/?ItemID=e1".to_string()),
            start_time: EventTime::new(start, "UTC"),
            end_time: EventTime::new(end, "UTC"),
            reminder_fire_time: EventTime::new(fire, "UTC"),
            location: EventLocation {
                display_name: "Room A".to_string(),
            },
            dispatch: DispatchState::default(),
        }
    }

    #[test]
    fn instant_discards_fractional_seconds() {
        let t = EventTime::new("2026-02-10T17:30:00.0000000", "UTC");
        assert_eq!(
            t.instant().unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 10, 17, 30, 0).unwrap()
        );
    }

    #[test]
    fn instant_reads_wall_clock_in_named_zone() {
        let t = EventTime::new("2026-02-10T09:30:00", "America/Los_Angeles");
        assert_eq!(
            t.instant().unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 10, 17, 30, 0).unwrap()
        );
    }

    #[test]
    fn unknown_zone_name_is_read_as_utc() {
        let t = EventTime::new("2026-02-10T17:30:00", "Pacific Standard Time");
        assert_eq!(
            t.instant().unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 10, 17, 30, 0).unwrap()
        );
    }

    #[test]
    fn malformed_timestamp_is_an_error() {
        let t = EventTime::new("tomorrow at noon", "UTC");
        match t.instant() {
            Err(ReminderError::InvalidTimestamp { value, .. }) => {
                assert_eq!(value, "tomorrow at noon")
            }
            other => panic!("expected InvalidTimestamp, got {:?}", other),
        }
    }

    #[test]
    fn projection_is_repeatable() {
        let t = EventTime::new("2026-07-01T20:00:00.123", "UTC");
        let first = t.project(&Los_Angeles).unwrap();
        let second = t.project(&Los_Angeles).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.format("%H:%M").to_string(), "13:00");
    }

    #[test]
    fn describe_formats_local_times_and_link() {
        let e = event(
            "2026-02-10T22:00:00.0000000",
            "2026-02-10T22:30:00.0000000",
            "2026-02-10T21:45:00.0000000",
        );
        let body = e.describe(&Los_Angeles, "%-I:%M%p").unwrap();
        assert_eq!(
            body,
            "2:00PM - 2:30PM  Room A\nhttps://outlook.office.com/owa/?ItemID=e1"
        );
    }

    #[test]
    fn describe_omits_missing_link() {
        let mut e = event("2026-02-10T22:00:00", "2026-02-10T22:30:00", "2026-02-10T21:45:00");
        e.web_link = None;
        let body = e.describe(&Los_Angeles, "%H:%M").unwrap();
        assert_eq!(body, "14:00 - 14:30  Room A");
    }

    #[test]
    fn decodes_reminder_view_payload() {
        let payload = r#"{
            "value": [{
                "EventId": "AAMk1",
                "EventSubject": "Meet with the Bobs",
                "EventStartTime": {"DateTime": "2026-02-10T22:00:00.0000000", "TimeZone": "UTC"},
                "EventEndTime": {"DateTime": "2026-02-10T22:30:00.0000000", "TimeZone": "UTC"},
                "ReminderFireTime": {"DateTime": "2026-02-10T21:45:00.0000000", "TimeZone": "UTC"},
                "EventLocation": {"DisplayName": "Room A"}
            }]
        }"#;
        let view: ReminderView = serde_json::from_str(payload).unwrap();
        assert_eq!(view.value.len(), 1);
        let e = &view.value[0];
        assert_eq!(e.id, "AAMk1");
        assert_eq!(e.web_link, None);
        assert_eq!(e.dispatch, DispatchState::default());
        assert!(e.validate().is_ok());
    }
}

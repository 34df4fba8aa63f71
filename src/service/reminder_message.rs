use chrono_tz::Tz;

use crate::error::Result;
use crate::models::event::Event;

/// Timezone and time format used when rendering reminders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConfig {
    pub timezone: Tz,
    pub time_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub summary: String,
    pub body: String,
}

pub struct ReminderMessageService;

impl ReminderMessageService {
    pub fn build_message(event: &Event, display: &DisplayConfig) -> Result<ReminderMessage> {
        Ok(ReminderMessage {
            summary: event.subject.clone(),
            body: event.describe(&display.timezone, &display.time_format)?,
        })
    }

    /// Local reminder time for log lines.
    pub fn reminder_time(event: &Event, display: &DisplayConfig) -> String {
        match event.reminder_fire_time.project(&display.timezone) {
            Ok(at) => at.format(&display.time_format).to_string(),
            Err(_) => event.reminder_fire_time.date_time.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EventLocation, EventTime};

    fn display() -> DisplayConfig {
        DisplayConfig {
            timezone: chrono_tz::America::New_York,
            time_format: "%-I:%M%p".to_string(),
        }
    }

    fn event() -> Event {
        Event {
            id: "e1".to_string(),
            subject: "Meet with the Bobs".to_string(),
            web_link: None,
            start_time: EventTime::new("2026-02-10T19:00:00.0000000", "UTC"),
            end_time: EventTime::new("2026-02-10T19:30:00.0000000", "UTC"),
            reminder_fire_time: EventTime::new("2026-02-10T18:45:00.0000000", "UTC"),
            location: EventLocation {
                display_name: "Room A".to_string(),
            },
            dispatch: Default::default(),
        }
    }

    #[test]
    fn build_message_uses_subject_and_local_times() {
        let message = ReminderMessageService::build_message(&event(), &display()).unwrap();
        assert_eq!(message.summary, "Meet with the Bobs");
        assert_eq!(message.body, "2:00PM - 2:30PM  Room A");
    }

    #[test]
    fn reminder_time_falls_back_to_raw_value() {
        let mut e = event();
        e.reminder_fire_time = EventTime::new("garbage", "UTC");
        assert_eq!(ReminderMessageService::reminder_time(&e, &display()), "garbage");
        assert_eq!(
            ReminderMessageService::reminder_time(&event(), &display()),
            "1:45PM"
        );
    }
}

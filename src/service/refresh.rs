use chrono::{DateTime, Duration, Utc};

use crate::clients::calendar_client::CalendarClient;
use crate::error::Result;
use crate::models::session::Session;
use crate::service::event_cache::{EventCache, MergeOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub received: usize,
    pub merged: usize,
    pub already_fired: usize,
    pub skipped: usize,
}

/// Queries reminders due in `[start, start + look_ahead]` and merges them.
/// On error the cache is left as it was.
pub async fn refresh_events<C: CalendarClient + ?Sized>(
    cache: &mut EventCache,
    client: &C,
    session: &Session,
    start: DateTime<Utc>,
    look_ahead: Duration,
) -> Result<RefreshSummary> {
    let events = client.reminder_view(session, start, start + look_ahead).await?;

    let mut summary = RefreshSummary {
        received: events.len(),
        ..Default::default()
    };
    cache.forget_ended_before(start);
    for event in events {
        if let Err(e) = event.validate() {
            tracing::warn!("Dropping {} from refresh: {}", event, e);
            summary.skipped += 1;
            continue;
        }
        let label = event.to_string();
        match cache.merge(event) {
            MergeOutcome::AlreadyFired => summary.already_fired += 1,
            outcome => {
                tracing::debug!("---> {} {:?}", label, outcome);
                summary.merged += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReminderError;
    use crate::models::event::{Event, EventLocation, EventTime};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct ScriptedClient {
        response: Mutex<Option<Result<Vec<Event>>>>,
        windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl ScriptedClient {
        fn new(response: Result<Vec<Event>>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                windows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CalendarClient for ScriptedClient {
        async fn reminder_view(
            &self,
            _session: &Session,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Event>> {
            self.windows.lock().unwrap().push((start, end));
            self.response.lock().unwrap().take().unwrap_or(Ok(Vec::new()))
        }
    }

    fn event(id: &str, fire: &str) -> Event {
        Event {
            id: id.to_string(),
            subject: id.to_string(),
            web_link: None,
            start_time: EventTime::new("2026-02-10T13:00:00", "UTC"),
            end_time: EventTime::new("2026-02-10T13:30:00", "UTC"),
            reminder_fire_time: EventTime::new(fire, "UTC"),
            location: EventLocation::default(),
            dispatch: Default::default(),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn merges_events_and_queries_window() {
        let client = ScriptedClient::new(Ok(vec![
            event("a", "2026-02-10T12:45:00"),
            event("b", "2026-02-10T12:50:00"),
            event("a", "2026-02-10T12:45:00"),
        ]));
        let mut cache = EventCache::new();
        let summary = refresh_events(&mut cache, &client, &Session::new("t"), start(), Duration::minutes(60))
            .await
            .unwrap();
        assert_eq!(summary.received, 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(
            client.windows.lock().unwrap()[0],
            (start(), start() + Duration::minutes(60))
        );
    }

    #[tokio::test]
    async fn drops_only_events_with_bad_times() {
        let client = ScriptedClient::new(Ok(vec![
            event("good", "2026-02-10T12:45:00"),
            event("bad", "not a time"),
        ]));
        let mut cache = EventCache::new();
        let summary = refresh_events(&mut cache, &client, &Session::new("t"), start(), Duration::minutes(60))
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.merged, 1);
        assert!(cache.get("good").is_some());
        assert!(cache.get("bad").is_none());
    }

    #[tokio::test]
    async fn failed_query_leaves_cache_unchanged() {
        let mut cache = EventCache::new();
        cache.merge(event("kept", "2026-02-10T12:45:00"));
        let client = ScriptedClient::new(Err(ReminderError::Status {
            status: "401 Unauthorized".to_string(),
            body: "{}".to_string(),
        }));
        let result =
            refresh_events(&mut cache, &client, &Session::new("t"), start(), Duration::minutes(60)).await;
        assert!(matches!(result, Err(ReminderError::Status { .. })));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("kept").is_some());
    }
}

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};

use crate::error::{ReminderError, Result};
use crate::models::event::{Event, ReminderView};
use crate::models::session::Session;

pub const DEFAULT_API_ROOT: &str = "https://outlook.office.com/api/beta";
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Events whose reminder falls inside `[start, end]`.
    async fn reminder_view(
        &self,
        session: &Session,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>>;
}

#[derive(Debug, Clone)]
pub struct OutlookCalendarClient {
    client: Client,
    api_root: String,
}

impl Default for OutlookCalendarClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_ROOT)
    }
}

impl OutlookCalendarClient {
    pub fn new(api_root: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_root: api_root.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn reminder_view_url(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "{}/me/ReminderView(StartDateTime='{}',EndDateTime='{}')",
            self.api_root,
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

#[async_trait]
impl CalendarClient for OutlookCalendarClient {
    async fn reminder_view(
        &self,
        session: &Session,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let url = self.reminder_view_url(start, end);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!("{}", body);

        if status != StatusCode::OK {
            return Err(ReminderError::Status {
                status: status.to_string(),
                body,
            });
        }

        let view: ReminderView = serde_json::from_str(&body)?;
        Ok(view.value)
    }
}

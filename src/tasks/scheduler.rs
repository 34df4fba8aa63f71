use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::clients::calendar_client::CalendarClient;
use crate::clients::oauth_client::TokenExchanger;
use crate::error::Result;
use crate::events::queue::{DispatchBus, DispatchedReminder};
use crate::models::session::Session;
use crate::service::event_cache::{DispatchPolicy, DueReminder, EventCache};
use crate::service::refresh::{refresh_events, RefreshSummary};
use crate::service::reminder_message::{DisplayConfig, ReminderMessageService};
use crate::service::session_store::SessionStore;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: StdDuration,
    pub refresh_interval: StdDuration,
    pub look_ahead: Duration,
    pub policy: DispatchPolicy,
    pub display: DisplayConfig,
}

/// Everything a scheduler needs besides the session it is bound to.
#[derive(Clone)]
pub struct SchedulerContext {
    pub config: SchedulerConfig,
    pub client: Arc<dyn CalendarClient>,
    pub renewer: Option<Arc<dyn TokenExchanger>>,
    pub store: Arc<dyn SessionStore>,
    pub bus: DispatchBus,
    pub shutdown: watch::Receiver<bool>,
}

/// State of one polling cycle: the session, its cache and the refresh marker.
pub struct SchedulerWorker {
    context: SchedulerContext,
    session: Session,
    generation: u64,
    cache: EventCache,
    last_refresh: Option<Instant>,
}

impl SchedulerWorker {
    pub fn new(context: SchedulerContext, session: Session, generation: u64) -> Self {
        Self {
            context,
            session,
            generation,
            cache: EventCache::new(),
            last_refresh: None,
        }
    }

    pub fn cache(&self) -> &EventCache {
        &self.cache
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn refresh_due(&self) -> bool {
        match self.last_refresh {
            Some(at) => at.elapsed() > self.context.config.refresh_interval,
            None => true,
        }
    }

    /// Refreshes when the refresh interval has passed, then sweeps.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        if self.refresh_due() {
            if let Err(e) = self.refresh(now).await {
                tracing::warn!("Refresh failed, retrying on a later tick: {}", e);
            }
        }
        self.sweep(now).await;
    }

    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Result<RefreshSummary> {
        self.last_refresh = Some(Instant::now());
        self.renew_if_expired(now).await;

        let look_ahead = self.context.config.look_ahead;
        let summary = refresh_events(
            &mut self.cache,
            self.context.client.as_ref(),
            &self.session,
            now,
            look_ahead,
        )
        .await?;
        tracing::info!(
            "Refreshed events for the next {} minutes - found {} ({} cached)",
            look_ahead.num_minutes(),
            summary.received,
            self.cache.len()
        );
        Ok(summary)
    }

    async fn renew_if_expired(&mut self, now: DateTime<Utc>) {
        if !self.session.is_expired(now) || !self.session.can_renew() {
            return;
        }
        let Some(renewer) = self.context.renewer.clone() else {
            return;
        };
        match renewer.renew(&self.session).await {
            Ok(renewed) => {
                if let Err(e) = self.context.store.save(&renewed) {
                    tracing::warn!("Failed to save renewed session: {}", e);
                }
                tracing::info!("Session renewed");
                self.session = renewed;
            }
            Err(e) => tracing::warn!("Session renewal failed: {}", e),
        }
    }

    /// Dispatches every reminder due at `now` and applies the resulting
    /// cache updates. Returns the number of reminders dispatched.
    pub async fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let due: Vec<DueReminder> = self.cache.due(now, self.context.config.policy).collect();
        let mut dispatched = 0;
        for reminder in due {
            let id = reminder.event.id.clone();
            let display = &self.context.config.display;
            let message = match ReminderMessageService::build_message(&reminder.event, display) {
                Ok(message) => message,
                Err(e) => {
                    // Not delivered, so not recorded as fired either. A later
                    // refresh brings it back if the calendar still has it.
                    tracing::warn!(
                        "Cannot render reminder for {}, dropping it: {}",
                        reminder.event,
                        e
                    );
                    self.cache.remove(&id);
                    continue;
                }
            };
            self.context
                .bus
                .emit(DispatchedReminder {
                    generation: self.generation,
                    event_id: id.clone(),
                    summary: message.summary,
                    body: message.body,
                    reminder_time: ReminderMessageService::reminder_time(&reminder.event, display),
                })
                .await;
            dispatched += 1;
            self.cache.record_dispatch(&id, now);
            if reminder.disposition.evicts() {
                self.cache.evict(&id);
                tracing::debug!("Removed event {}", reminder.event);
            }
        }
        dispatched
    }
}

pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        // Nobody can signal anymore.
        std::future::pending::<()>().await;
    }
}

async fn run_scheduler_loop(
    mut worker: SchedulerWorker,
    mut stop_rx: oneshot::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let tick_interval = worker.context.config.tick_interval;
    tracing::info!(
        "Starting ticker with interval of {:?} (generation {})",
        tick_interval,
        worker.generation
    );

    tokio::select! {
        _ = &mut stop_rx => return,
        _ = shutdown_requested(&mut shutdown) => return,
        result = worker.refresh(Utc::now()) => {
            if let Err(e) = result {
                tracing::warn!("Initial refresh failed: {}", e);
            }
        }
    }

    let mut ticker = time::interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = shutdown_requested(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }
        // A slow refresh must not hold up stop or shutdown.
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = shutdown_requested(&mut shutdown) => break,
            _ = worker.tick(Utc::now()) => {}
        }
    }
    tracing::info!("Exiting ticker (generation {})", worker.generation);
}

struct RunningScheduler {
    generation: u64,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns at most one polling task. Dropping the scheduler stops its task.
pub struct SessionScheduler {
    context: SchedulerContext,
    running: Option<RunningScheduler>,
}

impl SessionScheduler {
    pub fn new(context: SchedulerContext) -> Self {
        Self {
            context,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub fn generation(&self) -> Option<u64> {
        self.running.as_ref().map(|running| running.generation)
    }

    /// Starts polling for `session`, stopping any previous cycle first.
    pub async fn start(&mut self, session: Session, generation: u64) {
        self.stop().await;
        let (stop_tx, stop_rx) = oneshot::channel();
        let shutdown = self.context.shutdown.clone();
        let worker = SchedulerWorker::new(self.context.clone(), session, generation);
        let handle = tokio::spawn(run_scheduler_loop(worker, stop_rx, shutdown));
        self.running = Some(RunningScheduler {
            generation,
            stop_tx,
            handle,
        });
    }

    /// Stops the polling task and waits for it to finish. No-op when
    /// nothing is running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        tracing::info!("Stopping ticker (generation {})", running.generation);
        let _ = running.stop_tx.send(());
        if let Err(e) = running.handle.await {
            tracing::error!("Scheduler task failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{Event, EventLocation, EventTime};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    struct EmptyCalendar;

    #[async_trait]
    impl CalendarClient for EmptyCalendar {
        async fn reminder_view(
            &self,
            _session: &Session,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Event>> {
            Ok(Vec::new())
        }
    }

    struct NoStore;

    impl SessionStore for NoStore {
        fn save(&self, _session: &Session) -> Result<()> {
            Ok(())
        }

        fn load(&self) -> Result<Option<Session>> {
            Ok(None)
        }
    }

    fn worker() -> (SchedulerWorker, mpsc::Receiver<DispatchedReminder>) {
        let (bus, rx) = DispatchBus::new(4);
        let (_tx, shutdown) = watch::channel(false);
        let context = SchedulerContext {
            config: SchedulerConfig {
                tick_interval: StdDuration::from_secs(30),
                refresh_interval: StdDuration::from_secs(300),
                look_ahead: Duration::minutes(60),
                policy: DispatchPolicy::SingleFire,
                display: DisplayConfig {
                    timezone: chrono_tz::Tz::UTC,
                    time_format: "%H:%M".to_string(),
                },
            },
            client: Arc::new(EmptyCalendar),
            renewer: None,
            store: Arc::new(NoStore),
            bus,
            shutdown,
        };
        (SchedulerWorker::new(context, Session::new("tok"), 1), rx)
    }

    #[tokio::test]
    async fn unrenderable_reminder_is_not_counted_as_fired() {
        let (mut worker, mut rx) = worker();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap();
        worker.cache.merge(Event {
            id: "broken".to_string(),
            subject: "Broken".to_string(),
            web_link: None,
            start_time: EventTime::new("garbage", "UTC"),
            end_time: EventTime::new("garbage", "UTC"),
            reminder_fire_time: EventTime::new("2026-03-02T16:00:00", "UTC"),
            location: EventLocation::default(),
            dispatch: Default::default(),
        });

        assert_eq!(worker.sweep(now).await, 0);
        assert!(rx.try_recv().is_err());
        assert!(worker.cache().is_empty());
        // Dropped without a fired record: a corrected copy is accepted again.
        let fixed = Event {
            id: "broken".to_string(),
            subject: "Fixed".to_string(),
            web_link: None,
            start_time: EventTime::new("2026-03-02T16:15:00", "UTC"),
            end_time: EventTime::new("2026-03-02T16:45:00", "UTC"),
            reminder_fire_time: EventTime::new("2026-03-02T16:00:00", "UTC"),
            location: EventLocation::default(),
            dispatch: Default::default(),
        };
        worker.cache.merge(fixed);
        assert_eq!(worker.sweep(now).await, 1);
        assert_eq!(rx.try_recv().unwrap().summary, "Fixed");
    }
}

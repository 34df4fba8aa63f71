use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::events::queue::LiveGeneration;
use crate::models::session::Session;
use crate::service::session_store::SessionStore;
use crate::tasks::scheduler::{shutdown_requested, SchedulerContext, SessionScheduler};

/// Persists incoming sessions and keeps exactly one scheduler running for
/// the newest of them.
pub struct SessionLifecycleManager {
    store: Arc<dyn SessionStore>,
    scheduler: SessionScheduler,
    live: LiveGeneration,
}

impl SessionLifecycleManager {
    pub fn new(context: SchedulerContext, live: LiveGeneration) -> Self {
        Self {
            store: context.store.clone(),
            scheduler: SessionScheduler::new(context),
            live,
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn generation(&self) -> Option<u64> {
        self.scheduler.generation()
    }

    /// Saves `session`, stops the previous scheduler and starts a new one.
    /// Returns the generation of the new scheduler.
    pub async fn accept(&mut self, session: Session) -> u64 {
        tracing::info!("Got a session");
        if let Err(e) = self.store.save(&session) {
            tracing::warn!("Failed to save session: {}", e);
        }
        self.scheduler.stop().await;
        let generation = self.live.advance();
        self.scheduler.start(session, generation).await;
        generation
    }

    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
    }

    pub async fn run(
        mut self,
        mut sessions: mpsc::Receiver<Session>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                next = sessions.recv() => match next {
                    Some(session) => {
                        self.accept(session).await;
                    }
                    None => break,
                },
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        self.stop().await;
        tracing::info!("Session lifecycle manager stopped");
    }
}

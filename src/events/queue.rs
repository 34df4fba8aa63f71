use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// A reminder the sweep decided to fire, tagged with the scheduler
/// generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedReminder {
    pub generation: u64,
    pub event_id: String,
    pub summary: String,
    pub body: String,
    pub reminder_time: String,
}

#[derive(Clone)]
pub struct DispatchBus {
    tx: mpsc::Sender<DispatchedReminder>,
}

impl DispatchBus {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<DispatchedReminder>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub async fn emit(&self, reminder: DispatchedReminder) {
        if self.tx.send(reminder).await.is_err() {
            tracing::warn!("Dispatch queue closed, dropping reminder");
        }
    }
}

/// The generation of the scheduler currently allowed to reach the notifier.
#[derive(Debug, Clone, Default)]
pub struct LiveGeneration(Arc<AtomicU64>);

impl LiveGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Retires the current generation and returns the next one.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_live(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

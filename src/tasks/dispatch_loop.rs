use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::queue::{DispatchedReminder, LiveGeneration};
use crate::service::notifier::Notifier;

pub async fn run_dispatch_loop(
    mut rx: mpsc::Receiver<DispatchedReminder>,
    notifier: Arc<dyn Notifier>,
    live: LiveGeneration,
) {
    while let Some(reminder) = rx.recv().await {
        dispatch_tick(&reminder, notifier.as_ref(), &live).await;
    }
    tracing::debug!("Dispatch queue closed");
}

/// Hands one reminder to the notifier unless it came from a retired
/// scheduler. Returns whether the notifier was invoked.
pub async fn dispatch_tick<N: Notifier + ?Sized>(
    reminder: &DispatchedReminder,
    notifier: &N,
    live: &LiveGeneration,
) -> bool {
    if !live.is_live(reminder.generation) {
        tracing::debug!(
            "Discarding {} from stale generation {}",
            reminder.event_id,
            reminder.generation
        );
        return false;
    }
    tracing::info!(
        "[notify] {} / {} (reminder @ {})",
        reminder.summary,
        reminder.body,
        reminder.reminder_time
    );
    if let Err(e) = notifier.send(&reminder.summary, &reminder.body).await {
        tracing::warn!("Notification for {} failed: {}", reminder.event_id, e);
    }
    true
}

pub mod event_cache;
pub mod notifier;
pub mod refresh;
pub mod reminder_message;
pub mod session_store;

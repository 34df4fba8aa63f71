use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::models::event::Event;

/// Delay before the confirmatory second reminder.
pub const CONFIRM_DELAY_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Fire once at the reminder time, then evict.
    #[default]
    SingleFire,
    /// Fire at the reminder time, fire again five minutes later, then evict.
    ConfirmAndEvict,
}

impl FromStr for DispatchPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" | "single-fire" => Ok(Self::SingleFire),
            "confirm" | "confirm-and-evict" => Ok(Self::ConfirmAndEvict),
            other => Err(format!("unknown dispatch policy {:?}", other)),
        }
    }
}

impl DispatchPolicy {
    /// Whether an event with `sent_count` prior dispatches is due at `now`,
    /// and if so whether it leaves the cache afterwards.
    pub fn decide(
        &self,
        fire_at: DateTime<Utc>,
        sent_count: u32,
        now: DateTime<Utc>,
    ) -> Option<Disposition> {
        match self {
            Self::SingleFire => (now >= fire_at).then_some(Disposition::FireAndEvict),
            Self::ConfirmAndEvict => match sent_count {
                0 if now >= fire_at => Some(Disposition::Fire),
                1 if now >= fire_at + Duration::minutes(CONFIRM_DELAY_MINUTES) => {
                    Some(Disposition::FireAndEvict)
                }
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Fire,
    FireAndEvict,
}

impl Disposition {
    pub fn evicts(&self) -> bool {
        matches!(self, Self::FireAndEvict)
    }
}

#[derive(Debug, Clone)]
pub struct DueReminder {
    pub event: Event,
    pub fire_at: DateTime<Utc>,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    /// This reminder cycle was already fired and evicted.
    AlreadyFired,
}

/// Reminder that was fired and evicted. Kept until its event is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FiredReminder {
    fire_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

/// Upcoming events keyed by remote id, owned by one running scheduler.
#[derive(Debug, Default)]
pub struct EventCache {
    events: HashMap<String, Event>,
    fired: HashMap<String, FiredReminder>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Upserts by id. Calendar fields are replaced; dispatch state survives
    /// only while the reminder fire time is unchanged.
    pub fn merge(&mut self, mut event: Event) -> MergeOutcome {
        let fire_at = event.reminder_instant().ok();
        if let Some(fired) = self.fired.get(&event.id).copied() {
            if Some(fired.fire_at) == fire_at {
                return MergeOutcome::AlreadyFired;
            }
            self.fired.remove(&event.id);
        }

        let previous = self
            .events
            .get(&event.id)
            .map(|existing| (existing.reminder_instant().ok(), existing.dispatch));
        let outcome = match previous {
            Some((previous_fire_at, dispatch)) => {
                event.dispatch = if previous_fire_at == fire_at {
                    dispatch
                } else {
                    Default::default()
                };
                MergeOutcome::Updated
            }
            None => {
                event.dispatch = Default::default();
                MergeOutcome::Inserted
            }
        };
        self.events.insert(event.id.clone(), event);
        outcome
    }

    /// Lazily yields the events due at `now`. Nothing is mutated; apply
    /// `record_dispatch` and `evict` once iteration is done.
    pub fn due(
        &self,
        now: DateTime<Utc>,
        policy: DispatchPolicy,
    ) -> impl Iterator<Item = DueReminder> + '_ {
        self.events.values().filter_map(move |event| {
            let fire_at = match event.reminder_instant() {
                Ok(fire_at) => fire_at,
                Err(e) => {
                    tracing::warn!("Skipping {} in sweep: {}", event, e);
                    return None;
                }
            };
            policy
                .decide(fire_at, event.dispatch.sent_count, now)
                .map(|disposition| DueReminder {
                    event: event.clone(),
                    fire_at,
                    disposition,
                })
        })
    }

    pub fn record_dispatch(&mut self, id: &str, at: DateTime<Utc>) {
        if let Some(event) = self.events.get_mut(id) {
            event.dispatch.sent_at = Some(at);
            event.dispatch.sent_count += 1;
        }
    }

    /// Removes a fired event and remembers its reminder time so a later
    /// refresh does not bring the same reminder back.
    pub fn evict(&mut self, id: &str) -> Option<Event> {
        let event = self.events.remove(id)?;
        if let Ok(fire_at) = event.reminder_instant() {
            let ends_at = event
                .end_time
                .instant()
                .map_or(fire_at, |end| end.max(fire_at));
            self.fired
                .insert(event.id.clone(), FiredReminder { fire_at, ends_at });
        }
        Some(event)
    }

    pub fn remove(&mut self, id: &str) -> Option<Event> {
        self.events.remove(id)
    }

    /// Drops fired-reminder records whose event ended before `cutoff`.
    /// A reminder already in the past can still come back from the calendar
    /// until its event is over.
    pub fn forget_ended_before(&mut self, cutoff: DateTime<Utc>) {
        self.fired.retain(|_, fired| fired.ends_at >= cutoff);
    }
}

//! Per-user cooldown tracking.
//!
//! A user is admitted when no earlier admission exists or when the window
//! since the last admission has fully elapsed (the boundary admits).

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use log::debug;
use poise::serenity_prelude::UserId;

/// Cooldown applied to everyone except the privileged user.
pub const DEFAULT_COOLDOWN: TimeDelta = TimeDelta::milliseconds(5000);

/// Cooldown applied to the privileged user.
pub const PRIVILEGED_COOLDOWN: TimeDelta = TimeDelta::milliseconds(2000);

const PRUNE_EVERY_ADMISSIONS: u64 = 512;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Storage for last-admission timestamps keyed by user.
pub trait CooldownStore: Send + Sync {
    fn get(&self, user_id: UserId) -> Option<DateTime<Utc>>;

    fn set(&self, user_id: UserId, at: DateTime<Utc>);

    /// Drop entries last admitted before `cutoff`.
    fn prune_before(&self, cutoff: DateTime<Utc>);

    /// Check-and-record. Returns `true` and records `now` when admitted.
    ///
    /// The default composes `get` and `set` and is not atomic; stores shared
    /// between concurrent handlers should override it.
    fn admit(&self, user_id: UserId, now: DateTime<Utc>, window: TimeDelta) -> bool {
        if is_elapsed(self.get(user_id), now, window) {
            self.set(user_id, now);
            true
        } else {
            false
        }
    }
}

/// In-process store. Admission is atomic per user key.
#[derive(Debug, Default)]
pub struct InMemoryCooldownStore {
    entries: DashMap<UserId, DateTime<Utc>>,
}

impl InMemoryCooldownStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CooldownStore for InMemoryCooldownStore {
    fn get(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.entries.get(&user_id).map(|entry| *entry)
    }

    fn set(&self, user_id: UserId, at: DateTime<Utc>) {
        self.entries.insert(user_id, at);
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) {
        self.entries.retain(|_, last| *last >= cutoff);
    }

    fn admit(&self, user_id: UserId, now: DateTime<Utc>, window: TimeDelta) -> bool {
        match self.entries.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                if is_elapsed(Some(*occupied.get()), now, window) {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }
}

fn is_elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    last.is_none_or(|last| now >= last + window)
}

/// Window selection between the privileged user and everyone else.
#[derive(Debug, Clone, Copy)]
pub struct CooldownPolicy {
    pub default_window: TimeDelta,
    pub privileged_window: TimeDelta,
    pub privileged_user: Option<UserId>,
}

impl CooldownPolicy {
    #[must_use]
    pub fn new(privileged_user: Option<UserId>) -> Self {
        Self {
            default_window: DEFAULT_COOLDOWN,
            privileged_window: PRIVILEGED_COOLDOWN,
            privileged_user,
        }
    }

    #[must_use]
    pub fn is_privileged(&self, user_id: UserId) -> bool {
        self.privileged_user == Some(user_id)
    }

    #[must_use]
    pub fn window_for(&self, user_id: UserId) -> TimeDelta {
        if self.is_privileged(user_id) {
            self.privileged_window
        } else {
            self.default_window
        }
    }

    fn longest_window(&self) -> TimeDelta {
        self.default_window.max(self.privileged_window)
    }
}

/// Cooldown tracker over an injectable store.
pub struct CooldownTracker<S = InMemoryCooldownStore> {
    store: S,
    policy: CooldownPolicy,
    admissions: AtomicU64,
}

impl CooldownTracker {
    #[must_use]
    pub fn in_memory(policy: CooldownPolicy) -> Self {
        Self::new(InMemoryCooldownStore::new(), policy)
    }
}

impl<S: CooldownStore> CooldownTracker<S> {
    pub fn new(store: S, policy: CooldownPolicy) -> Self {
        Self {
            store,
            policy,
            admissions: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn should_admit(&self, user_id: UserId, now: DateTime<Utc>, window: TimeDelta) -> bool {
        is_elapsed(self.store.get(user_id), now, window)
    }

    pub fn record_admission(&self, user_id: UserId, now: DateTime<Utc>) {
        self.store.set(user_id, now);
    }

    /// Admit `user_id` under the window its policy selects, recording `now`
    /// on success.
    pub fn try_admit(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        let window = self.policy.window_for(user_id);
        let admitted = self.store.admit(user_id, now, window);
        if admitted {
            self.maybe_prune(now);
        } else {
            debug!("User {user_id} is cooling down ({}ms window)", window.num_milliseconds());
        }
        admitted
    }

    fn maybe_prune(&self, now: DateTime<Utc>) {
        let seen = self.admissions.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % PRUNE_EVERY_ADMISSIONS == 0 {
            // Anything older than the longest window would be admitted anyway.
            self.store.prune_before(now - self.policy.longest_window());
        }
    }
}

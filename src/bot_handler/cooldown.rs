use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use teloxide::types::ChatId;

/// Per-user cooldown for commands that must not be repeated in quick
/// succession.
pub struct Cooldown {
    interval: Duration,
    claims: Mutex<HashMap<ChatId, Instant>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self { interval, claims: Mutex::new(HashMap::new()) }
    }

    /// Claims the cooldown for `user` at `now`. Returns `false` while an
    /// earlier claim is younger than the interval.
    pub fn try_acquire(&self, user: ChatId, now: Instant) -> bool {
        let mut claims = self.lock();
        if let Some(&claimed_at) = claims.get(&user) {
            if now.saturating_duration_since(claimed_at) < self.interval {
                return false;
            }
        }

        claims.insert(user, now);
        true
    }

    /// Drops the claim of `user` so the next attempt is accepted right away.
    pub fn release(&self, user: ChatId) {
        self.lock().remove(&user);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, Instant>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

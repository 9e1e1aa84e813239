//! Active-rule cache.
//!
//! A small thread-safe holder for a tenant's active-rule list. Purely a
//! local accelerator: it is invalidated on every rule mutation and
//! repopulated from the store on the next evaluate-all, so correctness
//! never depends on it. Lists go in and out as copies; callers never hold
//! an alias into the cached data.

use crate::model::Rule;
use parking_lot::RwLock;
use std::time::{Duration, Instant};

struct Slot {
    rules: Option<Vec<Rule>>,
    stored_at: Instant,
}

pub struct ActiveRuleCache {
    slot: RwLock<Slot>,
    /// Optional expiry; `None` means invalidation is purely event-driven.
    ttl: Option<Duration>,
}

impl ActiveRuleCache {
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            slot: RwLock::new(Slot {
                rules: None,
                stored_at: Instant::now(),
            }),
            ttl,
        }
    }

    /// A copy of the cached list, or `None` when invalid or expired.
    pub fn get(&self) -> Option<Vec<Rule>> {
        let slot = self.slot.read();
        if self.expired(&slot) {
            return None;
        }
        slot.rules.clone()
    }

    /// Store a copy of the list and mark the cache valid.
    pub fn set(&self, rules: &[Rule]) {
        let mut slot = self.slot.write();
        slot.rules = Some(rules.to_vec());
        slot.stored_at = Instant::now();
    }

    pub fn invalidate(&self) {
        self.slot.write().rules = None;
    }

    /// Whether a `get` would currently return data.
    pub fn is_valid(&self) -> bool {
        let slot = self.slot.read();
        slot.rules.is_some() && !self.expired(&slot)
    }

    fn expired(&self, slot: &Slot) -> bool {
        match self.ttl {
            Some(ttl) => slot.stored_at.elapsed() > ttl,
            None => false,
        }
    }
}

impl Default for ActiveRuleCache {
    fn default() -> Self {
        Self::new()
    }
}

// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::models::{Verdict, VerdictSource};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Verdicts shared by every concurrent lookup, keyed by URL.
///
/// A single lock guards the whole map. Every operation is a plain map access,
/// and no I/O ever happens while the lock is held.
pub struct ReputationCache {
    entries: Mutex<HashMap<String, Verdict>>,
    max_age: TimeDelta,
}

impl ReputationCache {
    pub fn new(max_age: TimeDelta) -> Self {
        Self::with_entries(HashMap::new(), max_age)
    }

    pub fn with_entries(entries: HashMap<String, Verdict>, max_age: TimeDelta) -> Self {
        Self {
            entries: Mutex::new(entries),
            max_age,
        }
    }

    pub fn get(&self, url: &str) -> Option<Verdict> {
        self.entries().get(url).cloned()
    }

    pub fn is_fresh(&self, url: &str, now: DateTime<Utc>) -> bool {
        self.entries()
            .get(url)
            .is_some_and(|verdict| self.is_within_max_age(verdict.observed_at, now))
    }

    /// Returns the cached verdict for `url` when it is still fresh, marked as served from cache.
    pub fn serve_fresh(&self, url: &str, now: DateTime<Utc>) -> Option<Verdict> {
        let mut entries = self.entries();
        let verdict = entries.get_mut(url)?;

        if !self.is_within_max_age(verdict.observed_at, now) {
            log::info!("[urlrep.cache] stale verdict for {} (observed at {})", url, verdict.observed_at);
            return None;
        }

        verdict.source = VerdictSource::Cache;
        log::info!("[urlrep.cache] cache hit for {}", url);
        Some(verdict.clone())
    }

    pub fn put(&self, url: &str, verdict: Verdict) {
        self.entries().insert(url.to_string(), verdict);
        log::info!("[urlrep.cache] stored verdict for {}", url);
    }

    pub fn snapshot(&self) -> HashMap<String, Verdict> {
        self.entries().clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Boundary is inclusive: a verdict exactly `max_age` old is still fresh.
    pub fn is_within_max_age(&self, observed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(observed_at) <= self.max_age
    }

    // Entries are always replaced whole, so a poisoned map is still consistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Verdict>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::cache::ReputationCache;
use crate::domain::errors::ProviderError;
use crate::domain::interfaces::RemoteReputation;
use crate::domain::lookups::standalone::ReputationProvider;
use crate::domain::models::{LookupMode, ScanJob, ScanStatus, SubjectLookup, Verdict, VerdictSource};
use crate::domain::settings::PollingPolicy;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

type ScanOutcome = Result<Verdict, ProviderError>;
type InflightScans = HashMap<String, watch::Receiver<Option<ScanOutcome>>>;

enum ScanState {
    Submitting,
    Polling { job: ScanJob, attempts: u32 },
    Completed(Verdict),
    Failed(ProviderError),
}

enum ScanClaim {
    Leader(watch::Sender<Option<ScanOutcome>>),
    Follower(watch::Receiver<Option<ScanOutcome>>),
}

/// Decides, per URL, between a cached verdict, the provider's last analysis, and a brand new scan.
pub struct ScanEngine {
    cache: Arc<ReputationCache>,
    provider: ReputationProvider,
    polling: PollingPolicy,
    inflight: Mutex<InflightScans>,
}

impl ScanEngine {
    pub fn new(cache: Arc<ReputationCache>, provider: ReputationProvider, polling: PollingPolicy) -> Self {
        Self {
            cache,
            provider,
            polling,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> Arc<ReputationCache> {
        self.cache.clone()
    }

    pub async fn execute(&self, url: &str, mode: LookupMode, cancellation: &CancellationToken) -> ScanOutcome {
        match mode {
            LookupMode::CachedFirst => self.lookup(url, cancellation).await,
            LookupMode::ForceScan => self.force_scan(url, cancellation).await,
        }
    }

    pub async fn lookup(&self, url: &str, cancellation: &CancellationToken) -> ScanOutcome {
        let now = Utc::now();

        if let Some(cached) = self.cache.serve_fresh(url, now) {
            return Ok(cached);
        }

        let subject = tokio::select! {
            _ = cancellation.cancelled() => return Err(cancelled_lookup(url)),
            fetched = self.provider.fetch_verdict(url) => fetched?,
        };

        match subject {
            SubjectLookup::NotFound => {
                log::info!("[urlrep.engine] {} not known by provider; submitting scan", url);
                self.force_scan(url, cancellation).await
            },
            SubjectLookup::NeverAnalysed => {
                log::info!("[urlrep.engine] {} never analysed by provider; submitting scan", url);
                self.force_scan(url, cancellation).await
            },
            SubjectLookup::Analysed(verdict) if !self.cache.is_within_max_age(verdict.observed_at, now) => {
                log::info!(
                    "[urlrep.engine] provider analysis for {} is stale (observed at {}); submitting scan",
                    url,
                    verdict.observed_at
                );
                self.force_scan(url, cancellation).await
            },
            SubjectLookup::Analysed(verdict) => {
                let verdict = verdict.served_from(VerdictSource::Remote);
                self.cache.put(url, verdict.clone());
                Ok(verdict)
            },
        }
    }

    /// Submits a new scan for `url` and polls it until completion.
    ///
    /// Concurrent calls for the same URL share a single remote scan.
    pub async fn force_scan(&self, url: &str, cancellation: &CancellationToken) -> ScanOutcome {
        match self.claim_scan(url) {
            ScanClaim::Follower(receiver) => {
                log::info!("[urlrep.engine] joining in-flight scan for {}", url);
                self.await_shared_scan(url, receiver, cancellation).await
            },
            ScanClaim::Leader(sender) => {
                let _release = InflightRelease {
                    inflight: &self.inflight,
                    url,
                };
                let outcome = self.run_scan(url, cancellation).await;
                sender.send_replace(Some(outcome.clone()));
                outcome
            },
        }
    }

    async fn run_scan(&self, url: &str, cancellation: &CancellationToken) -> ScanOutcome {
        let mut state = ScanState::Submitting;

        loop {
            state = match state {
                ScanState::Submitting => self.submit(url, cancellation).await,
                ScanState::Polling { job, attempts } => self.poll(job, attempts, cancellation).await,
                ScanState::Completed(verdict) => {
                    let verdict = verdict.served_from(VerdictSource::Remote);
                    self.cache.put(url, verdict.clone());
                    return Ok(verdict);
                },
                ScanState::Failed(error) => {
                    log::info!("[urlrep.engine] scan failed for {} | reason = {}", url, error);
                    return Err(error);
                },
            };
        }
    }

    async fn submit(&self, url: &str, cancellation: &CancellationToken) -> ScanState {
        let submitted = tokio::select! {
            _ = cancellation.cancelled() => return ScanState::Failed(cancelled_lookup(url)),
            submitted = self.provider.submit_scan(url) => submitted,
        };

        match submitted {
            Ok(job) => {
                log::info!("[urlrep.engine] submitted scan {}", job);
                ScanState::Polling { job, attempts: 0 }
            },
            Err(error) => ScanState::Failed(error),
        }
    }

    async fn poll(&self, job: ScanJob, attempts: u32, cancellation: &CancellationToken) -> ScanState {
        let status = tokio::select! {
            _ = cancellation.cancelled() => return ScanState::Failed(cancelled_lookup(&job.url)),
            status = self.provider.fetch_scan_status(&job) => status,
        };

        match status {
            Ok(ScanStatus::Completed(verdict)) => ScanState::Completed(verdict),
            Err(error) => ScanState::Failed(error),
            Ok(ScanStatus::Pending) => {
                let attempts = attempts + 1;

                if self.polling.max_attempts.is_some_and(|limit| attempts >= limit) {
                    let message = format!("scan {} still pending after {} polls", job, attempts);
                    return ScanState::Failed(ProviderError::cancelled(message));
                }

                log::info!("[urlrep.engine] scan {} pending (poll #{})", job, attempts);

                tokio::select! {
                    _ = cancellation.cancelled() => ScanState::Failed(cancelled_lookup(&job.url)),
                    _ = sleep(self.polling.interval) => ScanState::Polling { job, attempts },
                }
            },
        }
    }

    async fn await_shared_scan(
        &self,
        url: &str,
        mut receiver: watch::Receiver<Option<ScanOutcome>>,
        cancellation: &CancellationToken,
    ) -> ScanOutcome {
        let shared = async move {
            receiver
                .wait_for(Option::is_some)
                .await
                .map(|outcome| outcome.clone())
                .ok()
                .flatten()
        };

        let outcome = tokio::select! {
            _ = cancellation.cancelled() => return Err(cancelled_lookup(url)),
            outcome = shared => outcome,
        };

        outcome.unwrap_or_else(|| Err(ProviderError::cancelled(format!("in-flight scan for {} was abandoned", url))))
    }

    fn claim_scan(&self, url: &str) -> ScanClaim {
        let mut inflight = lock_inflight(&self.inflight);

        if let Some(receiver) = inflight.get(url) {
            return ScanClaim::Follower(receiver.clone());
        }

        let (sender, receiver) = watch::channel(None);
        inflight.insert(url.to_string(), receiver);
        ScanClaim::Leader(sender)
    }
}

struct InflightRelease<'a> {
    inflight: &'a Mutex<InflightScans>,
    url: &'a str,
}

impl Drop for InflightRelease<'_> {
    fn drop(&mut self) {
        lock_inflight(self.inflight).remove(self.url);
    }
}

fn lock_inflight(inflight: &Mutex<InflightScans>) -> MutexGuard<'_, InflightScans> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cancelled_lookup(url: &str) -> ProviderError {
    ProviderError::cancelled(format!("lookup for {} cancelled", url))
}

#[cfg(test)]
mod tests {
    use crate::domain::cache::ReputationCache;
    use crate::domain::errors::{ProviderError, ProviderErrorKind};
    use crate::domain::lookups::engine::ScanEngine;
    use crate::domain::lookups::standalone::{FakeReputationProvider, ReputationProvider};
    use crate::domain::models::{LookupMode, ScanStatus, SubjectLookup, Verdict, VerdictSource};
    use crate::domain::settings::PollingPolicy;
    use assertor::{BooleanAssertion, EqualityAssertion, OptionAssertion};
    use chrono::{DateTime, TimeDelta, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    static URL: &str = "http://a.test";

    fn fast_polling() -> PollingPolicy {
        PollingPolicy {
            interval: Duration::from_millis(5),
            max_attempts: None,
        }
    }

    fn observed_days_ago(days: i64) -> DateTime<Utc> {
        Utc::now() - TimeDelta::days(days)
    }

    fn remote_verdict(label: &str, observed_at: DateTime<Utc>) -> Verdict {
        Verdict::new(URL, observed_at, label, "90.00%", VerdictSource::Remote)
    }

    fn engine_with(cached: Vec<Verdict>, fake: FakeReputationProvider, polling: PollingPolicy) -> ScanEngine {
        let entries = cached
            .into_iter()
            .map(|verdict| (verdict.url.clone(), verdict))
            .collect::<HashMap<_, _>>();
        let cache = Arc::new(ReputationCache::with_entries(entries, TimeDelta::days(182)));
        ScanEngine::new(cache, ReputationProvider::Fake(fake), polling)
    }

    fn fake_of(engine: &ScanEngine) -> &FakeReputationProvider {
        match &engine.provider {
            ReputationProvider::Fake(fake) => fake,
            _ => panic!("Not allowed on this test"),
        }
    }

    #[tokio::test]
    async fn should_serve_fresh_cached_verdict_without_network() {
        let cached = Verdict::new(URL, observed_days_ago(1), "harmless", "99.00%", VerdictSource::Remote);
        let engine = engine_with(vec![cached.clone()], FakeReputationProvider::new(), fast_polling());

        let verdict = engine.lookup(URL, &CancellationToken::new()).await.unwrap();

        assertor::assert_that!(verdict.source).is_equal_to(VerdictSource::Cache);
        assertor::assert_that!(verdict).is_equal_to(cached);
        assertor::assert_that!(fake_of(&engine).total_calls()).is_equal_to(0);
    }

    #[tokio::test]
    async fn should_scan_and_poll_when_provider_never_analysed_url() {
        let completed = remote_verdict("harmless", observed_days_ago(0));
        let fake = FakeReputationProvider::new()
            .with_subject(Ok(SubjectLookup::NeverAnalysed))
            .with_statuses(vec![
                Ok(ScanStatus::Pending),
                Ok(ScanStatus::Pending),
                Ok(ScanStatus::Completed(completed.clone())),
            ]);
        let engine = engine_with(vec![], fake, fast_polling());

        let verdict = engine.lookup(URL, &CancellationToken::new()).await.unwrap();

        assertor::assert_that!(verdict.clone()).is_equal_to(completed);
        assertor::assert_that!(verdict.source).is_equal_to(VerdictSource::Remote);
        assertor::assert_that!(fake_of(&engine).submissions()).is_equal_to(1);
        assertor::assert_that!(fake_of(&engine).status_fetches()).is_equal_to(3);
        assertor::assert_that!(engine.cache.get(URL)).is_equal_to(Some(verdict));
    }

    #[tokio::test]
    async fn should_scan_when_provider_does_not_know_url() {
        let completed = remote_verdict("malicious", observed_days_ago(0));
        let fake = FakeReputationProvider::new()
            .with_subject(Ok(SubjectLookup::NotFound))
            .with_statuses(vec![Ok(ScanStatus::Completed(completed.clone()))]);
        let engine = engine_with(vec![], fake, fast_polling());

        let verdict = engine.lookup(URL, &CancellationToken::new()).await.unwrap();

        assertor::assert_that!(verdict).is_equal_to(completed);
        assertor::assert_that!(fake_of(&engine).submissions()).is_equal_to(1);
    }

    #[tokio::test]
    async fn should_store_recent_provider_verdict() {
        let analysed = remote_verdict("harmless", observed_days_ago(10));
        let fake = FakeReputationProvider::new().with_subject(Ok(SubjectLookup::Analysed(analysed.clone())));
        let engine = engine_with(vec![], fake, fast_polling());

        let verdict = engine.lookup(URL, &CancellationToken::new()).await.unwrap();

        assertor::assert_that!(verdict.clone()).is_equal_to(analysed.clone());
        assertor::assert_that!(verdict.source).is_equal_to(VerdictSource::Remote);
        assertor::assert_that!(fake_of(&engine).submissions()).is_equal_to(0);
        assertor::assert_that!(engine.cache.get(URL)).is_equal_to(Some(analysed));
    }

    #[tokio::test]
    async fn should_refetch_when_cached_verdict_is_stale() {
        let stale = remote_verdict("malicious", observed_days_ago(400));
        let analysed = remote_verdict("harmless", observed_days_ago(2));
        let fake = FakeReputationProvider::new().with_subject(Ok(SubjectLookup::Analysed(analysed.clone())));
        let engine = engine_with(vec![stale], fake, fast_polling());

        let verdict = engine.lookup(URL, &CancellationToken::new()).await.unwrap();

        assertor::assert_that!(verdict).is_equal_to(analysed);
        assertor::assert_that!(fake_of(&engine).verdict_fetches()).is_equal_to(1);
    }

    #[tokio::test]
    async fn should_rescan_when_provider_analysis_is_stale() {
        let outdated = remote_verdict("malicious", observed_days_ago(200));
        let completed = remote_verdict("harmless", observed_days_ago(0));
        let fake = FakeReputationProvider::new()
            .with_subject(Ok(SubjectLookup::Analysed(outdated)))
            .with_statuses(vec![Ok(ScanStatus::Completed(completed.clone()))]);
        let engine = engine_with(vec![], fake, fast_polling());

        let verdict = engine.lookup(URL, &CancellationToken::new()).await.unwrap();

        assertor::assert_that!(verdict).is_equal_to(completed);
        assertor::assert_that!(fake_of(&engine).submissions()).is_equal_to(1);
    }

    #[tokio::test]
    async fn should_propagate_provider_error_without_falling_back_to_stale_cache() {
        let stale = remote_verdict("harmless", observed_days_ago(400));
        let fake = FakeReputationProvider::new().with_subject(Err(ProviderError::server(503, "unavailable")));
        let engine = engine_with(vec![stale], fake, fast_polling());

        let looked_up = engine.lookup(URL, &CancellationToken::new()).await;

        assertor::assert_that!(looked_up).is_equal_to(Err(ProviderError::server(503, "unavailable")));
        assertor::assert_that!(fake_of(&engine).submissions()).is_equal_to(0);
    }

    #[tokio::test]
    async fn should_not_poll_when_submission_fails() {
        let fake = FakeReputationProvider::new().with_submission(Err(ProviderError::client(401, "wrong API key")));
        let engine = engine_with(vec![], fake, fast_polling());

        let scanned = engine.force_scan(URL, &CancellationToken::new()).await;

        assertor::assert_that!(scanned.unwrap_err().kind).is_equal_to(ProviderErrorKind::ClientError);
        assertor::assert_that!(fake_of(&engine).status_fetches()).is_equal_to(0);
        assertor::assert_that!(engine.cache.get(URL)).is_none();
    }

    #[tokio::test]
    async fn should_stop_polling_on_first_completed_status() {
        let completed = remote_verdict("harmless", observed_days_ago(0));
        let fake = FakeReputationProvider::new().with_statuses(vec![
            Ok(ScanStatus::Completed(completed.clone())),
            Err(ProviderError::server(500, "must never be polled")),
        ]);
        let engine = engine_with(vec![], fake, fast_polling());

        let verdict = engine.force_scan(URL, &CancellationToken::new()).await.unwrap();

        assertor::assert_that!(verdict).is_equal_to(completed);
        assertor::assert_that!(fake_of(&engine).status_fetches()).is_equal_to(1);
    }

    #[tokio::test]
    async fn should_fail_polling_on_hard_error() {
        let fake = FakeReputationProvider::new().with_statuses(vec![
            Ok(ScanStatus::Pending),
            Err(ProviderError::server(502, "bad gateway")),
            Ok(ScanStatus::Pending),
        ]);
        let engine = engine_with(vec![], fake, fast_polling());

        let scanned = engine.force_scan(URL, &CancellationToken::new()).await;

        assertor::assert_that!(scanned).is_equal_to(Err(ProviderError::server(502, "bad gateway")));
        assertor::assert_that!(fake_of(&engine).status_fetches()).is_equal_to(2);
    }

    #[tokio::test]
    async fn should_give_up_after_max_polls() {
        let polling = PollingPolicy {
            interval: Duration::from_millis(1),
            max_attempts: Some(3),
        };
        let engine = engine_with(vec![], FakeReputationProvider::new(), polling);

        let scanned = engine.force_scan(URL, &CancellationToken::new()).await;

        assertor::assert_that!(scanned.unwrap_err().kind).is_equal_to(ProviderErrorKind::Cancelled);
        assertor::assert_that!(fake_of(&engine).status_fetches()).is_equal_to(3);
        assertor::assert_that!(engine.cache.is_empty()).is_true();
    }

    #[tokio::test]
    async fn should_cancel_hung_scan_without_caching() {
        let polling = PollingPolicy {
            interval: Duration::from_secs(3600),
            max_attempts: None,
        };
        let engine = engine_with(vec![], FakeReputationProvider::new(), polling);
        let cancellation = CancellationToken::new();

        let trigger = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let scanned = engine.force_scan(URL, &cancellation).await;

        assertor::assert_that!(scanned.unwrap_err().kind).is_equal_to(ProviderErrorKind::Cancelled);
        assertor::assert_that!(engine.cache.is_empty()).is_true();
    }

    #[tokio::test]
    async fn should_not_reach_provider_when_already_cancelled() {
        let engine = engine_with(vec![], FakeReputationProvider::new(), fast_polling());
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let scanned = engine.lookup(URL, &cancellation).await;

        assertor::assert_that!(scanned.unwrap_err().kind).is_equal_to(ProviderErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn should_share_in_flight_scan_for_same_url() {
        let completed = remote_verdict("harmless", observed_days_ago(0));
        let mut statuses = vec![Ok(ScanStatus::Pending); 20];
        statuses.push(Ok(ScanStatus::Completed(completed.clone())));

        let fake = FakeReputationProvider::new().with_statuses(statuses);
        let engine = Arc::new(engine_with(vec![], fake, fast_polling()));

        let lookups = (0..4)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.force_scan(URL, &CancellationToken::new()).await })
            })
            .collect::<Vec<_>>();

        for lookup in lookups {
            let verdict = lookup.await.unwrap().unwrap();
            assertor::assert_that!(verdict).is_equal_to(completed.clone());
        }

        assertor::assert_that!(fake_of(&engine).submissions()).is_equal_to(1);
    }

    #[tokio::test]
    async fn should_dispatch_by_lookup_mode() {
        let cached = Verdict::new(URL, observed_days_ago(1), "harmless", "99.00%", VerdictSource::Remote);
        let completed = remote_verdict("malicious", observed_days_ago(0));
        let fake = FakeReputationProvider::new().with_statuses(vec![Ok(ScanStatus::Completed(completed.clone()))]);
        let engine = engine_with(vec![cached], fake, fast_polling());

        let verdict = engine
            .execute(URL, LookupMode::ForceScan, &CancellationToken::new())
            .await
            .unwrap();

        assertor::assert_that!(verdict).is_equal_to(completed.clone());
        assertor::assert_that!(engine.cache.get(URL)).is_equal_to(Some(completed));
    }
}

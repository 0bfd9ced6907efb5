// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

pub(crate) mod analyser;

use crate::domain::cache::ReputationCache;
use crate::domain::models::{LookupMode, LookupResults};
use crate::infra::caching::snapshots::VerdictSnapshots;
use crate::infra::cli::reporter::ConsoleReporter;
use analyser::UrlRepAnalyser;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlRepTask {
    pub urls: Vec<String>,
    pub mode: LookupMode,
}

impl UrlRepTask {
    pub fn new(urls: Vec<String>, mode: LookupMode) -> Self {
        Self { urls, mode }
    }
}

pub struct UrlRep {
    analyser: UrlRepAnalyser,
    snapshots: VerdictSnapshots,
    console_reporter: ConsoleReporter,
    deadline: Option<Duration>,
}

impl UrlRep {
    pub(crate) fn new(
        analyser: UrlRepAnalyser,
        snapshots: VerdictSnapshots,
        console_reporter: ConsoleReporter,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            analyser,
            snapshots,
            console_reporter,
            deadline,
        }
    }

    pub async fn execute(self, task: UrlRepTask) -> anyhow::Result<LookupResults> {
        self.console_reporter.report_lookups_started(&task.urls, task.mode);

        let cancellation = CancellationToken::new();
        let watchdogs = self.arm_cancellation(&cancellation);
        let cache = self.analyser.cache();

        let analysed = self
            .analyser
            .analyse_urls(task.urls, task.mode, cancellation)
            .await;

        watchdogs.iter().for_each(JoinHandle::abort);
        Self::settle(&self.snapshots, &self.console_reporter, &cache, analysed)
    }

    /// Persists whatever reached the cache, even when the analysis itself failed.
    fn settle(
        snapshots: &VerdictSnapshots,
        console_reporter: &ConsoleReporter,
        cache: &ReputationCache,
        analysed: anyhow::Result<LookupResults>,
    ) -> anyhow::Result<LookupResults> {
        let persisted = snapshots.store(&cache.snapshot());

        let results = analysed?;
        persisted?;

        console_reporter.report_lookup_outcomes(&results);
        Ok(results)
    }

    fn arm_cancellation(&self, cancellation: &CancellationToken) -> Vec<JoinHandle<()>> {
        let on_interrupt = cancellation.clone();
        let mut watchdogs = vec![tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("[urlrep.core] interrupted; cancelling pending lookups");
                on_interrupt.cancel();
            }
        })];

        if let Some(deadline) = self.deadline {
            let on_deadline = cancellation.clone();
            watchdogs.push(tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                log::warn!("[urlrep.core] deadline of {:?} reached; cancelling pending lookups", deadline);
                on_deadline.cancel();
            }));
        }

        watchdogs
    }
}

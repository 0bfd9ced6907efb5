// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::errors::ProviderError;
use crate::domain::interfaces::RemoteReputation;
use crate::domain::models::{ScanJob, ScanStatus, SubjectLookup};
use crate::infra::networking::virustotal::VirusTotalClient;
#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::Mutex;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

pub enum ReputationProvider {
    VirusTotal(VirusTotalClient),
    #[cfg(test)]
    Fake(FakeReputationProvider),
}

impl RemoteReputation for ReputationProvider {
    async fn submit_scan(&self, url: &str) -> Result<ScanJob, ProviderError> {
        match self {
            ReputationProvider::VirusTotal(delegate) => delegate.submit_scan(url).await,
            #[cfg(test)]
            ReputationProvider::Fake(fake) => fake.submit_scan(url).await,
        }
    }

    async fn fetch_verdict(&self, url: &str) -> Result<SubjectLookup, ProviderError> {
        match self {
            ReputationProvider::VirusTotal(delegate) => delegate.fetch_verdict(url).await,
            #[cfg(test)]
            ReputationProvider::Fake(fake) => fake.fetch_verdict(url).await,
        }
    }

    async fn fetch_scan_status(&self, job: &ScanJob) -> Result<ScanStatus, ProviderError> {
        match self {
            ReputationProvider::VirusTotal(delegate) => delegate.fetch_scan_status(job).await,
            #[cfg(test)]
            ReputationProvider::Fake(fake) => fake.fetch_scan_status(job).await,
        }
    }
}

/// Scripted provider: answers with canned responses and counts every call.
///
/// Once scripted scan statuses run out, scans stay pending forever.
#[cfg(test)]
pub struct FakeReputationProvider {
    subject: Result<SubjectLookup, ProviderError>,
    submission: Result<String, ProviderError>,
    statuses: Mutex<VecDeque<Result<ScanStatus, ProviderError>>>,
    submissions: AtomicUsize,
    verdict_fetches: AtomicUsize,
    status_fetches: AtomicUsize,
}

#[cfg(test)]
impl FakeReputationProvider {
    pub fn new() -> Self {
        Self {
            subject: Ok(SubjectLookup::NeverAnalysed),
            submission: Ok("fake-analysis-id".to_string()),
            statuses: Mutex::new(VecDeque::new()),
            submissions: AtomicUsize::new(0),
            verdict_fetches: AtomicUsize::new(0),
            status_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_subject(self, subject: Result<SubjectLookup, ProviderError>) -> Self {
        Self { subject, ..self }
    }

    pub fn with_submission(self, submission: Result<String, ProviderError>) -> Self {
        Self { submission, ..self }
    }

    pub fn with_statuses(self, statuses: Vec<Result<ScanStatus, ProviderError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..self
        }
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn verdict_fetches(&self) -> usize {
        self.verdict_fetches.load(Ordering::SeqCst)
    }

    pub fn status_fetches(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.submissions() + self.verdict_fetches() + self.status_fetches()
    }
}

#[cfg(test)]
impl RemoteReputation for FakeReputationProvider {
    async fn submit_scan(&self, url: &str) -> Result<ScanJob, ProviderError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.submission.clone().map(|id| ScanJob::new(&id, url))
    }

    async fn fetch_verdict(&self, _: &str) -> Result<SubjectLookup, ProviderError> {
        self.verdict_fetches.fetch_add(1, Ordering::SeqCst);
        self.subject.clone()
    }

    async fn fetch_scan_status(&self, _: &ScanJob) -> Result<ScanStatus, ProviderError> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().expect("fake statuses lock");
        statuses.pop_front().unwrap_or(Ok(ScanStatus::Pending))
    }
}

// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::errors::ProviderError;
use crate::domain::models::{ScanJob, ScanStatus, SubjectLookup};

pub trait RemoteReputation {
    async fn submit_scan(&self, url: &str) -> Result<ScanJob, ProviderError>;
    async fn fetch_verdict(&self, url: &str) -> Result<SubjectLookup, ProviderError>;
    async fn fetch_scan_status(&self, job: &ScanJob) -> Result<ScanStatus, ProviderError>;
}

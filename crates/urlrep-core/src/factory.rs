// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::cache::ReputationCache;
use crate::domain::lookups::engine::ScanEngine;
use crate::domain::lookups::standalone::ReputationProvider;
use crate::infra::caching::CacheManager;
use crate::infra::caching::snapshots::VerdictSnapshots;
use crate::infra::cli::parsing::Invocation;
use crate::infra::cli::reporter::ConsoleReporter;
use crate::infra::networking::http::HTTP_CLIENT;
use crate::infra::networking::virustotal::{URL_VIRUSTOTAL_API, VirusTotalClient};
use crate::urlrep::UrlRep;
use crate::urlrep::analyser::UrlRepAnalyser;
use std::sync::Arc;

pub fn create_urlrep(invocation: &Invocation) -> anyhow::Result<UrlRep> {
    let settings = &invocation.settings;

    let cache_manager = match &invocation.cache_dir {
        Some(dir) => CacheManager::at(dir),
        None => CacheManager::get(),
    };

    let snapshots = VerdictSnapshots::new(cache_manager);
    let cache = Arc::new(ReputationCache::with_entries(snapshots.load()?, settings.max_age));

    let virustotal = VirusTotalClient::new(
        URL_VIRUSTOTAL_API.to_string(),
        settings.api_key.clone(),
        HTTP_CLIENT.clone(),
    );

    let engine = ScanEngine::new(cache, ReputationProvider::VirusTotal(virustotal), settings.polling.clone());
    let analyser = UrlRepAnalyser::new(Arc::new(engine));
    let console_reporter = ConsoleReporter::new(invocation.use_colors, invocation.verbose);

    Ok(UrlRep::new(analyser, snapshots, console_reporter, settings.deadline))
}

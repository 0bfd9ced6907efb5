// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::errors::ProviderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Category name to number of engines reporting it, as returned by the provider.
///
/// Kept ordered by category name, which makes dominant category ties resolve
/// to the lexicographically smallest category.
pub type CategoryDistribution = BTreeMap<String, u64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Cache,
    Remote,
}

impl Display for VerdictSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictSource::Cache => f.write_str("cache"),
            VerdictSource::Remote => f.write_str("remote"),
        }
    }
}

/// Reputation result for a single URL.
///
/// `observed_at` is the provider's own analysis timestamp and is what freshness
/// is computed against. `source` is metadata only and does not take part in equality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Verdict {
    pub url: String,
    pub observed_at: DateTime<Utc>,
    pub label: String,
    pub confidence: String,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn new(url: &str, observed_at: DateTime<Utc>, label: &str, confidence: &str, source: VerdictSource) -> Self {
        Self {
            url: url.to_string(),
            observed_at,
            label: label.to_string(),
            confidence: confidence.to_string(),
            source,
        }
    }

    /// Builds a remote verdict out of a provider category distribution.
    pub fn from_distribution(
        url: &str,
        observed_at: DateTime<Utc>,
        distribution: &CategoryDistribution,
    ) -> Result<Self, ProviderError> {
        let (label, confidence) = dominant_category(distribution)?;
        Ok(Self {
            url: url.to_string(),
            observed_at,
            label,
            confidence,
            source: VerdictSource::Remote,
        })
    }

    pub fn served_from(mut self, source: VerdictSource) -> Self {
        self.source = source;
        self
    }
}

impl PartialEq for Verdict {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.observed_at == other.observed_at
            && self.label == other.label
            && self.confidence == other.confidence
    }
}

impl Eq for Verdict {}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "URL: {}, analysis date: {}, result: ({}, {}), source: {}",
            self.url,
            self.observed_at.format("%d-%m-%Y"),
            self.label,
            self.confidence,
            self.source
        ))
    }
}

/// Picks the category with the highest count and its share of all counts.
///
/// Ties go to the first category in key order. An empty distribution, or one where
/// every count is zero, cannot produce a percentage and is reported as a `ConfigError`.
/// Counts whose total does not fit in a `u64` are a malformed payload, reported as a `ServerError`.
pub fn dominant_category(distribution: &CategoryDistribution) -> Result<(String, String), ProviderError> {
    let total = distribution
        .values()
        .try_fold(0u64, |sum, count| sum.checked_add(*count))
        .ok_or_else(|| ProviderError::server(0, "category counts overflow their total"))?;

    if total == 0 {
        return Err(ProviderError::config(format!(
            "cannot compute dominant category out of {} categories with no counts",
            distribution.len()
        )));
    }

    let mut dominant: Option<(&String, u64)> = None;
    for (category, count) in distribution {
        match dominant {
            Some((_, highest)) if *count <= highest => {},
            _ => dominant = Some((category, *count)),
        }
    }

    let Some((label, highest)) = dominant else {
        return Err(ProviderError::config("empty category distribution"));
    };

    let confidence = format!("{:.2}%", highest as f64 / total as f64 * 100.0);
    Ok((label.clone(), confidence))
}

/// Handle for a scan submitted to the provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScanJob {
    pub id: String,
    pub url: String,
}

impl ScanJob {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
        }
    }
}

impl Display for ScanJob {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{} ({})", self.id, self.url))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanStatus {
    Pending,
    Completed(Verdict),
}

/// What the provider knows about a subject URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubjectLookup {
    Analysed(Verdict),
    NotFound,
    NeverAnalysed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupMode {
    CachedFirst,
    ForceScan,
}

pub type LookupOutcome = (String, Result<Verdict, ProviderError>);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupStatistics {
    pub total: usize,
    pub from_cache: usize,
    pub from_remote: usize,
    pub failed: usize,
}

#[derive(Clone, Debug)]
pub struct LookupResults {
    pub statistics: LookupStatistics,
    pub outcomes: Vec<LookupOutcome>,
}

impl LookupResults {
    pub fn new(outcomes: Vec<LookupOutcome>) -> Self {
        let mut statistics = LookupStatistics {
            total: outcomes.len(),
            ..LookupStatistics::default()
        };

        for (_, outcome) in outcomes.iter() {
            match outcome {
                Ok(verdict) if verdict.source == VerdictSource::Cache => statistics.from_cache += 1,
                Ok(_) => statistics.from_remote += 1,
                Err(_) => statistics.failed += 1,
            }
        }

        Self { statistics, outcomes }
    }

    pub fn has_failures(&self) -> bool {
        self.statistics.failed > 0
    }
}

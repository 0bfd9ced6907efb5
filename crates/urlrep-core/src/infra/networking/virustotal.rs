// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::errors::ProviderError;
use crate::domain::interfaces::RemoteReputation;
use crate::domain::models::{CategoryDistribution, ScanJob, ScanStatus, SubjectLookup, Verdict};
use crate::infra::networking::http::HTTPClient;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest_middleware::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub static URL_VIRUSTOTAL_API: &str = "https://www.virustotal.com/api/v3";

static HEADER_API_KEY: &str = "x-apikey";
static ERROR_CODE_NOT_FOUND: &str = "NotFoundError";
static ANALYSIS_STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: Option<T>,
    error: Option<ApiErrorDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetails {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubmittedAnalysis {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UrlReport {
    attributes: UrlAttributes,
}

#[derive(Debug, Deserialize)]
struct UrlAttributes {
    last_analysis_date: Option<i64>,
    last_analysis_stats: Option<CategoryDistribution>,
}

#[derive(Debug, Deserialize)]
struct AnalysisReport {
    attributes: AnalysisAttributes,
}

#[derive(Debug, Deserialize)]
struct AnalysisAttributes {
    status: String,
    date: Option<i64>,
    stats: Option<CategoryDistribution>,
}

/// VirusTotal identifies URL objects by their unpadded url-safe base64 encoding.
pub fn url_identifier(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url)
}

pub struct VirusTotalClient {
    base_url: String,
    api_key: String,
    http_client: Arc<HTTPClient>,
}

impl VirusTotalClient {
    pub fn new(base_url: String, api_key: String, http_client: Arc<HTTPClient>) -> Self {
        Self {
            base_url,
            api_key,
            http_client,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<(u16, String), ProviderError> {
        let response = request
            .header(HEADER_API_KEY, self.api_key.as_str())
            .send()
            .await
            .map_err(|incoming| ProviderError::server(0, format!("cannot reach VirusTotal : {}", incoming)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|incoming| ProviderError::server(status, format!("cannot read response body : {}", incoming)))?;

        Ok((status, body))
    }
}

impl RemoteReputation for VirusTotalClient {
    async fn submit_scan(&self, url: &str) -> Result<ScanJob, ProviderError> {
        let endpoint = format!("{}/urls", self.base_url);
        let request = self.http_client.post(&endpoint).form(&[("url", url)]);
        let (status, body) = self.send(request).await?;

        if status != 200 {
            return Err(ProviderError::from_status(status, describe_failure(&body)));
        }

        let submitted = decode::<SubmittedAnalysis>(status, &body)?
            .data
            .ok_or_else(|| missing_field(status, "data"))?;

        log::info!("[urlrep.virustotal] scan submitted for {} (analysis = {})", url, submitted.id);
        Ok(ScanJob::new(&submitted.id, url))
    }

    async fn fetch_verdict(&self, url: &str) -> Result<SubjectLookup, ProviderError> {
        let endpoint = format!("{}/urls/{}", self.base_url, url_identifier(url));
        let (status, body) = self.send(self.http_client.get(&endpoint)).await?;

        if status == 404 && is_not_found(&body) {
            log::info!("[urlrep.virustotal] no report for {}", url);
            return Ok(SubjectLookup::NotFound);
        }

        if status != 200 {
            return Err(ProviderError::from_status(status, describe_failure(&body)));
        }

        let envelope = decode::<UrlReport>(status, &body)?;

        if let Some(error) = envelope.error {
            log::info!("[urlrep.virustotal] no report for {} ({})", url, error.code);
            return Ok(SubjectLookup::NotFound);
        }

        let attributes = envelope.data.ok_or_else(|| missing_field(status, "data"))?.attributes;

        let Some(epoch) = attributes.last_analysis_date else {
            log::info!("[urlrep.virustotal] {} known but never analysed", url);
            return Ok(SubjectLookup::NeverAnalysed);
        };

        let observed_at = analysis_timestamp(status, epoch)?;
        let stats = attributes
            .last_analysis_stats
            .ok_or_else(|| missing_field(status, "last_analysis_stats"))?;

        let verdict = Verdict::from_distribution(url, observed_at, &stats)?;
        log::info!("[urlrep.virustotal] found report for {} (observed at {})", url, observed_at);
        Ok(SubjectLookup::Analysed(verdict))
    }

    async fn fetch_scan_status(&self, job: &ScanJob) -> Result<ScanStatus, ProviderError> {
        let endpoint = format!("{}/analyses/{}", self.base_url, job.id);
        let (status, body) = self.send(self.http_client.get(&endpoint)).await?;

        if status == 404 && is_not_found(&body) {
            return Err(ProviderError::not_found(status, format!("analysis {} not found", job.id)));
        }

        if status != 200 {
            return Err(ProviderError::from_status(status, describe_failure(&body)));
        }

        let attributes = decode::<AnalysisReport>(status, &body)?
            .data
            .ok_or_else(|| missing_field(status, "data"))?
            .attributes;

        if attributes.status != ANALYSIS_STATUS_COMPLETED {
            log::info!("[urlrep.virustotal] analysis {} is {}", job, attributes.status);
            return Ok(ScanStatus::Pending);
        }

        let epoch = attributes.date.ok_or_else(|| missing_field(status, "date"))?;
        let observed_at = analysis_timestamp(status, epoch)?;
        let stats = attributes.stats.ok_or_else(|| missing_field(status, "stats"))?;

        let verdict = Verdict::from_distribution(&job.url, observed_at, &stats)?;
        Ok(ScanStatus::Completed(verdict))
    }
}

fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<ApiEnvelope<T>, ProviderError> {
    serde_json::from_str(body)
        .map_err(|incoming| ProviderError::server(status, format!("malformed VirusTotal payload : {}", incoming)))
}

fn analysis_timestamp(status: u16, epoch: i64) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| ProviderError::server(status, format!("invalid analysis timestamp : {}", epoch)))
}

fn missing_field(status: u16, field: &str) -> ProviderError {
    ProviderError::server(status, format!("VirusTotal payload without '{}'", field))
}

fn api_error(body: &str) -> Option<ApiErrorDetails> {
    serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.error)
}

fn is_not_found(body: &str) -> bool {
    api_error(body).is_some_and(|error| error.code == ERROR_CODE_NOT_FOUND)
}

fn describe_failure(body: &str) -> String {
    match api_error(body) {
        Some(error) if error.message.is_empty() => error.code,
        Some(error) if error.code.is_empty() => error.message,
        Some(error) => format!("{} ({})", error.message, error.code),
        None => "unexpected VirusTotal response".to_string(),
    }
}

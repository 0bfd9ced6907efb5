// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::errors::ProviderError;
use chrono::TimeDelta;
use std::time::Duration;

pub static API_KEY_ENVIRONMENT_VARIABLE: &str = "VT_KEY";
pub static DEFAULT_MAX_AGE_DAYS: &str = "182";
pub static DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS),
            max_attempts: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub max_age: TimeDelta,
    pub polling: PollingPolicy,
    pub deadline: Option<Duration>,
}

impl Settings {
    /// Validates raw configuration inputs, before any remote call happens.
    ///
    /// An explicit API key takes precedence over the one found in the environment,
    /// unless it is blank.
    pub fn resolve(
        explicit_key: Option<String>,
        environment_key: Option<String>,
        raw_max_age: &str,
    ) -> Result<Self, ProviderError> {
        let api_key = usable_key(explicit_key)
            .or_else(|| usable_key(environment_key))
            .ok_or_else(|| {
                ProviderError::config(format!(
                    "API key not provided (use --apikey or {})",
                    API_KEY_ENVIRONMENT_VARIABLE
                ))
            })?;

        let max_age = parse_max_age(raw_max_age)?;

        Ok(Self {
            api_key,
            max_age,
            polling: PollingPolicy::default(),
            deadline: None,
        })
    }

    pub fn with_polling(self, polling: PollingPolicy) -> Self {
        Self { polling, ..self }
    }

    pub fn with_deadline(self, deadline: Option<Duration>) -> Self {
        Self { deadline, ..self }
    }
}

pub fn parse_max_age(raw_max_age: &str) -> Result<TimeDelta, ProviderError> {
    let invalid = || ProviderError::config(format!("cache age is not a valid number of days : '{}'", raw_max_age));

    let days = raw_max_age.trim().parse::<u64>().map_err(|_| invalid())?;
    let days = i64::try_from(days).map_err(|_| invalid())?;
    TimeDelta::try_days(days).ok_or_else(invalid)
}

fn usable_key(candidate: Option<String>) -> Option<String> {
    candidate
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

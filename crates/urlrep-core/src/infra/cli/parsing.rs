// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::errors::ProviderError;
use crate::domain::models::LookupMode;
use crate::domain::settings::{
    API_KEY_ENVIRONMENT_VARIABLE, DEFAULT_MAX_AGE_DAYS, DEFAULT_POLL_INTERVAL_SECONDS, PollingPolicy, Settings,
};
use crate::urlrep::UrlRepTask;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Check URL reputation, powered by VirusTotal", long_about = None)]
struct CliParser {
    /// One or more URLs, separated by whitespace
    pub urls: Vec<String>,

    /// Custom VirusTotal API key (defaults to VT_KEY environment variable)
    #[arg(short = 'k', long)]
    pub apikey: Option<String>,

    /// Force a new scan for every URL
    #[arg(short, long)]
    pub scan: bool,

    /// Verbose output throughout the process
    #[arg(short, long)]
    pub verbose: bool,

    /// Cache max age, in days
    #[arg(short, long, default_value = DEFAULT_MAX_AGE_DAYS)]
    pub age: String,

    /// Seconds to wait between two polls of a pending scan
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECONDS)]
    pub poll_interval: u64,

    /// Give up a pending scan after this many polls
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Cancel whatever is still running after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Folder holding the verdicts cache (defaults to ~/.urlrep)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Turn off colors on console output
    #[arg(long)]
    pub no_colors: bool,
}

#[derive(Debug)]
pub struct Invocation {
    pub task: UrlRepTask,
    pub settings: Settings,
    pub verbose: bool,
    pub use_colors: bool,
    pub cache_dir: Option<PathBuf>,
}

pub fn parse_arguments() -> Result<Invocation, ProviderError> {
    let cli = CliParser::parse();
    let environment_key = std::env::var(API_KEY_ENVIRONMENT_VARIABLE).ok();
    interpret(cli, environment_key)
}

fn interpret(cli: CliParser, environment_key: Option<String>) -> Result<Invocation, ProviderError> {
    if cli.poll_interval == 0 {
        return Err(ProviderError::config("poll interval must be at least one second"));
    }

    if cli.max_polls == Some(0) {
        return Err(ProviderError::config("max polls must be at least one"));
    }

    let polling = PollingPolicy {
        interval: Duration::from_secs(cli.poll_interval),
        max_attempts: cli.max_polls,
    };

    let settings = Settings::resolve(cli.apikey, environment_key, &cli.age)?
        .with_polling(polling)
        .with_deadline(cli.timeout.map(Duration::from_secs));

    let mode = if cli.scan {
        LookupMode::ForceScan
    } else {
        LookupMode::CachedFirst
    };

    Ok(Invocation {
        task: UrlRepTask::new(cli.urls, mode),
        settings,
        verbose: cli.verbose,
        use_colors: !cli.no_colors,
        cache_dir: cli.cache_dir,
    })
}

#[cfg(test)]
mod tests {
    use crate::domain::errors::ProviderErrorKind;
    use crate::domain::models::LookupMode;
    use crate::infra::cli::parsing::{CliParser, interpret};
    use assertor::{BooleanAssertion, EqualityAssertion};
    use chrono::TimeDelta;
    use clap::Parser;
    use std::time::Duration;

    fn parse(arguments: &[&str]) -> CliParser {
        let mut full = vec!["urlrep"];
        full.extend_from_slice(arguments);
        CliParser::try_parse_from(full).unwrap()
    }

    #[test]
    fn should_parse_lookup_with_defaults() {
        let cli = parse(&["https://whatsapp.com/", "https://facebook.com", "-k", "my-key"]);

        let invocation = interpret(cli, None).unwrap();

        assertor::assert_that!(invocation.task.urls).is_equal_to(vec![
            "https://whatsapp.com/".to_string(),
            "https://facebook.com".to_string(),
        ]);
        assertor::assert_that!(invocation.task.mode).is_equal_to(LookupMode::CachedFirst);
        assertor::assert_that!(invocation.settings.max_age).is_equal_to(TimeDelta::days(182));
        assertor::assert_that!(invocation.settings.polling.interval).is_equal_to(Duration::from_secs(5));
        assertor::assert_that!(invocation.settings.deadline).is_equal_to(None);
        assertor::assert_that!(invocation.use_colors).is_true();
        assertor::assert_that!(invocation.verbose).is_false();
    }

    #[test]
    fn should_parse_forced_scan_with_custom_settings() {
        let cli = parse(&[
            "https://a.test",
            "--scan",
            "--verbose",
            "--age",
            "1",
            "--poll-interval",
            "2",
            "--max-polls",
            "10",
            "--timeout",
            "120",
            "--no-colors",
        ]);

        let invocation = interpret(cli, Some("env-key".to_string())).unwrap();

        assertor::assert_that!(invocation.task.mode).is_equal_to(LookupMode::ForceScan);
        assertor::assert_that!(invocation.settings.api_key).is_equal_to("env-key".to_string());
        assertor::assert_that!(invocation.settings.max_age).is_equal_to(TimeDelta::days(1));
        assertor::assert_that!(invocation.settings.polling.max_attempts).is_equal_to(Some(10));
        assertor::assert_that!(invocation.settings.deadline).is_equal_to(Some(Duration::from_secs(120)));
        assertor::assert_that!(invocation.verbose).is_true();
        assertor::assert_that!(invocation.use_colors).is_false();
    }

    #[test]
    fn should_reject_missing_api_key() {
        let cli = parse(&["https://a.test"]);

        let interpreted = interpret(cli, None);

        assertor::assert_that!(interpreted.unwrap_err().kind).is_equal_to(ProviderErrorKind::ConfigError);
    }

    #[test]
    fn should_reject_invalid_age() {
        let cli = parse(&["https://a.test", "--age", "six-months", "-k", "key"]);

        let interpreted = interpret(cli, None);

        assertor::assert_that!(interpreted.unwrap_err().kind).is_equal_to(ProviderErrorKind::ConfigError);
    }

    #[test]
    fn should_reject_zero_poll_interval() {
        let cli = parse(&["https://a.test", "--poll-interval", "0", "-k", "key"]);

        let interpreted = interpret(cli, None);

        assertor::assert_that!(interpreted.unwrap_err().kind).is_equal_to(ProviderErrorKind::ConfigError);
    }
}

// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::models::{LookupMode, LookupResults};
use comfy_table::Table;
use console::{StyledObject, style};

#[derive(Default)]
pub struct ConsoleReporter {
    use_colors: bool,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(use_colors: bool, verbose: bool) -> Self {
        Self { use_colors, verbose }
    }

    pub fn report_lookups_started(&self, urls: &[String], mode: LookupMode) {
        if !self.verbose {
            return;
        }

        println!();
        match mode {
            LookupMode::CachedFirst => println!("Looking up {} URL(s) ...", self.cyan(urls.len())),
            LookupMode::ForceScan => println!("Scanning {} URL(s). This may take some time ...", self.cyan(urls.len())),
        }

        for url in urls {
            println!("Processing URL {}...", url);
        }
    }

    pub fn report_lookup_outcomes(&self, results: &LookupResults) {
        if results.outcomes.is_empty() {
            return;
        }

        if self.verbose {
            println!();
            for (url, _) in results.outcomes.iter() {
                println!("Processed URL {}", url);
            }
        }

        let mut table = Table::new();
        table.set_header(vec!["URL", "Analysis date", "Label", "Confidence", "Source"]);

        for (url, outcome) in results.outcomes.iter() {
            match outcome {
                Ok(verdict) => {
                    table.add_row(vec![
                        url.clone(),
                        verdict.observed_at.format("%d-%m-%Y").to_string(),
                        verdict.label.clone(),
                        verdict.confidence.clone(),
                        verdict.source.to_string(),
                    ]);
                },
                Err(error) => {
                    table.add_row(vec![
                        url.clone(),
                        "-".to_string(),
                        self.red(error.kind).to_string(),
                        "-".to_string(),
                        self.red(&error.message).to_string(),
                    ]);
                },
            }
        }

        println!();
        println!("{table}");

        let statistics = &results.statistics;
        println!();
        println!("• total URLs processed : {}", self.cyan(statistics.total));
        println!("• served from cache : {}", self.cyan(statistics.from_cache));
        println!("• fetched from VirusTotal : {}", self.cyan(statistics.from_remote));
        println!("• failed : {}", self.red(statistics.failed));
        println!();
    }

    fn cyan<T>(&self, what: T) -> StyledObject<T> {
        match self.use_colors {
            true => style(what).cyan(),
            false => style(what),
        }
    }

    fn red<T>(&self, what: T) -> StyledObject<T> {
        match self.use_colors {
            true => style(what).red(),
            false => style(what),
        }
    }
}

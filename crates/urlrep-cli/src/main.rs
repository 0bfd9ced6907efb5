// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use std::process::ExitCode;
use tikv_jemallocator::Jemalloc;
use urlrep_core::factory;
use urlrep_core::infra::cli;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let invocation = cli::parsing::parse_arguments()?;
    cli::troubleshooting::setup_troubleshooting(invocation.verbose);

    let urlrep = factory::create_urlrep(&invocation)?;
    let results = urlrep.execute(invocation.task).await?;

    match results.has_failures() {
        true => Ok(ExitCode::FAILURE),
        false => Ok(ExitCode::SUCCESS),
    }
}

// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use log::LevelFilter;

pub fn setup_troubleshooting(verbose: bool) {
    better_panic::install();
    human_panic::setup_panic!();

    let default_level = if verbose { LevelFilter::Info } else { LevelFilter::Warn };

    env_logger::builder()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp(None)
        .format_module_path(false)
        .format_level(false)
        .format_file(false)
        .format_target(false)
        .init();
}

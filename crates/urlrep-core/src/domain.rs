// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

pub mod cache;
pub mod errors;
pub mod interfaces;
pub mod lookups;
pub mod models;
pub mod settings;

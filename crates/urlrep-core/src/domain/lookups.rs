// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

pub mod engine;
pub mod standalone;

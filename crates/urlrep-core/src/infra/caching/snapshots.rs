// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use crate::domain::models::Verdict;
use crate::infra::caching::CacheManager;
use anyhow::Context;
use std::collections::HashMap;
use std::path::PathBuf;

static VERDICTS_FILE_NAME: &str = "verdicts.json";

/// Reads the verdicts cache once at startup and writes it back once at shutdown.
pub struct VerdictSnapshots {
    cache_manager: CacheManager,
}

impl VerdictSnapshots {
    pub fn new(cache_manager: CacheManager) -> Self {
        Self { cache_manager }
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.cache_manager.cache_dir().join(VERDICTS_FILE_NAME)
    }

    pub fn load(&self) -> anyhow::Result<HashMap<String, Verdict>> {
        let snapshot_file = self.snapshot_file();

        if !snapshot_file.exists() {
            log::info!("[urlrep.snapshots] {:?} not found; starting with empty cache", snapshot_file);
            return Ok(HashMap::new());
        }

        let serialized = std::fs::read(&snapshot_file)
            .with_context(|| format!("[urlrep.snapshots] cannot read {:?}", snapshot_file))?;
        let verdicts: HashMap<String, Verdict> = serde_json::from_slice(&serialized)
            .with_context(|| format!("[urlrep.snapshots] cannot parse {:?}", snapshot_file))?;

        log::info!("[urlrep.snapshots] loaded {} verdicts from {:?}", verdicts.len(), snapshot_file);
        Ok(verdicts)
    }

    pub fn store(&self, verdicts: &HashMap<String, Verdict>) -> anyhow::Result<()> {
        let cache_dir = self.cache_manager.cache_dir();

        if !cache_dir.exists() {
            std::fs::create_dir_all(cache_dir)
                .with_context(|| format!("[urlrep.snapshots] cannot create {:?}", cache_dir))?;
            log::info!("[urlrep.snapshots] {:?} created", cache_dir);
        }

        let snapshot_file = self.snapshot_file();
        let serialized = serde_json::to_vec_pretty(verdicts)?;
        std::fs::write(&snapshot_file, serialized)
            .with_context(|| format!("[urlrep.snapshots] cannot write {:?}", snapshot_file))?;

        log::info!("[urlrep.snapshots] saved {} verdicts into {:?}", verdicts.len(), snapshot_file);
        Ok(())
    }
}

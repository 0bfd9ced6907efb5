// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use std::env::home_dir;
use std::path::{Path, PathBuf};

pub mod snapshots;

static CACHE_FOLDER_NAME: &str = ".urlrep";

pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn get() -> Self {
        let cache_dir = match home_dir() {
            None => PathBuf::from("/var/cache").join(CACHE_FOLDER_NAME),
            Some(dir) => dir.join(CACHE_FOLDER_NAME),
        };
        Self { cache_dir }
    }

    pub fn at(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache_dir.as_path()
    }
}

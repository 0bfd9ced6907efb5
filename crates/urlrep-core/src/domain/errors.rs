// Copyright 2025 Dotanuki Labs
// SPDX-License-Identifier: MIT

use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    ClientError,
    ServerError,
    NotFound,
    ConfigError,
    Cancelled,
}

impl Display for ProviderErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderErrorKind::ClientError => "ClientError",
            ProviderErrorKind::ServerError => "ServerError",
            ProviderErrorKind::NotFound => "NotFoundError",
            ProviderErrorKind::ConfigError => "ConfigError",
            ProviderErrorKind::Cancelled => "CancellationError",
        };
        f.write_str(name)
    }
}

/// A classified failure, either reported by the remote provider or raised by local validation.
///
/// `status` carries the remote HTTP status code, or 0 when nothing was received.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (HTTP status = {status}) : {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: u16,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, status: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ClientError, status, message)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServerError, status, message)
    }

    pub fn not_found(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, status, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ConfigError, 0, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Cancelled, 0, message)
    }

    /// Maps a non-successful HTTP status into its error class.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if (400..=499).contains(&status) {
            Self::client(status, message)
        } else {
            Self::server(status, message)
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == ProviderErrorKind::Cancelled
    }
}

//! Error types for camfleet.

use serde::Serialize;
use thiserror::Error;

use crate::address::ServerAddress;

/// Why a single server did not produce a usable reply.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    #[error("timed out")]
    Timeout,

    #[error("unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("server error ({code}): {message}")]
    Protocol { code: String, message: String },

    #[error("malformed reply: {reason}")]
    Decode { reason: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Protocol error ({code}): {message}")]
    Protocol { code: String, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error(
        "{} of {} servers failed: {}",
        .failed.len(),
        .failed.len() + .succeeded.len(),
        summarize(.failed)
    )]
    PartialFleetFailure {
        failed: Vec<(ServerAddress, Failure)>,
        succeeded: Vec<ServerAddress>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Attach a server address to a per-server failure.
    pub fn from_failure(address: ServerAddress, failure: Failure) -> Self {
        match failure {
            Failure::Timeout => Self::Timeout(address.to_string()),
            Failure::Unreachable { reason } => Self::Unreachable(format!("{address}: {reason}")),
            Failure::Protocol { code, message } => Self::Protocol {
                code,
                message: format!("{address}: {message}"),
            },
            Failure::Decode { reason } => Self::Decode(format!("{address}: {reason}")),
        }
    }
}

fn summarize(failed: &[(ServerAddress, Failure)]) -> String {
    failed
        .iter()
        .map(|(addr, failure)| format!("{addr} ({failure})"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

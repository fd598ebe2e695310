//! Datagram envelopes and the download stream header.

use std::fmt;

use camfleet_core::{Error, Failure, Result};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::types::{FileRecord, ServerStatus};

/// Version stamped on every envelope. Replies with another version are rejected.
pub const PROTOCOL_VERSION: u16 = 1;
/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
/// Length of the big-endian size prefix a server sends before file bytes.
pub const DOWNLOAD_SIZE_HEADER: usize = 8;

/// Client → server datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub version: u16,
    pub seq: u32,
    pub command: Command,
}

impl Request {
    pub fn new(seq: u32, command: Command) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            seq,
            command,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::Validation(format!(
                "encoded {} command is {} bytes, over the datagram limit",
                self.command.name(),
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let request: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        check_version(request.version)?;
        Ok(request)
    }
}

/// Server → client datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub version: u16,
    /// Echo of the request's sequence number.
    pub seq: u32,
    pub reply: Reply,
}

impl Response {
    pub fn new(seq: u32, reply: Reply) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            seq,
            reply,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let response: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        check_version(response.version)?;
        Ok(response)
    }
}

fn check_version(version: u16) -> Result<()> {
    if version == PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(Error::Decode(format!(
            "unsupported protocol version {version} (expected {PROTOCOL_VERSION})"
        )))
    }
}

/// Structured failure code a server may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParameter,
    Unsupported,
    Busy,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "invalid_parameter"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Busy => write!(f, "busy"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Decoded reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Ack,
    Status { status: ServerStatus },
    Files { files: Vec<FileRecord> },
    Error { code: ErrorCode, message: String },
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Status { .. } => "status",
            Self::Files { .. } => "files",
            Self::Error { .. } => "error",
        }
    }

    /// Turn an error reply into a protocol failure; pass anything else through.
    pub fn into_result(self) -> std::result::Result<Reply, Failure> {
        match self {
            Self::Error { code, message } => Err(Failure::Protocol {
                code: code.to_string(),
                message,
            }),
            other => Ok(other),
        }
    }

    pub fn into_ack(self) -> std::result::Result<(), Failure> {
        match self.into_result()? {
            Self::Ack => Ok(()),
            other => Err(unexpected("ack", &other)),
        }
    }

    pub fn into_status(self) -> std::result::Result<ServerStatus, Failure> {
        match self.into_result()? {
            Self::Status { status } => Ok(status),
            other => Err(unexpected("status", &other)),
        }
    }

    pub fn into_files(self) -> std::result::Result<Vec<FileRecord>, Failure> {
        match self.into_result()? {
            Self::Files { files } => Ok(files),
            other => Err(unexpected("files", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> Failure {
    Failure::Decode {
        reason: format!("expected {expected} reply, got {}", got.kind()),
    }
}

/// Bytes a client sends after connecting to request one file.
pub fn encode_download_request(index: u32) -> [u8; 4] {
    index.to_be_bytes()
}

pub fn decode_download_request(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

pub fn encode_download_size(size: u64) -> [u8; DOWNLOAD_SIZE_HEADER] {
    size.to_be_bytes()
}

pub fn decode_download_size(bytes: [u8; DOWNLOAD_SIZE_HEADER]) -> u64 {
    u64::from_be_bytes(bytes)
}

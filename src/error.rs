use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::phase::PhaseKind;

/// Connect/send/receive failures. Recovered by the session; never fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection is not open")]
    NotConnected,
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection closed by peer")]
    Closed,
    #[error("transport i/o failure: {0}")]
    Io(#[from] io::Error),
    #[error("unrecoverable framing error: {0}")]
    Framing(#[from] ProtocolError),
}

/// Malformed or unusable frames. The frame is dropped and the session continues.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds the {} byte limit", crate::protocol::codec::MAX_FRAME_LEN)]
    FrameTooLarge(usize),
    #[error("frame is not a valid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{message_type} frame is missing field {field}")]
    MissingField {
        message_type: &'static str,
        field: &'static str,
    },
    #[error("{0} messages cannot be sent")]
    Unencodable(String),
}

/// Startup configuration problems. Fatal: no session is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// An input or message that the current phase does not accept.
/// Expected whenever a hidden UI affordance fires, so it is only traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{attempted} is not valid while {phase:?}")]
pub struct InvalidTransition {
    pub phase: PhaseKind,
    pub attempted: &'static str,
}

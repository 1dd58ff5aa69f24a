use std::time::Duration;
use thiserror::Error;

/// Which part of a round trip an I/O failure happened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Connect,
    Write,
    Read,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Connect => "connect",
            Stage::Write => "write",
            Stage::Read => "read",
        };
        write!(f, "{}", s)
    }
}

/// Failure of a single request/response round trip.
///
/// Always recoverable; the next query opens a fresh connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{stage} to {addr} failed: {source}")]
    Io {
        stage: Stage,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} to {addr} timed out after {}ms", .after.as_millis())]
    Timeout {
        stage: Stage,
        addr: String,
        after: Duration,
    },

    #[error("{addr} closed the connection without sending a response")]
    Closed { addr: String },

    #[error("inverter unreachable after {failures} consecutive failures: {last}")]
    Unreachable {
        failures: u32,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable { .. })
    }
}

/// Reasons a response could not be turned into a reading.
///
/// These never leave the decoder as errors; they are folded into the
/// matching `DecodedValue` sentinel.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("service not supported by inverter")]
    ServiceNotSupported,

    #[error("response malformed: {0}")]
    Malformed(String),

    #[error("formula marker {marker:#04x} not present")]
    MissingMarker { marker: u8 },

    #[error("value {0} outside plausible range")]
    OutOfRange(f32),
}

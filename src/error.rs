use std::io;

use thiserror::Error;

use crate::decoder::DecoderKind;

/// A field could not be decoded because the buffer ends before the field does.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("buffer too short for {kind}: need {width} bytes at offset {offset}, got {len}")]
pub struct DecodeError {
    pub kind: DecoderKind,
    pub offset: usize,
    pub width: usize,
    pub len: usize,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown service: {service_key}")]
    UnknownService { service_key: String },

    #[error("unknown characteristic {characteristic} for service {service_key}")]
    UnknownCharacteristic {
        service_key: String,
        characteristic: uuid::Uuid,
    },

    #[error("malformed payload: field {field} at offset {offset} is outside a {len} byte buffer")]
    MalformedPayload {
        field: &'static str,
        offset: usize,
        len: usize,
    },

    #[error("failed to decode field {field}: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected envelope type: expected {expected}, got {actual}")]
    UnexpectedKind {
        expected: &'static str,
        actual: String,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: channel is not open")]
    Unavailable,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),

    #[error("relay did not acknowledge joining room {0}")]
    JoinTimeout(String),
}

/// Device discovery or pairing failed. Never retried automatically.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("device discovery failed: {0}")]
    Discovery(String),

    #[error("device pairing failed: {0}")]
    Pairing(String),

    #[error("device exposes no catalogued service")]
    NoSupportedService,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no session is bound")]
    NotBound,
}

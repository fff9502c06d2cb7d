//! Error taxonomy for the EWF/ODRAW engine.
//!
//! Every fallible public operation returns [`Error`], a domain × kind pair
//! plus a free-text message, instead of the C source's boolean/out-parameter
//! convention. See `SPEC_FULL.md` §7 for the full domain/kind catalogue.

use std::fmt;
use thiserror::Error;

/// Broad area an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Arguments,
    Conversion,
    Compression,
    Io,
    Input,
    Memory,
    Output,
    Runtime,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Domain::Arguments => "Arguments",
            Domain::Conversion => "Conversion",
            Domain::Compression => "Compression",
            Domain::Io => "IO",
            Domain::Input => "Input",
            Domain::Memory => "Memory",
            Domain::Output => "Output",
            Domain::Runtime => "Runtime",
        };
        f.write_str(s)
    }
}

/// Specific failure mode within a [`Domain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    InvalidValue,
    ValueOutOfBounds,
    ValueExceedsMaximum,
    ValueTooSmall,
    ValueAlreadySet,
    ValueMissing,
    UnsupportedValue,
    ConflictingValue,
    InitializeFailed,
    ResizeFailed,
    CopyFailed,
    SetFailed,
    GetFailed,
    FinalizeFailed,
    AppendFailed,
    RemoveFailed,
    InsufficientSpace,
    ChecksumMismatch,
    OpenFailed,
    CloseFailed,
    ReadFailed,
    WriteFailed,
    SeekFailed,
    IoctlFailed,
    AccessDenied,
    InvalidResource,
    Generic,
    Aborted,
    DecompressionFailed,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The crate-wide error type: a domain × kind pair, a message, and an
/// optional wrapped system error.
#[derive(Error, Debug)]
#[error("{domain}.{kind}: {message}")]
pub struct Error {
    pub domain: Domain,
    pub kind: Kind,
    pub message: String,
    #[source]
    pub source: Option<std::io::Error>,
}

impl Error {
    pub fn new(domain: Domain, kind: Kind, message: impl Into<String>) -> Self {
        Error {
            domain,
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        domain: Domain,
        kind: Kind,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error {
            domain,
            kind,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(Domain::Arguments, Kind::InvalidValue, message)
    }

    pub fn unsupported_value(message: impl Into<String>) -> Self {
        Self::new(Domain::Input, Kind::UnsupportedValue, message)
    }

    pub fn checksum_mismatch(message: impl Into<String>) -> Self {
        Self::new(Domain::Input, Kind::ChecksumMismatch, message)
    }

    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::new(Domain::Io, Kind::ReadFailed, message)
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::new(Domain::Io, Kind::WriteFailed, message)
    }

    pub fn aborted() -> Self {
        Self::new(Domain::Runtime, Kind::Aborted, "operation aborted by caller")
    }

    pub fn decompression_failed(message: impl Into<String>) -> Self {
        Self::new(Domain::Compression, Kind::DecompressionFailed, message)
    }

    pub fn value_exceeds_maximum(message: impl Into<String>) -> Self {
        Self::new(Domain::Arguments, Kind::ValueExceedsMaximum, message)
    }

    pub fn value_missing(message: impl Into<String>) -> Self {
        Self::new(Domain::Input, Kind::ValueMissing, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(Domain::Io, Kind::Generic, err.to_string(), err)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_domain_and_kind() {
        let err = Error::invalid_value("chunk size must be nonzero");
        let msg = err.to_string();
        assert!(msg.starts_with("Arguments.InvalidValue"));
        assert!(msg.contains("chunk size"));
    }

    #[test]
    fn wraps_io_error_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert_eq!(err.domain, Domain::Io);
        assert!(err.source.is_some());
    }
}

//! Error taxonomy
//!
//! Three kinds of failure can end a run:
//!
//! - **Content divergence**: the device returned bytes that differ from the
//!   shadow model.
//! - **Device I/O error**: the read/write/truncate/discard call itself failed.
//! - **Invariant violation**: the exerciser produced something it must never
//!   produce (a range outside its zone, inconsistent sizes). This is a bug in
//!   blkx, not in the system under test.
//!
//! All three are fatal and never retried. They are carried by [`Divergence`].
//! Startup rejections (bad configuration, unsafe zone layout) are
//! [`ExerciserError`]s and happen before any operation is issued.

use crate::position::{ByteRange, Zone};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Operation kinds understood by the executors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Read,
    Write,
    Truncate,
    Discard,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Read => write!(f, "read"),
            OpKind::Write => write!(f, "write"),
            OpKind::Truncate => write!(f, "truncate"),
            OpKind::Discard => write!(f, "discard"),
        }
    }
}

/// Internal consistency failures of the exerciser itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A range would leave the zone assigned to this instance
    #[error("{op} range {range} escapes assigned zone {zone}")]
    ZoneEscape {
        op: OpKind,
        range: ByteRange,
        zone: Zone,
    },

    /// A range is larger than the IO buffer
    #[error("{op} range {range} is larger than the maximum operation size {maximum}")]
    OversizedRange {
        op: OpKind,
        range: ByteRange,
        maximum: u64,
    },

    /// A write would push the logical size past the configured maximum
    #[error("write {range} would grow logical size to {requested}, maximum is {maximum}")]
    LogicalSizeExceeded {
        range: ByteRange,
        requested: u64,
        maximum: u64,
    },

    /// Truncate computed an end offset below the start of its own range
    #[error("truncate end offset {end} is below range offset {offset}")]
    TruncateBelowOffset { end: u64, offset: u64 },

    /// Discard length exceeds the maximum logical size of the instance
    #[error("discard length {length} at offset {offset} exceeds maximum logical size {maximum}")]
    DiscardTooLong {
        offset: u64,
        length: u64,
        maximum: u64,
    },

    /// Too many operations in a row made no progress
    #[error("{skipped} consecutive operations made no progress")]
    Stalled { skipped: u64 },
}

/// Why a run stopped before its budget was reached
#[derive(Debug, Error)]
pub enum Divergence {
    /// Device content differs from the shadow model
    #[error("content mismatch at offset {offset}: expected 0x{expected:02x}, observed 0x{observed:02x}")]
    Content {
        offset: u64,
        expected: u8,
        observed: u8,
    },

    /// The device call itself failed
    #[error("{op} failed at offset {offset}, length {len}: {error:#}")]
    Io {
        op: OpKind,
        offset: u64,
        len: u64,
        error: anyhow::Error,
    },

    /// The exerciser violated one of its own invariants
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl Divergence {
    /// Short category name used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Divergence::Content { .. } => "content",
            Divergence::Io { .. } => "io",
            Divergence::Invariant(_) => "invariant",
        }
    }

    /// OS error code of an I/O divergence, if the error chain carries one
    pub fn errno(&self) -> Option<i32> {
        match self {
            Divergence::Io { error, .. } => error
                .chain()
                .find_map(|e| e.downcast_ref::<std::io::Error>())
                .and_then(|e| e.raw_os_error()),
            _ => None,
        }
    }

    /// Serializable projection for reports
    pub fn to_report(&self) -> DivergenceReport {
        let mut report = DivergenceReport {
            kind: self.kind(),
            message: self.to_string(),
            op: None,
            offset: None,
            expected: None,
            observed: None,
            errno: self.errno(),
        };
        match self {
            Divergence::Content { offset, expected, observed } => {
                report.op = Some(OpKind::Read);
                report.offset = Some(*offset);
                report.expected = Some(*expected);
                report.observed = Some(*observed);
            }
            Divergence::Io { op, offset, .. } => {
                report.op = Some(*op);
                report.offset = Some(*offset);
            }
            Divergence::Invariant(_) => {}
        }
        report
    }
}

/// Divergence detail suitable for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct DivergenceReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<OpKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

/// Rejections raised while building an exerciser, before any I/O is issued
#[derive(Debug, Error)]
pub enum ExerciserError {
    /// Configuration is inconsistent with itself or with the opened device
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Zone layout would let two instances overlap
    #[error(transparent)]
    Zone(#[from] crate::zone::ZoneError),

    /// Buffer or device setup failed
    #[error("setup failed: {0:#}")]
    Setup(anyhow::Error),

    /// `run()` was called on an exerciser that already reached a terminal state
    #[error("exerciser already finished")]
    AlreadyFinished,
}

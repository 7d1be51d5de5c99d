//! Error types for the control layer, the snapshot store, the debug console
//! and the display decoder.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ExecutionMode;

/// Failures surfaced by the control layer.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Backing engine or worker threads could not be brought up; fatal.
    #[error("initialization failed: {reason}")]
    Initialization {
        /// Human-readable cause.
        reason: String,
    },
    /// Requested execution-mode change is not in the transition table.
    #[error("illegal execution-mode transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Mode at the time of the request.
        from: ExecutionMode,
        /// Rejected target mode.
        to: ExecutionMode,
    },
    /// Worker threads did not wind down cleanly.
    #[error("shutdown incomplete: {reason}")]
    Shutdown {
        /// Human-readable cause.
        reason: String,
    },
    /// Snapshot save/load failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// Operator console failed in a way re-prompting cannot fix.
    #[error(transparent)]
    Debug(#[from] DebugInputError),
    /// Display region could not be decoded.
    #[error(transparent)]
    Display(#[from] DisplayError),
}

impl ControlError {
    /// Returns `false` only for failures that must abort startup.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Initialization { .. })
    }
}

/// Snapshot store failures. None of them mutate engine state.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot file could not be created, opened, read, or written.
    #[error("snapshot file {path:?} unavailable: {source}")]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Blob length differs from the fixed snapshot length.
    #[error("snapshot length mismatch (expected {expected} bytes, got {actual})")]
    LengthMismatch {
        /// Fixed length for the active profile.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },
    /// Engine exposes a data window of a different size than the profile.
    #[error("engine data window is {actual} bytes, profile expects {expected}")]
    WindowMismatch {
        /// Data window size implied by the profile.
        expected: usize,
        /// Size the engine reports.
        actual: usize,
    },
}

/// Operator console input failures.
#[derive(Debug, Error)]
pub enum DebugInputError {
    /// Address token is not 1-6 hexadecimal digits.
    #[error("malformed address {0:?}: expected up to 6 hex digits")]
    MalformedAddress(String),
    /// Patch header is not `AAAAAA,NNN`.
    #[error("malformed patch header {0:?}: expected `AAAAAA,NNN`")]
    MalformedPatchHeader(String),
    /// Byte token is not 1-2 hexadecimal digits.
    #[error("malformed byte token {0:?}: expected 2 hex digits")]
    MalformedByte(String),
    /// Console closed before the session completed.
    #[error("console closed with {remaining} byte(s) outstanding")]
    Eof {
        /// Bytes still expected when input ended.
        remaining: u32,
    },
    /// Console read or write failed.
    #[error("console i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl DebugInputError {
    /// Malformed tokens are discarded and re-prompted; the rest end the session.
    #[must_use]
    pub const fn is_reprompt(&self) -> bool {
        matches!(
            self,
            Self::MalformedAddress(_) | Self::MalformedPatchHeader(_) | Self::MalformedByte(_)
        )
    }
}

/// Frame decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DisplayError {
    /// Row stride is narrower than the visible width.
    #[error("row stride {stride} px is narrower than visible width {width} px")]
    StrideTooNarrow {
        /// Visible width in pixels.
        width: u16,
        /// Row stride in pixels.
        stride: u16,
    },
    /// Source bytes do not cover every plane of the layout.
    #[error("frame buffer too short (need {needed} bytes, got {actual})")]
    BufferTooShort {
        /// Bytes the layout requires.
        needed: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

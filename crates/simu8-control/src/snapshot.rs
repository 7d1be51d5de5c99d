//! Fixed-length save/restore of the data window and register file.
//!
//! The blob has no header: `DATA_WINDOW_SIZE` bytes of data memory followed
//! by the 40-byte register file. A load verifies the length before touching
//! any engine state, so a truncated file can never leave memory half-written.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::engine::{CoreEngine, RegisterFile, REGISTER_FILE_BYTES};
use crate::error::SnapshotError;
use crate::profile::{DATA_WINDOW_SIZE, SNAPSHOT_LEN};
use crate::state::{ControlContext, CoreGuard};

/// A validated snapshot of exactly [`SNAPSHOT_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBlob(Vec<u8>);

impl SnapshotBlob {
    /// Accepts `bytes` only if it has the fixed snapshot length.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::LengthMismatch`] for any other length.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SnapshotError> {
        if bytes.len() == SNAPSHOT_LEN {
            Ok(Self(bytes))
        } else {
            Err(SnapshotError::LengthMismatch {
                expected: SNAPSHOT_LEN,
                actual: bytes.len(),
            })
        }
    }

    /// Raw blob.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Data-window part.
    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.0[..DATA_WINDOW_SIZE]
    }

    /// Decoded register-file part.
    #[must_use]
    pub fn registers(&self) -> RegisterFile {
        let mut raw = [0u8; REGISTER_FILE_BYTES];
        raw.copy_from_slice(&self.0[DATA_WINDOW_SIZE..]);
        RegisterFile::from_bytes(&raw)
    }
}

fn check_window<E: CoreEngine>(engine: &E) -> Result<(), SnapshotError> {
    let actual = engine.data_window().len();
    if actual == DATA_WINDOW_SIZE {
        Ok(())
    } else {
        Err(SnapshotError::WindowMismatch {
            expected: DATA_WINDOW_SIZE,
            actual,
        })
    }
}

/// Captures data memory then registers.
///
/// # Errors
///
/// Returns [`SnapshotError::WindowMismatch`] if the engine's data window is
/// not the profile size.
pub fn save<E: CoreEngine>(core: &CoreGuard<'_, E>) -> Result<SnapshotBlob, SnapshotError> {
    let engine = core.engine();
    check_window(engine)?;
    let mut bytes = Vec::with_capacity(SNAPSHOT_LEN);
    bytes.extend_from_slice(engine.data_window());
    bytes.extend_from_slice(&engine.registers().to_bytes());
    SnapshotBlob::from_bytes(bytes)
}

/// Writes `bytes` back into the engine.
///
/// Nothing is written unless `bytes` has the fixed length and the engine's
/// window matches.
///
/// # Errors
///
/// Returns [`SnapshotError::LengthMismatch`] or
/// [`SnapshotError::WindowMismatch`]; engine state is untouched in both cases.
pub fn load<E: CoreEngine>(core: &mut CoreGuard<'_, E>, bytes: &[u8]) -> Result<(), SnapshotError> {
    let blob = SnapshotBlob::from_bytes(bytes.to_vec())?;
    restore(core, &blob)
}

/// Writes a validated blob back into the engine.
///
/// # Errors
///
/// Returns [`SnapshotError::WindowMismatch`] before writing anything if the
/// engine's data window is not the profile size.
pub fn restore<E: CoreEngine>(
    core: &mut CoreGuard<'_, E>,
    blob: &SnapshotBlob,
) -> Result<(), SnapshotError> {
    let engine = core.engine_mut();
    check_window(engine)?;
    engine.data_window_mut().copy_from_slice(blob.memory());
    *engine.registers_mut() = blob.registers();
    Ok(())
}

/// Captures under the lock, then writes the file after releasing it.
///
/// # Errors
///
/// Returns [`SnapshotError::Io`] if the file cannot be written, or any
/// [`save`] error.
pub fn save_to_file<E: CoreEngine>(
    ctx: &ControlContext<E>,
    path: &Path,
) -> Result<SnapshotBlob, SnapshotError> {
    let blob = save(&ctx.lock())?;
    fs::write(path, blob.as_bytes()).map_err(|source| {
        warn!("snapshot save to {} failed: {source}", path.display());
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;
    info!("state saved to {}", path.display());
    Ok(blob)
}

/// Reads and validates the file without the lock, then restores under it.
///
/// # Errors
///
/// Returns [`SnapshotError::Io`] if the file cannot be read, or any
/// [`restore`] or length error. Engine state is unchanged on failure.
pub fn load_from_file<E: CoreEngine>(
    ctx: &ControlContext<E>,
    path: &Path,
) -> Result<(), SnapshotError> {
    let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    });
    let blob = bytes.and_then(SnapshotBlob::from_bytes).inspect_err(|err| {
        warn!("snapshot load from {} failed: {err}", path.display());
    })?;
    restore(&mut ctx.lock(), &blob)?;
    info!("state loaded from {}", path.display());
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for configuration, devices, kernels and checkpoints.
//!
//! Callers pattern-match on the failure mode instead of parsing strings.
//! A small set of variants is fatal for a run (see [`QcdError::is_fatal`]):
//! the CLI prints the diagnostic and exits non-zero. Nothing is retried.

use std::path::PathBuf;

/// Errors arising from configuring, running or persisting a simulation.
#[derive(Debug, thiserror::Error)]
pub enum QcdError {
    /// Invalid or inconsistent run parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// No compute device can run the lattice kernels.
    #[error("no supported compute device found: {0}")]
    NoDevice(String),

    /// A device call (buffer allocation, mapping, upload) failed.
    #[error("device error: {0}")]
    Device(String),

    /// A kernel program or kernel entry point could not be built.
    #[error("kernel build failed for `{kernel}`: {reason}")]
    KernelBuild { kernel: String, reason: String },

    /// A kernel dispatch failed.
    #[error("kernel `{kernel}` failed: {reason}")]
    KernelRun { kernel: String, reason: String },

    /// Checkpoint prefix or version does not match this build.
    #[error("checkpoint {path} rejected: expected {expected}, found {found}")]
    CheckpointMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// Checkpoint is truncated or inconsistent with the current run.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Lattice geometry violates a layout constraint.
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation was called in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    State(String),
}

impl QcdError {
    /// Fatal errors end the run with no degraded-mode continuation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoDevice(_) | Self::KernelBuild { .. } | Self::CheckpointMismatch { .. }
        )
    }

    pub(crate) fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QcdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config() {
        let err = QcdError::config("ND must be at most 32");
        assert_eq!(err.to_string(), "configuration error: ND must be at most 32");
    }

    #[test]
    fn display_kernel_build() {
        let err = QcdError::KernelBuild {
            kernel: "update_odd".into(),
            reason: "missing entry point".into(),
        };
        assert!(err.to_string().contains("update_odd"));
        assert!(err.to_string().contains("missing entry point"));
    }

    #[test]
    fn fatal_classification() {
        assert!(QcdError::NoDevice("none".into()).is_fatal());
        assert!(QcdError::CheckpointMismatch {
            path: PathBuf::from("state.bin"),
            expected: "QCDGPU 2.0".into(),
            found: "XXXX".into(),
        }
        .is_fatal());
        assert!(!QcdError::Checkpoint("truncated".into()).is_fatal());
        assert!(!QcdError::config("bad").is_fatal());
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: QcdError = io.into();
        assert!(matches!(err, QcdError::Io(_)));
    }
}

//! Client error type.

use std::ffi::NulError;

use cephfs_types::{CephFsError, ConfigError};
use thiserror::Error;

use crate::command::CommandFailed;

/// Everything a mount handle operation can fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// The native library returned a non-zero result.
    #[error(transparent)]
    Ceph(#[from] CephFsError),

    /// An MDS command returned a non-zero result.
    #[error(transparent)]
    Command(#[from] CommandFailed),

    /// A string argument could not be marshaled to a C string.
    #[error("argument contains a NUL byte at offset {offset}")]
    InteriorNul { offset: usize },

    /// An MDS command was issued with no arguments.
    #[error("MDS command requires at least one argument")]
    EmptyCommand,

    /// The mount configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<NulError> for Error {
    fn from(e: NulError) -> Self {
        Self::InteriorNul {
            offset: e.nul_position(),
        }
    }
}

impl Error {
    /// The foreign error code, when this error came from the native library.
    pub fn ceph_error(&self) -> Option<CephFsError> {
        match self {
            Error::Ceph(e) => Some(*e),
            Error::Command(e) => Some(e.error),
            _ => None,
        }
    }
}

/// Client result type.
pub type Result<T> = std::result::Result<T, Error>;

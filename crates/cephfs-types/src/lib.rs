//! Shared types for the CephFS client binding.
//!
//! A leaf crate with no knowledge of the native library: the error domain
//! that every foreign call result passes through, the mount lifecycle enum,
//! and the declarative mount configuration.
//!
//! |--------------------|----------------------------------------------|
//! | Type               | Purpose                                      |
//! |--------------------|----------------------------------------------|
//! | [`CephFsError`]    | Non-zero foreign result code + description   |
//! | [`check`]          | `0 → Ok(())`, anything else → `CephFsError`  |
//! | [`MountState`]     | Lifecycle of a live mount handle             |
//! | [`MountConfig`]    | RON-backed handle preparation settings       |
//! |--------------------|----------------------------------------------|

pub mod config;
pub mod error;
pub mod state;

pub use config::{ConfigError, MountConfig};
pub use error::{CephFsError, check};
pub use state::MountState;

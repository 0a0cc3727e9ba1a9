//! # cephfs-client
//!
//! Client-side access to a CephFS filesystem through libcephfs: mount
//! lifecycle, path operations, and MDS administrative commands.
//!
//! ```text
//! Mount::create / create_with_id / from_cluster / from_config
//!     └── read_default_config / read_config_file / set_config_option   (optional)
//!     └── mount
//!         └── change_dir, make_dir, remove_dir, chmod, chown, sync_fs
//!         └── mds_command / mds_command_with_input
//!     └── unmount
//! └── release (or drop)
//! ```
//!
//! Every call goes through a [`CephFsApi`] implementation: [`LibCephFs`]
//! (feature `native`, links `-lcephfs`) in production, or [`MockCephFs`]
//! (feature `test-mock`) in tests. Every result code passes through
//! [`cephfs_types::check`].
//!
//! ## Process-wide state
//!
//! The native library keeps global state (logging, config parsing
//! machinery) that is initialized by the first handle and shared by all of
//! them. Whether several handles with different configurations coexist
//! safely in one process is up to the library version in use; this crate
//! does not isolate them.

pub mod api;
pub mod command;
pub mod error;
mod marshal;
pub mod mount;

#[cfg(feature = "native")]
pub mod ffi;

#[cfg(any(test, feature = "test-mock"))]
pub mod mock;

pub use api::{CephFsApi, ClusterConnection, LibraryVersion, library_version};
pub use cephfs_types::{CephFsError, ConfigError, MountConfig, MountState, check};
pub use command::{CommandFailed, CommandReply};
pub use error::{Error, Result};
pub use mount::Mount;

#[cfg(feature = "native")]
pub use ffi::{LibCephFs, RawRadosCluster};

#[cfg(any(test, feature = "test-mock"))]
pub use mock::{MockCephFs, MockCluster, MockReply};

/// A mount handle backed by the linked libcephfs.
#[cfg(feature = "native")]
pub type NativeMount<'conn> = Mount<'conn, LibCephFs>;

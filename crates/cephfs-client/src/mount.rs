//! Mount handle lifecycle and path operations.
//!
//! A [`Mount`] exclusively owns one native mount context. It is created
//! fresh, with a client id, or from an existing cluster connection; it is
//! configured, mounted, and unmounted in place; and it is destroyed by
//! [`Mount::release`], which consumes it. A handle dropped without an
//! explicit release is unmounted (if mounted) and released in `Drop`.
//!
//! ## Threading
//!
//! Calls block the calling thread until the library returns, and nothing
//! here is cancellable. There is no internal locking around the native
//! context: a handle may move between threads but is not `Sync`, so use
//! one handle per thread or serialize access externally.

use std::ffi::CStr;
use std::marker::PhantomData;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use cephfs_types::{CephFsError, MountConfig, MountState};
use libc::{c_char, c_int, mode_t};
use tracing::{debug, warn};

use crate::api::{CephFsApi, ClusterConnection};
use crate::error::Result;
use crate::marshal::{TransientStr, optional_str, ptr_or_null};

/// Initial buffer for `conf_get`; doubled on `-ENAMETOOLONG`.
const CONF_GET_INITIAL_LEN: usize = 256;

/// Upper bound for `conf_get` buffer growth.
const CONF_GET_MAX_LEN: usize = 64 * 1024;

/// Map an allocation result; the library never reports failure as zero,
/// but a zero code is treated as `-EIO` rather than success.
fn allocated<H>(op: &'static str, created: std::result::Result<H, c_int>) -> Result<H> {
    created.map_err(|code| {
        let err = CephFsError::from_code(code).unwrap_or(CephFsError::from_errno(libc::EIO));
        debug!(op, code, %err, "mount context allocation failed");
        err.into()
    })
}

/// An owned CephFS mount context.
///
/// `'conn` ties a handle derived from a [`ClusterConnection`] to that
/// connection; fresh handles are `'static`.
pub struct Mount<'conn, A: CephFsApi> {
    pub(crate) api: A,
    pub(crate) handle: A::Handle,
    state: MountState,
    released: bool,
    _conn: PhantomData<&'conn ()>,
}

impl<A: CephFsApi> std::fmt::Debug for Mount<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}

impl<A: CephFsApi> Mount<'static, A> {
    /// Allocate a fresh mount context with no client id.
    pub fn create(api: A) -> Result<Self> {
        Self::create_inner(api, None)
    }

    /// Allocate a fresh mount context for client `id`.
    pub fn create_with_id(api: A, id: &str) -> Result<Self> {
        Self::create_inner(api, Some(id))
    }

    fn create_inner(api: A, id: Option<&str>) -> Result<Self> {
        let c_id = optional_str(id)?;
        // SAFETY: c_id outlives the call.
        let created = unsafe { api.create(ptr_or_null(&c_id)) };
        drop(c_id);

        let handle = allocated("create", created)?;
        debug!(?id, ?handle, "mount context allocated");
        Ok(Self::from_handle(api, handle))
    }

    /// Allocate and prepare a handle from a [`MountConfig`].
    ///
    /// The handle is left in [`MountState::Configured`] (or `Allocated`
    /// when the config asks for nothing); it is not mounted. On failure the
    /// partially prepared handle is released before the error returns.
    pub fn from_config(api: A, config: &MountConfig) -> Result<Self> {
        let mut mount = match &config.client_id {
            Some(id) => Self::create_with_id(api, id)?,
            None => Self::create(api)?,
        };

        if config.read_config {
            match &config.config_file {
                Some(path) => mount.read_config_file(path)?,
                None => mount.read_default_config()?,
            }
        }
        if let Some(var) = &config.parse_env {
            mount.parse_env(Some(var.as_str()))?;
        }
        for (key, value) in &config.options {
            mount.set_config_option(key, value)?;
        }
        Ok(mount)
    }
}

impl<'conn, A: CephFsApi> Mount<'conn, A> {
    /// Derive a mount context from an existing cluster connection.
    ///
    /// The connection is not owned; it is borrowed for as long as the
    /// returned handle lives.
    pub fn from_cluster<C>(api: A, conn: &'conn C) -> Result<Self>
    where
        C: ClusterConnection<Raw = A::Cluster>,
    {
        // SAFETY: the borrow keeps the connection alive past this call.
        let created = unsafe { api.create_from_cluster(conn.raw_cluster()) };
        let handle = allocated("create_from_cluster", created)?;
        debug!(?handle, "mount context derived from cluster connection");
        Ok(Self::from_handle(api, handle))
    }

    fn from_handle(api: A, handle: A::Handle) -> Self {
        Self {
            api,
            handle,
            state: MountState::Allocated,
            released: false,
            _conn: PhantomData,
        }
    }

    /// Lifecycle state as tracked by this handle.
    pub fn state(&self) -> MountState {
        self.state
    }

    /// The boundary this handle calls through.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Map a foreign result and log failures.
    pub(crate) fn checked(&self, op: &'static str, ret: c_int) -> Result<()> {
        cephfs_types::check(ret).map_err(|err| {
            debug!(op, code = ret, %err, "cephfs call failed");
            err.into()
        })
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Read configuration from the default search path.
    ///
    /// Failure leaves the lifecycle state unchanged.
    pub fn read_default_config(&mut self) -> Result<()> {
        // SAFETY: null selects the default path list.
        let ret = unsafe { self.api.conf_read_file(self.handle, ptr::null()) };
        self.checked("conf_read_file", ret)?;
        self.configured();
        Ok(())
    }

    /// Read configuration from an explicit file (or comma-separated list).
    ///
    /// The path bytes are passed through unchanged, so non-UTF-8 names work.
    pub fn read_config_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let c_path = TransientStr::new(path.as_ref().as_os_str().as_bytes())?;
        // SAFETY: c_path outlives the call.
        let ret = unsafe { self.api.conf_read_file(self.handle, c_path.as_ptr()) };
        drop(c_path);
        self.checked("conf_read_file", ret)?;
        self.configured();
        Ok(())
    }

    /// Parse ceph arguments from an environment variable (`CEPH_ARGS` when `None`).
    pub fn parse_env(&mut self, var: Option<&str>) -> Result<()> {
        let c_var = optional_str(var)?;
        // SAFETY: c_var outlives the call.
        let ret = unsafe { self.api.conf_parse_env(self.handle, ptr_or_null(&c_var)) };
        drop(c_var);
        self.checked("conf_parse_env", ret)?;
        self.configured();
        Ok(())
    }

    /// Set a single configuration option.
    pub fn set_config_option(&mut self, option: &str, value: &str) -> Result<()> {
        let c_option = TransientStr::new(option)?;
        let c_value = TransientStr::new(value)?;
        // SAFETY: both strings outlive the call.
        let ret = unsafe { self.api.conf_set(self.handle, c_option.as_ptr(), c_value.as_ptr()) };
        drop((c_option, c_value));
        self.checked("conf_set", ret)?;
        self.configured();
        Ok(())
    }

    /// Read a configuration option's current value.
    pub fn config_option(&self, option: &str) -> Result<String> {
        let c_option = TransientStr::new(option)?;
        let mut len = CONF_GET_INITIAL_LEN;
        loop {
            let mut buf = vec![0 as c_char; len];
            // SAFETY: buf is writable for `len` bytes; c_option outlives the call.
            let ret = unsafe {
                self.api
                    .conf_get(self.handle, c_option.as_ptr(), buf.as_mut_ptr(), buf.len())
            };
            if ret == -libc::ENAMETOOLONG && len < CONF_GET_MAX_LEN {
                len *= 2;
                continue;
            }
            self.checked("conf_get", ret)?;
            // SAFETY: on success the library NUL-terminates within `len`.
            let value = unsafe { CStr::from_ptr(buf.as_ptr()) };
            return Ok(value.to_string_lossy().into_owned());
        }
    }

    fn configured(&mut self) {
        let next = self.state.after_configure();
        if next != self.state {
            debug!(from = %self.state, to = %next, "mount state");
            self.state = next;
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Mount the filesystem root, establishing a connection capable of I/O.
    ///
    /// On failure the handle stays in its prior state.
    pub fn mount(&mut self) -> Result<()> {
        // SAFETY: null root mounts "/".
        let ret = unsafe { self.api.mount(self.handle, ptr::null()) };
        self.checked("mount", ret)?;
        self.transition(MountState::Mounted);
        Ok(())
    }

    /// Unmount the filesystem.
    ///
    /// Repeated calls are passed through; the library decides whether they fail.
    pub fn unmount(&mut self) -> Result<()> {
        // SAFETY: handle is live until release.
        let ret = unsafe { self.api.unmount(self.handle) };
        self.checked("unmount", ret)?;
        self.transition(MountState::Unmounted);
        Ok(())
    }

    /// Destroy the mount context.
    ///
    /// If the library refuses (e.g. the handle is still mounted) the error
    /// is returned and the handle falls through to `Drop`, which unmounts
    /// when mounted and releases again.
    pub fn release(mut self) -> Result<()> {
        // SAFETY: on success `released` is set and nothing touches the handle again.
        let ret = unsafe { self.api.release(self.handle) };
        if ret != 0 {
            warn!(handle = ?self.handle, code = ret, "ceph_release failed; retrying on drop");
            return self.checked("release", ret);
        }
        self.released = true;
        debug!(handle = ?self.handle, "mount context released");
        Ok(())
    }

    /// Whether the library reports this context as mounted.
    ///
    /// This is the library's own flag, queried fresh. A disagreement with
    /// [`state`](Self::state) is logged, not reconciled.
    pub fn is_mounted(&self) -> bool {
        // SAFETY: handle is live until release.
        let native = unsafe { self.api.is_mounted(self.handle) } == 1;
        if native != self.state.is_mounted() {
            warn!(
                handle = ?self.handle,
                state = %self.state,
                native,
                "native mount flag disagrees with tracked state"
            );
        }
        native
    }

    fn transition(&mut self, next: MountState) {
        debug!(handle = ?self.handle, from = %self.state, to = %next, "mount state");
        self.state = next;
    }

    /// Flush all pending filesystem data to durable storage.
    pub fn sync_fs(&self) -> Result<()> {
        // SAFETY: handle is live until release.
        let ret = unsafe { self.api.sync_fs(self.handle) };
        self.checked("sync_fs", ret)
    }

    // ========================================================================
    // Path operations
    // ========================================================================

    /// The current working directory. Empty when the library has none.
    pub fn current_dir(&self) -> String {
        // SAFETY: the returned pointer is valid until the next call on the handle;
        // it is copied before anything else touches the handle.
        unsafe {
            let raw = self.api.getcwd(self.handle);
            if raw.is_null() {
                String::new()
            } else {
                CStr::from_ptr(raw).to_string_lossy().into_owned()
            }
        }
    }

    /// Change the current working directory.
    pub fn change_dir(&self, path: &str) -> Result<()> {
        // SAFETY (all path ops): `p` points into a transient that outlives the call.
        self.path_call("chdir", path, |p| unsafe { self.api.chdir(self.handle, p) })
    }

    /// Create a directory.
    pub fn make_dir(&self, path: &str, mode: u32) -> Result<()> {
        self.path_call("mkdir", path, |p| unsafe {
            self.api.mkdir(self.handle, p, mode as mode_t)
        })
    }

    /// Remove an empty directory.
    pub fn remove_dir(&self, path: &str) -> Result<()> {
        self.path_call("rmdir", path, |p| unsafe { self.api.rmdir(self.handle, p) })
    }

    /// Change the permission bits of a file or directory.
    pub fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        self.path_call("chmod", path, |p| unsafe {
            self.api.chmod(self.handle, p, mode as mode_t)
        })
    }

    /// Change the owner and group of a file or directory.
    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        self.path_call("chown", path, |p| unsafe {
            self.api.chown(self.handle, p, uid as c_int, gid as c_int)
        })
    }

    /// marshal path → call → free transient → map result.
    fn path_call(
        &self,
        op: &'static str,
        path: &str,
        call: impl FnOnce(*const c_char) -> c_int,
    ) -> Result<()> {
        let c_path = TransientStr::new(path)?;
        let ret = call(c_path.as_ptr());
        drop(c_path);
        self.checked(op, ret)
    }
}

impl<A: CephFsApi> Drop for Mount<'_, A> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.state.is_mounted() {
            // SAFETY: handle is live; this is the drop path.
            let ret = unsafe { self.api.unmount(self.handle) };
            if let Err(err) = cephfs_types::check(ret) {
                warn!(handle = ?self.handle, %err, "unmount on drop failed");
            }
        }
        // SAFETY: last call on the handle.
        let ret = unsafe { self.api.release(self.handle) };
        match cephfs_types::check(ret) {
            Ok(()) => debug!(handle = ?self.handle, "mount context released on drop"),
            Err(err) => warn!(handle = ?self.handle, %err, "release on drop failed"),
        }
    }
}

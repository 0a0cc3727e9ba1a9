//! The foreign call boundary.
//!
//! [`CephFsApi`] mirrors the subset of `libcephfs.h` this crate consumes,
//! one method per C entry point, with C calling conventions kept intact:
//! raw NUL-terminated strings in, bare `c_int` results out, and
//! library-allocated buffers returned through out-parameters. Nothing above
//! this trait touches the native library directly, which is what lets the
//! mount and marshaling layers run against [`MockCephFs`](crate::MockCephFs)
//! in tests.

use std::ffi::CStr;
use std::fmt;

use libc::{c_char, c_int, mode_t};

/// Raw libcephfs entry points.
///
/// # Safety
///
/// Implementors must honor the libcephfs contract:
///
/// - String parameters are only read for the duration of the call.
/// - Buffers written to `outbuf`/`outs` by [`mds_command`](Self::mds_command)
///   stay valid until passed to [`buffer_free`](Self::buffer_free), and the
///   reported lengths never exceed the allocation.
/// - The pointer returned by [`getcwd`](Self::getcwd) stays valid until the
///   next call on the same handle.
/// - A handle is never used after [`release`](Self::release) succeeds.
pub unsafe trait CephFsApi {
    /// Opaque mount context reference (`struct ceph_mount_info *`).
    type Handle: Copy + fmt::Debug;

    /// Existing cluster connection reference (`rados_t`).
    type Cluster: Copy;

    /// `ceph_create`. `id` may be null.
    unsafe fn create(&self, id: *const c_char) -> Result<Self::Handle, c_int>;

    /// `ceph_create_from_rados`.
    unsafe fn create_from_cluster(&self, cluster: Self::Cluster) -> Result<Self::Handle, c_int>;

    /// `ceph_conf_read_file`. A null `path` reads the default search path.
    unsafe fn conf_read_file(&self, handle: Self::Handle, path: *const c_char) -> c_int;

    /// `ceph_conf_parse_env`. A null `var` means `CEPH_ARGS`.
    unsafe fn conf_parse_env(&self, handle: Self::Handle, var: *const c_char) -> c_int;

    /// `ceph_conf_set`.
    unsafe fn conf_set(
        &self,
        handle: Self::Handle,
        option: *const c_char,
        value: *const c_char,
    ) -> c_int;

    /// `ceph_conf_get`. Returns `-ENAMETOOLONG` when `buf` is too small.
    unsafe fn conf_get(
        &self,
        handle: Self::Handle,
        option: *const c_char,
        buf: *mut c_char,
        len: usize,
    ) -> c_int;

    /// `ceph_mount`. A null `root` mounts the filesystem root.
    unsafe fn mount(&self, handle: Self::Handle, root: *const c_char) -> c_int;

    /// `ceph_unmount`.
    unsafe fn unmount(&self, handle: Self::Handle) -> c_int;

    /// `ceph_release`.
    unsafe fn release(&self, handle: Self::Handle) -> c_int;

    /// `ceph_is_mounted`. Returns 1 when mounted.
    unsafe fn is_mounted(&self, handle: Self::Handle) -> c_int;

    /// `ceph_sync_fs`.
    unsafe fn sync_fs(&self, handle: Self::Handle) -> c_int;

    /// `ceph_getcwd`. May return null.
    unsafe fn getcwd(&self, handle: Self::Handle) -> *const c_char;

    /// `ceph_chdir`.
    unsafe fn chdir(&self, handle: Self::Handle, path: *const c_char) -> c_int;

    /// `ceph_mkdir`.
    unsafe fn mkdir(&self, handle: Self::Handle, path: *const c_char, mode: mode_t) -> c_int;

    /// `ceph_rmdir`.
    unsafe fn rmdir(&self, handle: Self::Handle, path: *const c_char) -> c_int;

    /// `ceph_chmod`.
    unsafe fn chmod(&self, handle: Self::Handle, path: *const c_char, mode: mode_t) -> c_int;

    /// `ceph_chown`.
    unsafe fn chown(&self, handle: Self::Handle, path: *const c_char, uid: c_int, gid: c_int)
    -> c_int;

    /// `ceph_mds_command`.
    ///
    /// `cmd` points at `cmdlen` contiguous C strings. On return the library
    /// may have allocated `*outbuf` and `*outs`; both belong to the caller
    /// and are released with [`buffer_free`](Self::buffer_free).
    #[allow(clippy::too_many_arguments)]
    unsafe fn mds_command(
        &self,
        handle: Self::Handle,
        mds_spec: *const c_char,
        cmd: *const *const c_char,
        cmdlen: usize,
        inbuf: *const c_char,
        inbuflen: usize,
        outbuf: *mut *mut c_char,
        outbuflen: *mut usize,
        outs: *mut *mut c_char,
        outslen: *mut usize,
    ) -> c_int;

    /// `ceph_buffer_free`.
    unsafe fn buffer_free(&self, buf: *mut c_char);

    /// `ceph_version`. The returned string is static.
    unsafe fn version(&self, major: *mut c_int, minor: *mut c_int, patch: *mut c_int)
    -> *const c_char;
}

/// A separately-owned cluster connection a mount can be derived from.
///
/// The mount only reads the raw reference once, during construction, but
/// borrows the connection for its whole lifetime.
pub trait ClusterConnection {
    type Raw: Copy;

    /// The raw cluster reference handed to `ceph_create_from_rados`.
    fn raw_cluster(&self) -> Self::Raw;
}

/// Version of the loaded client library.
///
/// This is process-wide: it describes the library, not any mount handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    /// Library-provided version string (may be empty).
    pub text: String,
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Query the client library version.
pub fn library_version<A: CephFsApi>(api: &A) -> LibraryVersion {
    let (mut major, mut minor, mut patch) = (0, 0, 0);

    // SAFETY: the out-pointers are valid locals; the returned string is static.
    let text = unsafe {
        let raw = api.version(&mut major, &mut minor, &mut patch);
        if raw.is_null() {
            String::new()
        } else {
            CStr::from_ptr(raw).to_string_lossy().into_owned()
        }
    };

    LibraryVersion {
        major,
        minor,
        patch,
        text,
    }
}

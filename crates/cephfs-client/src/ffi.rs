//! Native libcephfs binding.
//!
//! Only compiled with the `native` feature, which links `-lcephfs`.

use std::ptr::{self, NonNull};

use libc::{c_char, c_int, c_void, mode_t};

use crate::api::{CephFsApi, ClusterConnection};

/// `struct ceph_mount_info`, opaque.
#[repr(C)]
pub struct CephMountInfo {
    _private: [u8; 0],
}

/// `rados_t`.
pub type RadosT = *mut c_void;

#[link(name = "cephfs")]
unsafe extern "C" {
    fn ceph_version(major: *mut c_int, minor: *mut c_int, patch: *mut c_int) -> *const c_char;
    fn ceph_create(cmount: *mut *mut CephMountInfo, id: *const c_char) -> c_int;
    fn ceph_create_from_rados(cmount: *mut *mut CephMountInfo, cluster: RadosT) -> c_int;
    fn ceph_conf_read_file(cmount: *mut CephMountInfo, path_list: *const c_char) -> c_int;
    fn ceph_conf_parse_env(cmount: *mut CephMountInfo, var: *const c_char) -> c_int;
    fn ceph_conf_set(
        cmount: *mut CephMountInfo,
        option: *const c_char,
        value: *const c_char,
    ) -> c_int;
    fn ceph_conf_get(
        cmount: *mut CephMountInfo,
        option: *const c_char,
        buf: *mut c_char,
        len: usize,
    ) -> c_int;
    fn ceph_mount(cmount: *mut CephMountInfo, root: *const c_char) -> c_int;
    fn ceph_unmount(cmount: *mut CephMountInfo) -> c_int;
    fn ceph_release(cmount: *mut CephMountInfo) -> c_int;
    fn ceph_is_mounted(cmount: *mut CephMountInfo) -> c_int;
    fn ceph_sync_fs(cmount: *mut CephMountInfo) -> c_int;
    fn ceph_getcwd(cmount: *mut CephMountInfo) -> *const c_char;
    fn ceph_chdir(cmount: *mut CephMountInfo, path: *const c_char) -> c_int;
    fn ceph_mkdir(cmount: *mut CephMountInfo, path: *const c_char, mode: mode_t) -> c_int;
    fn ceph_rmdir(cmount: *mut CephMountInfo, path: *const c_char) -> c_int;
    fn ceph_chmod(cmount: *mut CephMountInfo, path: *const c_char, mode: mode_t) -> c_int;
    fn ceph_chown(cmount: *mut CephMountInfo, path: *const c_char, uid: c_int, gid: c_int)
    -> c_int;
    fn ceph_mds_command(
        cmount: *mut CephMountInfo,
        mds_spec: *const c_char,
        cmd: *mut *const c_char,
        cmdlen: usize,
        inbuf: *const c_char,
        inbuflen: usize,
        outbuf: *mut *mut c_char,
        outbuflen: *mut usize,
        outs: *mut *mut c_char,
        outslen: *mut usize,
    ) -> c_int;
    fn ceph_buffer_free(buf: *mut c_char);
}

/// A live `struct ceph_mount_info *`.
#[derive(Debug, Clone, Copy)]
pub struct MountPtr(NonNull<CephMountInfo>);

// SAFETY: the mount context may be moved between threads; concurrent use
// is not claimed (no Sync).
unsafe impl Send for MountPtr {}

impl MountPtr {
    fn as_ptr(self) -> *mut CephMountInfo {
        self.0.as_ptr()
    }
}

/// A raw `rados_t` obtained from an external rados binding.
#[derive(Debug, Clone, Copy)]
pub struct RawRadosCluster(NonNull<c_void>);

impl RawRadosCluster {
    /// Wrap a connected `rados_t`.
    ///
    /// # Safety
    ///
    /// `cluster` must be a connected rados handle that outlives every mount
    /// derived from it.
    pub unsafe fn from_raw(cluster: RadosT) -> Option<Self> {
        NonNull::new(cluster).map(Self)
    }
}

impl ClusterConnection for RawRadosCluster {
    type Raw = RadosT;

    fn raw_cluster(&self) -> RadosT {
        self.0.as_ptr()
    }
}

/// Calls straight into the linked libcephfs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibCephFs;

fn into_handle(ret: c_int, raw: *mut CephMountInfo) -> Result<MountPtr, c_int> {
    if ret != 0 {
        return Err(ret);
    }
    NonNull::new(raw).map(MountPtr).ok_or(-libc::ENOMEM)
}

// SAFETY: every method forwards to the libcephfs symbol of the same name.
unsafe impl CephFsApi for LibCephFs {
    type Handle = MountPtr;
    type Cluster = RadosT;

    unsafe fn create(&self, id: *const c_char) -> Result<MountPtr, c_int> {
        let mut raw = ptr::null_mut();
        let ret = unsafe { ceph_create(&mut raw, id) };
        into_handle(ret, raw)
    }

    unsafe fn create_from_cluster(&self, cluster: RadosT) -> Result<MountPtr, c_int> {
        let mut raw = ptr::null_mut();
        let ret = unsafe { ceph_create_from_rados(&mut raw, cluster) };
        into_handle(ret, raw)
    }

    unsafe fn conf_read_file(&self, handle: MountPtr, path: *const c_char) -> c_int {
        unsafe { ceph_conf_read_file(handle.as_ptr(), path) }
    }

    unsafe fn conf_parse_env(&self, handle: MountPtr, var: *const c_char) -> c_int {
        unsafe { ceph_conf_parse_env(handle.as_ptr(), var) }
    }

    unsafe fn conf_set(&self, handle: MountPtr, option: *const c_char, value: *const c_char) -> c_int {
        unsafe { ceph_conf_set(handle.as_ptr(), option, value) }
    }

    unsafe fn conf_get(
        &self,
        handle: MountPtr,
        option: *const c_char,
        buf: *mut c_char,
        len: usize,
    ) -> c_int {
        unsafe { ceph_conf_get(handle.as_ptr(), option, buf, len) }
    }

    unsafe fn mount(&self, handle: MountPtr, root: *const c_char) -> c_int {
        unsafe { ceph_mount(handle.as_ptr(), root) }
    }

    unsafe fn unmount(&self, handle: MountPtr) -> c_int {
        unsafe { ceph_unmount(handle.as_ptr()) }
    }

    unsafe fn release(&self, handle: MountPtr) -> c_int {
        unsafe { ceph_release(handle.as_ptr()) }
    }

    unsafe fn is_mounted(&self, handle: MountPtr) -> c_int {
        unsafe { ceph_is_mounted(handle.as_ptr()) }
    }

    unsafe fn sync_fs(&self, handle: MountPtr) -> c_int {
        unsafe { ceph_sync_fs(handle.as_ptr()) }
    }

    unsafe fn getcwd(&self, handle: MountPtr) -> *const c_char {
        unsafe { ceph_getcwd(handle.as_ptr()) }
    }

    unsafe fn chdir(&self, handle: MountPtr, path: *const c_char) -> c_int {
        unsafe { ceph_chdir(handle.as_ptr(), path) }
    }

    unsafe fn mkdir(&self, handle: MountPtr, path: *const c_char, mode: mode_t) -> c_int {
        unsafe { ceph_mkdir(handle.as_ptr(), path, mode) }
    }

    unsafe fn rmdir(&self, handle: MountPtr, path: *const c_char) -> c_int {
        unsafe { ceph_rmdir(handle.as_ptr(), path) }
    }

    unsafe fn chmod(&self, handle: MountPtr, path: *const c_char, mode: mode_t) -> c_int {
        unsafe { ceph_chmod(handle.as_ptr(), path, mode) }
    }

    unsafe fn chown(&self, handle: MountPtr, path: *const c_char, uid: c_int, gid: c_int) -> c_int {
        unsafe { ceph_chown(handle.as_ptr(), path, uid, gid) }
    }

    unsafe fn mds_command(
        &self,
        handle: MountPtr,
        mds_spec: *const c_char,
        cmd: *const *const c_char,
        cmdlen: usize,
        inbuf: *const c_char,
        inbuflen: usize,
        outbuf: *mut *mut c_char,
        outbuflen: *mut usize,
        outs: *mut *mut c_char,
        outslen: *mut usize,
    ) -> c_int {
        unsafe {
            ceph_mds_command(
                handle.as_ptr(),
                mds_spec,
                cmd.cast_mut(),
                cmdlen,
                inbuf,
                inbuflen,
                outbuf,
                outbuflen,
                outs,
                outslen,
            )
        }
    }

    unsafe fn buffer_free(&self, buf: *mut c_char) {
        unsafe { ceph_buffer_free(buf) }
    }

    unsafe fn version(&self, major: *mut c_int, minor: *mut c_int, patch: *mut c_int) -> *const c_char {
        unsafe { ceph_version(major, minor, patch) }
    }
}

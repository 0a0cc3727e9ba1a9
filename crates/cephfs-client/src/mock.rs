//! In-memory boundary for tests.
//!
//! [`MockCephFs`] implements [`CephFsApi`] without a cluster: each handle
//! gets a small directory namespace with modes and owners, a working
//! directory, and a config option table. MDS command replies are scripted
//! per `(target, args)`. Reply buffers are allocated with `libc::malloc`
//! and tracked, so a test can assert that every one came back through
//! `buffer_free` exactly once.
//!
//! Failure injection is one-shot per operation name (`"create"`, `"mount"`,
//! `"sync_fs"`, ...), see [`MockCephFs::fail_next`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use libc::{c_char, c_int, mode_t};
use parking_lot::Mutex;

use crate::api::{CephFsApi, ClusterConnection};

const MOCK_VERSION: (c_int, c_int, c_int) = (19, 2, 0);
static MOCK_VERSION_TEXT: &CStr = c"19.2.0 (mock)";

/// Handle issued by [`MockCephFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockHandle(u64);

/// A scripted MDS reply.
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    code: c_int,
    output: Vec<u8>,
    info: String,
}

impl MockReply {
    /// Success with the given output.
    pub fn ok(output: &[u8]) -> Self {
        Self {
            code: 0,
            output: output.to_vec(),
            info: String::new(),
        }
    }

    /// Failure with the given (negative) code.
    pub fn failed(code: c_int) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: &[u8]) -> Self {
        self.output = output.to_vec();
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }
}

/// One MDS command as the boundary saw it.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub target: String,
    pub args: Vec<Vec<u8>>,
    pub input: Vec<u8>,
    /// Distinct input pointers handed across (target, each arg, input).
    pub distinct_pointers: usize,
}

/// A cluster connection the mock can derive mounts from.
#[derive(Debug)]
pub struct MockCluster {
    id: u64,
}

impl MockCluster {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl ClusterConnection for MockCluster {
    type Raw = u64;

    fn raw_cluster(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy)]
struct DirMeta {
    mode: u32,
    uid: u32,
    gid: u32,
}

#[derive(Debug)]
struct MockMount {
    client_id: Option<String>,
    cluster: Option<u64>,
    mounted: bool,
    cwd: CString,
    dirs: BTreeMap<PathBuf, DirMeta>,
    options: HashMap<String, String>,
    syncs: usize,
}

impl MockMount {
    fn new(client_id: Option<String>, cluster: Option<u64>) -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert(
            PathBuf::from("/"),
            DirMeta {
                mode: 0o755,
                uid: 0,
                gid: 0,
            },
        );
        Self {
            client_id,
            cluster,
            mounted: false,
            cwd: c"/".to_owned(),
            dirs,
            options: HashMap::new(),
            syncs: 0,
        }
    }

    /// Resolve `path` against the cwd, folding `.` and `..`.
    fn resolve(&self, path: &str) -> PathBuf {
        let cwd = PathBuf::from(self.cwd.to_string_lossy().into_owned());
        let joined = cwd.join(path);
        let mut out = PathBuf::from("/");
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    out.pop();
                }
                Component::Normal(name) => out.push(name),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        out
    }

    fn has_children(&self, dir: &Path) -> bool {
        self.dirs
            .keys()
            .any(|p| p.as_path() != dir && p.parent() == Some(dir))
    }
}

#[derive(Debug)]
struct MockState {
    next_handle: u64,
    mounts: HashMap<MockHandle, MockMount>,
    default_config_present: bool,
    config_files: HashSet<PathBuf>,
    env: HashMap<String, String>,
    fail_next: HashMap<&'static str, c_int>,
    replies: HashMap<(String, Vec<Vec<u8>>), MockReply>,
    commands: Vec<RecordedCommand>,
    live_buffers: HashSet<usize>,
    buffers_freed: usize,
    releases: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_handle: 1,
            mounts: HashMap::new(),
            default_config_present: true,
            config_files: HashSet::new(),
            env: HashMap::new(),
            fail_next: HashMap::new(),
            replies: HashMap::new(),
            commands: Vec::new(),
            live_buffers: HashSet::new(),
            buffers_freed: 0,
            releases: 0,
        }
    }
}

impl MockState {
    fn take_failure(&mut self, op: &'static str) -> Option<c_int> {
        self.fail_next.remove(op)
    }

    fn alloc(&mut self, data: &[u8]) -> (*mut c_char, usize) {
        if data.is_empty() {
            return (ptr::null_mut(), 0);
        }
        // SAFETY: malloc of a non-zero size; checked for null below.
        let buf = unsafe { libc::malloc(data.len()) }.cast::<u8>();
        assert!(!buf.is_null(), "mock malloc failed");
        // SAFETY: buf holds data.len() bytes.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), buf, data.len()) };
        self.live_buffers.insert(buf as usize);
        (buf.cast(), data.len())
    }

    fn mount_mut(&mut self, handle: MockHandle) -> &mut MockMount {
        self.mounts
            .get_mut(&handle)
            .unwrap_or_else(|| panic!("{handle:?} used after release"))
    }

    /// Common path-op preamble: injected failure, then mounted check.
    fn path_op(&mut self, op: &'static str, handle: MockHandle) -> Result<&mut MockMount, c_int> {
        if let Some(code) = self.take_failure(op) {
            return Err(code);
        }
        let mount = self.mount_mut(handle);
        if !mount.mounted {
            return Err(-libc::ENOTCONN);
        }
        Ok(mount)
    }
}

/// Allocation-tracking in-memory boundary. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockCephFs {
    state: Arc<Mutex<MockState>>,
}

static NEXT_CLUSTER: AtomicU64 = AtomicU64::new(1);

impl MockCephFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: &'static str, code: c_int) {
        self.state.lock().fail_next.insert(op, code);
    }

    /// Whether the default config search path finds a file.
    pub fn set_default_config_present(&self, present: bool) {
        self.state.lock().default_config_present = present;
    }

    /// Make `path` readable as a config file.
    pub fn add_config_file(&self, path: impl Into<PathBuf>) {
        self.state.lock().config_files.insert(path.into());
    }

    /// Set a variable visible to `conf_parse_env`.
    pub fn set_env(&self, var: impl Into<String>, value: impl Into<String>) {
        self.state.lock().env.insert(var.into(), value.into());
    }

    /// Script the reply for an exact `(target, args)` pair.
    pub fn script_reply(&self, target: &str, args: &[&str], reply: MockReply) {
        let key = (
            target.to_string(),
            args.iter().map(|a| a.as_bytes().to_vec()).collect(),
        );
        self.state.lock().replies.insert(key, reply);
    }

    /// A cluster connection mounts can be derived from.
    pub fn connect_cluster(&self) -> MockCluster {
        MockCluster {
            id: NEXT_CLUSTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().commands.clone()
    }

    /// Reply buffers handed out and not yet freed.
    pub fn outstanding_buffers(&self) -> usize {
        self.state.lock().live_buffers.len()
    }

    pub fn buffers_freed(&self) -> usize {
        self.state.lock().buffers_freed
    }

    /// Handles allocated and not successfully released.
    pub fn live_handles(&self) -> usize {
        self.state.lock().mounts.len()
    }

    /// Number of `release` calls, successful or not.
    pub fn release_count(&self) -> usize {
        self.state.lock().releases
    }

    pub fn client_id(&self, handle: MockHandle) -> Option<String> {
        self.state.lock().mounts.get(&handle)?.client_id.clone()
    }

    pub fn cluster_of(&self, handle: MockHandle) -> Option<u64> {
        self.state.lock().mounts.get(&handle)?.cluster
    }

    pub fn mode_of(&self, handle: MockHandle, path: &str) -> Option<u32> {
        let state = self.state.lock();
        let mount = state.mounts.get(&handle)?;
        mount.dirs.get(&mount.resolve(path)).map(|m| m.mode)
    }

    pub fn owner_of(&self, handle: MockHandle, path: &str) -> Option<(u32, u32)> {
        let state = self.state.lock();
        let mount = state.mounts.get(&handle)?;
        mount.dirs.get(&mount.resolve(path)).map(|m| (m.uid, m.gid))
    }

    /// Overwrite the library-side mounted flag without touching the handle.
    pub fn set_mounted_flag(&self, handle: MockHandle, mounted: bool) {
        if let Some(mount) = self.state.lock().mounts.get_mut(&handle) {
            mount.mounted = mounted;
        }
    }

    pub fn sync_count(&self, handle: MockHandle) -> usize {
        self.state
            .lock()
            .mounts
            .get(&handle)
            .map_or(0, |m| m.syncs)
    }

    fn new_handle(&self, client_id: Option<String>, cluster: Option<u64>) -> MockHandle {
        let mut state = self.state.lock();
        let handle = MockHandle(state.next_handle);
        state.next_handle += 1;
        state.mounts.insert(handle, MockMount::new(client_id, cluster));
        handle
    }
}

unsafe fn read_str(p: *const c_char) -> String {
    unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
}

fn code_of(result: Result<(), c_int>) -> c_int {
    result.err().unwrap_or(0)
}

/// Apply `--key=value` / `--key value` pairs.
fn apply_args(options: &mut HashMap<String, String>, text: &str) {
    let mut words = text.split_whitespace().peekable();
    while let Some(word) = words.next() {
        let Some(flag) = word.strip_prefix("--") else {
            continue;
        };
        match flag.split_once('=') {
            Some((key, value)) => {
                options.insert(key.to_string(), value.to_string());
            }
            None => {
                if let Some(value) = words.next_if(|w| !w.starts_with("--")) {
                    options.insert(flag.to_string(), value.to_string());
                }
            }
        }
    }
}

// SAFETY: pointers are only read during the call; reply buffers come from
// malloc and are tracked until `buffer_free`.
unsafe impl CephFsApi for MockCephFs {
    type Handle = MockHandle;
    type Cluster = u64;

    unsafe fn create(&self, id: *const c_char) -> Result<MockHandle, c_int> {
        if let Some(code) = self.state.lock().take_failure("create") {
            return Err(code);
        }
        let client_id = (!id.is_null()).then(|| unsafe { read_str(id) });
        Ok(self.new_handle(client_id, None))
    }

    unsafe fn create_from_cluster(&self, cluster: u64) -> Result<MockHandle, c_int> {
        if let Some(code) = self.state.lock().take_failure("create_from_cluster") {
            return Err(code);
        }
        Ok(self.new_handle(None, Some(cluster)))
    }

    unsafe fn conf_read_file(&self, handle: MockHandle, path: *const c_char) -> c_int {
        let mut state = self.state.lock();
        state.mount_mut(handle);
        if let Some(code) = state.take_failure("conf_read_file") {
            return code;
        }
        let found = if path.is_null() {
            state.default_config_present
        } else {
            // SAFETY: caller passes a NUL-terminated string.
            let list = unsafe { CStr::from_ptr(path) }.to_bytes();
            list.split(|&b| b == b',')
                .map(<[u8]>::trim_ascii)
                .any(|p| state.config_files.contains(Path::new(OsStr::from_bytes(p))))
        };
        if found { 0 } else { -libc::ENOENT }
    }

    unsafe fn conf_parse_env(&self, handle: MockHandle, var: *const c_char) -> c_int {
        let var = if var.is_null() {
            "CEPH_ARGS".to_string()
        } else {
            unsafe { read_str(var) }
        };
        let mut state = self.state.lock();
        if let Some(code) = state.take_failure("conf_parse_env") {
            return code;
        }
        let text = state.env.get(&var).cloned().unwrap_or_default();
        apply_args(&mut state.mount_mut(handle).options, &text);
        0
    }

    unsafe fn conf_set(&self, handle: MockHandle, option: *const c_char, value: *const c_char) -> c_int {
        let (option, value) = unsafe { (read_str(option), read_str(value)) };
        let mut state = self.state.lock();
        if let Some(code) = state.take_failure("conf_set") {
            return code;
        }
        state.mount_mut(handle).options.insert(option, value);
        0
    }

    unsafe fn conf_get(
        &self,
        handle: MockHandle,
        option: *const c_char,
        buf: *mut c_char,
        len: usize,
    ) -> c_int {
        let option = unsafe { read_str(option) };
        let mut state = self.state.lock();
        let Some(value) = state.mount_mut(handle).options.get(&option) else {
            return -libc::ENOENT;
        };
        if value.len() + 1 > len {
            return -libc::ENAMETOOLONG;
        }
        // SAFETY: caller's buffer holds `len` bytes; value plus NUL fits.
        unsafe {
            ptr::copy_nonoverlapping(value.as_ptr(), buf.cast::<u8>(), value.len());
            *buf.add(value.len()) = 0;
        }
        0
    }

    unsafe fn mount(&self, handle: MockHandle, root: *const c_char) -> c_int {
        assert!(root.is_null(), "only root mounts are issued");
        let mut state = self.state.lock();
        if let Some(code) = state.take_failure("mount") {
            return code;
        }
        let mount = state.mount_mut(handle);
        if mount.mounted {
            return -libc::EISCONN;
        }
        mount.mounted = true;
        0
    }

    unsafe fn unmount(&self, handle: MockHandle) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.take_failure("unmount") {
            return code;
        }
        let mount = state.mount_mut(handle);
        if !mount.mounted {
            return -libc::ENOTCONN;
        }
        mount.mounted = false;
        0
    }

    unsafe fn release(&self, handle: MockHandle) -> c_int {
        let mut state = self.state.lock();
        state.releases += 1;
        if let Some(code) = state.take_failure("release") {
            return code;
        }
        if state.mount_mut(handle).mounted {
            return -libc::EISCONN;
        }
        state.mounts.remove(&handle);
        0
    }

    unsafe fn is_mounted(&self, handle: MockHandle) -> c_int {
        c_int::from(self.state.lock().mount_mut(handle).mounted)
    }

    unsafe fn sync_fs(&self, handle: MockHandle) -> c_int {
        let mut state = self.state.lock();
        code_of(state.path_op("sync_fs", handle).map(|m| m.syncs += 1))
    }

    unsafe fn getcwd(&self, handle: MockHandle) -> *const c_char {
        // The CString lives in the mount entry, which outlives the caller's copy.
        self.state.lock().mount_mut(handle).cwd.as_ptr()
    }

    unsafe fn chdir(&self, handle: MockHandle, path: *const c_char) -> c_int {
        let path = unsafe { read_str(path) };
        let mut state = self.state.lock();
        code_of(state.path_op("chdir", handle).and_then(|m| {
            let target = m.resolve(&path);
            if !m.dirs.contains_key(&target) {
                return Err(-libc::ENOENT);
            }
            m.cwd = CString::new(target.to_string_lossy().into_owned()).map_err(|_| -libc::EINVAL)?;
            Ok(())
        }))
    }

    unsafe fn mkdir(&self, handle: MockHandle, path: *const c_char, mode: mode_t) -> c_int {
        let path = unsafe { read_str(path) };
        let mut state = self.state.lock();
        code_of(state.path_op("mkdir", handle).and_then(|m| {
            let target = m.resolve(&path);
            if m.dirs.contains_key(&target) {
                return Err(-libc::EEXIST);
            }
            let parent = target.parent().ok_or(-libc::EEXIST)?;
            if !m.dirs.contains_key(parent) {
                return Err(-libc::ENOENT);
            }
            m.dirs.insert(
                target,
                DirMeta {
                    mode: mode as u32 & 0o7777,
                    uid: 0,
                    gid: 0,
                },
            );
            Ok(())
        }))
    }

    unsafe fn rmdir(&self, handle: MockHandle, path: *const c_char) -> c_int {
        let path = unsafe { read_str(path) };
        let mut state = self.state.lock();
        code_of(state.path_op("rmdir", handle).and_then(|m| {
            let target = m.resolve(&path);
            if target == Path::new("/") {
                return Err(-libc::EBUSY);
            }
            if !m.dirs.contains_key(&target) {
                return Err(-libc::ENOENT);
            }
            if m.has_children(&target) {
                return Err(-libc::ENOTEMPTY);
            }
            m.dirs.remove(&target);
            Ok(())
        }))
    }

    unsafe fn chmod(&self, handle: MockHandle, path: *const c_char, mode: mode_t) -> c_int {
        let path = unsafe { read_str(path) };
        let mut state = self.state.lock();
        code_of(state.path_op("chmod", handle).and_then(|m| {
            let target = m.resolve(&path);
            let meta = m.dirs.get_mut(&target).ok_or(-libc::ENOENT)?;
            meta.mode = mode as u32 & 0o7777;
            Ok(())
        }))
    }

    unsafe fn chown(&self, handle: MockHandle, path: *const c_char, uid: c_int, gid: c_int) -> c_int {
        let path = unsafe { read_str(path) };
        let mut state = self.state.lock();
        code_of(state.path_op("chown", handle).and_then(|m| {
            let target = m.resolve(&path);
            let meta = m.dirs.get_mut(&target).ok_or(-libc::ENOENT)?;
            meta.uid = uid as u32;
            meta.gid = gid as u32;
            Ok(())
        }))
    }

    unsafe fn mds_command(
        &self,
        handle: MockHandle,
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
        // SAFETY: caller passes `cmdlen` valid strings and `inbuflen` input bytes.
        let (target, argv, input) = unsafe {
            let argv = std::slice::from_raw_parts(cmd, cmdlen);
            (
                read_str(mds_spec),
                argv.to_vec(),
                std::slice::from_raw_parts(inbuf.cast::<u8>(), inbuflen).to_vec(),
            )
        };
        let args: Vec<Vec<u8>> = argv
            .iter()
            .map(|p| unsafe { CStr::from_ptr(*p) }.to_bytes().to_vec())
            .collect();

        let mut pointers: HashSet<usize> = argv.iter().map(|p| *p as usize).collect();
        pointers.insert(mds_spec as usize);
        pointers.insert(inbuf as usize);

        let mut state = self.state.lock();
        state.commands.push(RecordedCommand {
            target: target.clone(),
            args: args.clone(),
            input,
            distinct_pointers: pointers.len(),
        });

        let reply = if !state.mount_mut(handle).mounted {
            MockReply::failed(-libc::ENOTCONN)
        } else {
            state
                .replies
                .get(&(target, args))
                .cloned()
                .unwrap_or_else(|| {
                    MockReply::failed(-libc::EINVAL).with_info("unrecognized command")
                })
        };

        let (out_ptr, out_len) = state.alloc(&reply.output);
        let (info_ptr, info_len) = state.alloc(reply.info.as_bytes());
        // SAFETY: out-pointers are valid per the trait contract.
        unsafe {
            *outbuf = out_ptr;
            *outbuflen = out_len;
            *outs = info_ptr;
            *outslen = info_len;
        }
        reply.code
    }

    unsafe fn buffer_free(&self, buf: *mut c_char) {
        let mut state = self.state.lock();
        assert!(
            state.live_buffers.remove(&(buf as usize)),
            "buffer {buf:p} freed twice or never allocated"
        );
        state.buffers_freed += 1;
        // SAFETY: allocated by malloc in `alloc` and tracked until now.
        unsafe { libc::free(buf.cast()) };
    }

    unsafe fn version(&self, major: *mut c_int, minor: *mut c_int, patch: *mut c_int) -> *const c_char {
        // SAFETY: out-pointers are valid per the trait contract.
        unsafe {
            *major = MOCK_VERSION.0;
            *minor = MOCK_VERSION.1;
            *patch = MOCK_VERSION.2;
        }
        MOCK_VERSION_TEXT.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::library_version;

    #[test]
    fn test_resolve_relative_paths() {
        let mut mount = MockMount::new(None, None);
        mount.cwd = c"/a/b".to_owned();
        assert_eq!(mount.resolve("c"), PathBuf::from("/a/b/c"));
        assert_eq!(mount.resolve(".."), PathBuf::from("/a"));
        assert_eq!(mount.resolve("/x/./y"), PathBuf::from("/x/y"));
        assert_eq!(mount.resolve("../../../.."), PathBuf::from("/"));
    }

    #[test]
    fn test_apply_args() {
        let mut options = HashMap::new();
        apply_args(&mut options, "--a=1 --b 2 stray --c --d=4");
        assert_eq!(options.get("a").map(String::as_str), Some("1"));
        assert_eq!(options.get("b").map(String::as_str), Some("2"));
        assert_eq!(options.get("c"), None);
        assert_eq!(options.get("d").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_library_version() {
        let version = library_version(&MockCephFs::new());
        assert_eq!((version.major, version.minor, version.patch), (19, 2, 0));
        assert_eq!(version.to_string(), "19.2.0");
        assert_eq!(version.text, "19.2.0 (mock)");
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn test_double_free_is_caught() {
        let api = MockCephFs::new();
        let (buf, _) = api.state.lock().alloc(b"x");
        unsafe {
            api.buffer_free(buf);
            api.buffer_free(buf);
        }
    }
}

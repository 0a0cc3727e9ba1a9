//! Per-call marshaling across the boundary.
//!
//! Transient values own the C representation of one argument for the
//! duration of a single foreign call and release it when dropped, so
//! cleanup runs on every exit path including early `?` returns. Native
//! buffers flow the other way: [`take_native`] copies a library-allocated
//! buffer into Rust memory and hands the native one back to the library.

use std::ffi::CString;
use std::ptr;

use libc::c_char;

use crate::api::CephFsApi;

/// One owned NUL-terminated string.
#[derive(Debug)]
pub(crate) struct TransientStr(CString);

impl TransientStr {
    pub(crate) fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, std::ffi::NulError> {
        let s = CString::new(bytes)?;
        #[cfg(test)]
        counters::allocated();
        Ok(Self(s))
    }

    pub(crate) fn as_ptr(&self) -> *const c_char {
        self.0.as_ptr()
    }
}

/// Like [`TransientStr::new`] but `None` maps to a null pointer.
pub(crate) fn optional_str(s: Option<&str>) -> Result<Option<TransientStr>, std::ffi::NulError> {
    s.map(TransientStr::new).transpose()
}

pub(crate) fn ptr_or_null(s: &Option<TransientStr>) -> *const c_char {
    s.as_ref().map_or(ptr::null(), TransientStr::as_ptr)
}

/// An argument vector: each element independently owned, plus the
/// contiguous pointer array the C side indexes into.
#[derive(Debug)]
pub(crate) struct TransientArgv {
    // Must outlive `ptrs`; the pointers borrow into these.
    strings: Vec<TransientStr>,
    ptrs: Vec<*const c_char>,
}

impl TransientArgv {
    pub(crate) fn new<S: AsRef<[u8]>>(args: &[S]) -> Result<Self, std::ffi::NulError> {
        let strings = args
            .iter()
            .map(|arg| TransientStr::new(arg.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let ptrs = strings.iter().map(TransientStr::as_ptr).collect();
        Ok(Self { strings, ptrs })
    }

    pub(crate) fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    pub(crate) fn len(&self) -> usize {
        self.strings.len()
    }
}

/// A binary input payload.
///
/// The length travels separately from the pointer, so embedded NUL bytes
/// survive. A trailing NUL is kept past the end for readers that expect
/// one; it is not counted in [`len`](Self::len).
#[derive(Debug)]
pub(crate) struct TransientBuf(Vec<u8>);

impl TransientBuf {
    pub(crate) fn new(data: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.extend_from_slice(data);
        buf.push(0);
        #[cfg(test)]
        counters::allocated();
        Self(buf)
    }

    pub(crate) fn as_ptr(&self) -> *const c_char {
        self.0.as_ptr().cast()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len() - 1
    }
}

#[cfg(test)]
impl Drop for TransientStr {
    fn drop(&mut self) {
        counters::released();
    }
}

#[cfg(test)]
impl Drop for TransientBuf {
    fn drop(&mut self) {
        counters::released();
    }
}

/// Copy a library-allocated buffer out and free it.
///
/// A null pointer or zero length yields an empty vector. Any non-null
/// pointer is freed, even when the reported length is zero.
///
/// # Safety
///
/// `buf` must be null or a buffer of at least `len` bytes allocated by
/// `api` and not yet freed.
pub(crate) unsafe fn take_native<A: CephFsApi>(api: &A, buf: *mut c_char, len: usize) -> Vec<u8> {
    if buf.is_null() {
        return Vec::new();
    }
    let out = if len > 0 {
        // SAFETY: caller guarantees `len` readable bytes at `buf`.
        let bytes = unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), len) };
        bytes.to_vec()
    } else {
        Vec::new()
    };
    // SAFETY: copied above; the buffer is not touched again.
    unsafe { api.buffer_free(buf) };
    out
}

/// Per-thread allocation bookkeeping for transient values.
#[cfg(test)]
pub(crate) mod counters {
    use std::cell::Cell;

    thread_local! {
        static ALLOCATED: Cell<usize> = const { Cell::new(0) };
        static RELEASED: Cell<usize> = const { Cell::new(0) };
    }

    pub(crate) fn allocated() {
        ALLOCATED.with(|c| c.set(c.get() + 1));
    }

    pub(crate) fn released() {
        RELEASED.with(|c| c.set(c.get() + 1));
    }

    /// Zero both counters for this thread.
    pub(crate) fn reset() {
        ALLOCATED.with(|c| c.set(0));
        RELEASED.with(|c| c.set(0));
    }

    /// `(allocated, released)` since the last reset on this thread.
    pub(crate) fn snapshot() -> (usize, usize) {
        (ALLOCATED.with(Cell::get), RELEASED.with(Cell::get))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_transient_str_roundtrip() {
        counters::reset();
        {
            let s = TransientStr::new("/a/b").unwrap();
            let back = unsafe { CStr::from_ptr(s.as_ptr()) };
            assert_eq!(back.to_bytes(), b"/a/b");
            assert_eq!(counters::snapshot(), (1, 0));
        }
        assert_eq!(counters::snapshot(), (1, 1));
    }

    #[test]
    fn test_transient_str_rejects_nul() {
        counters::reset();
        let err = TransientStr::new("a\0b").unwrap_err();
        assert_eq!(err.nul_position(), 1);
        assert_eq!(counters::snapshot(), (0, 0));
    }

    #[test]
    fn test_optional_str_null() {
        let none = optional_str(None).unwrap();
        assert!(ptr_or_null(&none).is_null());
        let some = optional_str(Some("client.admin")).unwrap();
        assert!(!ptr_or_null(&some).is_null());
    }

    #[test]
    fn test_argv_preserves_order() {
        counters::reset();
        {
            let argv = TransientArgv::new(&["fs", "status", "--format=json"]).unwrap();
            assert_eq!(argv.len(), 3);
            let ptrs = unsafe { std::slice::from_raw_parts(argv.as_ptr(), argv.len()) };
            let args: Vec<_> = ptrs
                .iter()
                .map(|p| unsafe { CStr::from_ptr(*p) }.to_str().unwrap())
                .collect();
            assert_eq!(args, ["fs", "status", "--format=json"]);
        }
        assert_eq!(counters::snapshot(), (3, 3));
    }

    #[test]
    fn test_argv_failure_releases_prefix() {
        counters::reset();
        let args: [&[u8]; 3] = [b"ok", b"bad\0arg", b"never"];
        assert!(TransientArgv::new(&args).is_err());
        assert_eq!(counters::snapshot(), (1, 1));
    }

    #[test]
    fn test_buf_keeps_embedded_nul() {
        let buf = TransientBuf::new(b"a\0b\0");
        assert_eq!(buf.len(), 4);
        let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr().cast::<u8>(), buf.len() + 1) };
        assert_eq!(bytes, b"a\0b\0\0");
    }

    #[test]
    fn test_empty_buf_has_valid_pointer() {
        let buf = TransientBuf::new(&[]);
        assert_eq!(buf.len(), 0);
        assert!(!buf.as_ptr().is_null());
    }
}

//! Error domain for the foreign call boundary.
//!
//! Every libcephfs entry point reports failure as a bare integer (negative
//! errno by convention). [`check`] is the single place where that
//! "zero means success" convention becomes a `Result`.

use std::ffi::CStr;
use std::fmt;

use libc::c_int;

/// Size of the scratch buffer handed to `strerror_r`.
const STRERROR_BUF_LEN: usize = 1024;

/// A non-zero result code returned from a libcephfs call.
///
/// The code is kept exactly as the library returned it (negative on
/// failure). A value of zero is never represented; [`CephFsError::from_code`]
/// returns `None` for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CephFsError {
    code: i32,
}

impl CephFsError {
    /// Map a raw result code. Zero means success and yields `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        if code == 0 { None } else { Some(Self { code }) }
    }

    /// Build an error from a positive errno constant (e.g. `libc::ENOENT`).
    pub fn from_errno(errno: c_int) -> Self {
        Self {
            code: -(errno.saturating_abs()),
        }
    }

    /// The raw code as returned by the library.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The positive errno value.
    pub fn errno(&self) -> u32 {
        self.code.unsigned_abs()
    }

    /// Platform description of the errno, or `None` when the platform has
    /// no text for it.
    pub fn description(&self) -> Option<String> {
        describe_errno(self.errno())
    }

    pub fn is_not_found(&self) -> bool {
        self.errno() == libc::ENOENT as u32
    }

    pub fn is_already_exists(&self) -> bool {
        self.errno() == libc::EEXIST as u32
    }

    pub fn is_not_connected(&self) -> bool {
        self.errno() == libc::ENOTCONN as u32
    }

    pub fn is_permission_denied(&self) -> bool {
        let errno = self.errno();
        errno == libc::EACCES as u32 || errno == libc::EPERM as u32
    }
}

impl fmt::Display for CephFsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "cephfs: ret={}, {}", self.errno(), text),
            None => write!(f, "cephfs: ret={}", self.errno()),
        }
    }
}

impl std::error::Error for CephFsError {}

impl From<CephFsError> for std::io::Error {
    fn from(e: CephFsError) -> Self {
        std::io::Error::from_raw_os_error(e.errno() as i32)
    }
}

/// Translate a foreign result code into a `Result`.
///
/// Call this after every boundary crossing.
pub fn check(code: c_int) -> Result<(), CephFsError> {
    match CephFsError::from_code(code) {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

/// Look up the platform text for `errno` via `strerror_r`.
fn describe_errno(errno: u32) -> Option<String> {
    let errnum = c_int::try_from(errno).ok()?;
    let mut buf = [0 as libc::c_char; STRERROR_BUF_LEN];

    // SAFETY: buf is writable for STRERROR_BUF_LEN bytes and the XSI variant
    // always NUL-terminates on success.
    let ret = unsafe { libc::strerror_r(errnum, buf.as_mut_ptr(), buf.len()) };
    if ret != 0 {
        return None;
    }

    // SAFETY: strerror_r succeeded, so buf holds a NUL-terminated string.
    let text = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy();
    if text.is_empty() || text.starts_with("Unknown error") {
        None
    } else {
        Some(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_success() {
        assert!(CephFsError::from_code(0).is_none());
        assert!(check(0).is_ok());
    }

    #[test]
    fn test_nonzero_keeps_code() {
        for code in [-1, -2, -13, -107, 5, i32::MIN, i32::MAX] {
            let err = CephFsError::from_code(code).unwrap();
            assert_eq!(err.code(), code);
            assert_eq!(check(code).unwrap_err().code(), code);
        }
    }

    #[test]
    fn test_display_with_description() {
        let err = CephFsError::from_errno(libc::ENOENT);
        assert_eq!(err.code(), -libc::ENOENT);
        let text = err.to_string();
        assert!(text.starts_with(&format!("cephfs: ret={}, ", libc::ENOENT)), "{text}");
        assert!(err.description().is_some());
    }

    #[test]
    fn test_display_falls_back_to_code() {
        let err = CephFsError::from_code(-99_999).unwrap();
        assert_eq!(err.description(), None);
        assert_eq!(err.to_string(), "cephfs: ret=99999");
    }

    #[test]
    fn test_min_code_does_not_overflow() {
        let err = CephFsError::from_code(i32::MIN).unwrap();
        assert_eq!(err.errno(), 2_147_483_648);
        assert_eq!(err.to_string(), "cephfs: ret=2147483648");
    }

    #[test]
    fn test_predicates() {
        assert!(CephFsError::from_errno(libc::ENOENT).is_not_found());
        assert!(CephFsError::from_errno(libc::EEXIST).is_already_exists());
        assert!(CephFsError::from_errno(libc::ENOTCONN).is_not_connected());
        assert!(CephFsError::from_errno(libc::EACCES).is_permission_denied());
        assert!(!CephFsError::from_errno(libc::EIO).is_not_found());
    }

    #[test]
    fn test_into_io_error() {
        let io: std::io::Error = CephFsError::from_errno(libc::ENOENT).into();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }
}

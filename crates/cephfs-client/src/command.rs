//! MDS administrative commands.
//!
//! One fixed contract: a target spec, an ordered argument vector, and an
//! optional binary input go in; an output payload, a status string, and a
//! result code come back. Everything the library allocates for the reply is
//! copied out and freed before [`Mount::mds_command`] returns, on success
//! and failure alike. There is no retry; commands are not assumed to be
//! idempotent.

use std::fmt;
use std::ptr;

use cephfs_types::CephFsError;
use tracing::debug;

use crate::api::CephFsApi;
use crate::error::{Error, Result};
use crate::marshal::{TransientArgv, TransientBuf, TransientStr, take_native};
use crate::mount::Mount;

/// Everything an MDS command produced.
///
/// Partial results are kept: a failed command still carries whatever status
/// text and output the library returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReply {
    /// Output payload (often JSON). Empty when the library returned none.
    pub output: Vec<u8>,
    /// Status string. Empty when the library returned none.
    pub info: String,
    /// Set when the command returned a non-zero code.
    pub error: Option<CephFsError>,
}

impl CommandReply {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The output payload as UTF-8.
    pub fn output_str(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.output)
    }

    /// Split into `(output, info)` or the failure with its status text.
    pub fn into_result(self) -> std::result::Result<(Vec<u8>, String), CommandFailed> {
        match self.error {
            None => Ok((self.output, self.info)),
            Some(error) => Err(CommandFailed {
                error,
                info: self.info,
                output: self.output,
            }),
        }
    }
}

/// A command that returned a non-zero code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailed {
    pub error: CephFsError,
    /// Status text returned alongside the failure.
    pub info: String,
    /// Output copied before the failure was reported.
    pub output: Vec<u8>,
}

impl fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.info.is_empty() {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{}: {}", self.error, self.info)
        }
    }
}

impl std::error::Error for CommandFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<A: CephFsApi> Mount<'_, A> {
    /// Send a command to the MDS daemons matching `target` (e.g. `"mds.0"`, `"*"`).
    ///
    /// `args` is the command line, one element per word, in order. An
    /// empty `args` is rejected with [`Error::EmptyCommand`] without
    /// calling the library.
    ///
    /// The returned `Err` covers only local marshaling problems; a command
    /// the MDS rejects comes back as `Ok` with [`CommandReply::error`] set.
    pub fn mds_command<S: AsRef<[u8]>>(&self, target: &str, args: &[S]) -> Result<CommandReply> {
        self.execute(target, args, None)
    }

    /// Like [`mds_command`](Self::mds_command), with a binary input payload.
    pub fn mds_command_with_input<S: AsRef<[u8]>>(
        &self,
        target: &str,
        args: &[S],
        input: &[u8],
    ) -> Result<CommandReply> {
        self.execute(target, args, Some(input))
    }

    fn execute<S: AsRef<[u8]>>(
        &self,
        target: &str,
        args: &[S],
        input: Option<&[u8]>,
    ) -> Result<CommandReply> {
        if args.is_empty() {
            return Err(Error::EmptyCommand);
        }

        let c_target = TransientStr::new(target)?;
        let argv = TransientArgv::new(args)?;
        let inbuf = TransientBuf::new(input.unwrap_or_default());

        let (mut outbuf, mut outbuflen) = (ptr::null_mut(), 0usize);
        let (mut outs, mut outslen) = (ptr::null_mut(), 0usize);

        // SAFETY: every input pointer is owned by a transient that lives to
        // the end of this function; the out-pointers are valid locals.
        let ret = unsafe {
            self.api.mds_command(
                self.handle,
                c_target.as_ptr(),
                argv.as_ptr(),
                argv.len(),
                inbuf.as_ptr(),
                inbuf.len(),
                &mut outbuf,
                &mut outbuflen,
                &mut outs,
                &mut outslen,
            )
        };

        // SAFETY: both buffers came from this call and are freed exactly once here.
        let info = unsafe { take_native(&self.api, outs, outslen) };
        let output = unsafe { take_native(&self.api, outbuf, outbuflen) };
        drop((c_target, argv, inbuf));

        let info = String::from_utf8(info)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
        let error = cephfs_types::check(ret).err();
        if let Some(err) = &error {
            debug!(mds_spec = target, code = ret, %err, info = %info, "mds command failed");
        }

        Ok(CommandReply {
            output,
            info,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::counters;
    use crate::mock::{MockCephFs, MockReply};

    fn mounted(api: &MockCephFs) -> Mount<'static, MockCephFs> {
        let mut mount = Mount::create(api.clone()).unwrap();
        mount.read_default_config().unwrap();
        mount.mount().unwrap();
        mount
    }

    #[test]
    fn test_status_command() {
        let api = MockCephFs::new();
        api.script_reply("mds.0", &["status"], MockReply::ok(br#"{"state":"up"}"#));
        let mount = mounted(&api);

        let reply = mount.mds_command("mds.0", &["status"]).unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.output, br#"{"state":"up"}"#);
        assert_eq!(reply.output_str().unwrap(), r#"{"state":"up"}"#);
        assert_eq!(reply.info, "");
        assert_eq!(api.outstanding_buffers(), 0);
    }

    #[test]
    fn test_allocations_balance_on_success() {
        let api = MockCephFs::new();
        api.script_reply(
            "mds.*",
            &["session", "ls", "--format=json"],
            MockReply::ok(b"[]").with_info("3 sessions"),
        );
        let mount = mounted(&api);

        counters::reset();
        let reply = mount
            .mds_command_with_input("mds.*", &["session", "ls", "--format=json"], b"payload")
            .unwrap();
        assert!(reply.is_success());

        // target + 3 args + input buffer
        assert_eq!(counters::snapshot(), (5, 5));
        let recorded = api.commands();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].distinct_pointers, 5);
        assert_eq!(api.outstanding_buffers(), 0);
        assert_eq!(api.buffers_freed(), 2);
    }

    #[test]
    fn test_allocations_balance_on_failure() {
        let api = MockCephFs::new();
        api.script_reply(
            "mds.0",
            &["damage", "rm"],
            MockReply::failed(-libc::EINVAL)
                .with_output(b"partial")
                .with_info("missing damage id"),
        );
        let mount = mounted(&api);

        counters::reset();
        let reply = mount.mds_command("mds.0", &["damage", "rm"]).unwrap();
        assert_eq!(counters::snapshot(), (4, 4));
        assert_eq!(api.outstanding_buffers(), 0);

        assert_eq!(reply.error.unwrap().code(), -libc::EINVAL);
        assert_eq!(reply.info, "missing damage id");
        assert_eq!(reply.output, b"partial");
    }

    #[test]
    fn test_info_copied_exactly() {
        let api = MockCephFs::new();
        let info = "client evicted: 4305 (embedded\ttab)";
        api.script_reply("mds.a", &["client", "evict"], MockReply::ok(b"").with_info(info));
        let mount = mounted(&api);

        let reply = mount.mds_command("mds.a", &["client", "evict"]).unwrap();
        assert_eq!(reply.info.len(), info.len());
        assert_eq!(reply.info, info);
        assert_eq!(api.buffers_freed(), 1);
    }

    #[test]
    fn test_zero_length_output_is_empty() {
        let api = MockCephFs::new();
        api.script_reply("mds.0", &["flush", "journal"], MockReply::ok(b""));
        let mount = mounted(&api);

        let reply = mount.mds_command("mds.0", &["flush", "journal"]).unwrap();
        assert!(reply.output.is_empty());
        assert!(reply.info.is_empty());
        assert_eq!(api.buffers_freed(), 0);
    }

    #[test]
    fn test_input_is_binary_safe() {
        let api = MockCephFs::new();
        api.script_reply("mds.0", &["import"], MockReply::ok(b"ok"));
        let mount = mounted(&api);

        let input = b"\x00head\x00\xfftail\x00";
        mount.mds_command_with_input("mds.0", &["import"], input).unwrap();
        assert_eq!(api.commands()[0].input, input);
    }

    #[test]
    fn test_no_input_sends_empty_payload() {
        let api = MockCephFs::new();
        api.script_reply("mds.0", &["status"], MockReply::ok(b"{}"));
        let mount = mounted(&api);

        mount.mds_command("mds.0", &["status"]).unwrap();
        assert!(api.commands()[0].input.is_empty());
    }

    #[test]
    fn test_argument_order_preserved() {
        let api = MockCephFs::new();
        let mount = mounted(&api);
        let args: Vec<Vec<u8>> = vec![b"config".to_vec(), b"set".to_vec(), b"debug_mds".to_vec()];

        let reply = mount.mds_command("mds.0", &args[..]).unwrap();
        // unscripted command
        assert_eq!(reply.error.unwrap().code(), -libc::EINVAL);
        assert_eq!(api.commands()[0].target, "mds.0");
        assert_eq!(api.commands()[0].args, args);
    }

    #[test]
    fn test_empty_args_rejected_locally() {
        let api = MockCephFs::new();
        let mount = mounted(&api);

        counters::reset();
        let args: [&str; 0] = [];
        let err = mount.mds_command("mds.0", &args).unwrap_err();
        assert!(matches!(err, Error::EmptyCommand));
        assert_eq!(counters::snapshot(), (0, 0));
        assert!(api.commands().is_empty());
    }

    #[test]
    fn test_nul_in_argument_rejected_locally() {
        let api = MockCephFs::new();
        let mount = mounted(&api);

        counters::reset();
        let args: [&[u8]; 2] = [b"status", b"bad\0"];
        let err = mount.mds_command("mds.0", &args).unwrap_err();
        assert!(matches!(err, Error::InteriorNul { offset: 3 }));
        let (allocated, released) = counters::snapshot();
        assert_eq!(allocated, released);
        assert!(api.commands().is_empty());
    }

    #[test]
    fn test_requires_mount() {
        let api = MockCephFs::new();
        let mount = Mount::create(api.clone()).unwrap();

        counters::reset();
        let reply = mount.mds_command("mds.0", &["status"]).unwrap();
        assert!(reply.error.unwrap().is_not_connected());
        assert_eq!(counters::snapshot(), (3, 3));
    }

    #[test]
    fn test_into_result() {
        let ok = CommandReply {
            output: b"{}".to_vec(),
            info: "fine".into(),
            error: None,
        };
        assert_eq!(ok.into_result().unwrap(), (b"{}".to_vec(), "fine".to_string()));

        let failed = CommandReply {
            output: Vec::new(),
            info: "no such rank".into(),
            error: CephFsError::from_code(-libc::ENOENT),
        };
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.info, "no such rank");
        assert!(err.to_string().ends_with(": no such rank"));

        let err: Error = err.into();
        assert!(err.ceph_error().unwrap().is_not_found());
    }
}

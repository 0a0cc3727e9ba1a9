//! Mount handle lifecycle.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a live mount handle.
///
/// `Unallocated` and `Released` have no variant: a handle that exists has
/// been allocated, and releasing it consumes it.
///
/// ```text
/// Allocated ──► Configured ──► Mounted ──► Unmounted
///     └──────────────────────────▲
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MountState {
    /// Native context allocated, nothing loaded yet.
    Allocated,
    /// Configuration has been read or set at least once.
    Configured,
    /// `mount` succeeded.
    Mounted,
    /// `unmount` succeeded.
    Unmounted,
}

impl MountState {
    /// Whether the state expects mount-dependent calls to succeed.
    pub fn is_mounted(&self) -> bool {
        matches!(self, MountState::Mounted)
    }

    /// State after a successful configuration call.
    ///
    /// Configuring a mounted handle is legal at the native layer (runtime
    /// options) and does not change the state.
    pub fn after_configure(self) -> Self {
        match self {
            MountState::Allocated => MountState::Configured,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_display_roundtrip() {
        for state in [
            MountState::Allocated,
            MountState::Configured,
            MountState::Mounted,
            MountState::Unmounted,
        ] {
            let text = state.to_string();
            assert_eq!(MountState::from_str(&text).unwrap(), state);
        }
        assert_eq!(MountState::Mounted.to_string(), "mounted");
    }

    #[test]
    fn test_after_configure() {
        assert_eq!(MountState::Allocated.after_configure(), MountState::Configured);
        assert_eq!(MountState::Configured.after_configure(), MountState::Configured);
        assert_eq!(MountState::Mounted.after_configure(), MountState::Mounted);
        assert_eq!(MountState::Unmounted.after_configure(), MountState::Unmounted);
    }
}

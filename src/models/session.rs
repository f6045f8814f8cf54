//! Reactive session state read by the presentation layer.

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::{Identity, Profile};

/// Who is signed in, their profile, and whether resolution is in progress.
///
/// `profile` is only ever `Some` while `identity` is `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Session {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl Default for Session {
    /// Start-up state: nothing resolved yet.
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
        }
    }
}

impl Session {
    /// Settled, signed-out state.
    pub fn signed_out() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: false,
        }
    }

    pub fn identity_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }
}

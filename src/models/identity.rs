//! Identity record owned by the identity provider.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Authenticated principal as reported by the identity provider.
///
/// Read-only to this crate: changes go through
/// [`IdentityProvider::update_identity`](crate::provider::IdentityProvider::update_identity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Identity {
    /// Stable provider id (Firebase `localId`)
    pub id: String,
    pub email_address: Option<String>,
    /// E.164 phone number, present for phone sign-ins
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Identity {
    /// Identity with only an id; fields are filled in by the caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email_address: None,
            phone_number: None,
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email_address = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Partial identity update pushed to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl IdentityUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.avatar_url.is_none()
    }
}

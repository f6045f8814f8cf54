//! Profile document model for storage and the UI.

use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Identity;

/// User profile stored in Firestore.
///
/// Stored at: `users/{uid}`. Field names match the documents the website
/// front end already reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    /// Identity id (also used as document ID). Older documents lack it.
    #[serde(rename = "uid", default)]
    pub id: String,
    /// Email address (None for phone-only accounts)
    #[serde(default)]
    pub email: Option<String>,
    /// Empty when unknown; stored as null by phone sign-ups
    #[serde(default, deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Profile picture URL
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// When the profile was first created (RFC 3339, UTC).
    /// Read time is used for documents written without one.
    #[serde(
        default = "crate::time_utils::now_rfc3339",
        deserialize_with = "created_at_or_now"
    )]
    pub created_at: String,
}

impl Profile {
    /// Seed a new profile from the identity's known fields.
    pub fn seed(identity: &Identity, created_at: String) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email_address.clone(),
            display_name: identity.display_name.clone().unwrap_or_default(),
            first_name: None,
            last_name: None,
            avatar_url: identity.avatar_url.clone(),
            phone_number: identity.phone_number.clone(),
            created_at,
        }
    }

    /// Creation time, if the stored value parses.
    pub fn created_at_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        crate::time_utils::parse_rfc3339(&self.created_at)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept an RFC 3339 string, a `{seconds, nanos}` timestamp map, or null.
fn created_at_or_now<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Text(String),
        Timestamp {
            seconds: i64,
            #[serde(default)]
            nanos: u32,
        },
    }

    let parsed = match Option::<Stored>::deserialize(deserializer)? {
        Some(Stored::Text(text)) => Some(text),
        Some(Stored::Timestamp { seconds, nanos }) => {
            chrono::DateTime::from_timestamp(seconds, nanos)
                .map(crate::time_utils::format_utc_rfc3339)
        }
        None => None,
    };
    Ok(parsed.unwrap_or_else(crate::time_utils::now_rfc3339))
}

/// Partial profile update; only present fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.avatar_url.is_none()
            && self.phone_number.is_none()
    }

    /// Names captured at sign-up.
    ///
    /// Display name is "first last" when both are given, otherwise the first
    /// name alone. Blank names are ignored.
    pub fn from_names(first_name: Option<&str>, last_name: Option<&str>) -> Self {
        let first = first_name.map(str::trim).filter(|s| !s.is_empty());
        let last = last_name.map(str::trim).filter(|s| !s.is_empty());

        let display_name = match (first, last) {
            (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
            (Some(f), None) => Some(f.to_string()),
            _ => None,
        };

        Self {
            display_name,
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
            ..Default::default()
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile synchronization.
//!
//! Keeps one profile document per identity in the `users` collection:
//! - created lazily (and idempotently) the first time an identity is seen
//! - merge-updated by its owner
//!
//! Store failures are returned as [`SessionError::Storage`] and never
//! retried here; a background retry could race with a sign-out.

use crate::db::{collections, from_document, to_document, CreateOutcome, DocumentStore, SetOptions};
use crate::error::{Result, SessionError};
use crate::models::{Identity, Profile, ProfileUpdate};
use crate::time_utils::now_rfc3339;
use std::sync::Arc;

/// Profile synchronizer over a document store.
#[derive(Clone)]
pub struct ProfileSync {
    store: Arc<dyn DocumentStore>,
}

impl ProfileSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Read-only lookup. `Ok(None)` means "not created yet".
    pub async fn fetch(&self, id: &str) -> Result<Option<Profile>> {
        let Some(doc) = self.store.get(collections::USERS, id).await? else {
            return Ok(None);
        };

        let mut profile: Profile = from_document(collections::USERS, id, doc)?;
        // The document key is authoritative.
        profile.id = id.to_string();
        Ok(Some(profile))
    }

    /// Return the identity's profile, creating it from the identity's fields
    /// if it does not exist yet.
    ///
    /// Safe to call concurrently for one id: creation is a conditional
    /// write, and the result is always re-read so every caller sees the
    /// single stored document.
    pub async fn get_or_create(&self, identity: &Identity) -> Result<Profile> {
        if let Some(profile) = self.fetch(&identity.id).await? {
            return Ok(profile);
        }

        let seed = Profile::seed(identity, now_rfc3339());
        let doc = to_document(collections::USERS, &identity.id, &seed)?;

        match self
            .store
            .create(collections::USERS, &identity.id, doc)
            .await?
        {
            CreateOutcome::Created => {
                tracing::info!(uid = %identity.id, "Profile created");
            }
            CreateOutcome::AlreadyExists => {
                tracing::debug!(uid = %identity.id, "Profile created concurrently, re-reading");
            }
        }

        self.fetch(&identity.id).await?.ok_or_else(|| {
            SessionError::Storage(format!("Profile {} missing after create", identity.id))
        })
    }

    /// Merge `update` into the existing profile and return the result.
    pub async fn update(&self, id: &str, update: &ProfileUpdate) -> Result<Profile> {
        let existing = self
            .fetch(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if update.is_empty() {
            return Ok(existing);
        }

        let doc = to_document(collections::USERS, id, update)?;
        self.store
            .set(collections::USERS, id, doc, SetOptions::merge())
            .await?;

        tracing::info!(uid = %id, "Profile updated");

        self.fetch(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}

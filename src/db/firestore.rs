// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing [`DocumentStore`].

use crate::db::{CreateOutcome, Document, DocumentStore, SetOptions};
use crate::error::StoreError;
use async_trait::async_trait;
use firestore::errors::FirestoreError;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client.as_ref().ok_or_else(|| {
            StoreError::Unavailable("Database not connected (offline mode)".to_string())
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj::<Document>()
            .one(id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        let client = self.get_client()?;

        // A field mask turns the write into a merge; without one the whole
        // document is replaced.
        let result: Result<(), FirestoreError> = if options.merge {
            let fields: Vec<String> = doc.keys().cloned().collect();
            client
                .fluent()
                .update()
                .fields(fields)
                .in_col(collection)
                .document_id(id)
                .object(&doc)
                .execute()
                .await
        } else {
            client
                .fluent()
                .update()
                .in_col(collection)
                .document_id(id)
                .object(&doc)
                .execute()
                .await
        };
        result.map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::debug!(collection, id, merge = options.merge, "Document written");
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> Result<CreateOutcome, StoreError> {
        // Firestore's CreateDocument fails with ALREADY_EXISTS when the id is
        // taken, which gives us an atomic create-if-absent.
        let result: Result<(), FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(id)
            .object(&doc)
            .execute()
            .await;

        match result {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(FirestoreError::DataConflictError(_)) => {
                tracing::debug!(collection, id, "Document already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }
}

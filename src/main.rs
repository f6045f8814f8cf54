// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Portfolio auth session daemon.
//!
//! Starts a session manager against the Identity Toolkit and logs every
//! session change. Set `DEMO_EMAIL` and `DEMO_PASSWORD` to sign in at
//! startup.

use anyhow::Context;
use portfolio_auth::{
    config::{Config, ProfileStoreKind},
    db::{DocumentStore, FirestoreDb, MemoryStore},
    services::{IdentityToolkit, ProfileSync},
    SessionManager,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        project = %config.gcp_project_id,
        store = ?config.profile_store,
        "Starting portfolio auth"
    );

    let store: Arc<dyn DocumentStore> = match config.profile_store {
        ProfileStoreKind::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .context("Failed to connect to Firestore")?,
        ),
        ProfileStoreKind::Memory => {
            tracing::warn!("Using in-memory profile store; profiles are not persisted");
            Arc::new(MemoryStore::new())
        }
    };

    // No interactive consent flow in a headless process.
    let provider = Arc::new(IdentityToolkit::new(&config, None));
    let manager = SessionManager::start(provider, ProfileSync::new(store), &config);

    let mut changes = manager.watch();
    let logger = tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let session = changes.borrow_and_update().clone();
            tracing::info!(
                uid = session.identity_id().unwrap_or("-"),
                has_profile = session.profile.is_some(),
                loading = session.loading,
                "Session changed"
            );
        }
    });

    manager.ready().await;

    if let (Ok(email), Ok(password)) = (
        std::env::var("DEMO_EMAIL"),
        std::env::var("DEMO_PASSWORD"),
    ) {
        match manager.sign_in(&email, &password).await {
            Ok(()) => tracing::info!("Demo sign-in complete"),
            Err(e) => tracing::error!(error = %e, "Demo sign-in failed"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    manager.shutdown();
    logger.abort();
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("portfolio_auth=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}

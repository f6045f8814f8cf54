// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider contract.
//!
//! The session manager never talks to an identity platform directly; it goes
//! through [`IdentityProvider`]. Providers publish auth-state changes through
//! an [`AuthStateHub`], which gives every subscriber its own ordered channel.

use crate::error::ProviderError;
use crate::models::{Identity, IdentityUpdate};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Auth-state change published by a provider.
///
/// `seq` increases by one per publish and is shared by all subscribers, so
/// two subscribers can agree on which change they are looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    pub seq: u64,
    /// The signed-in identity, or `None` when signed out
    pub identity: Option<Identity>,
}

/// Proof that the UI-rendered bot-check challenge (reCAPTCHA) was solved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCheckToken(String);

impl BotCheckToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Credential returned by an interactive OAuth consent flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpCredential {
    /// Provider id, e.g. `google.com`
    pub provider_id: String,
    /// OIDC ID token issued to the user
    pub id_token: String,
}

/// Interactive OAuth consent (popup or redirect), rendered outside this crate.
///
/// Cancellation must be reported as [`ProviderError::POPUP_CLOSED`] and a
/// blocked popup as [`ProviderError::POPUP_BLOCKED`].
#[async_trait]
pub trait ConsentFlow: Send + Sync + 'static {
    async fn authorize(&self) -> Result<IdpCredential, ProviderError>;
}

/// External identity platform.
///
/// Implementations deliver auth-state events in order, at least once, and
/// emit the current state to every new subscriber first. An operation that
/// changes the auth state must publish the change before its future
/// resolves.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Subscribe to auth-state changes. Dropping the stream unsubscribes.
    fn subscribe(&self) -> AuthStateStream;

    async fn create_account(&self, email: &str, password: &str)
        -> Result<Identity, ProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ProviderError>;

    /// Run the interactive consent flow and sign in with its credential.
    async fn sign_in_with_oauth(&self) -> Result<Identity, ProviderError>;

    /// Send an OTP to `phone_number` (E.164). Returns the provider's
    /// verification id.
    async fn send_phone_code(
        &self,
        phone_number: &str,
        bot_check: &BotCheckToken,
    ) -> Result<String, ProviderError>;

    /// Redeem an OTP against a verification id.
    async fn confirm_phone_code(
        &self,
        verification_id: &str,
        code: &str,
    ) -> Result<Identity, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Update the signed-in identity and return the result.
    async fn update_identity(&self, update: &IdentityUpdate) -> Result<Identity, ProviderError>;
}

/// Receiving half of an auth-state subscription.
pub struct AuthStateStream {
    rx: mpsc::UnboundedReceiver<AuthStateChange>,
}

impl AuthStateStream {
    /// Next change, or `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<AuthStateChange> {
        self.rx.recv().await
    }

    /// Next already-delivered change, without waiting.
    pub fn try_recv(&mut self) -> Option<AuthStateChange> {
        self.rx.try_recv().ok()
    }

    /// Drain everything delivered so far and return the last change.
    pub fn drain_latest(&mut self) -> Option<AuthStateChange> {
        let mut latest = None;
        while let Some(change) = self.try_recv() {
            latest = Some(change);
        }
        latest
    }
}

/// Fan-out of auth-state events to subscribers.
///
/// Each subscriber gets an unbounded channel, so a slow subscriber never
/// loses or reorders events. Closed subscribers are pruned on publish.
#[derive(Default)]
pub struct AuthStateHub {
    inner: Mutex<HubState>,
}

struct HubState {
    current: AuthStateChange,
    subscribers: Vec<mpsc::UnboundedSender<AuthStateChange>>,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            current: AuthStateChange {
                seq: 0,
                identity: None,
            },
            subscribers: Vec::new(),
        }
    }
}

impl AuthStateHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe; the current state is delivered first.
    pub fn subscribe(&self) -> AuthStateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(state.current.clone());
        state.subscribers.push(tx);
        AuthStateStream { rx }
    }

    /// Record a new state and deliver it to every live subscriber.
    /// Returns the change's sequence number.
    pub fn publish(&self, identity: Option<Identity>) -> u64 {
        let mut state = self.lock();
        let change = AuthStateChange {
            seq: state.current.seq + 1,
            identity,
        };
        state.current = change.clone();
        state
            .subscribers
            .retain(|tx| tx.send(change.clone()).is_ok());
        tracing::debug!(
            seq = change.seq,
            signed_in = change.identity.is_some(),
            subscribers = state.subscribers.len(),
            "Auth state published"
        );
        change.seq
    }

    /// Last published state.
    pub fn current(&self) -> AuthStateChange {
        self.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

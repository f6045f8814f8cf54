// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: the single writer of "who is signed in".
//!
//! A listener task applies provider auth-state changes strictly in order.
//! Each change to a *different* identity bumps the generation, aborts any
//! in-flight profile resolution and starts a new one tagged with the new
//! generation. A resolution only commits if its generation is still current,
//! so a slow profile read for a superseded identity is dropped.
//!
//! Operations do not apply transitions themselves. They subscribe a probe
//! before calling the provider, read the sequence number of the change their
//! call published, and wait until the listener has applied it and the
//! session has settled.

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::models::{IdentityUpdate, Profile, ProfileUpdate, Session};
use crate::phone::{normalize_phone_number, validate_verification_code};
use crate::provider::{AuthStateChange, AuthStateStream, BotCheckToken, IdentityProvider};
use crate::services::ProfileSync;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use validator::ValidateEmail;

/// Handle for redeeming a phone OTP.
///
/// Only the most recently issued handle is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVerification {
    verification_id: String,
    phone_number: String,
    attempt: u64,
}

impl PendingVerification {
    /// Normalized number the code was sent to.
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }
}

/// Listener bookkeeping published to waiting operations.
#[derive(Debug, Clone)]
struct Progress {
    /// Seq of the last provider change the listener applied
    applied_seq: u64,
    /// Current transition generation
    generation: u64,
    /// Last generation whose profile resolution finished
    settled: u64,
    /// Identity id of the settled generation
    settled_identity: Option<String>,
    /// Outcome of the settled generation's resolution
    outcome: Result<()>,
    closed: bool,
}

impl Progress {
    fn is_quiescent(&self) -> bool {
        self.settled == self.generation
    }
}

#[derive(Default)]
struct Transition {
    generation: u64,
    resolving: Option<JoinHandle<()>>,
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    profiles: ProfileSync,
    default_country_code: String,
    state: watch::Sender<Session>,
    progress: watch::Sender<Progress>,
    transition: Mutex<Transition>,
    /// Latest phone sign-in attempt. A pending verification is redeemable
    /// only while its attempt is the latest; redeeming bumps past it.
    phone_attempt: AtomicU64,
}

/// Process-wide session manager.
///
/// Dropping it (or calling [`shutdown`](Self::shutdown)) unsubscribes from
/// the provider and abandons any in-flight profile resolution.
pub struct SessionManager {
    inner: Arc<Inner>,
    listener: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// Subscribe to the provider and start applying auth-state changes.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        profiles: ProfileSync,
        config: &Config,
    ) -> Self {
        let (state, _) = watch::channel(Session::default());
        let (progress, _) = watch::channel(Progress {
            applied_seq: 0,
            generation: 0,
            settled: 0,
            settled_identity: None,
            outcome: Ok(()),
            closed: false,
        });

        let mut events = provider.subscribe();
        let inner = Arc::new(Inner {
            provider,
            profiles,
            default_country_code: config.phone_default_country_code.clone(),
            state,
            progress,
            transition: Mutex::new(Transition::default()),
            phone_attempt: AtomicU64::new(0),
        });

        let listener_inner = Arc::clone(&inner);
        let listener = tokio::spawn(async move {
            while let Some(change) = events.recv().await {
                listener_inner.apply(change);
            }
            tracing::debug!("Auth state stream closed");
        });

        tracing::info!("Session manager started");

        Self {
            inner,
            listener: Some(listener),
        }
    }

    /// Stop listening and release the subscription.
    pub fn shutdown(mut self) {
        self.close();
    }

    // ─── Readers ─────────────────────────────────────────────────

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Reactive view of the session for the presentation layer.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Wait until the first auth-state resolution has completed.
    pub async fn ready(&self) -> Session {
        let mut rx = self.inner.state.subscribe();
        let result = rx.wait_for(|s| !s.loading).await.map(|s| s.clone());
        result.unwrap_or_else(|_| self.session())
    }

    /// Read a profile without creating it.
    pub async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>> {
        self.inner.profiles.fetch(id).await
    }

    // ─── Email / password ────────────────────────────────────────

    /// Create an account, resolve its profile and record the given names.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        let email = validate_email(email)?;
        require_password(password)?;

        let names = ProfileUpdate::from_names(first_name, last_name);

        let mut probe = self.inner.provider.subscribe();
        let identity = self
            .inner
            .provider
            .create_account(email, password)
            .await
            .map_err(|e| auth_failure("sign_up", e))?;

        // The account exists from here on. A failed display-name push is
        // logged; the names still land in the profile below.
        if let Some(display_name) = &names.display_name {
            let update = IdentityUpdate {
                display_name: Some(display_name.clone()),
                avatar_url: None,
            };
            if let Err(e) = self.inner.provider.update_identity(&update).await {
                tracing::warn!(
                    uid = %identity.id,
                    code = %e.code,
                    "Display name not pushed to identity provider"
                );
            }
        }

        self.inner.settle_after(&mut probe, Some(&identity.id)).await?;

        if !names.is_empty() {
            let profile = self.inner.profiles.update(&identity.id, &names).await?;
            self.inner.commit_profile(profile);
        }

        tracing::info!(uid = %identity.id, "Account created");
        Ok(())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let email = validate_email(email)?;
        require_password(password)?;

        let mut probe = self.inner.provider.subscribe();
        let identity = self
            .inner
            .provider
            .sign_in(email, password)
            .await
            .map_err(|e| auth_failure("sign_in", e))?;

        self.inner.settle_after(&mut probe, Some(&identity.id)).await
    }

    // ─── OAuth ───────────────────────────────────────────────────

    /// Sign in through the provider's interactive consent flow.
    pub async fn sign_in_with_oauth(&self) -> Result<()> {
        let mut probe = self.inner.provider.subscribe();
        let identity = self
            .inner
            .provider
            .sign_in_with_oauth()
            .await
            .map_err(|e| auth_failure("sign_in_with_oauth", e))?;

        self.inner.settle_after(&mut probe, Some(&identity.id)).await
    }

    // ─── Phone ───────────────────────────────────────────────────

    /// Send an OTP to `phone_number`.
    ///
    /// Any earlier pending verification stops being redeemable as soon as
    /// this call reaches the provider.
    pub async fn sign_in_with_phone(
        &self,
        phone_number: &str,
        bot_check: &BotCheckToken,
    ) -> Result<PendingVerification> {
        let phone_number =
            normalize_phone_number(phone_number, &self.inner.default_country_code)?;
        if bot_check.is_empty() {
            return Err(SessionError::Validation(
                "Complete the verification challenge first".to_string(),
            ));
        }

        let attempt = self.inner.phone_attempt.fetch_add(1, Ordering::SeqCst) + 1;

        let verification_id = self
            .inner
            .provider
            .send_phone_code(&phone_number, bot_check)
            .await
            .map_err(|e| auth_failure("sign_in_with_phone", e))?;

        // A newer attempt may have started while this one was in flight.
        if self.inner.phone_attempt.load(Ordering::SeqCst) != attempt {
            return Err(SessionError::auth(
                SessionError::STALE_VERIFICATION,
                "A newer verification code was requested",
            ));
        }

        tracing::info!(attempt, "Phone verification pending");
        Ok(PendingVerification {
            verification_id,
            phone_number,
            attempt,
        })
    }

    /// Redeem the OTP for the latest pending verification.
    ///
    /// A code requested while the confirm is in flight wins: the redeemed
    /// sign-in is undone and `STALE_VERIFICATION` returned.
    pub async fn verify_phone_code(
        &self,
        pending: &PendingVerification,
        code: &str,
    ) -> Result<()> {
        let code = validate_verification_code(code)?;

        if self.inner.phone_attempt.load(Ordering::SeqCst) != pending.attempt {
            tracing::warn!(attempt = pending.attempt, "Rejected superseded verification");
            return Err(SessionError::auth(
                SessionError::STALE_VERIFICATION,
                "This verification code is no longer valid. Request a new one.",
            ));
        }

        let mut probe = self.inner.provider.subscribe();
        let identity = self
            .inner
            .provider
            .confirm_phone_code(&pending.verification_id, code)
            .await
            .map_err(|e| auth_failure("verify_phone_code", e))?;

        // Redeemed. A newer code request made while the confirm was in
        // flight supersedes this sign-in, so undo it.
        let redeemed = self.inner.phone_attempt.compare_exchange(
            pending.attempt,
            pending.attempt + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if redeemed.is_err() {
            tracing::warn!(
                uid = %identity.id,
                attempt = pending.attempt,
                "Verification superseded during confirm, signing out"
            );
            self.inner
                .provider
                .sign_out()
                .await
                .map_err(|e| auth_failure("verify_phone_code", e))?;
            self.inner.settle_after(&mut probe, None).await?;
            return Err(SessionError::auth(
                SessionError::STALE_VERIFICATION,
                "A newer verification code was requested",
            ));
        }

        self.inner.settle_after(&mut probe, Some(&identity.id)).await
    }

    // ─── Sign-out / profile ──────────────────────────────────────

    /// Sign out. Signing out twice is not an error.
    pub async fn sign_out(&self) -> Result<()> {
        let mut probe = self.inner.provider.subscribe();
        self.inner
            .provider
            .sign_out()
            .await
            .map_err(|e| auth_failure("sign_out", e))?;

        self.inner.settle_after(&mut probe, None).await
    }

    /// Merge `update` into the signed-in user's profile.
    ///
    /// Display name and photo changes are pushed to the provider identity
    /// as well.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile> {
        let identity = self
            .inner
            .state
            .borrow()
            .identity
            .clone()
            .ok_or(SessionError::NotAuthenticated)?;

        let profile = self.inner.profiles.update(&identity.id, update).await?;
        self.inner.commit_profile(profile.clone());

        let identity_update = IdentityUpdate {
            display_name: update.display_name.clone(),
            avatar_url: update.avatar_url.clone(),
        };
        if !identity_update.is_empty() {
            let mut probe = self.inner.provider.subscribe();
            self.inner
                .provider
                .update_identity(&identity_update)
                .await
                .map_err(|e| auth_failure("update_profile", e))?;
            self.inner.settle_after(&mut probe, Some(&identity.id)).await?;
        }

        Ok(profile)
    }

    fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            self.inner.close();
            tracing::info!("Session manager stopped");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    /// Apply one provider change. Called only by the listener.
    fn apply(self: &Arc<Self>, change: AuthStateChange) {
        let mut transition = self.lock_transition();
        let (current_id, has_profile, loading) = {
            let session = self.state.borrow();
            (
                session.identity_id().map(str::to_string),
                session.profile.is_some(),
                session.loading,
            )
        };

        match change.identity {
            None if current_id.is_none() && !loading => {
                // Already signed out.
            }
            None => {
                transition.generation += 1;
                let generation = transition.generation;
                if let Some(task) = transition.resolving.take() {
                    task.abort();
                }
                self.state.send_replace(Session::signed_out());
                self.progress.send_modify(|p| {
                    p.generation = generation;
                    p.settled = generation;
                    p.settled_identity = None;
                    p.outcome = Ok(());
                });
                tracing::info!(generation, "Session cleared");
            }
            Some(identity)
                if current_id.as_deref() == Some(identity.id.as_str())
                    && (has_profile || transition.resolving.is_some()) =>
            {
                // Same session (token refresh, identity update): keep the
                // profile or the resolution already in flight.
                self.state.send_modify(|s| s.identity = Some(identity));
            }
            Some(identity) => {
                transition.generation += 1;
                let generation = transition.generation;
                if let Some(task) = transition.resolving.take() {
                    tracing::debug!(generation, "Abandoning superseded profile resolution");
                    task.abort();
                }

                tracing::info!(uid = %identity.id, generation, "Resolving session");
                self.state.send_replace(Session {
                    identity: Some(identity.clone()),
                    profile: None,
                    loading: true,
                });
                self.progress.send_modify(|p| p.generation = generation);

                let inner = Arc::clone(self);
                transition.resolving = Some(tokio::spawn(async move {
                    let outcome = inner.profiles.get_or_create(&identity).await;
                    inner.commit_resolution(generation, &identity.id, outcome);
                }));
            }
        }

        self.progress.send_modify(|p| p.applied_seq = change.seq);
    }

    /// Commit a finished profile resolution if it is still current.
    fn commit_resolution(&self, generation: u64, uid: &str, outcome: Result<Profile>) {
        let mut transition = self.lock_transition();
        if transition.generation != generation {
            tracing::debug!(
                uid,
                generation,
                current = transition.generation,
                "Dropping stale profile"
            );
            return;
        }
        transition.resolving = None;

        let outcome = match outcome {
            Ok(profile) => {
                self.state.send_modify(|s| {
                    s.profile = Some(profile);
                    s.loading = false;
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(uid, error = %e, "Profile resolution failed");
                self.state.send_modify(|s| s.loading = false);
                Err(e)
            }
        };

        self.progress.send_modify(|p| {
            p.settled = generation;
            p.settled_identity = Some(uid.to_string());
            p.outcome = outcome;
        });
    }

    /// Replace the session profile if its owner is still signed in.
    fn commit_profile(&self, profile: Profile) {
        let _transition = self.lock_transition();
        self.state.send_if_modified(|s| {
            if s.identity_id() == Some(profile.id.as_str()) {
                s.profile = Some(profile);
                true
            } else {
                false
            }
        });
    }

    /// Wait until the changes published since `probe` subscribed have been
    /// applied and the session has settled.
    ///
    /// With `expected_uid`, a failed profile resolution for that identity
    /// is returned as the error. If the session moved on to someone else
    /// meanwhile, the operation still counts as successful.
    async fn settle_after(
        &self,
        probe: &mut AuthStateStream,
        expected_uid: Option<&str>,
    ) -> Result<()> {
        // The first item is the state at subscribe time; anything after it
        // was published during the operation.
        let _ = probe.try_recv();
        let Some(latest) = probe.drain_latest() else {
            return Ok(());
        };

        let mut rx = self.progress.subscribe();
        let progress = rx
            .wait_for(|p| p.closed || (p.applied_seq >= latest.seq && p.is_quiescent()))
            .await
            .map(|p| p.clone())
            .map_err(|_| session_closed())?;

        if progress.closed {
            return Err(session_closed());
        }

        match expected_uid {
            Some(uid) if progress.settled_identity.as_deref() == Some(uid) => progress.outcome,
            _ => Ok(()),
        }
    }

    fn close(&self) {
        let mut transition = self.lock_transition();
        if let Some(task) = transition.resolving.take() {
            task.abort();
        }
        self.progress.send_modify(|p| p.closed = true);
    }

    fn lock_transition(&self) -> MutexGuard<'_, Transition> {
        self.transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(SessionError::Validation("Email is required".to_string()));
    }
    if !email.validate_email() {
        return Err(SessionError::Validation(format!(
            "Invalid email address: {}",
            email
        )));
    }
    Ok(email)
}

fn require_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(SessionError::Validation("Password is required".to_string()));
    }
    Ok(())
}

fn auth_failure(operation: &'static str, err: crate::error::ProviderError) -> SessionError {
    tracing::warn!(operation, code = %err.code, "Identity provider rejected request");
    err.into()
}

fn session_closed() -> SessionError {
    SessionError::auth(SessionError::SESSION_CLOSED, "Session manager stopped")
}

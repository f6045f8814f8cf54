// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use portfolio_auth::config::Config;
use portfolio_auth::db::{CreateOutcome, Document, DocumentStore, FirestoreDb, MemoryStore, SetOptions};
use portfolio_auth::error::{ProviderError, StoreError};
use portfolio_auth::models::{Identity, IdentityUpdate};
use portfolio_auth::provider::{AuthStateHub, AuthStateStream, BotCheckToken, IdentityProvider};
use portfolio_auth::services::ProfileSync;
use portfolio_auth::SessionManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique id for test isolation against a shared emulator.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

/// Bound on any wait in these tests.
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[allow(dead_code)]
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out")
}

// ─── Fake identity provider ──────────────────────────────────────

/// The code every fake SMS carries.
#[allow(dead_code)]
pub const FAKE_OTP: &str = "123456";

#[derive(Default)]
struct FakeState {
    /// email -> (password, identity)
    accounts: HashMap<String, (String, Identity)>,
    /// verification id -> phone number
    pending_codes: HashMap<String, String>,
    current: Option<Identity>,
    oauth_result: Option<Result<Identity, ProviderError>>,
    next_error: Option<ProviderError>,
    update_error: Option<ProviderError>,
    /// Held confirms wait on this until released
    confirm_hold: Option<Arc<Semaphore>>,
    last_phone_number: Option<String>,
    next_account: usize,
}

/// In-process identity provider with scripted behavior and call counters.
#[derive(Default)]
pub struct FakeProvider {
    hub: AuthStateHub,
    state: Mutex<FakeState>,
    pub create_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub send_code_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    /// Notified when a held confirm starts waiting.
    pub confirm_entered: Notify,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an email/password account without signing in.
    pub fn add_account(&self, email: &str, password: &str, identity: Identity) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(email.to_string(), (password.to_string(), identity));
    }

    /// Result of the next OAuth consent flow.
    pub fn set_oauth_result(&self, result: Result<Identity, ProviderError>) {
        self.state.lock().unwrap().oauth_result = Some(result);
    }

    /// Make the next provider call fail with `err`.
    pub fn fail_next(&self, err: ProviderError) {
        self.state.lock().unwrap().next_error = Some(err);
    }

    /// Make the next identity update fail with `err`.
    pub fn fail_next_update(&self, err: ProviderError) {
        self.state.lock().unwrap().update_error = Some(err);
    }

    /// Hold phone confirms until [`release_confirms`](Self::release_confirms).
    pub fn hold_confirms(&self) {
        self.state.lock().unwrap().confirm_hold = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_confirms(&self) {
        if let Some(hold) = self.state.lock().unwrap().confirm_hold.take() {
            hold.add_permits(1024);
        }
    }

    /// Publish an auth-state change as if it came from another tab.
    pub fn push(&self, identity: Option<Identity>) -> u64 {
        self.state.lock().unwrap().current = identity.clone();
        self.hub.publish(identity)
    }

    pub fn current(&self) -> Option<Identity> {
        self.state.lock().unwrap().current.clone()
    }

    pub fn last_phone_number(&self) -> Option<String> {
        self.state.lock().unwrap().last_phone_number.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn take_error(&self) -> Result<(), ProviderError> {
        match self.state.lock().unwrap().next_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn establish(&self, identity: Identity) -> Identity {
        self.push(Some(identity.clone()));
        identity
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn subscribe(&self) -> AuthStateStream {
        self.hub.subscribe()
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.take_error()?;

        let identity = {
            let mut state = self.state.lock().unwrap();
            if state.accounts.contains_key(email) {
                return Err(ProviderError::new(
                    "EMAIL_EXISTS",
                    "An account with this email already exists.",
                ));
            }
            state.next_account += 1;
            let identity =
                Identity::new(format!("uid-{}", state.next_account)).with_email(email);
            state
                .accounts
                .insert(email.to_string(), (password.to_string(), identity.clone()));
            identity
        };

        Ok(self.establish(identity))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.take_error()?;

        let identity = match self.state.lock().unwrap().accounts.get(email) {
            Some((stored, identity)) if stored == password => identity.clone(),
            _ => {
                return Err(ProviderError::new(
                    "INVALID_LOGIN_CREDENTIALS",
                    "Incorrect email or password.",
                ))
            }
        };

        Ok(self.establish(identity))
    }

    async fn sign_in_with_oauth(&self) -> Result<Identity, ProviderError> {
        self.take_error()?;
        let result = self.state.lock().unwrap().oauth_result.take().unwrap_or_else(|| {
            Err(ProviderError::new(
                ProviderError::OPERATION_NOT_ALLOWED,
                "No OAuth consent flow is configured.",
            ))
        });
        Ok(self.establish(result?))
    }

    async fn send_phone_code(
        &self,
        phone_number: &str,
        _bot_check: &BotCheckToken,
    ) -> Result<String, ProviderError> {
        let n = self.send_code_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.take_error()?;

        let verification_id = format!("session-info-{}", n);
        let mut state = self.state.lock().unwrap();
        state.last_phone_number = Some(phone_number.to_string());
        state
            .pending_codes
            .insert(verification_id.clone(), phone_number.to_string());
        Ok(verification_id)
    }

    async fn confirm_phone_code(
        &self,
        verification_id: &str,
        code: &str,
    ) -> Result<Identity, ProviderError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        self.take_error()?;

        let hold = self.state.lock().unwrap().confirm_hold.clone();
        if let Some(hold) = hold {
            self.confirm_entered.notify_one();
            let _permit = hold.acquire().await.unwrap();
        }

        let phone = self
            .state
            .lock()
            .unwrap()
            .pending_codes
            .get(verification_id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::new("INVALID_SESSION_INFO", "The verification code has expired.")
            })?;
        if code != FAKE_OTP {
            return Err(ProviderError::new("INVALID_CODE", "Invalid verification code."));
        }

        let identity = Identity::new(format!("phone-{}", phone.trim_start_matches('+')))
            .with_phone(phone);
        Ok(self.establish(identity))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.take_error()?;
        let was_signed_in = self.state.lock().unwrap().current.take().is_some();
        if was_signed_in {
            self.hub.publish(None);
        }
        Ok(())
    }

    async fn update_identity(&self, update: &IdentityUpdate) -> Result<Identity, ProviderError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.take_error()?;
        if let Some(err) = self.state.lock().unwrap().update_error.take() {
            return Err(err);
        }

        let identity = {
            let mut state = self.state.lock().unwrap();
            let Some(current) = state.current.as_mut() else {
                return Err(ProviderError::new(
                    ProviderError::NOT_SIGNED_IN,
                    "No user is signed in.",
                ));
            };
            if let Some(name) = &update.display_name {
                current.display_name = Some(name.clone());
            }
            if let Some(url) = &update.avatar_url {
                current.avatar_url = Some(url.clone());
            }
            current.clone()
        };

        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }
}

// ─── Instrumented document store ─────────────────────────────────

/// Memory store that counts calls and can hold reads of one document
/// until released.
pub struct GatedStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub creates: AtomicUsize,
    gated_id: Mutex<Option<String>>,
    gate: Semaphore,
    /// Notified when a read reaches the gate.
    pub blocked: Notify,
}

#[allow(dead_code)]
impl GatedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            gated_id: Mutex::new(None),
            gate: Semaphore::new(0),
            blocked: Notify::new(),
        })
    }

    /// Hold reads of `id` until [`release`](Self::release).
    pub fn hold(&self, id: &str) {
        *self.gated_id.lock().unwrap() = Some(id.to_string());
    }

    pub fn release(&self) {
        *self.gated_id.lock().unwrap() = None;
        self.gate.add_permits(1024);
    }

    pub fn writes(&self) -> usize {
        self.sets.load(Ordering::SeqCst) + self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let gated = self.gated_id.lock().unwrap().as_deref() == Some(id);
        if gated {
            self.blocked.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        self.inner.get(collection, id).await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(collection, id, doc, options).await
    }

    async fn create(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> Result<CreateOutcome, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(collection, id, doc).await
    }
}

// ─── Harness ─────────────────────────────────────────────────────

#[allow(dead_code)]
pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub store: Arc<GatedStore>,
    pub manager: Arc<SessionManager>,
}

/// Start a session manager over a fake provider and a gated memory store.
#[allow(dead_code)]
pub async fn start_session() -> Harness {
    start_session_with(Config::default()).await
}

#[allow(dead_code)]
pub async fn start_session_with(config: Config) -> Harness {
    let provider = FakeProvider::new();
    let store = GatedStore::new();
    let manager = SessionManager::start(
        provider.clone(),
        ProfileSync::new(store.clone()),
        &config,
    );
    within(manager.ready()).await;

    Harness {
        provider,
        store,
        manager: Arc::new(manager),
    }
}

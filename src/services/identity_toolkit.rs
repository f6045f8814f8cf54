// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication (Identity Toolkit) REST client.
//!
//! Handles:
//! - Email/password sign-up and sign-in
//! - Google sign-in with a credential from a [`ConsentFlow`]
//! - Phone OTP send and confirm
//! - Identity updates (display name, photo)
//! - ID token refresh; a rejected refresh signs the user out
//! - Reloading the signed-in user (`accounts:lookup`)
//!
//! Auth-state changes are published through an [`AuthStateHub`].
//! For local development with the Auth emulator, set
//! FIREBASE_AUTH_EMULATOR_HOST.

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{Identity, IdentityUpdate};
use crate::provider::{
    AuthStateHub, AuthStateStream, BotCheckToken, ConsentFlow, IdentityProvider,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh errors that mean the session is gone for good.
const REVOKED_SESSION_CODES: &[&str] = &[
    "TOKEN_EXPIRED",
    "USER_DISABLED",
    "USER_NOT_FOUND",
    "INVALID_REFRESH_TOKEN",
];

/// Human-readable text for Identity Toolkit error codes.
pub fn describe_error(code: &str) -> &'static str {
    match code {
        "EMAIL_EXISTS" => "An account with this email already exists.",
        "WEAK_PASSWORD" => "Password should be at least 6 characters.",
        "INVALID_EMAIL" => "The email address is badly formatted.",
        "MISSING_PASSWORD" => "A password is required.",
        "EMAIL_NOT_FOUND" => "No account exists for this email.",
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => "Incorrect email or password.",
        "USER_DISABLED" => "This account has been disabled.",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts. Please try again later.",
        "OPERATION_NOT_ALLOWED" => "This sign-in method is not enabled.",
        "INVALID_PHONE_NUMBER" => "The phone number is not valid.",
        "MISSING_PHONE_NUMBER" => "A phone number is required.",
        "CAPTCHA_CHECK_FAILED" => "The reCAPTCHA check failed. Please try again.",
        "QUOTA_EXCEEDED" => "SMS quota exceeded. Please try again later.",
        "INVALID_CODE" => "Invalid verification code.",
        "INVALID_SESSION_INFO" | "SESSION_EXPIRED" => {
            "The verification code has expired. Please request a new one."
        }
        "INVALID_IDP_RESPONSE" => "The sign-in provider returned an invalid credential.",
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "INVALID_REFRESH_TOKEN" => {
            "Your session has expired. Please sign in again."
        }
        "USER_NOT_FOUND" => "This account no longer exists.",
        _ => "Authentication failed.",
    }
}

/// Tokens and identity of the signed-in user.
#[derive(Debug, Clone)]
struct SignedInUser {
    identity: Identity,
    id_token: String,
    refresh_token: String,
}

/// Identity Toolkit client implementing [`IdentityProvider`].
pub struct IdentityToolkit {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    api_key: String,
    request_uri: String,
    consent: Option<Arc<dyn ConsentFlow>>,
    current: Mutex<Option<SignedInUser>>,
    hub: AuthStateHub,
}

impl IdentityToolkit {
    /// Create a client for the configured Firebase project.
    pub fn new(config: &Config, consent: Option<Arc<dyn ConsentFlow>>) -> Self {
        let (base_url, token_url) = match std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
            Ok(host) => {
                tracing::info!(host = %host, "Using Firebase Auth emulator");
                (
                    format!("http://{}/identitytoolkit.googleapis.com/v1", host),
                    format!("http://{}/securetoken.googleapis.com/v1", host),
                )
            }
            Err(_) => (DEFAULT_BASE_URL.to_string(), DEFAULT_TOKEN_URL.to_string()),
        };

        Self::with_base_urls(config, consent, base_url, token_url)
    }

    /// Create a client against explicit endpoints (emulator or test server).
    pub fn with_base_urls(
        config: &Config,
        consent: Option<Arc<dyn ConsentFlow>>,
        base_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            http,
            base_url: base_url.into(),
            token_url: token_url.into(),
            api_key: config.firebase_api_key.clone(),
            request_uri: config.oauth_request_uri.clone(),
            consent,
            current: Mutex::new(None),
            hub: AuthStateHub::new(),
        }
    }

    /// Currently signed-in identity, if any.
    pub fn current_identity(&self) -> Option<Identity> {
        self.lock_current().as_ref().map(|u| u.identity.clone())
    }

    /// ID token of the signed-in user, for calling other Firebase APIs.
    pub fn id_token(&self) -> Option<String> {
        self.lock_current().as_ref().map(|u| u.id_token.clone())
    }

    /// Exchange the refresh token for a fresh ID token.
    ///
    /// If the provider says the session was revoked (disabled account,
    /// expired refresh token), the user is signed out and subscribers see
    /// the transition like any other.
    pub async fn refresh(&self) -> Result<(), ProviderError> {
        let Some(refresh_token) = self
            .lock_current()
            .as_ref()
            .map(|u| u.refresh_token.clone())
        else {
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{}/token", self.token_url))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(ProviderError::network)?;

        match check_response_json::<RefreshResponse>(response).await {
            Ok(tokens) => {
                if let Some(user) = self.lock_current().as_mut() {
                    user.id_token = tokens.id_token;
                    user.refresh_token = tokens.refresh_token;
                }
                tracing::debug!("ID token refreshed");
                Ok(())
            }
            Err(e) if REVOKED_SESSION_CODES.contains(&e.code.as_str()) => {
                tracing::warn!(code = %e.code, "Session revoked by provider");
                self.clear_session();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-read the signed-in user from `accounts:lookup`.
    ///
    /// Picks up changes made elsewhere (another device, the console).
    /// Subscribers are notified only if the identity changed.
    pub async fn reload(&self) -> Result<Option<Identity>, ProviderError> {
        let Some(id_token) = self.id_token() else {
            return Ok(None);
        };

        let response: LookupResponse = self
            .post_json("lookup", &serde_json::json!({ "idToken": id_token }))
            .await?;
        let Some(user) = response.users.into_iter().next() else {
            return Err(ProviderError::new(
                "USER_NOT_FOUND",
                describe_error("USER_NOT_FOUND"),
            ));
        };

        let changed = {
            let mut current = self.lock_current();
            let Some(signed_in) = current.as_mut() else {
                return Ok(None);
            };
            if signed_in.identity.id != user.local_id {
                tracing::warn!(uid = %user.local_id, "Lookup returned a different user");
                return Ok(Some(signed_in.identity.clone()));
            }
            let identity = user.identity();
            let changed = signed_in.identity != identity;
            signed_in.identity = identity.clone();
            changed.then_some(identity)
        };

        match changed {
            Some(identity) => {
                tracing::debug!(uid = %identity.id, "Identity reloaded");
                self.hub.publish(Some(identity.clone()));
                Ok(Some(identity))
            }
            None => Ok(self.current_identity()),
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────

    /// POST a JSON body to an `accounts:*` endpoint.
    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(ProviderError::network)?;

        check_response_json(response).await
    }

    /// Store the session and notify subscribers.
    fn establish_session(&self, response: SignInResponse) -> Identity {
        let identity = response.account.identity();
        *self.lock_current() = Some(SignedInUser {
            identity: identity.clone(),
            id_token: response.id_token,
            refresh_token: response.refresh_token,
        });

        tracing::info!(uid = %identity.id, "Signed in");
        self.hub.publish(Some(identity.clone()));
        identity
    }

    fn clear_session(&self) {
        let was_signed_in = self.lock_current().take().is_some();
        if was_signed_in {
            self.hub.publish(None);
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<SignedInUser>> {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkit {
    fn subscribe(&self) -> AuthStateStream {
        self.hub.subscribe()
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        let response: SignInResponse = self
            .post_json(
                "signUp",
                &serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        Ok(self.establish_session(response))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let response: SignInResponse = self
            .post_json(
                "signInWithPassword",
                &serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        Ok(self.establish_session(response))
    }

    async fn sign_in_with_oauth(&self) -> Result<Identity, ProviderError> {
        let consent = self.consent.as_ref().ok_or_else(|| {
            ProviderError::new(
                ProviderError::OPERATION_NOT_ALLOWED,
                "No OAuth consent flow is configured.",
            )
        })?;

        let credential = consent.authorize().await?;

        let post_body = format!(
            "id_token={}&providerId={}",
            credential.id_token, credential.provider_id
        );
        let response: SignInResponse = self
            .post_json(
                "signInWithIdp",
                &serde_json::json!({
                    "postBody": post_body,
                    "requestUri": self.request_uri,
                    "returnSecureToken": true,
                    "returnIdpCredential": true,
                }),
            )
            .await?;

        Ok(self.establish_session(response))
    }

    async fn send_phone_code(
        &self,
        phone_number: &str,
        bot_check: &BotCheckToken,
    ) -> Result<String, ProviderError> {
        let response: SendCodeResponse = self
            .post_json(
                "sendVerificationCode",
                &serde_json::json!({
                    "phoneNumber": phone_number,
                    "recaptchaToken": bot_check.as_str(),
                }),
            )
            .await?;

        tracing::info!("Verification code sent");
        Ok(response.session_info)
    }

    async fn confirm_phone_code(
        &self,
        verification_id: &str,
        code: &str,
    ) -> Result<Identity, ProviderError> {
        let response: SignInResponse = self
            .post_json(
                "signInWithPhoneNumber",
                &serde_json::json!({
                    "sessionInfo": verification_id,
                    "code": code,
                }),
            )
            .await?;

        Ok(self.establish_session(response))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.clear_session();
        tracing::info!("Signed out");
        Ok(())
    }

    async fn update_identity(&self, update: &IdentityUpdate) -> Result<Identity, ProviderError> {
        let id_token = self.id_token().ok_or_else(|| {
            ProviderError::new(ProviderError::NOT_SIGNED_IN, "No user is signed in.")
        })?;

        let response: UpdateResponse = self
            .post_json(
                "update",
                &UpdateRequest {
                    id_token: &id_token,
                    display_name: update.display_name.as_deref(),
                    photo_url: update.avatar_url.as_deref(),
                    return_secure_token: true,
                },
            )
            .await?;

        let identity = {
            let mut current = self.lock_current();
            let Some(user) = current.as_mut() else {
                return Err(ProviderError::new(
                    ProviderError::NOT_SIGNED_IN,
                    "Signed out during update.",
                ));
            };
            // Echoed fields are authoritative; unchanged ones are kept.
            if response.display_name.is_some() {
                user.identity.display_name = response.display_name;
            }
            if response.photo_url.is_some() {
                user.identity.avatar_url = response.photo_url;
            }
            if let Some(token) = response.id_token {
                user.id_token = token;
            }
            if let Some(token) = response.refresh_token {
                user.refresh_token = token;
            }
            user.identity.clone()
        };

        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }
}

/// Check response status and parse the JSON body or the provider error.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    if response.status().is_success() {
        return response
            .json()
            .await
            .map_err(|e| ProviderError::network(format!("JSON parse error: {}", e)));
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(parse_error_body(status, &body))
}

/// Parse `{"error": {"message": "CODE : detail"}}` into a [`ProviderError`].
pub fn parse_error_body(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| env.error.message)
        .unwrap_or_default();

    // Codes may carry a detail suffix: "WEAK_PASSWORD : Password should be ..."
    let code = message.split(" : ").next().unwrap_or("").trim();

    if code.is_empty() {
        tracing::warn!(status = %status, "Unrecognized identity provider error");
        return ProviderError::new(
            format!("HTTP_{}", status.as_u16()),
            format!("HTTP {}: {}", status, body),
        );
    }

    ProviderError::new(code, describe_error(code))
}

// ─── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Common shape of sign-up / sign-in responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    #[serde(flatten)]
    account: AccountInfo,
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

/// Account fields shared by sign-in and lookup responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

impl AccountInfo {
    fn identity(&self) -> Identity {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        Identity {
            id: self.local_id.clone(),
            email_address: non_empty(&self.email),
            phone_number: non_empty(&self.phone_number),
            display_name: non_empty(&self.display_name),
            avatar_url: non_empty(&self.photo_url),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeResponse {
    session_info: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Secure-token refresh response (snake_case on the wire).
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use portfolio_auth::error::{ProviderError, StoreError};
use portfolio_auth::services::identity_toolkit::{describe_error, parse_error_body};
use portfolio_auth::SessionError;

#[test]
fn test_provider_error_becomes_auth() {
    let err: SessionError = ProviderError::new("EMAIL_EXISTS", describe_error("EMAIL_EXISTS")).into();

    assert_eq!(err.auth_code(), Some("EMAIL_EXISTS"));
    assert_eq!(err.to_string(), "An account with this email already exists.");
    assert!(!err.is_validation());
}

#[test]
fn test_store_error_becomes_storage() {
    let err: SessionError = StoreError::Unavailable("offline".to_string()).into();

    assert!(matches!(err, SessionError::Storage(ref msg) if msg.contains("offline")));
    assert_eq!(err.auth_code(), None);
}

#[test]
fn test_network_error_code() {
    let err = ProviderError::network("connection refused");

    assert_eq!(err.code, ProviderError::NETWORK);
    assert!(err.message.contains("connection refused"));
}

#[test]
fn test_unknown_code_has_generic_message() {
    assert_eq!(describe_error("SOMETHING_NEW"), "Authentication failed.");
}

#[test]
fn test_parse_error_body_plain_code() {
    let body = r#"{"error":{"code":400,"message":"INVALID_CODE"}}"#;
    let err = parse_error_body(reqwest::StatusCode::BAD_REQUEST, body);

    assert_eq!(err.code, "INVALID_CODE");
    assert_eq!(err.message, "Invalid verification code.");
}

#[test]
fn test_session_error_messages() {
    assert_eq!(
        SessionError::NotAuthenticated.to_string(),
        "No user is signed in"
    );
    assert_eq!(
        SessionError::Validation("Email is required".to_string()).to_string(),
        "Invalid input: Email is required"
    );
}

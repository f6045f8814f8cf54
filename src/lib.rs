// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Portfolio-Auth: session and profile core for the portfolio website
//!
//! This crate tracks who is signed in through an external identity
//! provider (Firebase Authentication) and keeps a matching profile
//! document per user in a document store (Cloud Firestore).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod phone;
pub mod provider;
pub mod services;
pub mod session;
pub mod time_utils;

pub use error::{SessionError, Result};
pub use session::{PendingVerification, SessionManager};

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - provider adapters and profile logic.

pub mod identity_toolkit;
pub mod profile;

pub use identity_toolkit::IdentityToolkit;
pub use profile::ProfileSync;

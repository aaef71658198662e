// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for the Tether provisioning server.
//!
//! SQLite-backed repositories for the provisioning tables:
//!
//! - `provisioning_codes` — install codes and their lifecycle state
//! - `provisioning_tokens` — hashed provisioning tokens
//! - `provisioning_attempts` — the append-only claim attempt ledger
//! - `devices` — the inventory mirror rows the reconciler operates on
//!
//! Each repository pairs a `*Store` trait (so handlers can be tested against
//! mocks) with a concrete `*Repository` over a [`sqlx::SqlitePool`]. All
//! timestamps are stored as fixed-width RFC 3339 TEXT so string ordering in
//! SQL matches chronological ordering.

pub mod attempt;
pub mod code;
pub mod device;
pub mod error;
pub mod pool;
pub mod schema;
pub mod testing;
pub mod token;

pub(crate) mod ts;

pub use attempt::{AttemptRepository, AttemptStore};
pub use code::{CodeRepository, CodeStore};
pub use device::{DeviceRepository, DeviceStore};
pub use error::DbError;
pub use pool::create_pool;
pub use schema::ensure_schema;
pub use token::{TokenRepository, TokenStore};

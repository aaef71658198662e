// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core domain types for the Tether device provisioning protocol.
//!
//! The provisioning flow turns a short, human-typeable install code into a
//! durable device identity:
//!
//! ```text
//! ┌──────────┐                      ┌─────────┐                 ┌──────────┐
//! │ Operator │                      │ Server  │                 │  Device  │
//! └────┬─────┘                      └────┬────┘                 └────┬─────┘
//!      │  POST /api/provisioning/codes  │                           │
//!      │───────────────────────────────>│                           │
//!      │  {code: "4821", expires_at}    │                           │
//!      │<───────────────────────────────│                           │
//!      │                                │                           │
//!      │  Operator types "4821" into the device (out of band)       │
//!      │─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┼ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ >│
//!      │                                │                           │
//!      │                                │  POST /claim {code}       │
//!      │                                │<──────────────────────────│
//!      │                                │  {token: "tpt_...", 900s} │
//!      │                                │──────────────────────────>│
//!      │                                │                           │
//!      │                                │  POST /register (bearer)  │
//!      │                                │<──────────────────────────│
//!      │                                │  POST /identity           │
//!      │                                │<──────────────────────────│
//!      │                                │  POST /revoke (bearer)    │
//!      │                                │<──────────────────────────│
//! ```
//!
//! # Two Secrets: Why?
//!
//! - **Install code** (4 digits): low entropy, short-lived, entered by a
//!   human. Guessing is defended by rate limiting and per-code lockout, not
//!   by entropy.
//! - **Provisioning token** (`tpt_` + 256 bits): high entropy, exchanged for
//!   the install code at claim time. All subsequent device-facing calls
//!   authenticate with it. Only its SHA-256 digest is ever persisted.
//!
//! This crate holds the entity types, status state machines, the secret
//! codec, and the injected [`Clock`] abstraction. It has no I/O; persistence
//! lives in `tether-server-db` and the handlers in
//! `tether-server-provisioning`.

pub mod clock;
pub mod codec;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{
	generate_install_code, generate_provisioning_token, hash_secret, is_valid_final_identity,
	normalize_install_code, TOKEN_PREFIX,
};
pub use types::{
	AttemptRecord, CodeId, CodeStatus, DeviceRecord, DeviceState, OperatorId, ProvisioningCode,
	ProvisioningToken, TokenId, TokenStatus,
};

/// Install code time-to-live in minutes.
///
/// A code that has not been claimed within this window can never be claimed;
/// expiry is evaluated lazily at each access rather than by a sweeper.
pub const CODE_TTL_MINUTES: i64 = 15;

/// Provisioning token time-to-live in seconds, fixed from the claim instant.
pub const TOKEN_TTL_SECONDS: i64 = 900;

/// Maximum candidate draws before issuance gives up with capacity exceeded.
///
/// With 10,000 possible code values the probability of 20 consecutive
/// collisions is negligible unless the live-code space is nearly saturated,
/// in which case failing loudly is the correct behavior.
pub const ISSUE_MAX_DRAWS: u32 = 20;

/// Width of the per-origin rate limit window in seconds.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Claim attempts allowed per origin inside [`RATE_LIMIT_WINDOW_SECS`].
///
/// The attempt that would exceed this cap is rejected, so the 21st request
/// from one origin inside a minute fails.
pub const RATE_LIMIT_MAX_ATTEMPTS: i64 = 20;

/// Width of the per-code failure lockout window in minutes.
pub const LOCKOUT_WINDOW_MINUTES: i64 = 15;

/// Failed claims for one code from one origin that trigger a lockout.
pub const LOCKOUT_MAX_FAILURES: i64 = 5;

/// How long a locked code stays locked, in minutes.
pub const LOCK_DURATION_MINUTES: i64 = 15;

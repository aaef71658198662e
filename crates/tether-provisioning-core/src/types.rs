// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity and identifier types for the provisioning protocol.
//!
//! This module defines:
//!
//! - **ID newtypes**: Type-safe wrappers around UUIDs ([`CodeId`],
//!   [`TokenId`]) and the registry-facing [`OperatorId`] account name,
//!   preventing accidental mixing
//! - **Status enums**: the [`CodeStatus`] and [`TokenStatus`] state machines
//! - **Entities**: [`ProvisioningCode`], [`ProvisioningToken`],
//!   [`AttemptRecord`], and the [`DeviceRecord`] mirror row
//!
//! All ID types implement transparent serde serialization and conversion
//! to/from their inner representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			/// Get the inner UUID value.
			pub fn into_inner(self) -> Uuid {
				self.0
			}

			/// Get a reference to the inner UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(CodeId, "Unique identifier for an install code row.");
define_id_type!(TokenId, "Unique identifier for a provisioning token row.");

/// Identity of the operator who minted an install code.
///
/// Operators are accounts in the external device registry, keyed by name
/// rather than UUID. A configured sentinel name (conventionally `system`)
/// must never mint codes; that rule is enforced by the issuer, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(String);

impl OperatorId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_inner(self) -> String {
		self.0
	}
}

impl fmt::Display for OperatorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<String> for OperatorId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl From<&str> for OperatorId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

// =============================================================================
// Status enums
// =============================================================================

/// Lifecycle status of an install code.
///
/// Transitions:
/// - `Unused` → `Claimed` on the first valid claim
/// - `Unused`/`Claimed` → `Expired` lazily once `expires_at` has passed
/// - `Unused`/`Claimed` → `Locked` after repeated failed claims
/// - any → `Consumed` when the owning token is revoked
///
/// `Expired`, `Consumed`, and `Locked` never transition back; they are
/// evaluated and written lazily on access rather than by a sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
	/// Minted, never successfully claimed.
	Unused,
	/// At least one claim succeeded; the code stays claimable until expiry.
	Claimed,
	/// TTL elapsed before the code was consumed.
	Expired,
	/// Terminated by revocation of its token.
	Consumed,
	/// Suspended after repeated failed claims.
	Locked,
}

impl CodeStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			CodeStatus::Unused => "unused",
			CodeStatus::Claimed => "claimed",
			CodeStatus::Expired => "expired",
			CodeStatus::Consumed => "consumed",
			CodeStatus::Locked => "locked",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"unused" => Some(CodeStatus::Unused),
			"claimed" => Some(CodeStatus::Claimed),
			"expired" => Some(CodeStatus::Expired),
			"consumed" => Some(CodeStatus::Consumed),
			"locked" => Some(CodeStatus::Locked),
			_ => None,
		}
	}

	/// Whether a code in this status can still be claimed (expiry aside).
	pub fn is_claimable(&self) -> bool {
		matches!(self, CodeStatus::Unused | CodeStatus::Claimed)
	}
}

impl fmt::Display for CodeStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Lifecycle status of a provisioning token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
	/// Usable while unexpired and the owning code is not terminated.
	Active,
	/// Explicitly terminated; `expires_at` is collapsed to the revoke instant.
	Revoked,
}

impl TokenStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			TokenStatus::Active => "active",
			TokenStatus::Revoked => "revoked",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"active" => Some(TokenStatus::Active),
			"revoked" => Some(TokenStatus::Revoked),
			_ => None,
		}
	}
}

impl fmt::Display for TokenStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Provisioning stage of a device mirror row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
	/// Registered with a fingerprint, awaiting its final identity.
	Provisioning,
	/// Final numeric identity confirmed.
	Ready,
}

impl DeviceState {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeviceState::Provisioning => "provisioning",
			DeviceState::Ready => "ready",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"provisioning" => Some(DeviceState::Provisioning),
			"ready" => Some(DeviceState::Ready),
			_ => None,
		}
	}
}

impl fmt::Display for DeviceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

// =============================================================================
// Entities
// =============================================================================

/// A short-lived install code bound to the operator who minted it.
///
/// Code values are 4 digits and are *not* unique across history; at most one
/// row per value may be live (claimable and unexpired) at any instant, which
/// the issuer enforces by searching before inserting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningCode {
	pub id: CodeId,
	/// 4-digit zero-padded value the operator reads to the device.
	pub code: String,
	pub issued_by: OperatorId,
	pub status: CodeStatus,
	pub expires_at: DateTime<Utc>,
	/// Set when the code transitions to `Locked`.
	pub locked_until: Option<DateTime<Utc>>,
	pub last_attempt_at: Option<DateTime<Utc>>,
	pub last_attempt_origin: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ProvisioningCode {
	/// Whether the TTL has elapsed at `now`.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now >= self.expires_at
	}

	/// Whether this row is live: claimable status and unexpired.
	pub fn is_live(&self, now: DateTime<Utc>) -> bool {
		self.status.is_claimable() && !self.is_expired(now)
	}
}

/// An opaque provisioning token exchanged for an install code at claim time.
///
/// Only the SHA-256 digest of the token is stored. A token is valid while it
/// is `Active` and unexpired *and* its owning code has not been expired,
/// consumed, or locked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningToken {
	pub id: TokenId,
	pub code_id: CodeId,
	pub token_hash: String,
	pub status: TokenStatus,
	/// Free-form device self-description supplied at claim time.
	pub device_hint: Option<String>,
	/// Digest of the claim nonce, if the device sent one.
	pub nonce_hash: Option<String>,
	pub expires_at: DateTime<Utc>,
	/// Fingerprint of the device that registered with this token.
	pub used_by_device_id: Option<String>,
	pub last_seen_at: Option<DateTime<Utc>>,
	pub origin_ip: Option<String>,
	pub created_at: DateTime<Utc>,
}

impl ProvisioningToken {
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now >= self.expires_at
	}

	/// Whether the token itself is usable at `now` (owning code aside).
	pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
		self.status == TokenStatus::Active && !self.is_expired(now)
	}
}

/// One row of the append-only claim attempt ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
	/// The code value as submitted (after normalization).
	pub code: String,
	pub origin_ip: String,
	pub success: bool,
	pub attempted_at: DateTime<Utc>,
}

/// A device row in the inventory mirror.
///
/// `device_id` starts as the opaque fingerprint reported at registration and
/// is later overwritten with the device's final numeric network identity by
/// the reconciler. Retired rows are soft-deleted, never removed; uniqueness
/// of the numeric identity among active rows is enforced by the reconciler,
/// not by a database constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
	/// Surrogate row id (UUID string); stable across identity rewrites.
	pub id: String,
	/// Fingerprint at first, final numeric identity once reconciled.
	pub device_id: String,
	/// Registry-facing username of the owning operator.
	pub owner_username: String,
	pub device_hint: Option<String>,
	#[serde(rename = "provisioning_status")]
	pub state: DeviceState,
	pub last_seen_at: Option<DateTime<Utc>>,
	pub deleted_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl DeviceRecord {
	pub fn is_deleted(&self) -> bool {
		self.deleted_at.is_some()
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tether_server_db::DbError;
use tether_server_registry::RegistryError;

/// Errors that can occur during device provisioning.
///
/// Every variant has a stable wire identifier ([`ProvisioningError::kind`])
/// that the HTTP layer places in the structured error body. `InvalidCode` is
/// deliberately returned for both unknown and race-lost codes so responses
/// cannot be used to enumerate the live code space.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
	#[error("invalid or unknown install code")]
	InvalidCode,

	#[error("install code has expired")]
	ExpiredCode,

	#[error("install code is locked")]
	CodeLocked,

	#[error("too many attempts from this origin")]
	RateLimited,

	#[error("operator not found: {0}")]
	OperatorNotFound(String),

	#[error("no registry user for code owner: {0}")]
	UserNotFound(String),

	#[error("live code space is saturated")]
	CapacityExceeded,

	#[error("invalid or expired provisioning token")]
	InvalidToken,

	#[error("no registry user for device owner: {0}")]
	DeviceOwnerNotFound(String),

	#[error("device not found: {0}")]
	DeviceNotFound(String),

	#[error("final identity must be 6-12 digits")]
	InvalidIdentityFormat,

	#[error("registry error: {0}")]
	Registry(#[from] RegistryError),

	#[error("database error: {0}")]
	Database(#[from] DbError),
}

impl ProvisioningError {
	/// Stable machine-readable identifier for the wire format.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::InvalidCode => "invalid_code",
			Self::ExpiredCode => "expired_code",
			Self::CodeLocked => "code_locked",
			Self::RateLimited => "rate_limited",
			Self::OperatorNotFound(_) => "operator_not_found",
			Self::UserNotFound(_) => "user_not_found",
			Self::CapacityExceeded => "capacity_exceeded",
			Self::InvalidToken => "invalid_token",
			Self::DeviceOwnerNotFound(_) => "device_owner_not_found",
			Self::DeviceNotFound(_) => "device_not_found",
			Self::InvalidIdentityFormat => "invalid_identity_format",
			Self::Registry(_) => "registry_error",
			Self::Database(_) => "storage_error",
		}
	}
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;

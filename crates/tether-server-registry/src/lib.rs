// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Typed client for the external device registry.
//!
//! The registry is the downstream system of record for operator accounts
//! and device metadata. The provisioning server consumes it through the
//! [`DeviceRegistry`] trait: operator resolution during claim and issuance,
//! and the delegated device upsert during registration. Everything else
//! about the registry (inventory sync, dashboards) is out of scope here.

pub mod client;
pub mod error;
pub mod testing;
pub mod types;

pub use client::HttpDeviceRegistry;
pub use error::RegistryError;
pub use types::{OperatorProfile, RegistryDevice};

use async_trait::async_trait;
use tether_provisioning_core::OperatorId;

/// Seam to the external device registry.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
	/// Resolve an operator identity to its registry profile.
	///
	/// Returns `Ok(None)` when the registry has no account for the operator;
	/// callers map that to their own not-found error.
	async fn lookup_operator(
		&self,
		operator: &OperatorId,
	) -> Result<Option<OperatorProfile>, RegistryError>;

	/// Create or update a device record under the given registry username.
	///
	/// The upsert is opaque to the caller; the registry decides whether the
	/// fingerprint is new. On success the device is left awaiting adoption.
	async fn upsert_device(
		&self,
		owner_username: &str,
		device_id: &str,
		device_hint: Option<&str>,
	) -> Result<RegistryDevice, RegistryError>;
}

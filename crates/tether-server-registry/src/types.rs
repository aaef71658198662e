// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// Registry-side profile of a provisioning operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorProfile {
	/// Registry user id handed back to the claiming device.
	pub user_id: String,
	/// Tenant the operator belongs to.
	pub tenant_id: String,
	/// Human-readable account label shown on the device.
	pub account_label: String,
	/// Username devices are registered under.
	pub registry_username: String,
}

/// Registry view of a device after the delegated upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDevice {
	pub device_id: String,
	/// Adoption state reported by the registry, e.g. `pending_adoption`.
	pub state: String,
}

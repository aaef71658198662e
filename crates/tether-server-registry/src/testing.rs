// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory registry double for handler tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tether_provisioning_core::OperatorId;

use crate::error::RegistryError;
use crate::types::{OperatorProfile, RegistryDevice};
use crate::DeviceRegistry;

/// Registry backed by a static operator map.
///
/// Upserts always succeed with `pending_adoption` and are recorded for
/// assertions. Set `fail_upserts` to exercise downstream-failure paths.
pub struct StaticRegistry {
	operators: HashMap<String, OperatorProfile>,
	pub upserts: Mutex<Vec<(String, String)>>,
	pub fail_upserts: bool,
}

impl StaticRegistry {
	pub fn new() -> Self {
		Self {
			operators: HashMap::new(),
			upserts: Mutex::new(Vec::new()),
			fail_upserts: false,
		}
	}

	/// Register an operator whose registry fields are derived from the name.
	pub fn with_operator(mut self, name: &str) -> Self {
		self.operators.insert(
			name.to_string(),
			OperatorProfile {
				user_id: format!("user-{name}"),
				tenant_id: format!("tenant-{name}"),
				account_label: format!("{name}'s account"),
				registry_username: name.to_string(),
			},
		);
		self
	}
}

impl Default for StaticRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
	async fn lookup_operator(
		&self,
		operator: &OperatorId,
	) -> Result<Option<OperatorProfile>, RegistryError> {
		Ok(self.operators.get(operator.as_str()).cloned())
	}

	async fn upsert_device(
		&self,
		owner_username: &str,
		device_id: &str,
		_device_hint: Option<&str>,
	) -> Result<RegistryDevice, RegistryError> {
		if self.fail_upserts {
			return Err(RegistryError::Api {
				status: 503,
				message: "registry unavailable".to_string(),
			});
		}

		self.upserts
			.lock()
			.expect("upsert log poisoned")
			.push((owner_username.to_string(), device_id.to_string()));

		Ok(RegistryDevice {
			device_id: device_id.to_string(),
			state: "pending_adoption".to_string(),
		})
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioning policy configuration.

use serde::Deserialize;

/// Provisioning configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
	/// Operator identities that must never mint install codes.
	pub reserved_operators: Vec<String>,
}

impl Default for ProvisioningConfig {
	fn default() -> Self {
		Self {
			reserved_operators: vec!["system".to_string()],
		}
	}
}

/// Provisioning configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisioningConfigLayer {
	#[serde(default)]
	pub reserved_operators: Option<Vec<String>>,
}

impl ProvisioningConfigLayer {
	pub fn merge(&mut self, other: ProvisioningConfigLayer) {
		if other.reserved_operators.is_some() {
			self.reserved_operators = other.reserved_operators;
		}
	}

	pub fn finalize(self) -> ProvisioningConfig {
		ProvisioningConfig {
			reserved_operators: self
				.reserved_operators
				.unwrap_or_else(|| vec!["system".to_string()]),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_reserves_system() {
		let config = ProvisioningConfigLayer::default().finalize();
		assert_eq!(config.reserved_operators, vec!["system".to_string()]);
	}

	#[test]
	fn test_override_replaces_list() {
		let layer = ProvisioningConfigLayer {
			reserved_operators: Some(vec!["system".to_string(), "root".to_string()]),
		};
		let config = layer.finalize();
		assert_eq!(config.reserved_operators.len(), 2);
	}
}

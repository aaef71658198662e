// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device registry client configuration.

use serde::Deserialize;

/// Registry configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
	/// Base URL of the external device registry.
	pub base_url: String,
	/// Service token for registry API calls.
	pub service_token: Option<String>,
	/// Request timeout in seconds for delegated calls.
	pub timeout_secs: u64,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:9090".to_string(),
			service_token: None,
			timeout_secs: 30,
		}
	}
}

/// Registry configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfigLayer {
	#[serde(default)]
	pub base_url: Option<String>,
	#[serde(default)]
	pub service_token: Option<String>,
	#[serde(default)]
	pub timeout_secs: Option<u64>,
}

impl RegistryConfigLayer {
	pub fn merge(&mut self, other: RegistryConfigLayer) {
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.service_token.is_some() {
			self.service_token = other.service_token;
		}
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
	}

	pub fn finalize(self) -> RegistryConfig {
		let defaults = RegistryConfig::default();
		RegistryConfig {
			base_url: self.base_url.unwrap_or(defaults.base_url),
			service_token: self.service_token,
			timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_timeout() {
		let config = RegistryConfigLayer::default().finalize();
		assert_eq!(config.timeout_secs, 30);
		assert!(config.service_token.is_none());
	}
}

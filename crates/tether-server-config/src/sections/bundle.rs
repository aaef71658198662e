// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config bundle contents served to devices after registration.

use serde::Deserialize;

/// Bundle configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct BundleConfig {
	pub bundle_version: String,
	pub gateway_host: String,
	pub gateway_port: u16,
	pub heartbeat_interval_secs: u64,
	pub tls: bool,
}

impl Default for BundleConfig {
	fn default() -> Self {
		Self {
			bundle_version: "1".to_string(),
			gateway_host: "localhost".to_string(),
			gateway_port: 8883,
			heartbeat_interval_secs: 30,
			tls: true,
		}
	}
}

/// Bundle configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleConfigLayer {
	#[serde(default)]
	pub bundle_version: Option<String>,
	#[serde(default)]
	pub gateway_host: Option<String>,
	#[serde(default)]
	pub gateway_port: Option<u16>,
	#[serde(default)]
	pub heartbeat_interval_secs: Option<u64>,
	#[serde(default)]
	pub tls: Option<bool>,
}

impl BundleConfigLayer {
	pub fn merge(&mut self, other: BundleConfigLayer) {
		if other.bundle_version.is_some() {
			self.bundle_version = other.bundle_version;
		}
		if other.gateway_host.is_some() {
			self.gateway_host = other.gateway_host;
		}
		if other.gateway_port.is_some() {
			self.gateway_port = other.gateway_port;
		}
		if other.heartbeat_interval_secs.is_some() {
			self.heartbeat_interval_secs = other.heartbeat_interval_secs;
		}
		if other.tls.is_some() {
			self.tls = other.tls;
		}
	}

	pub fn finalize(self) -> BundleConfig {
		let defaults = BundleConfig::default();
		BundleConfig {
			bundle_version: self.bundle_version.unwrap_or(defaults.bundle_version),
			gateway_host: self.gateway_host.unwrap_or(defaults.gateway_host),
			gateway_port: self.gateway_port.unwrap_or(defaults.gateway_port),
			heartbeat_interval_secs: self
				.heartbeat_interval_secs
				.unwrap_or(defaults.heartbeat_interval_secs),
			tls: self.tls.unwrap_or(defaults.tls),
		}
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration bundle handed to a device after registration.
//!
//! The bundle tells a freshly-registered device how to reach the gateway. It
//! carries a SHA-256 digest over its canonical JSON form so the device can
//! detect tampering in transit without the server holding signing keys.

use serde::{Deserialize, Serialize};
use tether_provisioning_core::codec::hash_secret;

/// Gateway connection parameters, as served to devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
	pub gateway_host: String,
	pub gateway_port: u16,
	pub heartbeat_interval_secs: u64,
	pub tls: bool,
}

/// Static inputs for bundle assembly, taken from server configuration.
#[derive(Debug, Clone)]
pub struct BundleSettings {
	pub bundle_version: String,
	pub connection: ConnectionSettings,
}

/// The bundle as returned to devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigBundle {
	pub bundle_version: String,
	pub connection_settings: ConnectionSettings,
	/// SHA-256 hex over the canonical JSON of version + settings.
	pub bundle_hash: String,
}

impl ConfigBundle {
	/// Assemble a bundle from settings, computing the tamper hash.
	///
	/// The hash covers `{bundle_version, connection_settings}` serialized
	/// with serde_json's deterministic field ordering, so two servers with
	/// identical configuration produce byte-identical hashes.
	pub fn assemble(settings: &BundleSettings) -> Result<Self, serde_json::Error> {
		#[derive(Serialize)]
		struct Canonical<'a> {
			bundle_version: &'a str,
			connection_settings: &'a ConnectionSettings,
		}

		let canonical = serde_json::to_string(&Canonical {
			bundle_version: &settings.bundle_version,
			connection_settings: &settings.connection,
		})?;

		Ok(Self {
			bundle_version: settings.bundle_version.clone(),
			connection_settings: settings.connection.clone(),
			bundle_hash: hash_secret(&canonical),
		})
	}
}

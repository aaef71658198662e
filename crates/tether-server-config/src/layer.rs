// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The mergeable configuration layer.

use serde::Deserialize;

use crate::sections::{
	BundleConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer,
	ProvisioningConfigLayer, RegistryConfigLayer,
};

/// One source's partial view of the configuration.
///
/// Sources are merged lowest-precedence first; a later layer's `Some` fields
/// override the accumulated values section by section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub provisioning: Option<ProvisioningConfigLayer>,
	#[serde(default)]
	pub registry: Option<RegistryConfigLayer>,
	#[serde(default)]
	pub bundle: Option<BundleConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(
			&mut self.provisioning,
			other.provisioning,
			ProvisioningConfigLayer::merge,
		);
		merge_section(&mut self.registry, other.registry, RegistryConfigLayer::merge);
		merge_section(&mut self.bundle, other.bundle, BundleConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(target: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	match (target.as_mut(), other) {
		(Some(t), Some(o)) => merge(t, o),
		(None, Some(o)) => *target = Some(o),
		_ => {}
	}
}

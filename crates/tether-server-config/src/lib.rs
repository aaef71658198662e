// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Tether server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`TETHER_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use tether_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub provisioning: ProvisioningConfig,
	pub registry: RegistryConfig,
	pub bundle: BundleConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TETHER_SERVER_*`)
/// 2. Config file (`/etc/tether/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let provisioning = layer.provisioning.unwrap_or_default().finalize();
	let registry = layer.registry.unwrap_or_default().finalize();
	let bundle = layer.bundle.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&bundle)?;

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		registry = %registry.base_url,
		reserved_operators = provisioning.reserved_operators.len(),
		bundle_version = %bundle.bundle_version,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		database,
		provisioning,
		registry,
		bundle,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(bundle: &BundleConfig) -> Result<(), ConfigError> {
	if bundle.gateway_port == 0 {
		return Err(ConfigError::Validation(
			"TETHER_SERVER_BUNDLE_GATEWAY_PORT must be non-zero".to_string(),
		));
	}
	if bundle.heartbeat_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"TETHER_SERVER_BUNDLE_HEARTBEAT_INTERVAL_SECS must be non-zero".to_string(),
		));
	}

	Ok(())
}

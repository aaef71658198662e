// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML file, environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	BundleConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer,
	ProvisioningConfigLayer, RegistryConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tether/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TETHER_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()),
			provisioning: Some(load_provisioning_from_env()),
			registry: Some(load_registry_from_env()?),
			bundle: Some(load_bundle_from_env()?),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|v| {
		v.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("TETHER_SERVER_HOST"),
		port: env_u16("TETHER_SERVER_PORT")?,
		base_url: env_var("TETHER_SERVER_BASE_URL"),
	})
}

fn load_database_from_env() -> DatabaseConfigLayer {
	DatabaseConfigLayer {
		url: env_var("TETHER_SERVER_DATABASE_URL"),
	}
}

fn load_provisioning_from_env() -> ProvisioningConfigLayer {
	ProvisioningConfigLayer {
		reserved_operators: env_list("TETHER_SERVER_PROVISIONING_RESERVED_OPERATORS"),
	}
}

fn load_registry_from_env() -> Result<RegistryConfigLayer, ConfigError> {
	Ok(RegistryConfigLayer {
		base_url: env_var("TETHER_SERVER_REGISTRY_BASE_URL"),
		service_token: env_var("TETHER_SERVER_REGISTRY_SERVICE_TOKEN"),
		timeout_secs: env_u64("TETHER_SERVER_REGISTRY_TIMEOUT_SECS")?,
	})
}

fn load_bundle_from_env() -> Result<BundleConfigLayer, ConfigError> {
	Ok(BundleConfigLayer {
		bundle_version: env_var("TETHER_SERVER_BUNDLE_VERSION"),
		gateway_host: env_var("TETHER_SERVER_BUNDLE_GATEWAY_HOST"),
		gateway_port: env_u16("TETHER_SERVER_BUNDLE_GATEWAY_PORT")?,
		heartbeat_interval_secs: env_u64("TETHER_SERVER_BUNDLE_HEARTBEAT_INTERVAL_SECS")?,
		tls: env_bool("TETHER_SERVER_BUNDLE_TLS"),
	})
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("TETHER_SERVER_LOG_LEVEL"),
		json: env_bool("TETHER_SERVER_LOG_JSON"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_missing_toml_file_is_empty_layer() {
		let layer = TomlSource::new("/nonexistent/tether.toml").load().unwrap();
		assert!(layer.http.is_none());
	}

	#[test]
	fn test_toml_parse() {
		let dir = std::env::temp_dir().join("tether-config-test");
		std::fs::create_dir_all(&dir).unwrap();
		let path = dir.join("server.toml");
		std::fs::write(
			&path,
			r#"
			[http]
			port = 9000

			[provisioning]
			reserved_operators = ["system", "root"]
			"#,
		)
		.unwrap();

		let layer = TomlSource::new(&path).load().unwrap();
		assert_eq!(layer.http.unwrap().port, Some(9000));
		assert_eq!(
			layer.provisioning.unwrap().reserved_operators.unwrap(),
			vec!["system".to_string(), "root".to_string()]
		);
	}

	#[test]
	fn test_env_list_parsing() {
		std::env::set_var("TETHER_SERVER_PROVISIONING_RESERVED_OPERATORS", "a, b ,c");
		let layer = load_provisioning_from_env();
		assert_eq!(
			layer.reserved_operators.unwrap(),
			vec!["a".to_string(), "b".to_string(), "c".to_string()]
		);
		std::env::remove_var("TETHER_SERVER_PROVISIONING_RESERVED_OPERATORS");
	}
}

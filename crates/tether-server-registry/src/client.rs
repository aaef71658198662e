// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP implementation of the registry seam.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tether_provisioning_core::OperatorId;
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::types::{OperatorProfile, RegistryDevice};
use crate::DeviceRegistry;

/// Default timeout for delegated registry calls.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Device registry client over HTTP+JSON.
///
/// All calls carry a bounded timeout; the provisioning handlers never retry
/// internally (the device retries the whole operation).
#[derive(Clone)]
pub struct HttpDeviceRegistry {
	client: Client,
	base_url: String,
	service_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpsertDeviceRequest<'a> {
	owner: &'a str,
	device_id: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	device_hint: Option<&'a str>,
}

impl HttpDeviceRegistry {
	/// Create a client against the given registry base URL.
	///
	/// # Arguments
	/// * `base_url` - e.g. `https://registry.internal.example`
	/// * `service_token` - bearer credential for server-to-server calls
	pub fn new(
		base_url: impl Into<String>,
		service_token: Option<String>,
	) -> Result<Self, RegistryError> {
		Self::with_timeout(base_url, service_token, DEFAULT_REQUEST_TIMEOUT)
	}

	pub fn with_timeout(
		base_url: impl Into<String>,
		service_token: Option<String>,
		timeout: Duration,
	) -> Result<Self, RegistryError> {
		let client = Client::builder().timeout(timeout).build()?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			service_token,
		})
	}

	fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match &self.service_token {
			Some(token) => builder.bearer_auth(token),
			None => builder,
		}
	}
}

#[async_trait]
impl DeviceRegistry for HttpDeviceRegistry {
	#[tracing::instrument(skip(self), fields(operator = %operator))]
	async fn lookup_operator(
		&self,
		operator: &OperatorId,
	) -> Result<Option<OperatorProfile>, RegistryError> {
		let url = format!("{}/api/v1/operators/{}", self.base_url, operator);
		let response = self.request(self.client.get(&url)).send().await?;

		match response.status() {
			StatusCode::NOT_FOUND => {
				debug!(operator = %operator, "operator not present in registry");
				Ok(None)
			}
			status if status.is_success() => {
				let profile = response
					.json::<OperatorProfile>()
					.await
					.map_err(|e| RegistryError::Decode(e.to_string()))?;
				Ok(Some(profile))
			}
			status => {
				let message = response.text().await.unwrap_or_default();
				warn!(%status, "operator lookup failed");
				Err(RegistryError::Api {
					status: status.as_u16(),
					message,
				})
			}
		}
	}

	#[tracing::instrument(skip(self, device_hint), fields(owner = %owner_username, device_id = %device_id))]
	async fn upsert_device(
		&self,
		owner_username: &str,
		device_id: &str,
		device_hint: Option<&str>,
	) -> Result<RegistryDevice, RegistryError> {
		let url = format!("{}/api/v1/devices", self.base_url);
		let body = UpsertDeviceRequest {
			owner: owner_username,
			device_id,
			device_hint,
		};

		let response = self
			.request(self.client.post(&url).json(&body))
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			warn!(%status, "device upsert rejected by registry");
			return Err(RegistryError::Api {
				status: status.as_u16(),
				message,
			});
		}

		let device = response
			.json::<RegistryDevice>()
			.await
			.map_err(|e| RegistryError::Decode(e.to_string()))?;
		debug!(device_id = %device.device_id, state = %device.state, "device upserted");
		Ok(device)
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tether_server_provisioning::ProvisioningError;

/// Structured error body returned on every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Stable machine-readable error identifier.
	pub error: String,
	/// Human-readable description.
	pub message: String,
}

/// Wrapper so provisioning errors convert into HTTP responses with `?`.
#[derive(Debug)]
pub struct ServerError(pub ProvisioningError);

impl From<ProvisioningError> for ServerError {
	fn from(err: ProvisioningError) -> Self {
		Self(err)
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let status = match &self.0 {
			ProvisioningError::InvalidCode
			| ProvisioningError::ExpiredCode
			| ProvisioningError::InvalidIdentityFormat => StatusCode::BAD_REQUEST,
			ProvisioningError::InvalidToken => StatusCode::UNAUTHORIZED,
			ProvisioningError::OperatorNotFound(_)
			| ProvisioningError::UserNotFound(_)
			| ProvisioningError::DeviceOwnerNotFound(_)
			| ProvisioningError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
			ProvisioningError::CodeLocked => StatusCode::LOCKED,
			ProvisioningError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
			ProvisioningError::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
			ProvisioningError::Registry(_) | ProvisioningError::Database(_) => {
				StatusCode::BAD_GATEWAY
			}
		};

		if status.is_server_error() {
			tracing::error!(error = %self.0, kind = self.0.kind(), "request failed");
		} else {
			tracing::debug!(error = %self.0, kind = self.0.kind(), "request rejected");
		}

		let body = ErrorResponse {
			error: self.0.kind().to_string(),
			message: self.0.to_string(),
		};
		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use tether_server_db::DbError;
	use tether_server_registry::RegistryError;

	#[test]
	fn status_mapping() {
		let cases = [
			(ProvisioningError::InvalidCode, StatusCode::BAD_REQUEST),
			(ProvisioningError::ExpiredCode, StatusCode::BAD_REQUEST),
			(
				ProvisioningError::InvalidIdentityFormat,
				StatusCode::BAD_REQUEST,
			),
			(ProvisioningError::InvalidToken, StatusCode::UNAUTHORIZED),
			(
				ProvisioningError::OperatorNotFound("alice".into()),
				StatusCode::NOT_FOUND,
			),
			(
				ProvisioningError::UserNotFound("alice".into()),
				StatusCode::NOT_FOUND,
			),
			(
				ProvisioningError::DeviceOwnerNotFound("alice".into()),
				StatusCode::NOT_FOUND,
			),
			(
				ProvisioningError::DeviceNotFound("fp".into()),
				StatusCode::NOT_FOUND,
			),
			(ProvisioningError::CodeLocked, StatusCode::LOCKED),
			(ProvisioningError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
			(
				ProvisioningError::CapacityExceeded,
				StatusCode::SERVICE_UNAVAILABLE,
			),
			(
				ProvisioningError::Registry(RegistryError::Api {
					status: 503,
					message: "registry unavailable".into(),
				}),
				StatusCode::BAD_GATEWAY,
			),
			(
				ProvisioningError::Database(DbError::Internal("pool exhausted".into())),
				StatusCode::BAD_GATEWAY,
			),
		];
		for (err, expected) in cases {
			let response = ServerError(err).into_response();
			assert_eq!(response.status(), expected);
		}
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioning HTTP handlers.
//!
//! Thin shells over [`ProvisioningService`]: extract the request origin and
//! bearer credential, delegate, and let [`ServerError`] map domain errors to
//! status codes and structured bodies.

use axum::extract::{FromRequestParts, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use tether_provisioning_core::OperatorId;
use tether_server_provisioning::{
	ClaimRequest, ClaimedToken, ConfigBundle, IssuedCode, ProvisioningError, RegisteredDevice,
};

use crate::api::AppState;
use crate::error::ServerError;

/// Request origin, as used by the rate limiter and the attempt ledger.
///
/// Prefers the first `X-Forwarded-For` entry (the server is expected to sit
/// behind a proxy), falling back to the socket peer address.
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
	S: Send + Sync,
{
	type Rejection = Infallible;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let forwarded = parts
			.headers
			.get("x-forwarded-for")
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.split(',').next())
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty());

		let ip = forwarded
			.or_else(|| {
				parts
					.extensions
					.get::<axum::extract::ConnectInfo<SocketAddr>>()
					.map(|ci| ci.0.ip().to_string())
			})
			.unwrap_or_else(|| "unknown".to_string());

		Ok(ClientIp(ip))
	}
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(str::trim)
		.filter(|t| !t.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct IssueCodeRequest {
	pub operator_id: String,
}

/// POST /api/provisioning/codes - issue a fresh install code.
pub async fn issue_code(
	State(state): State<AppState>,
	Json(body): Json<IssueCodeRequest>,
) -> Result<Json<IssuedCode>, ServerError> {
	let issued = state
		.service
		.issue_code(&OperatorId::new(body.operator_id))
		.await?;
	Ok(Json(issued))
}

/// POST /api/provisioning/claim - exchange a code for a provisioning token.
pub async fn claim_code(
	State(state): State<AppState>,
	ClientIp(origin): ClientIp,
	Json(body): Json<ClaimRequest>,
) -> Result<Json<ClaimedToken>, ServerError> {
	let claimed = state.service.claim_code(body, &origin).await?;
	Ok(Json(claimed))
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
	pub device_id: String,
}

/// POST /api/provisioning/register - register a device against a token.
///
/// The provisioning token travels as a bearer credential.
pub async fn register_device(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(body): Json<RegisterDeviceRequest>,
) -> Result<Json<RegisteredDevice>, ServerError> {
	let token = bearer_token(&headers).ok_or(ServerError(ProvisioningError::InvalidToken))?;
	let registered = state.service.register_device(token, &body.device_id).await?;
	Ok(Json(registered))
}

#[derive(Debug, Deserialize)]
pub struct ReportIdentityRequest {
	pub fingerprint: String,
	pub final_numeric_id: String,
}

/// POST /api/provisioning/identity - reconcile the confirmed identity.
pub async fn report_identity(
	State(state): State<AppState>,
	Json(body): Json<ReportIdentityRequest>,
) -> Result<Json<Value>, ServerError> {
	state
		.service
		.report_final_identity(&body.fingerprint, &body.final_numeric_id)
		.await?;
	Ok(Json(json!({ "success": true })))
}

/// POST /api/provisioning/revoke - revoke a provisioning token.
///
/// Always answers `{success: true}`; a missing or unknown token is treated
/// as already revoked.
pub async fn revoke_token(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
	if let Some(token) = bearer_token(&headers) {
		state.service.revoke_token(token).await;
	}
	Json(json!({ "success": true }))
}

/// GET /api/provisioning/config-bundle - connection parameters for devices.
pub async fn config_bundle(
	State(state): State<AppState>,
	Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ConfigBundle>, ServerError> {
	let bundle = state
		.service
		.config_bundle(params.get("delivery_context").map(String::as_str))?;
	Ok(Json(bundle))
}

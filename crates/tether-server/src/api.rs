// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Router assembly and shared application state.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tether_server_provisioning::ProvisioningService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ProvisioningService>,
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods(Any)
		.allow_headers(Any);

	Router::new()
		.route("/health", get(routes::health::health))
		.route(
			"/api/provisioning/codes",
			post(routes::provisioning::issue_code),
		)
		.route(
			"/api/provisioning/claim",
			post(routes::provisioning::claim_code),
		)
		.route(
			"/api/provisioning/register",
			post(routes::provisioning::register_device),
		)
		.route(
			"/api/provisioning/identity",
			post(routes::provisioning::report_identity),
		)
		.route(
			"/api/provisioning/revoke",
			post(routes::provisioning::revoke_token),
		)
		.route(
			"/api/provisioning/config-bundle",
			get(routes::provisioning::config_bundle),
		)
		.layer(TraceLayer::new_for_http())
		.layer(cors)
		.with_state(state)
}

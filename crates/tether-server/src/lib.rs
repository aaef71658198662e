// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP server for the Tether device provisioning protocol.
//!
//! Exposes the provisioning operations as JSON endpoints:
//!
//! - `POST /api/provisioning/codes` — issue an install code
//! - `POST /api/provisioning/claim` — exchange a code for a token
//! - `POST /api/provisioning/register` — register a device (bearer token)
//! - `POST /api/provisioning/identity` — reconcile the confirmed identity
//! - `POST /api/provisioning/revoke` — revoke a token (bearer token)
//! - `GET /api/provisioning/config-bundle` — connection parameters
//! - `GET /health` — liveness probe

pub mod api;
pub mod error;
pub mod routes;

pub use api::{create_router, AppState};
pub use error::{ErrorResponse, ServerError};

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Liveness endpoint.

use axum::Json;
use serde_json::{json, Value};

/// GET /health - liveness probe.
pub async fn health() -> Json<Value> {
	Json(json!({
		"status": "ok",
		"version": env!("CARGO_PKG_VERSION"),
	}))
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Idempotent schema creation for the provisioning tables.
//!
//! Applied at server startup and reused by the in-memory test pools. There
//! is deliberately no uniqueness constraint on `provisioning_codes.code`
//! (values recur across history; the issuer keeps the *live* set
//! collision-free) and none on `devices.device_id` (active-row uniqueness of
//! the numeric identity is enforced by the reconciler).

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

/// Create all provisioning tables and indexes if they do not exist.
#[tracing::instrument(skip(pool))]
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS provisioning_codes (
			id TEXT PRIMARY KEY,
			code TEXT NOT NULL,
			issued_by TEXT NOT NULL,
			status TEXT NOT NULL,
			expires_at TEXT NOT NULL,
			locked_until TEXT,
			last_attempt_at TEXT,
			last_attempt_origin TEXT,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_provisioning_codes_value ON provisioning_codes (code, created_at)",
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS provisioning_tokens (
			id TEXT PRIMARY KEY,
			code_id TEXT NOT NULL,
			token_hash TEXT NOT NULL UNIQUE,
			status TEXT NOT NULL,
			device_hint TEXT,
			nonce_hash TEXT,
			expires_at TEXT NOT NULL,
			used_by_device_id TEXT,
			last_seen_at TEXT,
			origin_ip TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS provisioning_attempts (
			id TEXT PRIMARY KEY,
			code TEXT NOT NULL,
			origin_ip TEXT NOT NULL,
			success INTEGER NOT NULL,
			attempted_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_provisioning_attempts_origin ON provisioning_attempts (origin_ip, attempted_at)",
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_provisioning_attempts_code ON provisioning_attempts (code, origin_ip, attempted_at)",
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS devices (
			id TEXT PRIMARY KEY,
			device_id TEXT NOT NULL,
			owner_username TEXT NOT NULL,
			device_hint TEXT,
			provisioning_status TEXT NOT NULL,
			last_seen_at TEXT,
			deleted_at TEXT,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_device_id ON devices (device_id)")
		.execute(pool)
		.await?;

	tracing::debug!("provisioning schema ensured");
	Ok(())
}

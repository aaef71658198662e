// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Append-only claim attempt ledger.
//!
//! Two independent windows are computed over it: the per-origin total
//! attempt count (global rate limit) and the per-code failure count from one
//! origin (lockout). No deletion API exists at this layer; retention is an
//! external housekeeping concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use crate::error::DbError;
use crate::ts;

#[async_trait]
pub trait AttemptStore: Send + Sync {
	async fn record(
		&self,
		code: &str,
		origin_ip: &str,
		success: bool,
		at: DateTime<Utc>,
	) -> Result<(), DbError>;
	async fn count_since(&self, origin_ip: &str, since: DateTime<Utc>) -> Result<i64, DbError>;
	async fn count_failures_since(
		&self,
		code: &str,
		origin_ip: &str,
		since: DateTime<Utc>,
	) -> Result<i64, DbError>;
}

#[async_trait]
impl AttemptStore for AttemptRepository {
	async fn record(
		&self,
		code: &str,
		origin_ip: &str,
		success: bool,
		at: DateTime<Utc>,
	) -> Result<(), DbError> {
		self.record(code, origin_ip, success, at).await
	}

	async fn count_since(&self, origin_ip: &str, since: DateTime<Utc>) -> Result<i64, DbError> {
		self.count_since(origin_ip, since).await
	}

	async fn count_failures_since(
		&self,
		code: &str,
		origin_ip: &str,
		since: DateTime<Utc>,
	) -> Result<i64, DbError> {
		self.count_failures_since(code, origin_ip, since).await
	}
}

/// Repository for the claim attempt ledger.
#[derive(Clone)]
pub struct AttemptRepository {
	pool: SqlitePool,
}

impl AttemptRepository {
	/// Create a new attempt repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Append one attempt row.
	///
	/// Callers treat this as fire-and-forget: an append failure is logged
	/// and must not abort the claim being processed.
	#[tracing::instrument(skip(self, origin_ip))]
	pub async fn record(
		&self,
		code: &str,
		origin_ip: &str,
		success: bool,
		at: DateTime<Utc>,
	) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO provisioning_attempts (id, code, origin_ip, success, attempted_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(code)
		.bind(origin_ip)
		.bind(success)
		.bind(ts::to_db(at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Count all attempts from an origin strictly after `since`.
	#[tracing::instrument(skip(self, origin_ip))]
	pub async fn count_since(&self, origin_ip: &str, since: DateTime<Utc>) -> Result<i64, DbError> {
		let row = sqlx::query(
			r#"
			SELECT COUNT(*) as count
			FROM provisioning_attempts
			WHERE origin_ip = ? AND attempted_at > ?
			"#,
		)
		.bind(origin_ip)
		.bind(ts::to_db(since))
		.fetch_one(&self.pool)
		.await?;

		Ok(row.get("count"))
	}

	/// Count failed attempts for one code value from one origin after `since`.
	#[tracing::instrument(skip(self, origin_ip))]
	pub async fn count_failures_since(
		&self,
		code: &str,
		origin_ip: &str,
		since: DateTime<Utc>,
	) -> Result<i64, DbError> {
		let row = sqlx::query(
			r#"
			SELECT COUNT(*) as count
			FROM provisioning_attempts
			WHERE code = ? AND origin_ip = ? AND success = 0 AND attempted_at > ?
			"#,
		)
		.bind(code)
		.bind(origin_ip)
		.bind(ts::to_db(since))
		.fetch_one(&self.pool)
		.await?;

		Ok(row.get("count"))
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Install code repository for database operations.
//!
//! Codes are short-lived and their lifecycle transitions (`expired`,
//! `locked`, `consumed`) are written lazily by callers when a stale row is
//! observed; nothing here runs on a timer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use tether_provisioning_core::{CodeId, CodeStatus, OperatorId, ProvisioningCode};
use uuid::Uuid;

use crate::error::DbError;
use crate::ts;

#[async_trait]
pub trait CodeStore: Send + Sync {
	async fn create_code(
		&self,
		code: &str,
		issued_by: &OperatorId,
		expires_at: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<CodeId, DbError>;
	async fn get_code(&self, id: &CodeId) -> Result<Option<ProvisioningCode>, DbError>;
	async fn find_live_by_value(
		&self,
		code: &str,
		now: DateTime<Utc>,
	) -> Result<Option<ProvisioningCode>, DbError>;
	async fn find_latest_by_value(&self, code: &str) -> Result<Option<ProvisioningCode>, DbError>;
	async fn mark_expired(&self, id: &CodeId, now: DateTime<Utc>) -> Result<bool, DbError>;
	async fn mark_locked(
		&self,
		id: &CodeId,
		locked_until: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<(), DbError>;
	async fn mark_consumed(&self, id: &CodeId, now: DateTime<Utc>) -> Result<bool, DbError>;
	async fn record_attempt_metadata(
		&self,
		id: &CodeId,
		origin_ip: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError>;
}

#[async_trait]
impl CodeStore for CodeRepository {
	async fn create_code(
		&self,
		code: &str,
		issued_by: &OperatorId,
		expires_at: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<CodeId, DbError> {
		self.create_code(code, issued_by, expires_at, now).await
	}

	async fn get_code(&self, id: &CodeId) -> Result<Option<ProvisioningCode>, DbError> {
		self.get_code(id).await
	}

	async fn find_live_by_value(
		&self,
		code: &str,
		now: DateTime<Utc>,
	) -> Result<Option<ProvisioningCode>, DbError> {
		self.find_live_by_value(code, now).await
	}

	async fn find_latest_by_value(&self, code: &str) -> Result<Option<ProvisioningCode>, DbError> {
		self.find_latest_by_value(code).await
	}

	async fn mark_expired(&self, id: &CodeId, now: DateTime<Utc>) -> Result<bool, DbError> {
		self.mark_expired(id, now).await
	}

	async fn mark_locked(
		&self,
		id: &CodeId,
		locked_until: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		self.mark_locked(id, locked_until, now).await
	}

	async fn mark_consumed(&self, id: &CodeId, now: DateTime<Utc>) -> Result<bool, DbError> {
		self.mark_consumed(id, now).await
	}

	async fn record_attempt_metadata(
		&self,
		id: &CodeId,
		origin_ip: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		self.record_attempt_metadata(id, origin_ip, now).await
	}
}

/// Repository for install code database operations.
#[derive(Clone)]
pub struct CodeRepository {
	pool: SqlitePool,
}

const CODE_COLUMNS: &str = "id, code, issued_by, status, expires_at, locked_until, \
	last_attempt_at, last_attempt_origin, created_at, updated_at";

impl CodeRepository {
	/// Create a new code repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a fresh `unused` code row.
	///
	/// # Note
	/// The caller (the issuer) is responsible for having probed the live set
	/// for collisions first; no uniqueness constraint backs this insert.
	#[tracing::instrument(skip(self), fields(issued_by = %issued_by))]
	pub async fn create_code(
		&self,
		code: &str,
		issued_by: &OperatorId,
		expires_at: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<CodeId, DbError> {
		let id = CodeId::generate();

		sqlx::query(
			r#"
			INSERT INTO provisioning_codes (
				id, code, issued_by, status, expires_at, created_at, updated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(id.to_string())
		.bind(code)
		.bind(issued_by.as_str())
		.bind(CodeStatus::Unused.as_str())
		.bind(ts::to_db(expires_at))
		.bind(ts::to_db(now))
		.bind(ts::to_db(now))
		.execute(&self.pool)
		.await?;

		tracing::debug!(code_id = %id, "install code created");
		Ok(id)
	}

	/// Get a code row by its ID, in any status.
	#[tracing::instrument(skip(self), fields(code_id = %id))]
	pub async fn get_code(&self, id: &CodeId) -> Result<Option<ProvisioningCode>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {CODE_COLUMNS} FROM provisioning_codes WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		match row {
			Some(row) => Ok(Some(parse_code_row(&row)?)),
			None => Ok(None),
		}
	}

	/// Find the live row for a code value, if one exists.
	///
	/// Live means claimable status (`unused`/`claimed`) and unexpired at
	/// `now`. Expiry is compared in Rust against the injected clock value so
	/// a skewed database host cannot resurrect a dead code.
	#[tracing::instrument(skip(self, code))]
	pub async fn find_live_by_value(
		&self,
		code: &str,
		now: DateTime<Utc>,
	) -> Result<Option<ProvisioningCode>, DbError> {
		let rows = sqlx::query(&format!(
			r#"
			SELECT {CODE_COLUMNS} FROM provisioning_codes
			WHERE code = ? AND status IN ('unused', 'claimed')
			ORDER BY created_at DESC
			"#
		))
		.bind(code)
		.fetch_all(&self.pool)
		.await?;

		for row in rows {
			let parsed = parse_code_row(&row)?;
			if !parsed.is_expired(now) {
				return Ok(Some(parsed));
			}
		}
		Ok(None)
	}

	/// Find the most recently created row for a code value, in any status.
	///
	/// Code values recur across history; only the newest row is considered
	/// by the claim path. Two issuances racing the collision probe can leave
	/// two live rows for one value, in which case the older row is simply
	/// unreachable from here and ages out.
	#[tracing::instrument(skip(self, code))]
	pub async fn find_latest_by_value(&self, code: &str) -> Result<Option<ProvisioningCode>, DbError> {
		let row = sqlx::query(&format!(
			r#"
			SELECT {CODE_COLUMNS} FROM provisioning_codes
			WHERE code = ?
			ORDER BY created_at DESC
			LIMIT 1
			"#
		))
		.bind(code)
		.fetch_optional(&self.pool)
		.await?;

		match row {
			Some(row) => Ok(Some(parse_code_row(&row)?)),
			None => Ok(None),
		}
	}

	/// Lazily transition a stale claimable code to `expired`.
	///
	/// # Returns
	/// `true` if this call performed the transition, `false` if another
	/// request got there first or the code already left the claimable set.
	#[tracing::instrument(skip(self), fields(code_id = %id))]
	pub async fn mark_expired(&self, id: &CodeId, now: DateTime<Utc>) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE provisioning_codes
			SET status = 'expired', updated_at = ?
			WHERE id = ? AND status IN ('unused', 'claimed')
			"#,
		)
		.bind(ts::to_db(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		let transitioned = result.rows_affected() > 0;
		if transitioned {
			tracing::debug!(code_id = %id, "install code expired");
		}
		Ok(transitioned)
	}

	/// Transition a code to `locked` until the given instant.
	#[tracing::instrument(skip(self), fields(code_id = %id))]
	pub async fn mark_locked(
		&self,
		id: &CodeId,
		locked_until: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		sqlx::query(
			r#"
			UPDATE provisioning_codes
			SET status = 'locked', locked_until = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(ts::to_db(locked_until))
		.bind(ts::to_db(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		tracing::warn!(code_id = %id, locked_until = %locked_until, "install code locked");
		Ok(())
	}

	/// Transition a code to `consumed`, regardless of its current state.
	///
	/// Guarded so a repeated revoke performs no additional mutation.
	///
	/// # Returns
	/// `true` if a row changed, `false` if the code was already consumed or
	/// does not exist.
	#[tracing::instrument(skip(self), fields(code_id = %id))]
	pub async fn mark_consumed(&self, id: &CodeId, now: DateTime<Utc>) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE provisioning_codes
			SET status = 'consumed', updated_at = ?
			WHERE id = ? AND status != 'consumed'
			"#,
		)
		.bind(ts::to_db(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Stamp the last attempt metadata on a code row.
	#[tracing::instrument(skip(self, origin_ip), fields(code_id = %id))]
	pub async fn record_attempt_metadata(
		&self,
		id: &CodeId,
		origin_ip: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		sqlx::query(
			r#"
			UPDATE provisioning_codes
			SET last_attempt_at = ?, last_attempt_origin = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(ts::to_db(now))
		.bind(origin_ip)
		.bind(ts::to_db(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

pub(crate) fn parse_code_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProvisioningCode, DbError> {
	let id_str: String = row.get("id");
	let code: String = row.get("code");
	let issued_by: String = row.get("issued_by");
	let status_str: String = row.get("status");
	let expires_at_str: String = row.get("expires_at");
	let locked_until_str: Option<String> = row.get("locked_until");
	let last_attempt_at_str: Option<String> = row.get("last_attempt_at");
	let last_attempt_origin: Option<String> = row.get("last_attempt_origin");
	let created_at_str: String = row.get("created_at");
	let updated_at_str: String = row.get("updated_at");

	let id = Uuid::parse_str(&id_str)
		.map_err(|e| DbError::Internal(format!("Invalid code id UUID: {e}")))?;
	let status = CodeStatus::parse(&status_str)
		.ok_or_else(|| DbError::Internal(format!("Invalid code status '{status_str}'")))?;

	Ok(ProvisioningCode {
		id: CodeId::new(id),
		code,
		issued_by: OperatorId::new(issued_by),
		status,
		expires_at: ts::from_db(&expires_at_str)?,
		locked_until: ts::opt_from_db(locked_until_str)?,
		last_attempt_at: ts::opt_from_db(last_attempt_at_str)?,
		last_attempt_origin,
		created_at: ts::from_db(&created_at_str)?,
		updated_at: ts::from_db(&updated_at_str)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use chrono::Duration;

	async fn make_repo() -> CodeRepository {
		CodeRepository::new(create_test_pool().await)
	}

	#[tokio::test]
	async fn test_create_and_get_code() {
		let repo = make_repo().await;
		let now = Utc::now();
		let operator = OperatorId::new("agentA");

		let id = repo
			.create_code("4821", &operator, now + Duration::minutes(15), now)
			.await
			.unwrap();

		let code = repo.get_code(&id).await.unwrap().unwrap();
		assert_eq!(code.id, id);
		assert_eq!(code.code, "4821");
		assert_eq!(code.issued_by, operator);
		assert_eq!(code.status, CodeStatus::Unused);
		assert!(code.locked_until.is_none());
		assert!(code.last_attempt_at.is_none());
	}

	#[tokio::test]
	async fn test_find_live_by_value_skips_expired_rows() {
		let repo = make_repo().await;
		let now = Utc::now();
		let operator = OperatorId::new("agentA");

		repo.create_code("4821", &operator, now - Duration::seconds(1), now - Duration::minutes(16))
			.await
			.unwrap();

		assert!(repo.find_live_by_value("4821", now).await.unwrap().is_none());

		let live_id = repo
			.create_code("4821", &operator, now + Duration::minutes(15), now)
			.await
			.unwrap();

		let found = repo.find_live_by_value("4821", now).await.unwrap().unwrap();
		assert_eq!(found.id, live_id);
	}

	#[tokio::test]
	async fn test_find_latest_by_value_prefers_newest_row() {
		let repo = make_repo().await;
		let now = Utc::now();
		let operator = OperatorId::new("agentA");

		repo.create_code("4821", &operator, now + Duration::minutes(15), now - Duration::hours(1))
			.await
			.unwrap();
		let newest = repo
			.create_code("4821", &operator, now + Duration::minutes(15), now)
			.await
			.unwrap();

		let found = repo.find_latest_by_value("4821").await.unwrap().unwrap();
		assert_eq!(found.id, newest);
	}

	#[tokio::test]
	async fn test_mark_expired_only_transitions_claimable_rows() {
		let repo = make_repo().await;
		let now = Utc::now();
		let id = repo
			.create_code("1111", &OperatorId::new("agentA"), now, now)
			.await
			.unwrap();

		assert!(repo.mark_expired(&id, now).await.unwrap());
		// Second transition is a no-op.
		assert!(!repo.mark_expired(&id, now).await.unwrap());

		let code = repo.get_code(&id).await.unwrap().unwrap();
		assert_eq!(code.status, CodeStatus::Expired);
	}

	#[tokio::test]
	async fn test_mark_locked_sets_locked_until() {
		let repo = make_repo().await;
		let now = Utc::now();
		let id = repo
			.create_code("2222", &OperatorId::new("agentA"), now + Duration::minutes(15), now)
			.await
			.unwrap();

		let until = now + Duration::minutes(15);
		repo.mark_locked(&id, until, now).await.unwrap();

		let code = repo.get_code(&id).await.unwrap().unwrap();
		assert_eq!(code.status, CodeStatus::Locked);
		let stored = code.locked_until.unwrap();
		assert!((stored - until).num_microseconds().unwrap().abs() < 2);
	}

	#[tokio::test]
	async fn test_mark_consumed_is_guarded() {
		let repo = make_repo().await;
		let now = Utc::now();
		let id = repo
			.create_code("3333", &OperatorId::new("agentA"), now + Duration::minutes(15), now)
			.await
			.unwrap();

		assert!(repo.mark_consumed(&id, now).await.unwrap());
		assert!(!repo.mark_consumed(&id, now).await.unwrap());

		let code = repo.get_code(&id).await.unwrap().unwrap();
		assert_eq!(code.status, CodeStatus::Consumed);
	}

	#[tokio::test]
	async fn test_record_attempt_metadata() {
		let repo = make_repo().await;
		let now = Utc::now();
		let id = repo
			.create_code("4444", &OperatorId::new("agentA"), now + Duration::minutes(15), now)
			.await
			.unwrap();

		repo.record_attempt_metadata(&id, "1.2.3.4", now).await.unwrap();

		let code = repo.get_code(&id).await.unwrap().unwrap();
		assert!(code.last_attempt_at.is_some());
		assert_eq!(code.last_attempt_origin.as_deref(), Some("1.2.3.4"));
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Device inventory mirror repository.
//!
//! Rows are keyed by a surrogate UUID; the `device_id` column starts as the
//! fingerprint reported at registration and is overwritten with the final
//! numeric identity by the reconciler. Retired rows are soft-deleted and
//! ignored by every active-row query. Uniqueness of the numeric identity
//! among active rows is enforced by the reconciler's conflict sweep, not by
//! a constraint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use tether_provisioning_core::{DeviceRecord, DeviceState};
use uuid::Uuid;

use crate::error::DbError;
use crate::ts;

#[async_trait]
pub trait DeviceStore: Send + Sync {
	async fn upsert_provisioning(
		&self,
		device_id: &str,
		owner_username: &str,
		device_hint: Option<&str>,
		now: DateTime<Utc>,
	) -> Result<DeviceRecord, DbError>;
	async fn find_active_by_device_id(
		&self,
		device_id: &str,
	) -> Result<Option<DeviceRecord>, DbError>;
	async fn find_active_with_identity(
		&self,
		identity: &str,
		exclude_row_id: &str,
	) -> Result<Vec<DeviceRecord>, DbError>;
	async fn soft_delete(&self, row_id: &str, now: DateTime<Utc>) -> Result<bool, DbError>;
	async fn assign_identity(
		&self,
		row_id: &str,
		identity: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError>;
}

#[async_trait]
impl DeviceStore for DeviceRepository {
	async fn upsert_provisioning(
		&self,
		device_id: &str,
		owner_username: &str,
		device_hint: Option<&str>,
		now: DateTime<Utc>,
	) -> Result<DeviceRecord, DbError> {
		self
			.upsert_provisioning(device_id, owner_username, device_hint, now)
			.await
	}

	async fn find_active_by_device_id(
		&self,
		device_id: &str,
	) -> Result<Option<DeviceRecord>, DbError> {
		self.find_active_by_device_id(device_id).await
	}

	async fn find_active_with_identity(
		&self,
		identity: &str,
		exclude_row_id: &str,
	) -> Result<Vec<DeviceRecord>, DbError> {
		self.find_active_with_identity(identity, exclude_row_id).await
	}

	async fn soft_delete(&self, row_id: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
		self.soft_delete(row_id, now).await
	}

	async fn assign_identity(
		&self,
		row_id: &str,
		identity: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		self.assign_identity(row_id, identity, now).await
	}
}

/// Repository for device mirror rows.
#[derive(Clone)]
pub struct DeviceRepository {
	pool: SqlitePool,
}

const DEVICE_COLUMNS: &str = "id, device_id, owner_username, device_hint, provisioning_status, \
	last_seen_at, deleted_at, created_at, updated_at";

impl DeviceRepository {
	/// Create a new device repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create or refresh the active row for a fingerprint.
	///
	/// Re-registration with the same token is a heartbeat: the existing row
	/// keeps its identity and state, only ownership, hint, and `last_seen_at`
	/// are refreshed.
	#[tracing::instrument(skip(self, device_hint), fields(device_id = %device_id, owner = %owner_username))]
	pub async fn upsert_provisioning(
		&self,
		device_id: &str,
		owner_username: &str,
		device_hint: Option<&str>,
		now: DateTime<Utc>,
	) -> Result<DeviceRecord, DbError> {
		if let Some(existing) = self.find_active_by_device_id(device_id).await? {
			sqlx::query(
				r#"
				UPDATE devices
				SET owner_username = ?, device_hint = ?, last_seen_at = ?, updated_at = ?
				WHERE id = ?
				"#,
			)
			.bind(owner_username)
			.bind(device_hint)
			.bind(ts::to_db(now))
			.bind(ts::to_db(now))
			.bind(&existing.id)
			.execute(&self.pool)
			.await?;

			tracing::debug!(row_id = %existing.id, "device row refreshed");
			return self
				.find_active_by_device_id(device_id)
				.await?
				.ok_or_else(|| DbError::Internal("device row vanished during upsert".to_string()));
		}

		let id = Uuid::new_v4().to_string();
		sqlx::query(
			r#"
			INSERT INTO devices (
				id, device_id, owner_username, device_hint, provisioning_status,
				last_seen_at, created_at, updated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(device_id)
		.bind(owner_username)
		.bind(device_hint)
		.bind(DeviceState::Provisioning.as_str())
		.bind(ts::to_db(now))
		.bind(ts::to_db(now))
		.bind(ts::to_db(now))
		.execute(&self.pool)
		.await?;

		tracing::debug!(row_id = %id, device_id = %device_id, "device row created");
		self
			.find_active_by_device_id(device_id)
			.await?
			.ok_or_else(|| DbError::Internal("device row vanished after insert".to_string()))
	}

	/// Find the active (not soft-deleted) row for a device id or fingerprint.
	#[tracing::instrument(skip(self), fields(device_id = %device_id))]
	pub async fn find_active_by_device_id(
		&self,
		device_id: &str,
	) -> Result<Option<DeviceRecord>, DbError> {
		let row = sqlx::query(&format!(
			r#"
			SELECT {DEVICE_COLUMNS} FROM devices
			WHERE device_id = ? AND deleted_at IS NULL
			ORDER BY created_at DESC
			LIMIT 1
			"#
		))
		.bind(device_id)
		.fetch_optional(&self.pool)
		.await?;

		match row {
			Some(row) => Ok(Some(parse_device_row(&row)?)),
			None => Ok(None),
		}
	}

	/// All *other* active rows already holding an identity.
	///
	/// These are the stale rows the reconciler soft-deletes when a different
	/// fingerprint confirms the same numeric identity.
	#[tracing::instrument(skip(self), fields(identity = %identity))]
	pub async fn find_active_with_identity(
		&self,
		identity: &str,
		exclude_row_id: &str,
	) -> Result<Vec<DeviceRecord>, DbError> {
		let rows = sqlx::query(&format!(
			r#"
			SELECT {DEVICE_COLUMNS} FROM devices
			WHERE device_id = ? AND deleted_at IS NULL AND id != ?
			"#
		))
		.bind(identity)
		.bind(exclude_row_id)
		.fetch_all(&self.pool)
		.await?;

		let mut records = Vec::with_capacity(rows.len());
		for row in rows {
			records.push(parse_device_row(&row)?);
		}
		Ok(records)
	}

	/// Soft-delete a row.
	///
	/// # Returns
	/// `true` if the row was retired by this call, `false` if it was already
	/// deleted or does not exist.
	#[tracing::instrument(skip(self), fields(row_id = %row_id))]
	pub async fn soft_delete(&self, row_id: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE devices
			SET deleted_at = ?, updated_at = ?
			WHERE id = ? AND deleted_at IS NULL
			"#,
		)
		.bind(ts::to_db(now))
		.bind(ts::to_db(now))
		.bind(row_id)
		.execute(&self.pool)
		.await?;

		let deleted = result.rows_affected() > 0;
		if deleted {
			tracing::info!(row_id = %row_id, "device row soft-deleted");
		}
		Ok(deleted)
	}

	/// Overwrite a row's identity with the confirmed numeric id.
	///
	/// Marks the row `ready` and refreshes `last_seen_at`.
	#[tracing::instrument(skip(self), fields(row_id = %row_id, identity = %identity))]
	pub async fn assign_identity(
		&self,
		row_id: &str,
		identity: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		sqlx::query(
			r#"
			UPDATE devices
			SET device_id = ?, provisioning_status = ?, last_seen_at = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(identity)
		.bind(DeviceState::Ready.as_str())
		.bind(ts::to_db(now))
		.bind(ts::to_db(now))
		.bind(row_id)
		.execute(&self.pool)
		.await?;

		tracing::info!(row_id = %row_id, identity = %identity, "device identity assigned");
		Ok(())
	}
}

fn parse_device_row(row: &sqlx::sqlite::SqliteRow) -> Result<DeviceRecord, DbError> {
	let id: String = row.get("id");
	let device_id: String = row.get("device_id");
	let owner_username: String = row.get("owner_username");
	let device_hint: Option<String> = row.get("device_hint");
	let state_str: String = row.get("provisioning_status");
	let last_seen_at_str: Option<String> = row.get("last_seen_at");
	let deleted_at_str: Option<String> = row.get("deleted_at");
	let created_at_str: String = row.get("created_at");
	let updated_at_str: String = row.get("updated_at");

	let state = DeviceState::parse(&state_str)
		.ok_or_else(|| DbError::Internal(format!("Invalid device state '{state_str}'")))?;

	Ok(DeviceRecord {
		id,
		device_id,
		owner_username,
		device_hint,
		state,
		last_seen_at: ts::opt_from_db(last_seen_at_str)?,
		deleted_at: ts::opt_from_db(deleted_at_str)?,
		created_at: ts::from_db(&created_at_str)?,
		updated_at: ts::from_db(&updated_at_str)?,
	})
}

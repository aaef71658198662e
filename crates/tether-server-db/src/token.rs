// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Provisioning token repository for database operations.
//!
//! Tokens are stored as SHA-256 digests, never in plaintext. Minting is
//! coupled to the owning code's claim transition inside one transaction so
//! that a token can never exist for a code that was not moved to `claimed`
//! by the same request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use tether_provisioning_core::{CodeId, ProvisioningToken, TokenId, TokenStatus};
use uuid::Uuid;

use crate::error::DbError;
use crate::ts;

/// Fields of a token row fixed at mint time.
#[derive(Debug, Clone)]
pub struct NewToken<'a> {
	pub token_hash: &'a str,
	pub expires_at: DateTime<Utc>,
	pub device_hint: Option<&'a str>,
	pub nonce_hash: Option<&'a str>,
	pub origin_ip: &'a str,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
	async fn mint_for_code(
		&self,
		code_id: &CodeId,
		token: NewToken<'_>,
		now: DateTime<Utc>,
	) -> Result<Option<TokenId>, DbError>;
	async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ProvisioningToken>, DbError>;
	async fn record_registration(
		&self,
		id: &TokenId,
		device_id: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError>;
	async fn revoke(&self, id: &TokenId, now: DateTime<Utc>) -> Result<bool, DbError>;
}

#[async_trait]
impl TokenStore for TokenRepository {
	async fn mint_for_code(
		&self,
		code_id: &CodeId,
		token: NewToken<'_>,
		now: DateTime<Utc>,
	) -> Result<Option<TokenId>, DbError> {
		self.mint_for_code(code_id, token, now).await
	}

	async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ProvisioningToken>, DbError> {
		self.find_by_hash(token_hash).await
	}

	async fn record_registration(
		&self,
		id: &TokenId,
		device_id: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		self.record_registration(id, device_id, now).await
	}

	async fn revoke(&self, id: &TokenId, now: DateTime<Utc>) -> Result<bool, DbError> {
		self.revoke(id, now).await
	}
}

/// Repository for provisioning token database operations.
#[derive(Clone)]
pub struct TokenRepository {
	pool: SqlitePool,
}

const TOKEN_COLUMNS: &str = "id, code_id, token_hash, status, device_hint, nonce_hash, \
	expires_at, used_by_device_id, last_seen_at, origin_ip, created_at";

impl TokenRepository {
	/// Create a new token repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Claim a code and mint a token for it, atomically.
	///
	/// The code-state write is a compare-and-swap: the transition to
	/// `claimed` only happens while the code is still in the claimable set.
	/// Two racing claims both pass the earlier read checks, but only one
	/// commits here; the loser observes `None` and must report the claim as
	/// invalid rather than hand out a second token for a code another
	/// request just moved.
	///
	/// # Returns
	/// The new token's ID, or `None` if the code left the claimable set
	/// between the caller's read and this write.
	#[tracing::instrument(skip(self, token), fields(code_id = %code_id))]
	pub async fn mint_for_code(
		&self,
		code_id: &CodeId,
		token: NewToken<'_>,
		now: DateTime<Utc>,
	) -> Result<Option<TokenId>, DbError> {
		let mut tx = self.pool.begin().await?;

		let claimed = sqlx::query(
			r#"
			UPDATE provisioning_codes
			SET status = 'claimed', last_attempt_at = ?, last_attempt_origin = ?, updated_at = ?
			WHERE id = ? AND status IN ('unused', 'claimed')
			"#,
		)
		.bind(ts::to_db(now))
		.bind(token.origin_ip)
		.bind(ts::to_db(now))
		.bind(code_id.to_string())
		.execute(&mut *tx)
		.await?;

		if claimed.rows_affected() == 0 {
			tx.rollback().await?;
			tracing::debug!(code_id = %code_id, "claim lost the code-state race");
			return Ok(None);
		}

		let id = TokenId::generate();
		sqlx::query(
			r#"
			INSERT INTO provisioning_tokens (
				id, code_id, token_hash, status, device_hint, nonce_hash,
				expires_at, origin_ip, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(id.to_string())
		.bind(code_id.to_string())
		.bind(token.token_hash)
		.bind(TokenStatus::Active.as_str())
		.bind(token.device_hint)
		.bind(token.nonce_hash)
		.bind(ts::to_db(token.expires_at))
		.bind(token.origin_ip)
		.bind(ts::to_db(now))
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		tracing::debug!(token_id = %id, code_id = %code_id, "provisioning token minted");
		Ok(Some(id))
	}

	/// Get a token by its digest.
	///
	/// # Note
	/// Returns the token regardless of status or expiry - caller applies the
	/// validity rules.
	#[tracing::instrument(skip(self, token_hash))]
	pub async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ProvisioningToken>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {TOKEN_COLUMNS} FROM provisioning_tokens WHERE token_hash = ?"
		))
		.bind(token_hash)
		.fetch_optional(&self.pool)
		.await?;

		match row {
			Some(row) => Ok(Some(parse_token_row(&row)?)),
			None => Ok(None),
		}
	}

	/// Record a successful registration against a token.
	///
	/// Only metadata changes; the token stays active for subsequent
	/// heartbeats until it expires or is revoked.
	#[tracing::instrument(skip(self), fields(token_id = %id))]
	pub async fn record_registration(
		&self,
		id: &TokenId,
		device_id: &str,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		sqlx::query(
			r#"
			UPDATE provisioning_tokens
			SET used_by_device_id = ?, last_seen_at = ?
			WHERE id = ?
			"#,
		)
		.bind(device_id)
		.bind(ts::to_db(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		tracing::debug!(token_id = %id, device_id = %device_id, "registration recorded");
		Ok(())
	}

	/// Revoke a token: status `revoked`, expiry collapsed to now.
	///
	/// # Returns
	/// `true` if the token was revoked, `false` if already revoked.
	#[tracing::instrument(skip(self), fields(token_id = %id))]
	pub async fn revoke(&self, id: &TokenId, now: DateTime<Utc>) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE provisioning_tokens
			SET status = 'revoked', expires_at = ?
			WHERE id = ? AND status = 'active'
			"#,
		)
		.bind(ts::to_db(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		let revoked = result.rows_affected() > 0;
		if revoked {
			tracing::info!(token_id = %id, "provisioning token revoked");
		}
		Ok(revoked)
	}
}

fn parse_token_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProvisioningToken, DbError> {
	let id_str: String = row.get("id");
	let code_id_str: String = row.get("code_id");
	let token_hash: String = row.get("token_hash");
	let status_str: String = row.get("status");
	let device_hint: Option<String> = row.get("device_hint");
	let nonce_hash: Option<String> = row.get("nonce_hash");
	let expires_at_str: String = row.get("expires_at");
	let used_by_device_id: Option<String> = row.get("used_by_device_id");
	let last_seen_at_str: Option<String> = row.get("last_seen_at");
	let origin_ip: Option<String> = row.get("origin_ip");
	let created_at_str: String = row.get("created_at");

	let id = Uuid::parse_str(&id_str)
		.map_err(|e| DbError::Internal(format!("Invalid token id UUID: {e}")))?;
	let code_id = Uuid::parse_str(&code_id_str)
		.map_err(|e| DbError::Internal(format!("Invalid code_id UUID: {e}")))?;
	let status = TokenStatus::parse(&status_str)
		.ok_or_else(|| DbError::Internal(format!("Invalid token status '{status_str}'")))?;

	Ok(ProvisioningToken {
		id: TokenId::new(id),
		code_id: CodeId::new(code_id),
		token_hash,
		status,
		device_hint,
		nonce_hash,
		expires_at: ts::from_db(&expires_at_str)?,
		used_by_device_id,
		last_seen_at: ts::opt_from_db(last_seen_at_str)?,
		origin_ip,
		created_at: ts::from_db(&created_at_str)?,
	})
}

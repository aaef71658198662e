// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The provisioning service: issue, claim, register, reconcile, revoke.
//!
//! Each operation is a short-lived, stateless handler over the shared store.
//! Expiry and lockout are evaluated lazily against the injected [`Clock`] at
//! each access; there is no background sweeper. The claim path is the
//! security-critical one and runs its checks in a fixed order, each
//! short-circuiting on failure, so a response never leaks more than the
//! earliest rejection reason.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

use tether_provisioning_core::codec::{
	generate_install_code, generate_provisioning_token, hash_secret, is_valid_final_identity,
	normalize_install_code,
};
use tether_provisioning_core::{
	Clock, CodeId, DeviceRecord, OperatorId, CODE_TTL_MINUTES, ISSUE_MAX_DRAWS,
	LOCKOUT_MAX_FAILURES, LOCKOUT_WINDOW_MINUTES, LOCK_DURATION_MINUTES, RATE_LIMIT_MAX_ATTEMPTS,
	RATE_LIMIT_WINDOW_SECS, TOKEN_TTL_SECONDS,
};
use tether_server_db::token::NewToken;
use tether_server_db::{
	AttemptRepository, CodeRepository, DeviceRepository, TokenRepository,
};
use tether_server_registry::DeviceRegistry;

use crate::bundle::{BundleSettings, ConfigBundle};
use crate::error::{ProvisioningError, Result};

/// Static service configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
	/// Public base URL used to build code delivery links.
	pub base_url: String,
	/// Sentinel identities that must never mint install codes.
	pub reserved_operators: Vec<String>,
	/// Inputs for the post-registration config bundle.
	pub bundle: BundleSettings,
}

/// A freshly-issued install code, as returned to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCode {
	pub code: String,
	pub expires_at: DateTime<Utc>,
	pub delivery_url: String,
}

/// Claim request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimRequest {
	pub code: String,
	#[serde(default)]
	pub device_hint: Option<String>,
	#[serde(default)]
	pub nonce: Option<String>,
}

/// A successful claim: the plaintext token (shown exactly once) plus the
/// operator profile the device binds to.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimedToken {
	pub token: String,
	/// Token lifetime in seconds.
	pub expires_in: i64,
	pub user_id: String,
	pub tenant_id: String,
	pub account_label: String,
}

/// Outcome of a delegated registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredDevice {
	/// Adoption state reported by the registry.
	pub state: String,
	pub device: DeviceRecord,
}

/// Stateless facade over the provisioning repositories, the device registry,
/// and the clock.
pub struct ProvisioningService {
	codes: CodeRepository,
	tokens: TokenRepository,
	attempts: AttemptRepository,
	devices: DeviceRepository,
	registry: Arc<dyn DeviceRegistry>,
	clock: Arc<dyn Clock>,
	settings: ServiceSettings,
}

impl ProvisioningService {
	pub fn new(
		pool: SqlitePool,
		registry: Arc<dyn DeviceRegistry>,
		clock: Arc<dyn Clock>,
		settings: ServiceSettings,
	) -> Self {
		Self {
			codes: CodeRepository::new(pool.clone()),
			tokens: TokenRepository::new(pool.clone()),
			attempts: AttemptRepository::new(pool.clone()),
			devices: DeviceRepository::new(pool),
			registry,
			clock,
			settings,
		}
	}

	/// Issue a fresh install code owned by `operator`.
	///
	/// Draws candidates until one has no live row with the same value, up to
	/// [`ISSUE_MAX_DRAWS`] times. Values are reusable across history; only
	/// liveness collisions block a draw.
	#[tracing::instrument(skip(self), fields(operator = %operator))]
	pub async fn issue_code(&self, operator: &OperatorId) -> Result<IssuedCode> {
		let now = self.clock.now();

		if self
			.settings
			.reserved_operators
			.iter()
			.any(|r| r == operator.as_str())
		{
			tracing::warn!(operator = %operator, "reserved operator may not issue install codes");
			return Err(ProvisioningError::OperatorNotFound(
				operator.as_str().to_string(),
			));
		}

		if self.registry.lookup_operator(operator).await?.is_none() {
			tracing::warn!(operator = %operator, "issue rejected: operator unknown to registry");
			return Err(ProvisioningError::OperatorNotFound(
				operator.as_str().to_string(),
			));
		}

		let expires_at = now + Duration::minutes(CODE_TTL_MINUTES);

		for _ in 0..ISSUE_MAX_DRAWS {
			let candidate = generate_install_code();
			if self
				.codes
				.find_live_by_value(&candidate, now)
				.await?
				.is_some()
			{
				continue;
			}

			let id = self
				.codes
				.create_code(&candidate, operator, expires_at, now)
				.await?;
			tracing::info!(code_id = %id, operator = %operator, "install code issued");

			let delivery_url = format!(
				"{}/provision?code={}",
				self.settings.base_url.trim_end_matches('/'),
				candidate
			);
			return Ok(IssuedCode {
				code: candidate,
				expires_at,
				delivery_url,
			});
		}

		tracing::error!(operator = %operator, "live code space saturated after {ISSUE_MAX_DRAWS} draws");
		Err(ProvisioningError::CapacityExceeded)
	}

	/// Exchange an install code for a provisioning token.
	///
	/// Checks run in a fixed order: normalize, per-origin rate limit, row
	/// lookup, lazy expiry, terminal status, per-code lockout, operator
	/// resolution, and finally the transactional mint whose code-state write
	/// is a compare-and-swap. A racer that loses the swap gets the same
	/// `InvalidCode` as an unknown value.
	#[tracing::instrument(skip(self, request), fields(origin = %origin_ip))]
	pub async fn claim_code(&self, request: ClaimRequest, origin_ip: &str) -> Result<ClaimedToken> {
		let now = self.clock.now();

		let Some(code_value) = normalize_install_code(&request.code) else {
			tracing::debug!("claim rejected: malformed install code");
			return Err(ProvisioningError::InvalidCode);
		};

		// Flood control runs before any code state is read or written, so a
		// rate-limited origin learns nothing and leaves no ledger row.
		let window_start = now - Duration::seconds(RATE_LIMIT_WINDOW_SECS);
		let recent = self.attempts.count_since(origin_ip, window_start).await?;
		if recent >= RATE_LIMIT_MAX_ATTEMPTS {
			tracing::warn!(origin = %origin_ip, recent, "claim rate limited");
			return Err(ProvisioningError::RateLimited);
		}

		// Only the newest row for a value is considered; older rows are dead
		// history.
		let Some(code) = self.codes.find_latest_by_value(&code_value).await? else {
			self.record_failure(&code_value, origin_ip, now, None).await;
			return Err(ProvisioningError::InvalidCode);
		};

		if code.status.is_claimable() && code.is_expired(now) {
			self.codes.mark_expired(&code.id, now).await?;
			self.record_failure(&code_value, origin_ip, now, Some(&code.id))
				.await;
			return Err(ProvisioningError::ExpiredCode);
		}

		if !code.status.is_claimable() {
			self.record_failure(&code_value, origin_ip, now, Some(&code.id))
				.await;
			return Err(ProvisioningError::CodeLocked);
		}

		let lockout_start = now - Duration::minutes(LOCKOUT_WINDOW_MINUTES);
		let failures = self
			.attempts
			.count_failures_since(&code_value, origin_ip, lockout_start)
			.await?;
		if failures >= LOCKOUT_MAX_FAILURES {
			let locked_until = now + Duration::minutes(LOCK_DURATION_MINUTES);
			self.codes.mark_locked(&code.id, locked_until, now).await?;
			self.record_failure(&code_value, origin_ip, now, Some(&code.id))
				.await;
			return Err(ProvisioningError::CodeLocked);
		}

		let Some(profile) = self.registry.lookup_operator(&code.issued_by).await? else {
			tracing::warn!(operator = %code.issued_by, "code owner has no registry profile");
			self.record_failure(&code_value, origin_ip, now, Some(&code.id))
				.await;
			return Err(ProvisioningError::UserNotFound(
				code.issued_by.as_str().to_string(),
			));
		};

		let token = generate_provisioning_token();
		let token_hash = hash_secret(&token);
		let nonce_hash = request.nonce.as_deref().map(hash_secret);
		let expires_at = now + Duration::seconds(TOKEN_TTL_SECONDS);

		let minted = self
			.tokens
			.mint_for_code(
				&code.id,
				NewToken {
					token_hash: &token_hash,
					expires_at,
					device_hint: request.device_hint.as_deref(),
					nonce_hash: nonce_hash.as_deref(),
					origin_ip,
				},
				now,
			)
			.await?;

		if minted.is_none() {
			// Lost the compare-and-swap to a concurrent writer. The response
			// is indistinguishable from an unknown code.
			self.record_failure(&code_value, origin_ip, now, None).await;
			return Err(ProvisioningError::InvalidCode);
		}

		if let Err(e) = self.attempts.record(&code_value, origin_ip, true, now).await {
			tracing::warn!(error = %e, "failed to append successful attempt");
		}

		tracing::info!(code_id = %code.id, origin = %origin_ip, "install code claimed");
		Ok(ClaimedToken {
			token,
			expires_in: TOKEN_TTL_SECONDS,
			user_id: profile.user_id,
			tenant_id: profile.tenant_id,
			account_label: profile.account_label,
		})
	}

	/// Register a device against a provisioning token.
	///
	/// Token validation is a pure read path. The code stays `claimed` so the
	/// same token supports heartbeat re-registration until it expires or is
	/// revoked.
	#[tracing::instrument(skip(self, bearer_token), fields(device_id = %device_id))]
	pub async fn register_device(
		&self,
		bearer_token: &str,
		device_id: &str,
	) -> Result<RegisteredDevice> {
		let now = self.clock.now();
		let digest = hash_secret(bearer_token);

		let Some(token) = self.tokens.find_by_hash(&digest).await? else {
			tracing::debug!("registration with unknown token");
			return Err(ProvisioningError::InvalidToken);
		};
		if !token.is_usable(now) {
			tracing::debug!(token_id = %token.id, "registration with expired or revoked token");
			return Err(ProvisioningError::InvalidToken);
		}

		let code = self
			.codes
			.get_code(&token.code_id)
			.await?
			.ok_or(ProvisioningError::InvalidToken)?;
		if !code.is_live(now) {
			tracing::debug!(code_id = %code.id, status = ?code.status, "owning code no longer live");
			return Err(ProvisioningError::InvalidToken);
		}

		let Some(profile) = self.registry.lookup_operator(&code.issued_by).await? else {
			tracing::warn!(operator = %code.issued_by, "device owner has no registry profile");
			return Err(ProvisioningError::DeviceOwnerNotFound(
				code.issued_by.as_str().to_string(),
			));
		};

		// The upsert is delegated before any local write so a registry
		// failure leaves no partial state here.
		let registry_device = self
			.registry
			.upsert_device(
				&profile.registry_username,
				device_id,
				token.device_hint.as_deref(),
			)
			.await?;

		let device = self
			.devices
			.upsert_provisioning(
				device_id,
				&profile.registry_username,
				token.device_hint.as_deref(),
				now,
			)
			.await?;
		self.tokens
			.record_registration(&token.id, device_id, now)
			.await?;

		tracing::info!(token_id = %token.id, device_id = %device_id, "device registered");
		Ok(RegisteredDevice {
			state: registry_device.state,
			device,
		})
	}

	/// Reconcile a fingerprint row with the hardware-confirmed identity.
	///
	/// Last writer wins: every *other* active row already holding the
	/// identity is soft-deleted, and the superseded row ids are logged for
	/// audit before the winner is overwritten.
	#[tracing::instrument(skip(self), fields(fingerprint = %fingerprint))]
	pub async fn report_final_identity(
		&self,
		fingerprint: &str,
		final_numeric_id: &str,
	) -> Result<()> {
		let now = self.clock.now();

		let Some(row) = self.devices.find_active_by_device_id(fingerprint).await? else {
			return Err(ProvisioningError::DeviceNotFound(fingerprint.to_string()));
		};

		if !is_valid_final_identity(final_numeric_id) {
			tracing::debug!("rejected malformed final identity");
			return Err(ProvisioningError::InvalidIdentityFormat);
		}

		let stale = self
			.devices
			.find_active_with_identity(final_numeric_id, &row.id)
			.await?;
		if !stale.is_empty() {
			let superseded: Vec<&str> = stale.iter().map(|r| r.id.as_str()).collect();
			tracing::info!(
				identity = %final_numeric_id,
				?superseded,
				"soft-deleting stale rows superseded by confirmed identity"
			);
			for record in &stale {
				self.devices.soft_delete(&record.id, now).await?;
			}
		}

		self.devices
			.assign_identity(&row.id, final_numeric_id, now)
			.await?;
		Ok(())
	}

	/// Revoke a provisioning token.
	///
	/// Idempotent and infallible from the caller's view: an unknown token is
	/// treated as already revoked, and storage failures are logged rather
	/// than surfaced. The owning code is marked `consumed` best-effort.
	#[tracing::instrument(skip(self, bearer_token))]
	pub async fn revoke_token(&self, bearer_token: &str) {
		let now = self.clock.now();
		let digest = hash_secret(bearer_token);

		let token = match self.tokens.find_by_hash(&digest).await {
			Ok(Some(token)) => token,
			Ok(None) => {
				tracing::debug!("revoke for unknown token treated as already revoked");
				return;
			}
			Err(e) => {
				tracing::error!(error = %e, "revoke lookup failed; caller still sees success");
				return;
			}
		};

		if let Err(e) = self.tokens.revoke(&token.id, now).await {
			tracing::error!(error = %e, token_id = %token.id, "token revoke write failed");
		}
		if let Err(e) = self.codes.mark_consumed(&token.code_id, now).await {
			tracing::error!(error = %e, code_id = %token.code_id, "failed to consume owning code");
		}
	}

	/// Assemble the post-registration configuration bundle.
	#[tracing::instrument(skip(self))]
	pub fn config_bundle(&self, delivery_context: Option<&str>) -> Result<ConfigBundle> {
		if let Some(context) = delivery_context {
			tracing::debug!(context = %context, "config bundle requested");
		}
		ConfigBundle::assemble(&self.settings.bundle)
			.map_err(|e| ProvisioningError::Database(e.into()))
	}

	/// Append a failed attempt and stamp the code row's attempt metadata.
	///
	/// Fire-and-forget: a ledger or metadata write failure never masks the
	/// rejection being returned to the caller.
	async fn record_failure(
		&self,
		code_value: &str,
		origin_ip: &str,
		now: DateTime<Utc>,
		code_id: Option<&CodeId>,
	) {
		if let Err(e) = self.attempts.record(code_value, origin_ip, false, now).await {
			tracing::warn!(error = %e, "failed to append attempt row");
		}
		if let Some(id) = code_id {
			if let Err(e) = self.codes.record_attempt_metadata(id, origin_ip, now).await {
				tracing::warn!(error = %e, code_id = %id, "failed to stamp attempt metadata");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bundle::ConnectionSettings;
	use chrono::TimeZone;
	use tether_provisioning_core::{CodeStatus, DeviceState, FixedClock, TokenStatus};
	use tether_server_db::testing::create_test_pool;
	use tether_server_registry::testing::StaticRegistry;

	fn start_time() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
	}

	fn test_settings() -> ServiceSettings {
		ServiceSettings {
			base_url: "https://tether.example.com".to_string(),
			reserved_operators: vec!["system".to_string()],
			bundle: BundleSettings {
				bundle_version: "2026.1".to_string(),
				connection: ConnectionSettings {
					gateway_host: "gateway.example.com".to_string(),
					gateway_port: 8883,
					heartbeat_interval_secs: 30,
					tls: true,
				},
			},
		}
	}

	struct Harness {
		service: ProvisioningService,
		clock: Arc<FixedClock>,
		registry: Arc<StaticRegistry>,
		pool: SqlitePool,
	}

	async fn harness(registry: StaticRegistry) -> Harness {
		let pool = create_test_pool().await;
		let clock = Arc::new(FixedClock::new(start_time()));
		let registry = Arc::new(registry);
		let service = ProvisioningService::new(
			pool.clone(),
			registry.clone(),
			clock.clone(),
			test_settings(),
		);
		Harness {
			service,
			clock,
			registry,
			pool,
		}
	}

	async fn default_harness() -> Harness {
		harness(StaticRegistry::new().with_operator("alice")).await
	}

	fn alice() -> OperatorId {
		OperatorId::new("alice")
	}

	// ------------------------------------------------------------------
	// Issue
	// ------------------------------------------------------------------

	#[tokio::test]
	async fn issue_returns_four_digit_code_with_ttl() {
		let h = default_harness().await;

		let issued = h.service.issue_code(&alice()).await.unwrap();

		assert_eq!(issued.code.len(), 4);
		assert!(issued.code.chars().all(|c| c.is_ascii_digit()));
		assert_eq!(issued.expires_at, start_time() + Duration::minutes(15));
		assert_eq!(
			issued.delivery_url,
			format!("https://tether.example.com/provision?code={}", issued.code)
		);

		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Unused);
		assert_eq!(row.issued_by, alice());
	}

	#[tokio::test]
	async fn issue_rejects_reserved_operator() {
		let h = harness(StaticRegistry::new().with_operator("system")).await;

		let err = h
			.service
			.issue_code(&OperatorId::new("system"))
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::OperatorNotFound(_)));
	}

	#[tokio::test]
	async fn issue_rejects_operator_unknown_to_registry() {
		let h = default_harness().await;

		let err = h
			.service
			.issue_code(&OperatorId::new("mallory"))
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::OperatorNotFound(_)));
	}

	#[tokio::test]
	async fn issue_fails_when_live_space_saturated() {
		let h = default_harness().await;
		let codes = CodeRepository::new(h.pool.clone());
		let expires = start_time() + Duration::minutes(15);

		// Fill every value in [0, 10000) with a live row.
		for v in 0..10_000u32 {
			codes
				.create_code(&format!("{v:04}"), &alice(), expires, start_time())
				.await
				.unwrap();
		}

		let err = h.service.issue_code(&alice()).await.unwrap_err();
		assert!(matches!(err, ProvisioningError::CapacityExceeded));
	}

	#[tokio::test]
	async fn issue_ignores_dead_rows_when_probing_collisions() {
		let h = default_harness().await;
		let codes = CodeRepository::new(h.pool.clone());

		// Every value has a row in history, but all of them are expired, so
		// none blocks a fresh draw.
		let expired = start_time() - Duration::minutes(1);
		for v in 0..10_000u32 {
			codes
				.create_code(&format!("{v:04}"), &alice(), expired, start_time())
				.await
				.unwrap();
		}

		h.service.issue_code(&alice()).await.unwrap();
	}

	// ------------------------------------------------------------------
	// Claim
	// ------------------------------------------------------------------

	fn claim(code: &str) -> ClaimRequest {
		ClaimRequest {
			code: code.to_string(),
			device_hint: None,
			nonce: None,
		}
	}

	#[tokio::test]
	async fn claim_exchanges_code_for_token() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();

		let claimed = h
			.service
			.claim_code(claim(&issued.code), "1.2.3.4")
			.await
			.unwrap();

		assert!(claimed.token.starts_with("tpt_"));
		assert_eq!(claimed.expires_in, 900);
		assert_eq!(claimed.user_id, "user-alice");
		assert_eq!(claimed.tenant_id, "tenant-alice");
		assert_eq!(claimed.account_label, "alice's account");

		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Claimed);

		let tokens = TokenRepository::new(h.pool.clone());
		let stored = tokens
			.find_by_hash(&hash_secret(&claimed.token))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stored.status, TokenStatus::Active);
		assert_eq!(stored.expires_at, start_time() + Duration::seconds(900));

		let attempts = AttemptRepository::new(h.pool.clone());
		let total = attempts
			.count_since("1.2.3.4", start_time() - Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(total, 1);
	}

	#[tokio::test]
	async fn claim_accepts_surrounding_whitespace() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();

		let request = claim(&format!("  {}\n", issued.code));
		h.service.claim_code(request, "1.2.3.4").await.unwrap();
	}

	#[tokio::test]
	async fn claim_of_claimed_code_succeeds_for_retry() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();

		let first = h.service.claim_code(claim(&issued.code), "1.2.3.4").await.unwrap();
		let second = h.service.claim_code(claim(&issued.code), "1.2.3.4").await.unwrap();
		assert_ne!(first.token, second.token);
	}

	#[tokio::test]
	async fn claim_rejects_malformed_code_without_ledger_row() {
		let h = default_harness().await;

		let err = h
			.service
			.claim_code(claim("12a4"), "1.2.3.4")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::InvalidCode));

		// Malformed input is rejected before the ledger is touched.
		let attempts = AttemptRepository::new(h.pool.clone());
		let total = attempts
			.count_since("1.2.3.4", start_time() - Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(total, 0);
	}

	#[tokio::test]
	async fn claim_of_unknown_code_records_failure() {
		let h = default_harness().await;

		let err = h
			.service
			.claim_code(claim("0000"), "1.2.3.4")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::InvalidCode));

		let attempts = AttemptRepository::new(h.pool.clone());
		let failures = attempts
			.count_failures_since("0000", "1.2.3.4", start_time() - Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(failures, 1);
	}

	#[tokio::test]
	async fn claim_of_expired_code_transitions_it() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();

		h.clock.advance(Duration::minutes(15));

		let err = h
			.service
			.claim_code(claim(&issued.code), "1.2.3.4")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::ExpiredCode));

		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Expired);
		assert_eq!(row.last_attempt_origin.as_deref(), Some("1.2.3.4"));
	}

	#[tokio::test]
	async fn claim_just_before_expiry_succeeds() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();

		h.clock.advance(Duration::minutes(15) - Duration::seconds(1));
		h.service.claim_code(claim(&issued.code), "1.2.3.4").await.unwrap();
	}

	#[tokio::test]
	async fn claim_rate_limit_rejects_twenty_first_attempt() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();
		let attempts = AttemptRepository::new(h.pool.clone());

		for _ in 0..20 {
			attempts
				.record("9999", "9.9.9.9", false, h.clock.now())
				.await
				.unwrap();
		}

		let err = h
			.service
			.claim_code(claim(&issued.code), "9.9.9.9")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::RateLimited));

		// No ledger append and no code state change.
		let total = attempts
			.count_since("9.9.9.9", start_time() - Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(total, 20);
		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Unused);
	}

	#[tokio::test]
	async fn claim_rate_limit_window_slides() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();
		let attempts = AttemptRepository::new(h.pool.clone());

		for _ in 0..20 {
			attempts
				.record("9999", "9.9.9.9", false, h.clock.now())
				.await
				.unwrap();
		}

		// Once the burst ages out of the 60s window the origin may claim.
		h.clock.advance(Duration::seconds(61));
		h.service.claim_code(claim(&issued.code), "9.9.9.9").await.unwrap();
	}

	#[tokio::test]
	async fn claim_locks_code_after_five_failures() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();
		let attempts = AttemptRepository::new(h.pool.clone());

		for _ in 0..5 {
			attempts
				.record(&issued.code, "5.5.5.5", false, h.clock.now())
				.await
				.unwrap();
		}

		let err = h
			.service
			.claim_code(claim(&issued.code), "5.5.5.5")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::CodeLocked));

		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Locked);
		assert_eq!(
			row.locked_until,
			Some(start_time() + Duration::minutes(15))
		);
	}

	#[tokio::test]
	async fn claim_lockout_is_per_origin() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();
		let attempts = AttemptRepository::new(h.pool.clone());

		for _ in 0..5 {
			attempts
				.record(&issued.code, "5.5.5.5", false, h.clock.now())
				.await
				.unwrap();
		}

		// A different origin is not affected by 5.5.5.5's failures.
		h.service.claim_code(claim(&issued.code), "6.6.6.6").await.unwrap();
	}

	#[tokio::test]
	async fn claim_of_locked_code_stays_rejected() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();
		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		codes
			.mark_locked(&row.id, start_time() + Duration::minutes(15), start_time())
			.await
			.unwrap();

		// Locked is terminal: even past locked_until the claim is rejected.
		h.clock.advance(Duration::minutes(20));
		let err = h
			.service
			.claim_code(claim(&issued.code), "1.2.3.4")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::CodeLocked));
	}

	#[tokio::test]
	async fn claim_fails_when_owner_missing_from_registry() {
		let h = default_harness().await;
		let codes = CodeRepository::new(h.pool.clone());
		codes
			.create_code(
				"7777",
				&OperatorId::new("ghost"),
				start_time() + Duration::minutes(15),
				start_time(),
			)
			.await
			.unwrap();

		let err = h
			.service
			.claim_code(claim("7777"), "1.2.3.4")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::UserNotFound(_)));

		let attempts = AttemptRepository::new(h.pool.clone());
		let failures = attempts
			.count_failures_since("7777", "1.2.3.4", start_time() - Duration::minutes(1))
			.await
			.unwrap();
		assert_eq!(failures, 1);
	}

	#[tokio::test]
	async fn claim_stores_hint_and_nonce_digest() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();

		let request = ClaimRequest {
			code: issued.code.clone(),
			device_hint: Some("living-room".to_string()),
			nonce: Some("n-123".to_string()),
		};
		let claimed = h.service.claim_code(request, "1.2.3.4").await.unwrap();

		let tokens = TokenRepository::new(h.pool.clone());
		let stored = tokens
			.find_by_hash(&hash_secret(&claimed.token))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stored.device_hint.as_deref(), Some("living-room"));
		assert_eq!(stored.nonce_hash.as_deref(), Some(hash_secret("n-123").as_str()));
	}

	// ------------------------------------------------------------------
	// Register
	// ------------------------------------------------------------------

	async fn issue_and_claim(h: &Harness) -> ClaimedToken {
		let issued = h.service.issue_code(&alice()).await.unwrap();
		h.service.claim_code(claim(&issued.code), "1.2.3.4").await.unwrap()
	}

	#[tokio::test]
	async fn register_creates_provisioning_device_row() {
		let h = default_harness().await;
		let claimed = issue_and_claim(&h).await;

		let registered = h
			.service
			.register_device(&claimed.token, "fp-001")
			.await
			.unwrap();

		assert_eq!(registered.state, "pending_adoption");
		assert_eq!(registered.device.device_id, "fp-001");
		assert_eq!(registered.device.owner_username, "alice");
		assert_eq!(registered.device.state, DeviceState::Provisioning);

		let upserts = h.registry.upserts.lock().unwrap();
		assert_eq!(upserts.as_slice(), &[("alice".to_string(), "fp-001".to_string())]);

		let tokens = TokenRepository::new(h.pool.clone());
		let stored = tokens
			.find_by_hash(&hash_secret(&claimed.token))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stored.used_by_device_id.as_deref(), Some("fp-001"));
		assert!(stored.last_seen_at.is_some());
	}

	#[tokio::test]
	async fn register_twice_is_heartbeat_not_duplicate() {
		let h = default_harness().await;
		let claimed = issue_and_claim(&h).await;

		let first = h.service.register_device(&claimed.token, "fp-001").await.unwrap();
		h.clock.advance(Duration::minutes(2));
		let second = h.service.register_device(&claimed.token, "fp-001").await.unwrap();

		assert_eq!(first.device.id, second.device.id);
		assert!(second.device.last_seen_at > first.device.last_seen_at);
	}

	#[tokio::test]
	async fn register_rejects_unknown_token() {
		let h = default_harness().await;

		let err = h
			.service
			.register_device("tpt_bogus", "fp-001")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::InvalidToken));
	}

	#[tokio::test]
	async fn register_rejects_expired_token() {
		let h = default_harness().await;
		let claimed = issue_and_claim(&h).await;

		h.clock.advance(Duration::seconds(901));

		let err = h
			.service
			.register_device(&claimed.token, "fp-001")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::InvalidToken));
	}

	#[tokio::test]
	async fn register_rejects_revoked_token() {
		let h = default_harness().await;
		let claimed = issue_and_claim(&h).await;

		h.service.revoke_token(&claimed.token).await;

		let err = h
			.service
			.register_device(&claimed.token, "fp-001")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::InvalidToken));
	}

	#[tokio::test]
	async fn register_registry_failure_leaves_no_local_state() {
		let mut registry = StaticRegistry::new().with_operator("alice");
		registry.fail_upserts = true;
		let h = harness(registry).await;
		let claimed = issue_and_claim(&h).await;

		let err = h
			.service
			.register_device(&claimed.token, "fp-001")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::Registry(_)));

		let devices = DeviceRepository::new(h.pool.clone());
		assert!(devices
			.find_active_by_device_id("fp-001")
			.await
			.unwrap()
			.is_none());

		let tokens = TokenRepository::new(h.pool.clone());
		let stored = tokens
			.find_by_hash(&hash_secret(&claimed.token))
			.await
			.unwrap()
			.unwrap();
		assert!(stored.used_by_device_id.is_none());
	}

	// ------------------------------------------------------------------
	// Reconcile
	// ------------------------------------------------------------------

	#[tokio::test]
	async fn reconcile_assigns_final_identity() {
		let h = default_harness().await;
		let claimed = issue_and_claim(&h).await;
		h.service.register_device(&claimed.token, "fp-001").await.unwrap();

		h.service
			.report_final_identity("fp-001", "987654321")
			.await
			.unwrap();

		let devices = DeviceRepository::new(h.pool.clone());
		let row = devices
			.find_active_by_device_id("987654321")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(row.state, DeviceState::Ready);
		assert!(devices
			.find_active_by_device_id("fp-001")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn reconcile_rejects_bad_identity_format() {
		let h = default_harness().await;
		let claimed = issue_and_claim(&h).await;
		h.service.register_device(&claimed.token, "fp-001").await.unwrap();

		for bad in ["12345", "1234567890123", "98765432a", ""] {
			let err = h
				.service
				.report_final_identity("fp-001", bad)
				.await
				.unwrap_err();
			assert!(
				matches!(err, ProvisioningError::InvalidIdentityFormat),
				"identity {bad:?} should be rejected"
			);
		}
	}

	#[tokio::test]
	async fn reconcile_rejects_unknown_fingerprint() {
		let h = default_harness().await;

		let err = h
			.service
			.report_final_identity("fp-none", "987654321")
			.await
			.unwrap_err();
		assert!(matches!(err, ProvisioningError::DeviceNotFound(_)));
	}

	#[tokio::test]
	async fn reconcile_last_writer_supersedes_stale_rows() {
		let h = harness(
			StaticRegistry::new()
				.with_operator("alice")
				.with_operator("bob"),
		)
		.await;

		// alice's device confirms identity 555666777 first.
		let claimed_a = issue_and_claim(&h).await;
		h.service.register_device(&claimed_a.token, "fp-a").await.unwrap();
		h.service
			.report_final_identity("fp-a", "555666777")
			.await
			.unwrap();

		// bob's device then confirms the same identity.
		let issued_b = h.service.issue_code(&OperatorId::new("bob")).await.unwrap();
		let claimed_b = h
			.service
			.claim_code(claim(&issued_b.code), "2.3.4.5")
			.await
			.unwrap();
		h.service.register_device(&claimed_b.token, "fp-b").await.unwrap();
		h.service
			.report_final_identity("fp-b", "555666777")
			.await
			.unwrap();

		let devices = DeviceRepository::new(h.pool.clone());
		let winner = devices
			.find_active_by_device_id("555666777")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(winner.owner_username, "bob");
	}

	// ------------------------------------------------------------------
	// Revoke
	// ------------------------------------------------------------------

	#[tokio::test]
	async fn revoke_consumes_code_and_kills_token() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();
		let claimed = h.service.claim_code(claim(&issued.code), "1.2.3.4").await.unwrap();

		h.service.revoke_token(&claimed.token).await;

		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Consumed);

		let tokens = TokenRepository::new(h.pool.clone());
		let stored = tokens
			.find_by_hash(&hash_secret(&claimed.token))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stored.status, TokenStatus::Revoked);
		assert_eq!(stored.expires_at, start_time());
	}

	#[tokio::test]
	async fn revoke_is_idempotent() {
		let h = default_harness().await;
		let issued = h.service.issue_code(&alice()).await.unwrap();
		let claimed = h.service.claim_code(claim(&issued.code), "1.2.3.4").await.unwrap();

		h.service.revoke_token(&claimed.token).await;
		let codes = CodeRepository::new(h.pool.clone());
		let after_first = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();

		h.clock.advance(Duration::minutes(1));
		h.service.revoke_token(&claimed.token).await;
		let after_second = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();

		// Second revoke mutates nothing.
		assert_eq!(after_first.updated_at, after_second.updated_at);
	}

	#[tokio::test]
	async fn revoke_of_unknown_token_is_silent_success() {
		let h = default_harness().await;
		h.service.revoke_token("tpt_never_issued").await;
	}

	// ------------------------------------------------------------------
	// Bundle + end to end
	// ------------------------------------------------------------------

	#[tokio::test]
	async fn config_bundle_reflects_settings() {
		let h = default_harness().await;

		let bundle = h.service.config_bundle(Some("post-registration")).unwrap();
		assert_eq!(bundle.bundle_version, "2026.1");
		assert_eq!(bundle.connection_settings.gateway_host, "gateway.example.com");
		assert_eq!(bundle.bundle_hash.len(), 64);
	}

	#[tokio::test]
	async fn full_provisioning_lifecycle() {
		let h = default_harness().await;

		let issued = h.service.issue_code(&alice()).await.unwrap();
		assert_eq!(issued.expires_at, start_time() + Duration::minutes(15));

		let claimed = h
			.service
			.claim_code(claim(&issued.code), "1.2.3.4")
			.await
			.unwrap();
		let codes = CodeRepository::new(h.pool.clone());
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Claimed);

		let registered = h
			.service
			.register_device(&claimed.token, "fp-001")
			.await
			.unwrap();
		assert_eq!(registered.device.device_id, "fp-001");
		assert_eq!(registered.device.state, DeviceState::Provisioning);

		h.service
			.report_final_identity("fp-001", "987654321")
			.await
			.unwrap();
		let devices = DeviceRepository::new(h.pool.clone());
		let device = devices
			.find_active_by_device_id("987654321")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(device.state, DeviceState::Ready);

		h.service.revoke_token(&claimed.token).await;
		let row = codes.find_latest_by_value(&issued.code).await.unwrap().unwrap();
		assert_eq!(row.status, CodeStatus::Consumed);
	}
}

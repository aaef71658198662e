// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret codec: install code and provisioning token generation, at-rest
//! hashing, and input validation.
//!
//! All functions here are pure over a cryptographic RNG. Nothing in this
//! module persists anything; raw secrets are only ever compared by their
//! [`hash_secret`] digest after generation.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Recognizable prefix on every provisioning token.
///
/// The prefix lets log scrubbers and support staff identify the credential
/// class without revealing anything about its value.
pub const TOKEN_PREFIX: &str = "tpt_";

/// Number of random bytes behind each provisioning token (256 bits).
const TOKEN_SECRET_BYTES: usize = 32;

/// Number of digits in an install code.
const INSTALL_CODE_DIGITS: usize = 4;

/// Generate a 4-digit zero-padded install code.
///
/// Sampled uniformly over `[0, 10000)` from the OS CSPRNG. The value
/// carries ~13 bits of entropy; guessing resistance comes from rate limiting
/// and per-code lockout, not from the keyspace.
pub fn generate_install_code() -> String {
	let mut rng = rand::rngs::OsRng;
	// next_u32 modulo a power-of-ten divisor of 2^32's range would be biased;
	// rejection sample the top of the range instead.
	let bound = 10_000u32;
	let zone = u32::MAX - (u32::MAX % bound);
	loop {
		let v = rng.next_u32();
		if v < zone {
			return format!("{:04}", v % bound);
		}
	}
}

/// Generate an opaque provisioning token: [`TOKEN_PREFIX`] plus 256 bits of
/// CSPRNG output, URL-safe base64 encoded without padding.
pub fn generate_provisioning_token() -> String {
	let mut bytes = [0u8; TOKEN_SECRET_BYTES];
	rand::rngs::OsRng.fill_bytes(&mut bytes);
	format!(
		"{}{}",
		TOKEN_PREFIX,
		base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
	)
}

/// Deterministic SHA-256 hex digest used for all at-rest secret comparisons.
pub fn hash_secret(secret: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(secret.as_bytes());
	hex::encode(hasher.finalize())
}

/// Normalize a submitted install code to exactly 4 ASCII digits.
///
/// Returns `None` for anything that is not, after trimming surrounding
/// whitespace, exactly 4 digits. No padding or truncation is applied; a
/// malformed code is rejected outright rather than coerced.
pub fn normalize_install_code(raw: &str) -> Option<String> {
	let trimmed = raw.trim();
	if trimmed.len() == INSTALL_CODE_DIGITS && trimmed.chars().all(|c| c.is_ascii_digit()) {
		Some(trimmed.to_string())
	} else {
		None
	}
}

/// Validate a final numeric device identity: 6 to 12 ASCII digits.
pub fn is_valid_final_identity(identity: &str) -> bool {
	(6..=12).contains(&identity.len()) && identity.chars().all(|c| c.is_ascii_digit())
}

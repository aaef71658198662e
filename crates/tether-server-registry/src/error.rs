// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

/// Errors from the external device registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("registry request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("registry returned {status}: {message}")]
	Api { status: u16, message: String },

	#[error("registry response could not be decoded: {0}")]
	Decode(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

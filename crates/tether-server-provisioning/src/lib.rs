// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device provisioning services for the Tether server.
//!
//! Glues the [`tether_server_db`] repositories, the [`tether_server_registry`]
//! seam, and the [`tether_provisioning_core`] codec into the five
//! provisioning operations plus the config bundle read path. The HTTP layer
//! in `tether-server` is a thin shell around [`ProvisioningService`].

pub mod bundle;
pub mod error;
pub mod service;

pub use bundle::{BundleSettings, ConfigBundle, ConnectionSettings};
pub use error::ProvisioningError;
pub use service::{
	ClaimRequest, ClaimedToken, IssuedCode, ProvisioningService, RegisteredDevice,
	ServiceSettings,
};

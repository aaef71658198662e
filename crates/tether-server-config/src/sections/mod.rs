// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections, one module per concern.
//!
//! Each section comes in two shapes: the resolved runtime struct and a
//! `*Layer` counterpart where every field is optional, used for merging
//! sources by precedence before `finalize()` fills in defaults.

mod bundle;
mod database;
mod http;
mod logging;
mod provisioning;
mod registry;

pub use bundle::{BundleConfig, BundleConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use provisioning::{ProvisioningConfig, ProvisioningConfigLayer};
pub use registry::{RegistryConfig, RegistryConfigLayer};

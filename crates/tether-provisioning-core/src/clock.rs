// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Injected clock abstraction.
//!
//! Expiry and lockout are evaluated lazily against wall-clock time at each
//! access; every comparison goes through a [`Clock`] so tests can simulate
//! TTL expiry deterministically instead of sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current instant for all lifecycle comparisons.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Settable clock for tests.
///
/// Shipped outside `#[cfg(test)]` so downstream crates can drive TTL and
/// lockout windows in their own test suites.
#[derive(Debug)]
pub struct FixedClock {
	now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
	pub fn new(now: DateTime<Utc>) -> Self {
		Self { now: Mutex::new(now) }
	}

	/// Move the clock forward (or backward, with a negative duration).
	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().expect("clock mutex poisoned");
		*now += by;
	}

	pub fn set(&self, to: DateTime<Utc>) {
		let mut now = self.now.lock().expect("clock mutex poisoned");
		*now = to;
	}
}

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().expect("clock mutex poisoned")
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timestamp column helpers.
//!
//! Columns hold fixed-width RFC 3339 UTC strings (microsecond precision,
//! `Z` suffix) so that `ORDER BY` and window comparisons on TEXT columns
//! agree with chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DbError;

pub(crate) fn to_db(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db(raw: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid timestamp '{raw}': {e}")))
}

pub(crate) fn opt_from_db(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
	raw.map(|s| from_db(&s)).transpose()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn roundtrips() {
		let now = Utc::now();
		let parsed = from_db(&to_db(now)).unwrap();
		// Microsecond precision truncates nanoseconds.
		assert!((now - parsed).num_microseconds().unwrap().abs() < 1);
	}

	#[test]
	fn string_order_matches_time_order() {
		let base = Utc::now();
		let earlier = to_db(base);
		let later = to_db(base + Duration::microseconds(1));
		assert!(earlier < later);

		let much_later = to_db(base + Duration::days(400));
		assert!(later < much_later);
	}

	#[test]
	fn rejects_garbage() {
		assert!(from_db("yesterday").is_err());
		assert!(opt_from_db(Some("nope".to_string())).is_err());
		assert_eq!(opt_from_db(None).unwrap(), None);
	}
}

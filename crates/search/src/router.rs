//! Daily index routing.

use chrono::{DateTime, Utc};

/// Format the index name for a point in time: `<prefix>-YYYY.MM.DD` (UTC).
///
/// The caller passes the clock reading, so rollover at UTC midnight is
/// exact and needs no scheduling: a run spanning midnight starts writing
/// to the new day's index on its next event.
pub fn resolve(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, at.format("%Y.%m.%d"))
}

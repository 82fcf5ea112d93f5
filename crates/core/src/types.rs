/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque fixed-length task identifier.
pub type TaskId = String;

/// Convert epoch milliseconds (as persisted by the registry) into a [`Timestamp`].
///
/// Out-of-range values clamp to the Unix epoch.
pub fn timestamp_from_millis(millis: i64) -> Timestamp {
    chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

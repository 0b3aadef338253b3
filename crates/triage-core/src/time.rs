/// Milliseconds since UNIX epoch. All pipeline timestamps are derived from
/// the snapshot capture instant, never from a wall clock read mid-run.
pub type EpochMs = i64;

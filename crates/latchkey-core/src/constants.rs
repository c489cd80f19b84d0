//! Fixed resource bounds for the lock profiling model.
//!
//! # Tiger Style
//!
//! Every collection has an explicit upper bound so a runaway request cannot
//! exhaust memory in the profiler or the validators.

/// Maximum length of a lock key in bytes.
pub const MAX_LOCK_KEY_SIZE: usize = 1024;

/// Maximum length of a request entry URI in bytes.
pub const MAX_REQUEST_URI_SIZE: usize = 8192;

/// Maximum number of events held by a single request collection.
pub const MAX_EVENTS_PER_REQUEST: usize = 100_000;

/// File name written by the JSON report sink.
pub const REPORT_FILE_NAME: &str = "profiler_map.json";

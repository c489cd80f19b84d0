//! Report handed to a [`crate::ReportSink`].

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::map::ProfileMap;
use crate::violation::Violation;

/// Call map plus its validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// When the report was assembled.
    pub generated_at: DateTime<Utc>,
    /// Grouped events.
    pub map: ProfileMap,
    /// First finding in group-iteration order, if any.
    pub violation: Option<Violation>,
    /// Every finding, in group-iteration order.
    pub violations: Vec<Violation>,
}

impl Report {
    /// Assemble a report; the headline violation is the first of `violations`.
    pub fn new(map: ProfileMap, violations: Vec<Violation>) -> Self {
        Self {
            generated_at: Utc::now(),
            map,
            violation: violations.first().cloned(),
            violations,
        }
    }

    /// Whether validation found nothing.
    pub fn is_clean(&self) -> bool {
        self.violation.is_none()
    }
}

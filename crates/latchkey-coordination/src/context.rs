//! Request-scoped profiling context.
//!
//! One context per logical request. It is owned by the request's
//! [`crate::Profiler`] and dropped with it; there is no process-wide
//! accumulator.

use chrono::DateTime;
use chrono::Utc;
use latchkey_core::RequestIdentity;
use latchkey_core::constants::MAX_REQUEST_URI_SIZE;

use crate::error::ProfilerError;

/// Entry point and start instant of one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_uri: String,
    initiated_at: DateTime<Utc>,
    identity: RequestIdentity,
}

impl RequestContext {
    /// Start a request entered at `request_uri` now.
    pub fn new(request_uri: impl Into<String>) -> Result<Self, ProfilerError> {
        Self::started_at(request_uri, Utc::now())
    }

    /// Context for a request that started at a known instant.
    pub fn started_at(request_uri: impl Into<String>, initiated_at: DateTime<Utc>) -> Result<Self, ProfilerError> {
        let request_uri = request_uri.into();
        if request_uri.is_empty() {
            return Err(ProfilerError::InvalidRequestUri {
                reason: "empty".to_string(),
            });
        }
        if request_uri.len() > MAX_REQUEST_URI_SIZE {
            return Err(ProfilerError::InvalidRequestUri {
                reason: format!("{} bytes exceeds {}", request_uri.len(), MAX_REQUEST_URI_SIZE),
            });
        }
        let identity = RequestIdentity::derive(&request_uri, initiated_at);
        Ok(Self {
            request_uri,
            initiated_at,
            identity,
        })
    }

    /// Entry URI.
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    /// When the request started.
    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.initiated_at
    }

    /// Grouping identity.
    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }
}

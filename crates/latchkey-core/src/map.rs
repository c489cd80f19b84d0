//! Grouping of stored events into the per-request call map.
//!
//! The map has two levels, entry URI and then request identity, and keeps
//! both levels in order of first appearance in the store listing. Events
//! inside a group stay in store order.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::constants::MAX_EVENTS_PER_REQUEST;
use crate::event::EventCollection;
use crate::event::ProfileEvent;
use crate::event::RequestIdentity;

/// All requests recorded under one entry URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UriGroup {
    /// Entry URI shared by every request below.
    pub request_uri: String,
    /// One collection per request identity, in first-appearance order.
    pub requests: Vec<EventCollection>,
}

/// RequestURI → RequestIdentity → ordered events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileMap {
    uris: Vec<UriGroup>,
}

impl ProfileMap {
    /// Group an ordered event listing, bounding each request at
    /// [`MAX_EVENTS_PER_REQUEST`].
    pub fn from_events<I>(events: I) -> Self
    where I: IntoIterator<Item = ProfileEvent> {
        Self::from_events_bounded(events, MAX_EVENTS_PER_REQUEST)
    }

    /// Group an ordered event listing, keeping at most `max_per_request`
    /// events per request.
    ///
    /// A request over the bound keeps its first `max_per_request` events and
    /// counts the rest in [`EventCollection::dropped`]; other requests are
    /// unaffected.
    pub fn from_events_bounded<I>(events: I, max_per_request: usize) -> Self
    where I: IntoIterator<Item = ProfileEvent> {
        let mut uris: Vec<UriGroup> = Vec::new();
        let mut uri_index: HashMap<String, usize> = HashMap::new();
        let mut request_index: HashMap<(usize, RequestIdentity), usize> = HashMap::new();

        for event in events {
            let uri_pos = match uri_index.get(event.request_uri()) {
                Some(pos) => *pos,
                None => {
                    uris.push(UriGroup {
                        request_uri: event.request_uri().to_string(),
                        requests: Vec::new(),
                    });
                    uri_index.insert(event.request_uri().to_string(), uris.len() - 1);
                    uris.len() - 1
                }
            };

            let group = &mut uris[uri_pos];
            let lookup = (uri_pos, event.request_identity().clone());
            let request_pos = match request_index.get(&lookup) {
                Some(pos) => *pos,
                None => {
                    group.requests.push(EventCollection::new(event.request_identity().clone()));
                    request_index.insert(lookup, group.requests.len() - 1);
                    group.requests.len() - 1
                }
            };

            let collection = &mut group.requests[request_pos];
            if collection.append_bounded(event, max_per_request).is_err() {
                if collection.dropped() == 0 {
                    warn!(
                        request = %collection.request_identity(),
                        max = max_per_request,
                        "request collection full, dropping later events"
                    );
                }
                collection.note_dropped();
            }
        }

        Self { uris }
    }

    /// URI groups in first-appearance order.
    pub fn uri_groups(&self) -> &[UriGroup] {
        &self.uris
    }

    /// Every request collection, in group-iteration order.
    pub fn collections(&self) -> impl Iterator<Item = &EventCollection> {
        self.uris.iter().flat_map(|g| g.requests.iter())
    }

    /// Look up the collection for a request identity.
    pub fn collection(&self, identity: &RequestIdentity) -> Option<&EventCollection> {
        self.collections().find(|c| c.request_identity() == identity)
    }

    /// Number of distinct request identities.
    pub fn request_count(&self) -> usize {
        self.uris.iter().map(|g| g.requests.len()).sum()
    }

    /// Total number of events across all groups.
    pub fn event_count(&self) -> usize {
        self.collections().map(EventCollection::len).sum()
    }

    /// Whether no events were recorded.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

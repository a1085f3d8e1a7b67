//! The four capability adapters wrapping a loaded plugin's vtable. Each
//! adapter is conditionally present on [`crate::plugin::Plugin`] depending
//! on the bits `plugin_get_capabilities` returned at load time.

pub mod extraction;
pub mod parsing;
pub mod sourcing;

use crate::descriptor::SourceCompatibility;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One event as seen by a capability adapter: entirely opaque beyond its
/// source/type tags, since payload interpretation is the event pipeline's
/// concern, not this crate's.
#[derive(Debug, Clone, Copy)]
pub struct EventRef<'a> {
    /// `None` means the pipeline has not resolved a source for this event;
    /// such events must be rejected outright.
    pub source_id: Option<u32>,
    pub source_name: &'a str,
    pub event_type: u16,
    pub payload: &'a [u8],
}

/// Tracks, per numeric source id, whether that source's name was found
/// compatible with a plugin's advertised source set. Memoized because
/// resolving a source id to a name is assumed external and comparatively
/// costly, and the same id recurs on every event from that source.
#[derive(Debug, Default)]
pub(crate) struct CompatibilityCache {
    by_source_id: Mutex<HashMap<u32, bool>>,
}

impl CompatibilityCache {
    /// Unset source is rejected by the caller before this is reached; here
    /// we check the event type set first (cheap, no memoization needed)
    /// and then the memoized source-name check.
    pub(crate) fn is_compatible(&self, event: &EventRef<'_>, compat: &SourceCompatibility) -> bool {
        let Some(source_id) = event.source_id else { return false };
        if !compat.accepts_event_type(event.event_type) {
            return false;
        }
        let mut cache = self.by_source_id.lock();
        *cache.entry(source_id).or_insert_with(|| compat.accepts_source(event.source_name))
    }
}

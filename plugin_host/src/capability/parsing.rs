//! Parsing adapter: mutates shared tables in response to
//! events.

use super::{CompatibilityCache, EventRef};
use crate::descriptor::SourceCompatibility;
use crate::error::PluginError;
use crate::plugin::PluginCore;
use crate::tables::vtable::TableOwner;
use crate::tables::{vtable as table_vtable, TableRegistry};
use plugin_abi::{ss_plugin_event, SS_PLUGIN_SUCCESS};
use std::sync::Arc;

/// Wraps a plugin's PARSING capability. Holds its own compatibility cache
/// since, unlike extraction, parsing is invoked directly by the event
/// pipeline rather than through one filter-expression node per field; a
/// plugin has exactly one `ParsingAdapter`.
pub struct ParsingAdapter {
    core: Arc<PluginCore>,
    compat: SourceCompatibility,
    cache: CompatibilityCache,
    tables: Arc<TableRegistry>,
}

impl ParsingAdapter {
    pub(crate) fn new(core: Arc<PluginCore>, compat: SourceCompatibility, tables: Arc<TableRegistry>) -> Self {
        Self { core, compat, cache: CompatibilityCache::default(), tables }
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    /// Filters by source/event-type compatibility identically to the
    /// extraction path, then calls `parse_event`. Returns `Ok(false)` for a
    /// silent, non-error rejection: an incompatible event is not a failure.
    pub fn parse_event(&self, event: &EventRef<'_>) -> Result<bool, PluginError> {
        if !self.cache.is_compatible(event, &self.compat) {
            return Ok(false);
        }
        let state = self.core.state()?;
        let parse_event = self
            .core
            .api
            .parse_event
            .ok_or_else(|| PluginError::compatibility(self.name(), "plugin does not declare PARSING"))?;

        let owner = TableOwner { registry: &self.tables, plugin_name: self.name(), published: &self.core.published_tables };
        let table_init_input = table_vtable::build_table_init_input(&owner);
        let raw_event = ss_plugin_event { len: event.payload.len() as u32, data: event.payload.as_ptr() };

        let rc = unsafe { parse_event(state, &raw_event as *const _, &table_init_input as *const _) };
        if rc == SS_PLUGIN_SUCCESS {
            Ok(true)
        } else {
            Err(PluginError::runtime(self.name(), self.core.last_error()))
        }
    }
}

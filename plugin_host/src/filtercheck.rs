//! Field-check adapter: bridges one plugin field to the host's
//! filter/expression engine.

use crate::capability::extraction::{ExtractedValue, FieldRequest};
use crate::capability::{CompatibilityCache, EventRef};
use crate::error::PluginError;
use crate::fields::{self, FieldArg, FieldFlags, FieldValueType};
use crate::plugin::Plugin;
use std::sync::Arc;

/// A per-expression-node object binding a plugin, a selected field, and a
/// parsed argument, plus its own lazily-populated source-compatibility
/// cache. One instance is created per occurrence of a field
/// reference in a compiled filter expression.
pub struct FilterCheckAdapter {
    plugin: Arc<Plugin>,
    field_id: u32,
    field_name: String,
    arg: FieldArg,
    value_type: FieldValueType,
    is_list: bool,
    cache: CompatibilityCache,
}

impl FilterCheckAdapter {
    /// Parses `token` (e.g. `plugin.foo[42]`) against `plugin`'s declared
    /// fields.
    pub fn new(plugin: Arc<Plugin>, token: &str) -> Result<Self, PluginError> {
        let plugin_name = plugin.descriptor().name.clone();
        let extraction = plugin
            .extraction()
            .ok_or_else(|| PluginError::compatibility(&plugin_name, "plugin does not declare EXTRACTION"))?;

        let (name, raw_arg) = fields::split_token(token);
        let field_id = extraction
            .fields()
            .position_of(name)
            .ok_or_else(|| PluginError::descriptor(&plugin_name, format!("no such field {name:?}")))?;
        let field = extraction.fields().get(field_id).expect("position_of guarantees presence");
        let arg = fields::parse_arg(&plugin_name, field, raw_arg)?;

        Ok(Self {
            field_id,
            field_name: field.name.clone(),
            arg,
            value_type: field.value_type,
            is_list: field.flags.contains(FieldFlags::IS_LIST),
            plugin,
            cache: CompatibilityCache::default(),
        })
    }

    /// Evaluates this field against one event. A `None` result covers both
    /// a silent compatibility rejection and the plugin genuinely having no
    /// value for this event; the filter engine treats both the same way.
    pub fn extract(&self, event: &EventRef<'_>) -> Result<Option<ExtractedValue>, PluginError> {
        let extraction = self.plugin.extraction().expect("constructed only when EXTRACTION is declared");
        let Some(compat) = self.plugin.descriptor().extract_compat.as_ref() else {
            return Ok(None);
        };
        if !self.cache.is_compatible(event, compat) {
            return Ok(None);
        }

        let request = FieldRequest {
            field_id: self.field_id,
            field_name: self.field_name.clone(),
            arg: self.arg.clone(),
            value_type: self.value_type,
            is_list: self.is_list,
        };
        let mut results = extraction.extract_fields(event.payload, std::slice::from_ref(&request))?;
        Ok(results.pop().flatten())
    }
}

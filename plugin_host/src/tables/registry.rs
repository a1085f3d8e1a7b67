//! Process-scoped registry of all tables, native or foreign, keyed by name:
//! table names are unique across the whole process, not just within one
//! plugin.

use super::{BaseTable, NativeTable};
use crate::error::PluginError;
use crate::fields::FieldValueType;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds every table known to the host, whether created by the host itself
/// or published by a loaded plugin. A single registry is shared by every
/// plugin instance in the process, because tables are how plugins exchange
/// state with each other and with the host.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: Mutex<HashMap<String, Arc<dyn BaseTable>>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a host-native table, failing if the name is
    /// already taken.
    pub fn create_native(&self, name: &str, key_type: FieldValueType) -> Result<Arc<dyn BaseTable>, PluginError> {
        let mut tables = self.tables.lock();
        if tables.contains_key(name) {
            return Err(PluginError::descriptor("host", format!("table {name:?} is already registered")));
        }
        let table: Arc<dyn BaseTable> = Arc::new(NativeTable::new(name, key_type));
        tables.insert(name.to_string(), Arc::clone(&table));
        log::debug!("registered native table {name:?} (key type {key_type})");
        Ok(table)
    }

    /// Registers a table implementation (native or foreign) that already
    /// exists, failing if the name is already taken.
    pub fn register(&self, plugin: &str, table: Arc<dyn BaseTable>) -> Result<(), PluginError> {
        let mut tables = self.tables.lock();
        if tables.contains_key(table.name()) {
            return Err(PluginError::descriptor(plugin, format!("table {:?} is already registered", table.name())));
        }
        log::debug!("plugin {plugin:?} registered table {:?}", table.name());
        tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Removes a table by name, e.g. when its publishing plugin is destroyed.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn BaseTable>> {
        let removed = self.tables.lock().remove(name);
        if removed.is_some() {
            log::debug!("unregistered table {name:?}");
        } else {
            log::warn!("attempted to unregister unknown table {name:?}");
        }
        removed
    }

    /// Looks up a table by name, verifying the caller's expected key type
    /// matches: a plugin accessing a table it did not define must agree on
    /// the table's key type or be rejected.
    pub fn get(&self, plugin: &str, name: &str, expected_key_type: FieldValueType) -> Result<Arc<dyn BaseTable>, PluginError> {
        let table = self
            .tables
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::descriptor(plugin, format!("no such table {name:?}")))?;
        if table.key_type() != expected_key_type {
            return Err(PluginError::compatibility(
                plugin,
                format!("table {name:?} has key type {}, expected {}", table.key_type(), expected_key_type),
            ));
        }
        Ok(table)
    }

    /// Lists every registered table's name and key type, for the
    /// `list_tables` surface plugins see at init time.
    pub fn list(&self) -> Vec<(String, FieldValueType)> {
        self.tables.lock().values().map(|t| (t.name().to_string(), t.key_type())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_rejected() {
        let reg = TableRegistry::new();
        reg.create_native("procs", FieldValueType::Uint64).unwrap();
        let err = reg.create_native("procs", FieldValueType::String).unwrap_err();
        assert!(matches!(err, PluginError::Descriptor { .. }));
    }

    #[test]
    fn key_type_mismatch_rejected() {
        let reg = TableRegistry::new();
        reg.create_native("procs", FieldValueType::Uint64).unwrap();
        let err = reg.get("someplugin", "procs", FieldValueType::String).unwrap_err();
        assert!(matches!(err, PluginError::Compatibility { .. }));
    }

    #[test]
    fn lookup_succeeds_with_matching_key_type() {
        let reg = TableRegistry::new();
        reg.create_native("procs", FieldValueType::Uint64).unwrap();
        let table = reg.get("someplugin", "procs", FieldValueType::Uint64).unwrap();
        assert_eq!(table.name(), "procs");
    }
}

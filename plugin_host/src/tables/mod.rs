//! The table registry and the dual C-vtable bridge that makes host-native
//! and plugin-owned tables interchangeable.

mod foreign;
pub mod marshal;
mod native;
pub mod registry;
pub mod value;
pub mod vtable;

pub use foreign::ForeignTable;
pub use native::NativeTable;
pub use registry::TableRegistry;
pub use value::TableValue;

use crate::error::PluginError;
use crate::fields::FieldValueType;
use std::fmt;

/// A row handle, opaque to everything except the table that produced it.
/// Native tables use an index into their row store; foreign tables use the
/// raw pointer the plugin handed back from `create_table_entry`/
/// `get_table_entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle(pub usize);

/// Metadata about one column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub value_type: FieldValueType,
}

/// The common surface every table (whether implemented natively in Rust or
/// bridged from a plugin's own C vtable) exposes to the registry, to the
/// parsing/extraction adapters, and to the vtable bridge that re-exports it
/// to other plugins.
///
/// A consumer holds `Arc<dyn BaseTable>` and cannot tell whether the data
/// lives in this process's own memory or behind another plugin's FFI
/// vtable.
pub trait BaseTable: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn key_type(&self) -> FieldValueType;

    fn fields(&self) -> Vec<FieldInfo>;
    fn get_or_create_field(&self, name: &str, value_type: FieldValueType) -> Result<(), PluginError>;

    fn size(&self) -> u64;
    fn lookup(&self, key: &TableValue) -> Option<RowHandle>;
    /// Calls `visit` once per row with its key; stops early if `visit`
    /// returns `false`.
    fn iterate(&self, visit: &mut dyn FnMut(&TableValue, RowHandle) -> bool);

    fn read_field(&self, row: RowHandle, field: &str) -> Result<TableValue, PluginError>;

    fn create_entry(&self, key: TableValue) -> Result<RowHandle, PluginError>;
    fn erase_entry(&self, key: &TableValue) -> Result<(), PluginError>;
    fn write_field(&self, row: RowHandle, field: &str, value: TableValue) -> Result<(), PluginError>;
    fn clear(&self) -> Result<(), PluginError>;

    /// Called once the table's publishing plugin is destroyed, so further
    /// access is refused. Host-native tables have no such owner and ignore
    /// this.
    fn invalidate(&self) {}
}

//! A host for dynamically-loaded plugins that extend an event-processing
//! pipeline with event sourcing, field extraction, payload parsing, and
//! shared state tables.
//!
//! A [`Plugin`] is produced by [`Loader`] from either an on-disk shared
//! library or, for tests, an in-process [`plugin_abi::plugin_api`] vtable.
//! Once initialized, its declared capabilities are reached through
//! [`Plugin::sourcing`], [`Plugin::extraction`], and [`Plugin::parsing`];
//! [`FilterCheckAdapter`] binds one filter-expression field reference to a
//! plugin's extraction capability. Tables a plugin publishes, and tables
//! the host creates for plugins to share, both live behind
//! [`TableRegistry`] as `Arc<dyn BaseTable>`, indistinguishable to a reader
//! regardless of which side of the FFI boundary backs them.

#![warn(missing_debug_implementations)]

pub use plugin_abi as api;

pub mod capability;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fields;
pub mod filtercheck;
pub mod loader;
pub mod plugin;
pub mod registry;
pub mod tables;
pub mod version;

pub use crate::descriptor::{Capability, CapabilitySet, PluginDescriptor, SourceCompatibility};
pub use crate::error::{PluginError, Result};
pub use crate::filtercheck::FilterCheckAdapter;
pub use crate::loader::{Loader, PluginSource};
pub use crate::plugin::Plugin;
pub use crate::tables::{BaseTable, TableRegistry, TableValue};
pub use crate::version::SupportedApiRange;

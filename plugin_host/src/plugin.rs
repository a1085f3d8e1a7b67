//! The top-level plugin handle: descriptor, capability adapters, and the
//! FFI state handle under one lifecycle.

use crate::capability::extraction::ExtractionAdapter;
use crate::capability::parsing::ParsingAdapter;
use crate::capability::sourcing::SourcingAdapter;
use crate::config;
use crate::descriptor::{Capability, PluginDescriptor, SourceCompatibility};
use crate::error::PluginError;
use crate::fields::FieldCatalog;
use crate::registry::LoadedLibraryRegistry;
use crate::tables::vtable::TableOwner;
use crate::tables::{vtable as table_vtable, TableRegistry};
use plugin_abi::{ss_plugin_init_input, ss_plugin_owner_t, ss_plugin_t, SS_PLUGIN_SUCCESS};
use std::ffi::CString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};

/// The raw, FFI-facing core every capability adapter shares a reference to:
/// the bound function table, the current state pointer, and enough
/// identity to prefix error messages with the plugin name.
pub(crate) struct PluginCore {
    pub(crate) name: String,
    pub(crate) api: plugin_abi::plugin_api,
    state: AtomicPtr<ss_plugin_t>,
    destroyed: AtomicBool,
    /// Names of tables this plugin has published via `add_table`, so they
    /// can be invalidated and unregistered when the plugin is destroyed.
    pub(crate) published_tables: Mutex<Vec<String>>,
}

// SAFETY: the raw state pointer and function table are only ever touched
// through calls into the plugin's own exported functions, and the host's
// own discipline is synchronous, single-caller-thread-per-call;
// nothing here assumes multi-threaded plugin internals.
unsafe impl Send for PluginCore {}
unsafe impl Sync for PluginCore {}

impl PluginCore {
    pub(crate) fn last_error(&self) -> String {
        let Some(f) = self.api.plugin_get_last_error else { return String::new() };
        let ptr = self.state.load(Ordering::SeqCst);
        let raw = unsafe { f(ptr) };
        if raw.is_null() {
            String::new()
        } else {
            unsafe { std::ffi::CStr::from_ptr(raw) }.to_string_lossy().into_owned()
        }
    }

    /// The live state pointer, or a `StateError` once the plugin has been
    /// destroyed: no plugin-owned pointer may be dereferenced after
    /// destroy.
    pub(crate) fn state(&self) -> Result<*mut ss_plugin_t, PluginError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(PluginError::state(&self.name, "operation attempted after destroy"));
        }
        Ok(self.state.load(Ordering::SeqCst))
    }

    /// Marks the core destroyed and returns the state pointer to release,
    /// unless it was already destroyed.
    fn mark_destroyed(&self) -> Option<*mut ss_plugin_t> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(self.state.swap(std::ptr::null_mut(), Ordering::SeqCst))
        }
    }

    /// Drains and returns the names of tables this plugin has published.
    fn take_published_tables(&self) -> Vec<String> {
        std::mem::take(&mut *self.published_tables.lock().unwrap())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Loaded,
    Initialized,
    Destroyed,
}

/// A loaded plugin, combining its identity, its capability adapters, and
/// its lifecycle state.
pub struct Plugin {
    pub(crate) core: Arc<PluginCore>,
    descriptor: PluginDescriptor,
    lifecycle: Mutex<Lifecycle>,
    tables: Arc<TableRegistry>,
    sourcing: Option<SourcingAdapter>,
    extraction: Option<ExtractionAdapter>,
    parsing: Option<ParsingAdapter>,
    // Kept alive only to hold the dlopen'd library open for the plugin's
    // lifetime; `None` for plugins constructed from an in-process vtable.
    _library: Option<libloading::Library>,
    // The loader's open-library bookkeeping to release on drop, mirroring
    // `_library`'s lifetime; both are `None` together.
    loaded_from: Option<(Arc<LoadedLibraryRegistry>, PathBuf)>,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.descriptor.name)
            .field("capabilities", &self.descriptor.capabilities)
            .field("lifecycle", &*self.lifecycle.lock().unwrap())
            .finish()
    }
}

/// Raw ingredients for one loaded plugin. Capability adapters are built
/// from these inside [`Plugin::assemble`] rather than constructed
/// beforehand, since every adapter holds a reference to the same
/// [`PluginCore`] that `assemble` is responsible for creating.
pub(crate) struct PluginParts {
    pub(crate) api: plugin_abi::plugin_api,
    pub(crate) descriptor: PluginDescriptor,
    pub(crate) library: Option<libloading::Library>,
    pub(crate) loaded_from: Option<(Arc<LoadedLibraryRegistry>, PathBuf)>,
    pub(crate) source_id: Option<u32>,
    pub(crate) extract_fields: Option<FieldCatalog>,
    pub(crate) parse_compat: Option<SourceCompatibility>,
}

impl Plugin {
    pub(crate) fn assemble(core_name: String, parts: PluginParts, tables: Arc<TableRegistry>) -> Self {
        let PluginParts { api, descriptor, library, loaded_from, source_id, extract_fields, parse_compat } = parts;
        let core = Arc::new(PluginCore {
            name: core_name,
            api,
            state: AtomicPtr::new(std::ptr::null_mut()),
            destroyed: AtomicBool::new(false),
            published_tables: Mutex::new(Vec::new()),
        });

        let sourcing = source_id.map(|id| SourcingAdapter::new(Arc::clone(&core), id));
        let extraction = extract_fields.map(|fields| ExtractionAdapter::new(Arc::clone(&core), fields));
        let parsing = parse_compat.map(|compat| ParsingAdapter::new(Arc::clone(&core), compat, Arc::clone(&tables)));

        Self {
            core,
            descriptor,
            lifecycle: Mutex::new(Lifecycle::Loaded),
            tables,
            sourcing,
            extraction,
            parsing,
            _library: library,
            loaded_from,
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn sourcing(&self) -> Option<&SourcingAdapter> {
        self.sourcing.as_ref()
    }

    pub fn extraction(&self) -> Option<&ExtractionAdapter> {
        self.extraction.as_ref()
    }

    pub fn parsing(&self) -> Option<&ParsingAdapter> {
        self.parsing.as_ref()
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Initializes the plugin. Must be called at most once
    /// (testable property 2: "at-most-once init").
    pub fn init(&self, config: &str) -> Result<(), PluginError> {
        log::debug!("initializing plugin {:?}", self.name());
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if *lifecycle != Lifecycle::Loaded {
                return Err(PluginError::state(self.name(), "plugin was already initialized twice"));
            }
            *lifecycle = Lifecycle::Initialized;
        }

        let schema = self.core.api.plugin_get_init_schema.map(|f| {
            let raw = unsafe { f() };
            if raw.is_null() {
                String::new()
            } else {
                unsafe { std::ffi::CStr::from_ptr(raw) }.to_string_lossy().into_owned()
            }
        });
        if let Err(e) = config::validate_config(self.name(), config, schema.as_deref()) {
            *self.lifecycle.lock().unwrap() = Lifecycle::Loaded;
            return Err(e);
        }

        let needs_tables =
            self.descriptor.capabilities.has(Capability::Extraction) || self.descriptor.capabilities.has(Capability::Parsing);
        let owner = TableOwner { registry: &self.tables, plugin_name: self.name(), published: &self.core.published_tables };
        let table_init_input = needs_tables.then(|| table_vtable::build_table_init_input(&owner));

        let init_input = ss_plugin_init_input {
            owner: &owner as *const TableOwner<'_> as *mut ss_plugin_owner_t,
            get_owner_last_error: None,
            tables: table_init_input.as_ref().map_or(std::ptr::null(), |t| t as *const _),
        };

        let Some(plugin_init) = self.core.api.plugin_init else {
            return Err(PluginError::load(self.name(), "plugin does not export plugin_init"));
        };
        let config_c = CString::new(config).map_err(|e| PluginError::argument(self.name(), e.to_string()))?;
        let mut rc: plugin_abi::ss_plugin_rc = SS_PLUGIN_SUCCESS;
        let state = unsafe { plugin_init(&init_input as *const _, config_c.as_ptr(), &mut rc as *mut _) };

        if rc != SS_PLUGIN_SUCCESS {
            // Open question: retain the handle only long enough
            // to read the error message, then release it.
            let message = if !state.is_null() {
                self.core.state.store(state, Ordering::SeqCst);
                let msg = self.core.last_error();
                if let Some(destroy) = self.core.api.plugin_destroy {
                    unsafe { destroy(state) };
                }
                self.core.state.store(std::ptr::null_mut(), Ordering::SeqCst);
                msg
            } else {
                String::new()
            };
            *self.lifecycle.lock().unwrap() = Lifecycle::Loaded;
            log::error!("plugin {:?} failed to initialize: {message}", self.name());
            return Err(PluginError::init(self.name(), message));
        }

        self.core.state.store(state, Ordering::SeqCst);
        log::debug!("plugin {:?} initialized", self.name());
        Ok(())
    }

    /// Transitions to `Destroyed`, idempotently. Also invalidates and
    /// unregisters any tables this plugin published, so other plugins and
    /// the host stop seeing them and cannot dereference their now-dangling
    /// vtable pointers.
    pub fn destroy(&self) {
        *self.lifecycle.lock().unwrap() = Lifecycle::Destroyed;
        if let Some(state) = self.core.mark_destroyed() {
            log::debug!("destroying plugin {:?}", self.name());
            if !state.is_null() {
                if let Some(destroy) = self.core.api.plugin_destroy {
                    unsafe { destroy(state) };
                }
            }
        } else {
            log::warn!("destroy called again on already-destroyed plugin {:?}", self.name());
        }

        for name in self.core.take_published_tables() {
            if let Some(table) = self.tables.unregister(&name) {
                table.invalidate();
            }
        }
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        self.destroy();
        if let Some((registry, path)) = &self.loaded_from {
            registry.track_close(path);
        }
    }
}

//! Dynamic library loader: opens a plugin, binds its C ABI
//! symbols, negotiates its API version, and extracts descriptor metadata.
//!
//! Grounded on the libloading-based loader pattern in
//! `adi-family-lib-plugin-host`'s `src/loader.rs`: open the library, bind
//! each exported symbol by name, fail loudly on anything missing. The
//! difference here is that the plugin ABI is many individual C symbols
//! rather than one vtable-returning entry point, so each is bound
//! independently.

use crate::descriptor::{Capability, CapabilitySet, PluginDescriptor, SourceCompatibility};
use crate::error::PluginError;
use crate::fields;
use crate::plugin::{Plugin, PluginParts};
use crate::registry::LoadedLibraryRegistry;
use crate::tables::TableRegistry;
use crate::version::{self, SupportedApiRange};
use libloading::Library;
use plugin_abi::{plugin_api, PLUGIN_EVENT_TYPE};
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a plugin's raw API struct came from: an on-disk library (kept
/// alive for the plugin's whole lifetime) or an in-process vtable handed
/// in directly, which tests use to stand in for a `dlopen`'d plugin.
pub enum PluginSource {
    Path(PathBuf),
    InProcess(plugin_abi::plugin_api),
}

/// Loads plugins into a shared [`TableRegistry`] and tracks which library
/// paths are currently open.
pub struct Loader {
    api_range: SupportedApiRange,
    open_libraries: Arc<LoadedLibraryRegistry>,
    tables: Arc<TableRegistry>,
}

impl Loader {
    pub fn new(api_range: SupportedApiRange, tables: Arc<TableRegistry>) -> Self {
        Self { api_range, open_libraries: Arc::new(LoadedLibraryRegistry::default()), tables }
    }

    pub fn is_plugin_loaded(&self, path: &Path) -> bool {
        self.open_libraries.is_plugin_loaded(path)
    }

    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.open_libraries.loaded_paths()
    }

    /// Loads a plugin. Loading the same path twice is permitted and
    /// yields two independent descriptors.
    pub fn load(&self, source: PluginSource) -> Result<Plugin, PluginError> {
        let (library, api, path) = match source {
            PluginSource::Path(path) => {
                log::debug!("loading plugin library {}", path.display());
                let lib = unsafe { Library::new(&path) }.map_err(|e| {
                    log::error!("failed to open plugin library {}: {e}", path.display());
                    PluginError::load(path.display().to_string(), format!("failed to open library: {e}"))
                })?;
                let api = bind_symbols(&lib, &path.display().to_string())?;
                (Some(lib), api, Some(path))
            }
            PluginSource::InProcess(api) => (None, api, None),
        };

        let name_hint = path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<in-process>".to_string());
        let loaded_from = path.as_ref().map(|p| (Arc::clone(&self.open_libraries), p.clone()));
        let plugin = self.build_plugin(&name_hint, api, library, loaded_from).map_err(|e| {
            log::error!("failed to load plugin {name_hint}: {e}");
            e
        })?;

        log::debug!(
            "loaded plugin {:?} (capabilities: {})",
            plugin.descriptor().name,
            plugin.descriptor().capabilities
        );
        if let Some(path) = &path {
            self.open_libraries.track_open(path);
        }
        Ok(plugin)
    }

    fn build_plugin(
        &self,
        name_hint: &str,
        api: plugin_api,
        library: Option<Library>,
        loaded_from: Option<(Arc<LoadedLibraryRegistry>, PathBuf)>,
    ) -> Result<Plugin, PluginError> {
        let required_version_fn = api
            .plugin_get_required_api_version
            .ok_or_else(|| PluginError::load(name_hint, "missing required symbol plugin_get_required_api_version"))?;
        let raw_version = unsafe { CStr::from_ptr(required_version_fn()) };
        let required_api_version = version::negotiate(name_hint, raw_version, &self.api_range)?;

        let name = read_str(api.plugin_get_name, name_hint, "plugin_get_name")?;
        let description = read_str(api.plugin_get_description, &name, "plugin_get_description")?;
        let contact = read_str(api.plugin_get_contact, &name, "plugin_get_contact")?;
        let plugin_version_raw = read_str(api.plugin_get_version, &name, "plugin_get_version")?;
        let plugin_version = semver::Version::parse(&plugin_version_raw)
            .map_err(|e| PluginError::load(&name, format!("plugin version {plugin_version_raw:?} is not valid semver: {e}")))?;

        let capabilities_fn = api
            .plugin_get_capabilities
            .ok_or_else(|| PluginError::load(&name, "missing required symbol plugin_get_capabilities"))?;
        let capabilities = CapabilitySet::from_bits(unsafe { capabilities_fn() });

        let mut descriptor_source_id = None;
        let mut event_source = None;
        let mut adapter_source_id = None;
        if capabilities.has(Capability::Sourcing) {
            let get_id = api.get_id.ok_or_else(|| PluginError::load(&name, "SOURCING plugin missing get_id"))?;
            api.open.ok_or_else(|| PluginError::load(&name, "SOURCING plugin missing open"))?;
            api.close.ok_or_else(|| PluginError::load(&name, "SOURCING plugin missing close"))?;
            api.next_batch.ok_or_else(|| PluginError::load(&name, "SOURCING plugin missing next_batch"))?;
            let raw_id = unsafe { get_id() };
            descriptor_source_id = (raw_id != 0).then_some(raw_id);
            event_source = Some(read_str(api.get_event_source, &name, "get_event_source")?);
            adapter_source_id = Some(raw_id);
        }

        let mut extract_fields = None;
        let mut extract_compat = None;
        if capabilities.has(Capability::Extraction) {
            let get_fields = api.get_fields.ok_or_else(|| PluginError::load(&name, "EXTRACTION plugin missing get_fields"))?;
            api.extract_fields.ok_or_else(|| PluginError::load(&name, "EXTRACTION plugin missing extract_fields"))?;
            let json = unsafe { CStr::from_ptr(get_fields()) }
                .to_str()
                .map_err(|e| PluginError::descriptor(&name, format!("get_fields is not UTF-8: {e}")))?;
            let catalog = fields::parse_field_json(&name, json).map_err(|e| PluginError::descriptor(&name, e))?;
            let sources = read_optional_name_set(api.get_extract_event_sources, &name)?;
            let types = read_optional_type_set(api.get_extract_event_types);
            let compat = SourceCompatibility { sources, event_types: types }.with_defaults(PLUGIN_EVENT_TYPE, &[]);
            extract_fields = Some(catalog);
            extract_compat = Some(compat);
        }

        let mut parse_compat = None;
        if capabilities.has(Capability::Parsing) {
            api.parse_event.ok_or_else(|| PluginError::load(&name, "PARSING plugin missing parse_event"))?;
            let sources = read_optional_name_set(api.get_parse_event_sources, &name)?;
            let types = read_optional_type_set(api.get_parse_event_types);
            parse_compat = Some(SourceCompatibility { sources, event_types: types }.with_defaults(PLUGIN_EVENT_TYPE, &[]));
        }

        let descriptor = PluginDescriptor {
            name: name.clone(),
            description,
            contact,
            plugin_version,
            required_api_version,
            capabilities,
            source_id: descriptor_source_id,
            event_source,
            extract_compat,
            parse_compat: parse_compat.clone(),
        };
        descriptor.validate().map_err(|e| PluginError::descriptor(&name, e))?;

        let tables = Arc::clone(&self.tables);
        let parts = PluginParts {
            api,
            descriptor,
            library,
            loaded_from,
            source_id: adapter_source_id,
            extract_fields,
            parse_compat,
        };

        Ok(Plugin::assemble(name, parts, tables))
    }
}

fn read_str(
    f: Option<unsafe extern "C" fn() -> *const std::os::raw::c_char>,
    plugin_name: &str,
    symbol: &str,
) -> Result<String, PluginError> {
    let f = f.ok_or_else(|| PluginError::load(plugin_name, format!("missing required symbol {symbol}")))?;
    let raw = unsafe { f() };
    if raw.is_null() {
        return Ok(String::new());
    }
    unsafe { CStr::from_ptr(raw) }
        .to_str()
        .map(|s| s.to_string())
        .map_err(|e| PluginError::load(plugin_name, format!("{symbol} did not return valid UTF-8: {e}")))
}

fn read_optional_name_set(
    f: Option<unsafe extern "C" fn() -> *const std::os::raw::c_char>,
    plugin_name: &str,
) -> Result<std::collections::BTreeSet<String>, PluginError> {
    let Some(f) = f else { return Ok(std::collections::BTreeSet::new()) };
    let raw = unsafe { f() };
    if raw.is_null() {
        return Ok(std::collections::BTreeSet::new());
    }
    let json = unsafe { CStr::from_ptr(raw) }
        .to_str()
        .map_err(|e| PluginError::descriptor(plugin_name, format!("event source list is not UTF-8: {e}")))?;
    serde_json::from_str(json).map_err(|e| PluginError::descriptor(plugin_name, format!("event source list is not a JSON string array: {e}")))
}

fn read_optional_type_set(
    f: Option<unsafe extern "C" fn(numtypes: *mut u32) -> *const u16>,
) -> std::collections::BTreeSet<u16> {
    let Some(f) = f else { return std::collections::BTreeSet::new() };
    let mut n: u32 = 0;
    let raw = unsafe { f(&mut n as *mut u32) };
    if raw.is_null() || n == 0 {
        return std::collections::BTreeSet::new();
    }
    unsafe { std::slice::from_raw_parts(raw, n as usize) }.iter().copied().collect()
}

/// Binds every symbol the ABI defines by name, leaving capability-specific
/// ones `None` when absent (checked against capability bits once
/// `plugin_get_capabilities` is known).
fn bind_symbols(lib: &Library, plugin_name: &str) -> Result<plugin_api, PluginError> {
    let mut api = plugin_api::default();

    api.plugin_get_required_api_version = bind(lib, "plugin_get_required_api_version");
    api.plugin_get_version = bind(lib, "plugin_get_version");
    api.plugin_get_name = bind(lib, "plugin_get_name");
    api.plugin_get_description = bind(lib, "plugin_get_description");
    api.plugin_get_contact = bind(lib, "plugin_get_contact");
    api.plugin_get_last_error = bind(lib, "plugin_get_last_error");
    api.plugin_init = bind(lib, "plugin_init");
    api.plugin_destroy = bind(lib, "plugin_destroy");
    api.plugin_get_capabilities = bind(lib, "plugin_get_capabilities");
    api.plugin_get_init_schema = bind(lib, "plugin_get_init_schema");

    api.get_id = bind(lib, "get_id");
    api.get_event_source = bind(lib, "get_event_source");
    api.open = bind(lib, "open");
    api.close = bind(lib, "close");
    api.next_batch = bind(lib, "next_batch");
    api.get_progress = bind(lib, "get_progress");
    api.event_to_string = bind(lib, "event_to_string");
    api.list_open_params = bind(lib, "list_open_params");

    api.get_fields = bind(lib, "get_fields");
    api.extract_fields = bind(lib, "extract_fields");
    api.get_extract_event_sources = bind(lib, "get_extract_event_sources");
    api.get_extract_event_types = bind(lib, "get_extract_event_types");

    api.parse_event = bind(lib, "parse_event");
    api.get_parse_event_sources = bind(lib, "get_parse_event_sources");
    api.get_parse_event_types = bind(lib, "get_parse_event_types");

    let mut missing = Vec::new();
    if api.plugin_get_required_api_version.is_none() {
        missing.push("plugin_get_required_api_version");
    }
    if api.plugin_get_version.is_none() {
        missing.push("plugin_get_version");
    }
    if api.plugin_get_name.is_none() {
        missing.push("plugin_get_name");
    }
    if api.plugin_get_description.is_none() {
        missing.push("plugin_get_description");
    }
    if api.plugin_get_contact.is_none() {
        missing.push("plugin_get_contact");
    }
    if api.plugin_get_last_error.is_none() {
        missing.push("plugin_get_last_error");
    }
    if api.plugin_init.is_none() {
        missing.push("plugin_init");
    }
    if api.plugin_destroy.is_none() {
        missing.push("plugin_destroy");
    }
    if api.plugin_get_capabilities.is_none() {
        missing.push("plugin_get_capabilities");
    }
    if !missing.is_empty() {
        return Err(PluginError::load(plugin_name, format!("missing required symbols: {}", missing.join(", "))));
    }
    Ok(api)
}

fn bind<T: Copy>(lib: &Library, name: &str) -> Option<T> {
    unsafe { lib.get::<T>(name.as_bytes()).ok().map(|sym| *sym) }
}

//! End-to-end lifecycle coverage driven entirely through an in-process
//! `plugin_abi::plugin_api` vtable, standing in for a `dlopen`'d plugin.

use plugin_abi::{
    plugin_api, ss_plugin_event, ss_plugin_extract_field, ss_plugin_extract_value, ss_plugin_init_input, ss_plugin_rc,
    ss_plugin_t, CAP_EXTRACTION, SS_PLUGIN_FAILURE, SS_PLUGIN_SUCCESS,
};
use plugin_host::capability::extraction::ExtractedValue;
use plugin_host::capability::EventRef;
use plugin_host::filtercheck::FilterCheckAdapter;
use plugin_host::loader::{Loader, PluginSource};
use plugin_host::tables::{TableRegistry, TableValue};
use plugin_host::version::SupportedApiRange;
use std::ffi::{c_char, CStr, CString};
use std::sync::{Arc, Mutex};

struct TestState {
    last_error: Mutex<String>,
}

fn leak_cstr(s: &str) -> *const c_char {
    CString::new(s).unwrap().into_raw()
}

unsafe extern "C" fn required_api_version() -> *const c_char {
    leak_cstr("3.1.0")
}
unsafe extern "C" fn plugin_version() -> *const c_char {
    leak_cstr("1.0.0")
}
unsafe extern "C" fn plugin_name() -> *const c_char {
    leak_cstr("testplugin")
}
unsafe extern "C" fn plugin_description() -> *const c_char {
    leak_cstr("a plugin used only by tests")
}
unsafe extern "C" fn plugin_contact() -> *const c_char {
    leak_cstr("test@example.invalid")
}
unsafe extern "C" fn capabilities() -> u32 {
    CAP_EXTRACTION
}
unsafe extern "C" fn init_schema() -> *const c_char {
    leak_cstr(r#"{"type":"object","required":["k"],"properties":{"k":{"type":"string"}}}"#)
}
unsafe extern "C" fn get_fields() -> *const c_char {
    leak_cstr(r#"[{"name":"testplugin.val","type":"uint64","desc":"a test value"}]"#)
}
unsafe extern "C" fn get_extract_event_sources() -> *const c_char {
    leak_cstr(r#"["test-source"]"#)
}

unsafe extern "C" fn plugin_get_last_error(s: *mut ss_plugin_t) -> *const c_char {
    if s.is_null() {
        return std::ptr::null();
    }
    let state = unsafe { &*(s as *const TestState) };
    leak_cstr(&state.last_error.lock().unwrap())
}

unsafe extern "C" fn plugin_init(
    _input: *const ss_plugin_init_input,
    config: *const c_char,
    rc: *mut ss_plugin_rc,
) -> *mut ss_plugin_t {
    let config_str = unsafe { CStr::from_ptr(config) }.to_string_lossy().into_owned();
    let state = Box::into_raw(Box::new(TestState { last_error: Mutex::new(String::new()) }));
    if config_str.contains("boom") {
        unsafe { &*state }.last_error.lock().unwrap().push_str("boom triggered failure");
        unsafe { *rc = SS_PLUGIN_FAILURE };
    } else {
        unsafe { *rc = SS_PLUGIN_SUCCESS };
    }
    state as *mut ss_plugin_t
}

unsafe extern "C" fn plugin_destroy(s: *mut ss_plugin_t) {
    if !s.is_null() {
        drop(unsafe { Box::from_raw(s as *mut TestState) });
    }
}

unsafe extern "C" fn extract_fields(
    _s: *mut ss_plugin_t,
    _evt: *const ss_plugin_event,
    num_fields: u32,
    fields: *mut ss_plugin_extract_field,
) -> ss_plugin_rc {
    let slice = unsafe { std::slice::from_raw_parts_mut(fields, num_fields as usize) };
    for f in slice.iter_mut() {
        if f.field_id == 0 {
            let value = Box::into_raw(Box::new(42u64));
            f.res = ss_plugin_extract_value { u64_: value as *const u64 };
            f.res_len = 1;
        } else {
            f.res_len = 0;
        }
    }
    SS_PLUGIN_SUCCESS
}

fn test_api() -> plugin_api {
    plugin_api {
        plugin_get_required_api_version: Some(required_api_version),
        plugin_get_version: Some(plugin_version),
        plugin_get_name: Some(plugin_name),
        plugin_get_description: Some(plugin_description),
        plugin_get_contact: Some(plugin_contact),
        plugin_get_last_error: Some(plugin_get_last_error),
        plugin_init: Some(plugin_init),
        plugin_destroy: Some(plugin_destroy),
        plugin_get_capabilities: Some(capabilities),
        plugin_get_init_schema: Some(init_schema),
        get_fields: Some(get_fields),
        extract_fields: Some(extract_fields),
        get_extract_event_sources: Some(get_extract_event_sources),
        ..Default::default()
    }
}

fn new_loader() -> Loader {
    Loader::new(SupportedApiRange::default(), Arc::new(TableRegistry::new()))
}

#[test]
fn loads_initializes_extracts_and_destroys() {
    let loader = new_loader();
    let plugin = loader.load(PluginSource::InProcess(test_api())).expect("load should succeed");
    assert_eq!(plugin.descriptor().name, "testplugin");
    assert!(plugin.descriptor().capabilities.has(plugin_host::Capability::Extraction));

    plugin.init(r#"{"k":"v"}"#).expect("init with valid config should succeed");

    let plugin = Arc::new(plugin);
    let check = FilterCheckAdapter::new(Arc::clone(&plugin), "testplugin.val").expect("field exists");
    let event = EventRef { source_id: Some(1), source_name: "test-source", event_type: plugin_abi::PLUGIN_EVENT_TYPE, payload: &[] };
    let value = check.extract(&event).unwrap().expect("plugin always returns a value");
    assert_eq!(value, ExtractedValue::Scalar(TableValue::Uint64(42)));

    plugin.destroy();
    // Idempotent: a second destroy must not double-free or panic.
    plugin.destroy();
}

#[test]
fn extraction_is_silently_rejected_for_incompatible_source() {
    let loader = new_loader();
    let plugin = loader.load(PluginSource::InProcess(test_api())).unwrap();
    plugin.init(r#"{"k":"v"}"#).unwrap();
    let plugin = Arc::new(plugin);
    let check = FilterCheckAdapter::new(Arc::clone(&plugin), "testplugin.val").unwrap();

    let event =
        EventRef { source_id: Some(1), source_name: "some-other-source", event_type: plugin_abi::PLUGIN_EVENT_TYPE, payload: &[] };
    assert!(check.extract(&event).unwrap().is_none());

    let unset_source = EventRef { source_id: None, source_name: "test-source", event_type: plugin_abi::PLUGIN_EVENT_TYPE, payload: &[] };
    assert!(check.extract(&unset_source).unwrap().is_none());
}

#[test]
fn init_twice_is_rejected() {
    let loader = new_loader();
    let plugin = loader.load(PluginSource::InProcess(test_api())).unwrap();
    plugin.init(r#"{"k":"v"}"#).unwrap();
    let err = plugin.init(r#"{"k":"v"}"#).unwrap_err();
    assert!(err.to_string().contains("initialized twice"));
}

#[test]
fn schema_rejection_names_missing_property() {
    let loader = new_loader();
    let plugin = loader.load(PluginSource::InProcess(test_api())).unwrap();
    let err = plugin.init("{}").unwrap_err();
    assert!(err.to_string().contains('k'), "expected missing property name in {err}");
}

#[test]
fn init_failure_with_live_state_surfaces_message_then_releases_it() {
    let loader = new_loader();
    let plugin = loader.load(PluginSource::InProcess(test_api())).unwrap();
    let err = plugin.init(r#"{"k":"boom"}"#).unwrap_err();
    assert!(err.to_string().contains("boom triggered failure"));

    // The failed attempt released the handle and reset lifecycle to
    // `Loaded`, so a corrected config can still succeed afterwards.
    plugin.init(r#"{"k":"v"}"#).expect("retry after a failed init should succeed");
}

#[test]
fn loader_tracks_open_paths_independently_per_instance() {
    let loader = new_loader();
    assert!(loader.loaded_paths().is_empty());
    // In-process plugins never touch the path-based registry.
    let _plugin = loader.load(PluginSource::InProcess(test_api())).unwrap();
    assert!(loader.loaded_paths().is_empty());
}

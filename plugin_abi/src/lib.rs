//! Raw C ABI definitions for the plugin host.
//!
//! This crate has no logic of its own: it only describes the memory layout
//! and function-pointer contract a plugin dynamic library must satisfy.
//! Everything here is `#[repr(C)]` and raw pointers; safe wrappers live in
//! `plugin_host`.
//!
//! A C header describing this ABI would normally be turned into this kind
//! of module by `bindgen` against a vendored header. No such header is
//! available here, so the layout below is hand-written to match the wire
//! contract directly.

#![allow(non_camel_case_types)]

use std::ffi::c_char;
use std::os::raw::c_void;

/// Opaque plugin instance handle, owned by the loaded library.
#[repr(C)]
pub struct ss_plugin_t {
    _private: [u8; 0],
}

/// Opaque handle for an open event source (returned by `open`).
#[repr(C)]
pub struct ss_instance_t {
    _private: [u8; 0],
}

/// Opaque handle the host passes back to a plugin so it can address
/// callbacks at "whoever owns this session" without exposing the host's
/// internal representation.
#[repr(C)]
pub struct ss_plugin_owner_t {
    _private: [u8; 0],
}

/// Opaque handle to a table, either host-native or published by a plugin.
#[repr(C)]
pub struct ss_plugin_table_t {
    _private: [u8; 0],
}

/// Opaque handle to one row of a table.
#[repr(C)]
pub struct ss_plugin_table_entry_t {
    _private: [u8; 0],
}

/// Opaque handle to a table field (column) descriptor.
#[repr(C)]
pub struct ss_plugin_table_field_t {
    _private: [u8; 0],
}

/// Status code returned by every fallible plugin entry point.
pub type ss_plugin_rc = i32;
pub const SS_PLUGIN_SUCCESS: ss_plugin_rc = 0;
pub const SS_PLUGIN_FAILURE: ss_plugin_rc = 1;
pub const SS_PLUGIN_TIMEOUT: ss_plugin_rc = -1;
pub const SS_PLUGIN_EOF: ss_plugin_rc = 2;
pub const SS_PLUGIN_NOT_SUPPORTED: ss_plugin_rc = 3;

/// Tags identifying every scalar value type the plugin API can carry, for
/// both table keys/fields and extracted field values.
pub type ss_plugin_field_type = u32;
pub const FIELD_TYPE_STRING: ss_plugin_field_type = 0;
pub const FIELD_TYPE_UINT64: ss_plugin_field_type = 1;
pub const FIELD_TYPE_BOOL: ss_plugin_field_type = 2;
pub const FIELD_TYPE_RELTIME: ss_plugin_field_type = 3;
pub const FIELD_TYPE_ABSTIME: ss_plugin_field_type = 4;
pub const FIELD_TYPE_IPV4ADDR: ss_plugin_field_type = 5;
pub const FIELD_TYPE_IPV4NET: ss_plugin_field_type = 6;
pub const FIELD_TYPE_IPV6ADDR: ss_plugin_field_type = 7;
pub const FIELD_TYPE_IPV6NET: ss_plugin_field_type = 8;
pub const FIELD_TYPE_IPNET: ss_plugin_field_type = 9;

/// A length-prefixed, non-owning byte buffer crossing the FFI boundary.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ss_plugin_byte_buffer {
    pub ptr: *const u8,
    pub len: u32,
}

/// One element of `list_open_params()`'s JSON array, after parsing.
#[repr(C)]
pub struct ss_plugin_open_param {
    pub value: *const c_char,
    pub desc: *const c_char,
    pub separator: c_char,
}

/// A batch of events as returned from `next_batch`.
#[repr(C)]
pub struct ss_plugin_event_batch {
    pub events: *const *const ss_plugin_event,
    pub nevents: u32,
}

/// A single event, as a length-prefixed opaque byte blob. The plugin host
/// does not interpret the payload; it only tags it with a source index and
/// hands it to whichever capability adapter needs it.
#[repr(C)]
pub struct ss_plugin_event {
    pub len: u32,
    pub data: *const u8,
}

/// One requested field in an `extract_fields` call, and the slot the plugin
/// fills in with the result.
#[repr(C)]
pub struct ss_plugin_extract_field {
    pub field_id: u32,
    pub field: *const c_char,
    pub arg_key: *const c_char,
    pub arg_index: u64,
    pub arg_present: u8,
    pub ftype: ss_plugin_field_type,
    pub flist: u8,
    pub res_len: u32,
    pub res: ss_plugin_extract_value,
}

/// The plugin API only ever fills in the member matching `ftype`/`flist`;
/// the others are garbage. This mirrors the real API's C union.
#[repr(C)]
pub union ss_plugin_extract_value {
    pub str_: *const *const c_char,
    pub u64_: *const u64,
    pub buf: *const ss_plugin_byte_buffer,
    pub u32_: *const u32,
}

/// Metadata about one exposed table, as returned by `list_tables`.
#[repr(C)]
pub struct ss_plugin_table_info {
    pub name: *const c_char,
    pub key_type: ss_plugin_field_type,
}

/// Function pointers a plugin-owned table must supply so that other
/// plugins (and the host) can enumerate its fields.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ss_plugin_table_fields_vtable {
    pub list_table_fields:
        Option<unsafe extern "C" fn(t: *mut ss_plugin_table_t, n: *mut u32) -> *mut ss_plugin_table_info>,
    pub get_table_field: Option<
        unsafe extern "C" fn(
            t: *mut ss_plugin_table_t,
            name: *const c_char,
            data_type: ss_plugin_field_type,
        ) -> *mut ss_plugin_table_field_t,
    >,
    pub add_table_field: Option<
        unsafe extern "C" fn(
            t: *mut ss_plugin_table_t,
            name: *const c_char,
            data_type: ss_plugin_field_type,
        ) -> *mut ss_plugin_table_field_t,
    >,
}

/// Per-row state handed to a table iteration visitor: the entry under visit
/// and its key, encoded the same way `get_table_entry`'s `key` parameter is.
#[repr(C)]
pub struct ss_plugin_table_iterator_state {
    pub entry: *mut ss_plugin_table_entry_t,
    pub key: *const c_void,
}

/// Function pointers for read access to a plugin-owned table.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ss_plugin_table_reader_vtable {
    pub get_table_name: Option<unsafe extern "C" fn(t: *mut ss_plugin_table_t) -> *const c_char>,
    pub get_table_size: Option<unsafe extern "C" fn(t: *mut ss_plugin_table_t) -> u64>,
    pub get_table_entry: Option<
        unsafe extern "C" fn(
            t: *mut ss_plugin_table_t,
            key: *const c_void,
        ) -> *mut ss_plugin_table_entry_t,
    >,
    pub read_entry_field: Option<
        unsafe extern "C" fn(
            t: *mut ss_plugin_table_t,
            e: *mut ss_plugin_table_entry_t,
            f: *const ss_plugin_table_field_t,
            out: *mut c_void,
        ) -> ss_plugin_rc,
    >,
    /// Visits every row, invoking `it(state, data)` once per row; `data` is
    /// an opaque cookie round-tripped to the caller unchanged. Stops early
    /// the first time `it` returns `false`. Returns `false` if iteration was
    /// cut short by the callback, `true` if it ran to completion.
    pub iterate_entries: Option<
        unsafe extern "C" fn(
            t: *mut ss_plugin_table_t,
            it: unsafe extern "C" fn(s: *mut ss_plugin_table_iterator_state, data: *mut c_void) -> bool,
            data: *mut c_void,
        ) -> bool,
    >,
}

/// Function pointers for write access to a plugin-owned table.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ss_plugin_table_writer_vtable {
    pub clear_table: Option<unsafe extern "C" fn(t: *mut ss_plugin_table_t) -> ss_plugin_rc>,
    pub erase_table_entry:
        Option<unsafe extern "C" fn(t: *mut ss_plugin_table_t, key: *const c_void) -> ss_plugin_rc>,
    pub create_table_entry:
        Option<unsafe extern "C" fn(t: *mut ss_plugin_table_t) -> *mut ss_plugin_table_entry_t>,
    pub destroy_table_entry:
        Option<unsafe extern "C" fn(t: *mut ss_plugin_table_t, e: *mut ss_plugin_table_entry_t)>,
    pub add_table_entry: Option<
        unsafe extern "C" fn(
            t: *mut ss_plugin_table_t,
            key: *const c_void,
            e: *mut ss_plugin_table_entry_t,
        ) -> ss_plugin_rc,
    >,
    pub write_entry_field: Option<
        unsafe extern "C" fn(
            t: *mut ss_plugin_table_t,
            e: *mut ss_plugin_table_entry_t,
            f: *const ss_plugin_table_field_t,
            data: *const c_void,
        ) -> ss_plugin_rc,
    >,
}

/// What a plugin passes to `add_table` to publish a table of its own.
#[repr(C)]
pub struct ss_plugin_table_input {
    pub name: *const c_char,
    pub key_type: ss_plugin_field_type,
    pub table: *mut c_void,
    pub reader: ss_plugin_table_reader_vtable,
    pub writer: ss_plugin_table_writer_vtable,
    pub fields: ss_plugin_table_fields_vtable,
}

/// Top-level table-access surface, handed to a plugin at `init` time so it
/// can look up tables and register its own.
#[repr(C)]
pub struct ss_plugin_table_init_input {
    pub owner: *mut ss_plugin_owner_t,
    pub list_tables:
        Option<unsafe extern "C" fn(o: *mut ss_plugin_owner_t, n: *mut u32) -> *mut ss_plugin_table_info>,
    pub get_table: Option<
        unsafe extern "C" fn(
            o: *mut ss_plugin_owner_t,
            name: *const c_char,
            key_type: ss_plugin_field_type,
        ) -> *mut ss_plugin_table_t,
    >,
    pub add_table: Option<
        unsafe extern "C" fn(o: *mut ss_plugin_owner_t, input: *const ss_plugin_table_input) -> ss_plugin_rc,
    >,
    pub reader_ext: ss_plugin_table_reader_vtable,
    pub writer_ext: ss_plugin_table_writer_vtable,
    pub fields_ext: ss_plugin_table_fields_vtable,
}

/// Everything handed to a plugin's `init` beyond the raw config string.
#[repr(C)]
pub struct ss_plugin_init_input {
    pub owner: *mut ss_plugin_owner_t,
    pub get_owner_last_error:
        Option<unsafe extern "C" fn(o: *mut ss_plugin_owner_t) -> *const c_char>,
    /// Null unless the plugin declared EXTRACTION or PARSING.
    pub tables: *const ss_plugin_table_init_input,
}

/// The full set of C entry points a plugin dynamic library may export.
/// Required symbols are `Option`-wrapped purely so the loader can
/// build the struct incrementally while resolving symbols; a missing
/// required one is a `LoadError`, not a silently-absent capability. Optional
/// symbols (per-capability) are genuinely allowed to be absent.
#[repr(C)]
#[derive(Default)]
pub struct plugin_api {
    // required
    pub plugin_get_required_api_version: Option<unsafe extern "C" fn() -> *const c_char>,
    pub plugin_get_version: Option<unsafe extern "C" fn() -> *const c_char>,
    pub plugin_get_name: Option<unsafe extern "C" fn() -> *const c_char>,
    pub plugin_get_description: Option<unsafe extern "C" fn() -> *const c_char>,
    pub plugin_get_contact: Option<unsafe extern "C" fn() -> *const c_char>,
    pub plugin_get_last_error: Option<unsafe extern "C" fn(s: *mut ss_plugin_t) -> *const c_char>,
    pub plugin_init: Option<
        unsafe extern "C" fn(
            input: *const ss_plugin_init_input,
            config: *const c_char,
            rc: *mut ss_plugin_rc,
        ) -> *mut ss_plugin_t,
    >,
    pub plugin_destroy: Option<unsafe extern "C" fn(s: *mut ss_plugin_t)>,
    pub plugin_get_capabilities: Option<unsafe extern "C" fn() -> u32>,
    pub plugin_get_init_schema: Option<unsafe extern "C" fn() -> *const c_char>,

    // sourcing
    pub get_id: Option<unsafe extern "C" fn() -> u32>,
    pub get_event_source: Option<unsafe extern "C" fn() -> *const c_char>,
    pub open: Option<
        unsafe extern "C" fn(s: *mut ss_plugin_t, params: *const c_char, rc: *mut ss_plugin_rc) -> *mut ss_instance_t,
    >,
    pub close: Option<unsafe extern "C" fn(s: *mut ss_plugin_t, h: *mut ss_instance_t)>,
    pub next_batch: Option<
        unsafe extern "C" fn(
            s: *mut ss_plugin_t,
            h: *mut ss_instance_t,
            batch: *mut ss_plugin_event_batch,
        ) -> ss_plugin_rc,
    >,
    pub get_progress: Option<
        unsafe extern "C" fn(s: *mut ss_plugin_t, h: *mut ss_instance_t, progress_pct: *mut u32) -> *const c_char,
    >,
    pub event_to_string:
        Option<unsafe extern "C" fn(s: *mut ss_plugin_t, evt: *const ss_plugin_event) -> *const c_char>,
    pub list_open_params:
        Option<unsafe extern "C" fn(s: *mut ss_plugin_t, rc: *mut ss_plugin_rc) -> *const c_char>,

    // extraction
    pub get_fields: Option<unsafe extern "C" fn() -> *const c_char>,
    pub extract_fields: Option<
        unsafe extern "C" fn(
            s: *mut ss_plugin_t,
            evt: *const ss_plugin_event,
            num_fields: u32,
            fields: *mut ss_plugin_extract_field,
        ) -> ss_plugin_rc,
    >,
    pub get_extract_event_sources: Option<unsafe extern "C" fn() -> *const c_char>,
    pub get_extract_event_types: Option<unsafe extern "C" fn(numtypes: *mut u32) -> *const u16>,

    // parsing
    pub parse_event: Option<
        unsafe extern "C" fn(
            s: *mut ss_plugin_t,
            evt: *const ss_plugin_event,
            tables: *const ss_plugin_table_init_input,
        ) -> ss_plugin_rc,
    >,
    pub get_parse_event_sources: Option<unsafe extern "C" fn() -> *const c_char>,
    pub get_parse_event_types: Option<unsafe extern "C" fn(numtypes: *mut u32) -> *const u16>,
}

/// Minimum symbol set every plugin must export regardless of capability.
pub const REQUIRED_SYMBOLS: &[&str] = &[
    "plugin_get_required_api_version",
    "plugin_get_version",
    "plugin_get_name",
    "plugin_get_description",
    "plugin_get_contact",
    "plugin_get_last_error",
    "plugin_init",
    "plugin_destroy",
    "plugin_get_capabilities",
];

pub const SOURCING_REQUIRED_SYMBOLS: &[&str] = &["get_id", "get_event_source", "open", "close", "next_batch"];
pub const SOURCING_OPTIONAL_SYMBOLS: &[&str] = &["get_progress", "event_to_string", "list_open_params"];

pub const EXTRACTION_REQUIRED_SYMBOLS: &[&str] = &["get_fields", "extract_fields"];
pub const EXTRACTION_OPTIONAL_SYMBOLS: &[&str] = &["get_extract_event_sources", "get_extract_event_types"];

pub const PARSING_REQUIRED_SYMBOLS: &[&str] = &["parse_event"];
pub const PARSING_OPTIONAL_SYMBOLS: &[&str] = &["get_parse_event_sources", "get_parse_event_types"];

pub const OPTIONAL_SYMBOLS: &[&str] = &["plugin_get_init_schema"];

/// Capability bits as carried in the `u32` returned by `plugin_get_capabilities`.
pub const CAP_SOURCING: u32 = 1 << 0;
pub const CAP_EXTRACTION: u32 = 1 << 1;
pub const CAP_PARSING: u32 = 1 << 2;

/// Reserved numeric event type for "generic plugin event" (no sourcing id).
pub const PLUGIN_EVENT_TYPE: u16 = 322;
/// Built-in event source name for the syscall event stream.
pub const SYSCALL_SOURCE_NAME: &str = "syscall";

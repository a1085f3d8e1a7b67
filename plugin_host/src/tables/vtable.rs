//! The C vtable bridge that exposes a [`BaseTable`] (host-native or
//! another plugin's own foreign table) to a plugin exactly as if it were
//! the plugin API's own `ss_plugin_table_t`. This is the
//! opposite direction from [`super::foreign`]: there we wrap a plugin's
//! vtable into our trait; here we wrap our trait into callable C function
//! pointers.
//!
//! `Arc<dyn BaseTable>` is a fat pointer and cannot be cast directly to the
//! ABI's `*mut ss_plugin_table_t`, so every exported handle is boxed behind
//! a thin, sized wrapper and leaked for the registry's lifetime; tables
//! are process-scoped, so there is no narrower point at which
//! to free them.

use super::{BaseTable, TableRegistry, TableValue};
use crate::fields::FieldValueType;
use plugin_abi::{
    ss_plugin_byte_buffer, ss_plugin_field_type, ss_plugin_owner_t, ss_plugin_rc, ss_plugin_table_entry_t,
    ss_plugin_table_fields_vtable, ss_plugin_table_info, ss_plugin_table_input, ss_plugin_table_reader_vtable,
    ss_plugin_table_t, ss_plugin_table_writer_vtable, SS_PLUGIN_FAILURE, SS_PLUGIN_SUCCESS,
};
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::{Arc, Mutex};

use super::marshal;

/// A boxed, thin-pointer handle standing in for `Arc<dyn BaseTable>` across
/// the ABI boundary.
struct ExportedHandle(Arc<dyn BaseTable>);

fn to_raw(table: Arc<dyn BaseTable>) -> *mut ss_plugin_table_t {
    Box::into_raw(Box::new(ExportedHandle(table))) as *mut ss_plugin_table_t
}

unsafe fn handle<'a>(t: *mut ss_plugin_table_t) -> &'a ExportedHandle {
    unsafe { &*(t as *const ExportedHandle) }
}

/// A boxed (name, type) pair standing in for `*mut ss_plugin_table_field_t`.
/// Field handles, like table handles, are never freed individually: the
/// universe of field names a table exposes is small and fixed for the life
/// of the process.
struct FieldHandle {
    name: String,
    value_type: FieldValueType,
}

fn field_to_raw(name: &str, value_type: FieldValueType) -> *mut plugin_abi::ss_plugin_table_field_t {
    Box::into_raw(Box::new(FieldHandle { name: name.to_string(), value_type })) as *mut _
}

unsafe fn field_handle<'a>(f: *const plugin_abi::ss_plugin_table_field_t) -> &'a FieldHandle {
    unsafe { &*(f as *const FieldHandle) }
}

/// An entry handle: a pending or bound row, depending on whether the
/// plugin has called `add_table_entry` yet (the ABI's `create_table_entry`
/// allocates an entry before a key is known; our [`BaseTable::create_entry`]
/// wants both at once, so the two ABI calls are bridged through this
/// intermediate state).
struct EntryHandle(Mutex<Option<super::RowHandle>>);

fn entry_to_raw(row: Option<super::RowHandle>) -> *mut ss_plugin_table_entry_t {
    Box::into_raw(Box::new(EntryHandle(Mutex::new(row)))) as *mut _
}

unsafe fn entry_handle<'a>(e: *mut ss_plugin_table_entry_t) -> &'a EntryHandle {
    unsafe { &*(e as *const EntryHandle) }
}

unsafe extern "C" fn list_table_fields(
    t: *mut ss_plugin_table_t,
    n: *mut u32,
) -> *mut ss_plugin_table_info {
    let fields = unsafe { handle(t) }.0.fields();
    let infos: Vec<ss_plugin_table_info> = fields
        .iter()
        .map(|f| ss_plugin_table_info {
            name: CString::new(f.name.as_str()).unwrap().into_raw(),
            key_type: f.value_type.to_abi(),
        })
        .collect();
    unsafe { *n = infos.len() as u32 };
    // Leaked: there is no ABI-level "free the field list" call, matching
    // the real plugin API's contract that this array is host-owned for the
    // life of the table.
    let boxed = infos.into_boxed_slice();
    Box::into_raw(boxed) as *mut ss_plugin_table_info
}

unsafe extern "C" fn get_table_field(
    t: *mut ss_plugin_table_t,
    name: *const c_char,
    data_type: ss_plugin_field_type,
) -> *mut plugin_abi::ss_plugin_table_field_t {
    let name = match unsafe { CStr::from_ptr(name) }.to_str() {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };
    let Some(value_type) = FieldValueType::from_abi(data_type) else { return std::ptr::null_mut() };
    let fields = unsafe { handle(t) }.0.fields();
    if fields.iter().any(|f| f.name == name && f.value_type == value_type) {
        field_to_raw(name, value_type)
    } else {
        std::ptr::null_mut()
    }
}

unsafe extern "C" fn add_table_field(
    t: *mut ss_plugin_table_t,
    name: *const c_char,
    data_type: ss_plugin_field_type,
) -> *mut plugin_abi::ss_plugin_table_field_t {
    let name = match unsafe { CStr::from_ptr(name) }.to_str() {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };
    let Some(value_type) = FieldValueType::from_abi(data_type) else { return std::ptr::null_mut() };
    match unsafe { handle(t) }.0.get_or_create_field(name, value_type) {
        Ok(()) => field_to_raw(name, value_type),
        Err(_) => std::ptr::null_mut(),
    }
}

pub(super) const FIELDS_VTABLE: ss_plugin_table_fields_vtable = ss_plugin_table_fields_vtable {
    list_table_fields: Some(list_table_fields),
    get_table_field: Some(get_table_field),
    add_table_field: Some(add_table_field),
};

unsafe extern "C" fn get_table_name(t: *mut ss_plugin_table_t) -> *const c_char {
    let name = unsafe { handle(t) }.0.name();
    // Leaked for the table's lifetime; same rationale as field handles.
    CString::new(name).unwrap().into_raw()
}

unsafe extern "C" fn get_table_size(t: *mut ss_plugin_table_t) -> u64 {
    unsafe { handle(t) }.0.size()
}

unsafe extern "C" fn get_table_entry(
    t: *mut ss_plugin_table_t,
    key: *const c_void,
) -> *mut ss_plugin_table_entry_t {
    let table = &unsafe { handle(t) }.0;
    let Ok(key) = (unsafe { marshal::decode(table.key_type(), key) }) else { return std::ptr::null_mut() };
    match table.lookup(&key) {
        Some(row) => entry_to_raw(Some(row)),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn read_entry_field(
    t: *mut ss_plugin_table_t,
    e: *mut ss_plugin_table_entry_t,
    f: *const plugin_abi::ss_plugin_table_field_t,
    out: *mut c_void,
) -> ss_plugin_rc {
    let table = &unsafe { handle(t) }.0;
    let field = unsafe { field_handle(f) };
    let Some(row) = *unsafe { entry_handle(e) }.0.lock().unwrap() else { return SS_PLUGIN_FAILURE };
    let Ok(value) = table.read_field(row, &field.name) else { return SS_PLUGIN_FAILURE };
    match write_out(&value, out) {
        Ok(()) => SS_PLUGIN_SUCCESS,
        Err(_) => SS_PLUGIN_FAILURE,
    }
}

/// Writes a decoded [`TableValue`] into the caller-owned `out` buffer using
/// the same fixed-width layouts [`marshal::decode`] expects to read back,
/// leaking short-lived heap storage for variable-length values exactly as
/// the real ABI expects the host to (the plugin is only a reader here).
fn write_out(value: &TableValue, out: *mut c_void) -> Result<(), String> {
    let encoded = marshal::encode(value)?;
    match encoded {
        marshal::Encoded::U64(bytes) => unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), out as *mut u8, 8) },
        marshal::Encoded::U32(v) => unsafe { *(out as *mut u32) = v },
        marshal::Encoded::CString(c, _) => unsafe {
            *(out as *mut *const c_char) = c.into_raw();
        },
        marshal::Encoded::Bytes(bytes, _) => {
            let boxed = bytes.into_boxed_slice();
            let len = boxed.len() as u32;
            let ptr = Box::into_raw(boxed) as *const u8;
            unsafe { *(out as *mut ss_plugin_byte_buffer) = ss_plugin_byte_buffer { ptr, len } };
        }
    }
    Ok(())
}

unsafe extern "C" fn iterate_entries(
    t: *mut ss_plugin_table_t,
    it: unsafe extern "C" fn(s: *mut plugin_abi::ss_plugin_table_iterator_state, data: *mut c_void) -> bool,
    data: *mut c_void,
) -> bool {
    let table = &unsafe { handle(t) }.0;
    let mut completed = true;
    table.iterate(&mut |key, row| {
        let Ok(encoded) = marshal::encode(key) else {
            completed = false;
            return false;
        };
        let mut state = plugin_abi::ss_plugin_table_iterator_state {
            entry: entry_to_raw(Some(row)),
            key: encoded.as_ptr(),
        };
        let keep_going = unsafe { it(&mut state as *mut _, data) };
        completed = keep_going;
        keep_going
    });
    completed
}

pub(super) const READER_VTABLE: ss_plugin_table_reader_vtable = ss_plugin_table_reader_vtable {
    get_table_name: Some(get_table_name),
    get_table_size: Some(get_table_size),
    get_table_entry: Some(get_table_entry),
    read_entry_field: Some(read_entry_field),
    iterate_entries: Some(iterate_entries),
};

unsafe extern "C" fn clear_table(t: *mut ss_plugin_table_t) -> ss_plugin_rc {
    match unsafe { handle(t) }.0.clear() {
        Ok(()) => SS_PLUGIN_SUCCESS,
        Err(_) => SS_PLUGIN_FAILURE,
    }
}

unsafe extern "C" fn erase_table_entry(t: *mut ss_plugin_table_t, key: *const c_void) -> ss_plugin_rc {
    let table = &unsafe { handle(t) }.0;
    let Ok(key) = (unsafe { marshal::decode(table.key_type(), key) }) else { return SS_PLUGIN_FAILURE };
    match table.erase_entry(&key) {
        Ok(()) => SS_PLUGIN_SUCCESS,
        Err(_) => SS_PLUGIN_FAILURE,
    }
}

unsafe extern "C" fn create_table_entry(_t: *mut ss_plugin_table_t) -> *mut ss_plugin_table_entry_t {
    entry_to_raw(None)
}

unsafe extern "C" fn destroy_table_entry(_t: *mut ss_plugin_table_t, e: *mut ss_plugin_table_entry_t) {
    drop(unsafe { Box::from_raw(e as *mut EntryHandle) });
}

unsafe extern "C" fn add_table_entry(
    t: *mut ss_plugin_table_t,
    key: *const c_void,
    e: *mut ss_plugin_table_entry_t,
) -> ss_plugin_rc {
    let table = &unsafe { handle(t) }.0;
    let Ok(key) = (unsafe { marshal::decode(table.key_type(), key) }) else { return SS_PLUGIN_FAILURE };
    match table.create_entry(key) {
        Ok(row) => {
            *unsafe { entry_handle(e) }.0.lock().unwrap() = Some(row);
            SS_PLUGIN_SUCCESS
        }
        Err(_) => SS_PLUGIN_FAILURE,
    }
}

unsafe extern "C" fn write_entry_field(
    t: *mut ss_plugin_table_t,
    e: *mut ss_plugin_table_entry_t,
    f: *const plugin_abi::ss_plugin_table_field_t,
    data: *const c_void,
) -> ss_plugin_rc {
    let table = &unsafe { handle(t) }.0;
    let field = unsafe { field_handle(f) };
    let Some(row) = *unsafe { entry_handle(e) }.0.lock().unwrap() else { return SS_PLUGIN_FAILURE };
    let Ok(value) = (unsafe { marshal::decode(field.value_type, data) }) else { return SS_PLUGIN_FAILURE };
    match table.write_field(row, &field.name, value) {
        Ok(()) => SS_PLUGIN_SUCCESS,
        Err(_) => SS_PLUGIN_FAILURE,
    }
}

pub(super) const WRITER_VTABLE: ss_plugin_table_writer_vtable = ss_plugin_table_writer_vtable {
    clear_table: Some(clear_table),
    erase_table_entry: Some(erase_table_entry),
    create_table_entry: Some(create_table_entry),
    destroy_table_entry: Some(destroy_table_entry),
    add_table_entry: Some(add_table_entry),
    write_entry_field: Some(write_entry_field),
};

/// Bridges the owner pointer a plugin is handed at `init`/`parse_event` time
/// back to the shared registry and to whichever plugin made the call, so a
/// table the plugin publishes through `add_table` can be attributed to it
/// and torn down when that plugin is destroyed. Built fresh on the stack for
/// each call; plugins are not expected to retain the owner pointer past it.
pub(crate) struct TableOwner<'a> {
    pub(crate) registry: &'a TableRegistry,
    pub(crate) plugin_name: &'a str,
    pub(crate) published: &'a Mutex<Vec<String>>,
}

/// Builds the `ss_plugin_table_init_input` handed to a plugin at `init`
/// time so it can call `get_table`/`add_table` against the shared registry,
/// and read/write any table handle it receives through `reader_ext`/
/// `writer_ext`/`fields_ext`.
pub(crate) fn build_table_init_input(owner: &TableOwner<'_>) -> ss_plugin_table_init_input {
    ss_plugin_table_init_input {
        owner: owner as *const TableOwner<'_> as *mut ss_plugin_owner_t,
        list_tables: Some(list_tables_trampoline),
        get_table: Some(get_table_trampoline),
        add_table: Some(add_table_trampoline),
        reader_ext: READER_VTABLE,
        writer_ext: WRITER_VTABLE,
        fields_ext: FIELDS_VTABLE,
    }
}

unsafe fn owner_from_ptr<'a>(owner: *mut ss_plugin_owner_t) -> &'a TableOwner<'a> {
    unsafe { &*(owner as *const TableOwner<'_>) }
}

unsafe extern "C" fn list_tables_trampoline(o: *mut ss_plugin_owner_t, n: *mut u32) -> *mut ss_plugin_table_info {
    let owner = unsafe { owner_from_ptr(o) };
    let infos: Vec<ss_plugin_table_info> = owner
        .registry
        .list()
        .into_iter()
        .map(|(name, key_type)| ss_plugin_table_info {
            name: CString::new(name).unwrap().into_raw(),
            key_type: key_type.to_abi(),
        })
        .collect();
    unsafe { *n = infos.len() as u32 };
    Box::into_raw(infos.into_boxed_slice()) as *mut ss_plugin_table_info
}

unsafe extern "C" fn get_table_trampoline(
    o: *mut ss_plugin_owner_t,
    name: *const c_char,
    key_type: ss_plugin_field_type,
) -> *mut ss_plugin_table_t {
    let owner = unsafe { owner_from_ptr(o) };
    let name = match unsafe { CStr::from_ptr(name) }.to_str() {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };
    let Some(value_type) = FieldValueType::from_abi(key_type) else { return std::ptr::null_mut() };
    match owner.registry.get(owner.plugin_name, name, value_type) {
        Ok(table) => to_raw(table),
        Err(_) => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn add_table_trampoline(
    o: *mut ss_plugin_owner_t,
    input: *const ss_plugin_table_input,
) -> ss_plugin_rc {
    let owner = unsafe { owner_from_ptr(o) };
    let input = unsafe { &*input };
    let name = match unsafe { CStr::from_ptr(input.name) }.to_str() {
        Ok(s) => s.to_string(),
        Err(_) => return SS_PLUGIN_FAILURE,
    };
    let Some(key_type) = FieldValueType::from_abi(input.key_type) else { return SS_PLUGIN_FAILURE };
    // `ss_plugin_table_input` is passed by value from the plugin's call
    // frame; copy the vtables out before building the long-lived wrapper.
    let owned_input = ss_plugin_table_input {
        name: input.name,
        key_type: input.key_type,
        table: input.table,
        reader: input.reader,
        writer: input.writer,
        fields: input.fields,
    };
    let foreign = unsafe { super::ForeignTable::new(name.clone(), key_type, owned_input) };
    match owner.registry.register(owner.plugin_name, Arc::new(foreign)) {
        Ok(()) => {
            owner.published.lock().unwrap().push(name);
            SS_PLUGIN_SUCCESS
        }
        Err(_) => SS_PLUGIN_FAILURE,
    }
}

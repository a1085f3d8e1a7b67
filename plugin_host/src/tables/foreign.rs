//! Wraps a plugin-published table (raw C vtable + opaque pointer) into a
//! [`BaseTable`], so the host and other plugins can use it exactly like a
//! native one.

use super::marshal;
use super::{BaseTable, FieldInfo, RowHandle, TableValue};
use crate::error::PluginError;
use crate::fields::FieldValueType;
use plugin_abi::{ss_plugin_table_input, ss_plugin_table_iterator_state, ss_plugin_table_t, SS_PLUGIN_SUCCESS};
use std::ffi::{CStr, CString};
use std::os::raw::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Maps the [`RowHandle`]s this bridge hands out back to the raw
/// `*mut ss_plugin_table_entry_t` pointers the owning plugin understands.
/// Entries are appended, never reused, so a handle is stable for the
/// lifetime of the table: the whole map is dropped, along with the table,
/// when the publishing plugin is destroyed.
#[derive(Debug, Default)]
struct EntryMap {
    entries: Mutex<Vec<*mut plugin_abi::ss_plugin_table_entry_t>>,
}

// SAFETY: the raw entry pointers are only ever dereferenced by calling back
// into the owning plugin's own vtable functions, which the plugin itself
// must make thread-safe if it is accessed from more than one thread. The
// host's own discipline is single-caller-thread-per-call.
unsafe impl Send for EntryMap {}
unsafe impl Sync for EntryMap {}

impl EntryMap {
    fn push(&self, ptr: *mut plugin_abi::ss_plugin_table_entry_t) -> RowHandle {
        let mut entries = self.entries.lock().unwrap();
        entries.push(ptr);
        RowHandle(entries.len() - 1)
    }

    fn get(&self, row: RowHandle) -> Option<*mut plugin_abi::ss_plugin_table_entry_t> {
        self.entries.lock().unwrap().get(row.0).copied()
    }
}

/// A table published by a plugin through its `add_table` call, bridged so
/// the host and other plugins can read/write it through [`BaseTable`]
/// without knowing it lives behind someone else's FFI vtable.
#[derive(Debug)]
pub struct ForeignTable {
    name: String,
    key_type: FieldValueType,
    table_ptr: *mut ss_plugin_table_t,
    input: ss_plugin_table_input,
    entries: EntryMap,
    live: AtomicUsize,
}

// SAFETY: calls are only ever dispatched through the function pointers the
// publishing plugin itself supplied; the host never constructs or mutates
// `table_ptr` except by forwarding to those functions.
unsafe impl Send for ForeignTable {}
unsafe impl Sync for ForeignTable {}

impl ForeignTable {
    /// # Safety
    /// `input` must describe a table that remains valid (i.e. the
    /// publishing plugin has not been destroyed) for as long as the
    /// returned `ForeignTable` is used.
    pub unsafe fn new(name: String, key_type: FieldValueType, input: ss_plugin_table_input) -> Self {
        Self {
            name,
            key_type,
            table_ptr: input.table as *mut ss_plugin_table_t,
            input,
            entries: EntryMap::default(),
            live: AtomicUsize::new(1),
        }
    }

    /// Marks the table as no longer accessible. Called when the publishing
    /// plugin is destroyed, so the registry refuses further access
    /// afterward.
    pub fn invalidate(&self) {
        self.live.store(0, Ordering::SeqCst);
    }

    fn check_live(&self) -> Result<(), PluginError> {
        if self.live.load(Ordering::SeqCst) == 0 {
            Err(PluginError::state(&self.name, "table's publishing plugin has been destroyed"))
        } else {
            Ok(())
        }
    }
}

/// Bundles the caller's visitor closure with enough context to decode the
/// key the plugin hands back per row; passed across the FFI boundary as the
/// `iterate_entries` cookie.
struct IterateCookie<'a> {
    table: *const ForeignTable,
    visit: &'a mut dyn FnMut(&TableValue, RowHandle) -> bool,
    key_type: FieldValueType,
}

unsafe extern "C" fn iterate_trampoline(s: *mut ss_plugin_table_iterator_state, data: *mut c_void) -> bool {
    let cookie = unsafe { &mut *(data as *mut IterateCookie<'_>) };
    let state = unsafe { &*s };
    let Ok(key) = (unsafe { marshal::decode(cookie.key_type, state.key) }) else { return false };
    let row = unsafe { &*cookie.table }.entries.push(state.entry);
    (cookie.visit)(&key, row)
}

impl BaseTable for ForeignTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_type(&self) -> FieldValueType {
        self.key_type
    }

    fn invalidate(&self) {
        ForeignTable::invalidate(self);
    }

    fn fields(&self) -> Vec<FieldInfo> {
        if self.check_live().is_err() {
            return Vec::new();
        }
        let Some(list) = self.input.fields.list_table_fields else { return Vec::new() };
        let mut n: u32 = 0;
        let raw = unsafe { list(self.table_ptr, &mut n as *mut u32) };
        if raw.is_null() {
            return Vec::new();
        }
        let slice = unsafe { std::slice::from_raw_parts(raw, n as usize) };
        slice
            .iter()
            .filter_map(|info| {
                let name = unsafe { CStr::from_ptr(info.name) }.to_str().ok()?.to_string();
                let value_type = FieldValueType::from_abi(info.key_type)?;
                Some(FieldInfo { name, value_type })
            })
            .collect()
    }

    fn get_or_create_field(&self, name: &str, value_type: FieldValueType) -> Result<(), PluginError> {
        self.check_live()?;
        let cname = CString::new(name).map_err(|e| PluginError::argument(&self.name, e.to_string()))?;
        let abi_ty = value_type.to_abi();
        if let Some(get) = self.input.fields.get_table_field {
            let existing = unsafe { get(self.table_ptr, cname.as_ptr(), abi_ty) };
            if !existing.is_null() {
                return Ok(());
            }
        }
        let add = self
            .input
            .fields
            .add_table_field
            .ok_or_else(|| PluginError::compatibility(&self.name, "table does not support adding fields"))?;
        let field = unsafe { add(self.table_ptr, cname.as_ptr(), abi_ty) };
        if field.is_null() {
            Err(PluginError::runtime(&self.name, format!("could not add field {name:?}")))
        } else {
            Ok(())
        }
    }

    fn size(&self) -> u64 {
        if self.check_live().is_err() {
            return 0;
        }
        match self.input.reader.get_table_size {
            Some(f) => unsafe { f(self.table_ptr) },
            None => 0,
        }
    }

    fn lookup(&self, key: &TableValue) -> Option<RowHandle> {
        self.check_live().ok()?;
        let get_entry = self.input.reader.get_table_entry?;
        let encoded = marshal::encode(key).ok()?;
        let ptr = unsafe { get_entry(self.table_ptr, encoded.as_ptr()) };
        if ptr.is_null() {
            None
        } else {
            Some(self.entries.push(ptr))
        }
    }

    fn iterate(&self, visit: &mut dyn FnMut(&TableValue, RowHandle) -> bool) {
        if self.check_live().is_err() {
            return;
        }
        let Some(iterate_entries) = self.input.reader.iterate_entries else { return };
        let mut cookie = IterateCookie { table: self as *const ForeignTable, visit, key_type: self.key_type };
        unsafe {
            iterate_entries(self.table_ptr, iterate_trampoline, &mut cookie as *mut IterateCookie<'_> as *mut c_void);
        }
    }

    fn read_field(&self, row: RowHandle, field: &str) -> Result<TableValue, PluginError> {
        self.check_live()?;
        let entry = self.entries.get(row).ok_or_else(|| PluginError::runtime(&self.name, "stale row handle"))?;
        let cname = CString::new(field).map_err(|e| PluginError::argument(&self.name, e.to_string()))?;
        let field_type = self
            .fields()
            .into_iter()
            .find(|f| f.name == field)
            .map(|f| f.value_type)
            .ok_or_else(|| PluginError::compatibility(&self.name, format!("no such field {field:?}")))?;
        let field_handle = self
            .input
            .fields
            .get_table_field
            .map(|get| unsafe { get(self.table_ptr, cname.as_ptr(), field_type.to_abi()) })
            .filter(|p| !p.is_null())
            .ok_or_else(|| PluginError::compatibility(&self.name, format!("no such field {field:?}")))?;
        let read = self
            .input
            .reader
            .read_entry_field
            .ok_or_else(|| PluginError::compatibility(&self.name, "table is not readable"))?;

        let mut scratch = [0u8; 16];
        let rc = unsafe {
            read(self.table_ptr, entry, field_handle, scratch.as_mut_ptr() as *mut c_void)
        };
        if rc != SS_PLUGIN_SUCCESS {
            return Err(PluginError::runtime(&self.name, format!("read_entry_field failed with rc={rc}")));
        }
        unsafe { marshal::decode(field_type, scratch.as_ptr() as *const c_void) }
            .map_err(|e| PluginError::runtime(&self.name, e))
    }

    fn create_entry(&self, key: TableValue) -> Result<RowHandle, PluginError> {
        self.check_live()?;
        let create = self
            .input
            .writer
            .create_table_entry
            .ok_or_else(|| PluginError::compatibility(&self.name, "table is not writable"))?;
        let add = self
            .input
            .writer
            .add_table_entry
            .ok_or_else(|| PluginError::compatibility(&self.name, "table is not writable"))?;
        let encoded = marshal::encode(&key).map_err(|e| PluginError::argument(&self.name, e))?;

        let entry = unsafe { create(self.table_ptr) };
        if entry.is_null() {
            return Err(PluginError::runtime(&self.name, "create_table_entry returned null"));
        }
        let rc = unsafe { add(self.table_ptr, encoded.as_ptr(), entry) };
        if rc != SS_PLUGIN_SUCCESS {
            return Err(PluginError::runtime(&self.name, format!("add_table_entry failed with rc={rc}")));
        }
        Ok(self.entries.push(entry))
    }

    fn erase_entry(&self, key: &TableValue) -> Result<(), PluginError> {
        self.check_live()?;
        let erase = self
            .input
            .writer
            .erase_table_entry
            .ok_or_else(|| PluginError::compatibility(&self.name, "table is not writable"))?;
        let encoded = marshal::encode(key).map_err(|e| PluginError::argument(&self.name, e))?;
        let rc = unsafe { erase(self.table_ptr, encoded.as_ptr()) };
        if rc == SS_PLUGIN_SUCCESS {
            Ok(())
        } else {
            Err(PluginError::runtime(&self.name, format!("erase_table_entry failed with rc={rc}")))
        }
    }

    fn write_field(&self, row: RowHandle, field: &str, value: TableValue) -> Result<(), PluginError> {
        self.check_live()?;
        let entry = self.entries.get(row).ok_or_else(|| PluginError::runtime(&self.name, "stale row handle"))?;
        let cname = CString::new(field).map_err(|e| PluginError::argument(&self.name, e.to_string()))?;
        let field_handle = self
            .input
            .fields
            .get_table_field
            .map(|get| unsafe { get(self.table_ptr, cname.as_ptr(), value.value_type().to_abi()) })
            .filter(|p| !p.is_null())
            .ok_or_else(|| PluginError::compatibility(&self.name, format!("no such field {field:?}")))?;
        let write = self
            .input
            .writer
            .write_entry_field
            .ok_or_else(|| PluginError::compatibility(&self.name, "table is not writable"))?;
        let encoded = marshal::encode(&value).map_err(|e| PluginError::argument(&self.name, e))?;
        let rc = unsafe { write(self.table_ptr, entry, field_handle, encoded.as_ptr()) };
        if rc == SS_PLUGIN_SUCCESS {
            Ok(())
        } else {
            Err(PluginError::runtime(&self.name, format!("write_entry_field failed with rc={rc}")))
        }
    }

    fn clear(&self) -> Result<(), PluginError> {
        self.check_live()?;
        let clear = self
            .input
            .writer
            .clear_table
            .ok_or_else(|| PluginError::compatibility(&self.name, "table is not writable"))?;
        let rc = unsafe { clear(self.table_ptr) };
        if rc == SS_PLUGIN_SUCCESS {
            Ok(())
        } else {
            Err(PluginError::runtime(&self.name, format!("clear_table failed with rc={rc}")))
        }
    }
}

//! A table implemented natively in Rust.

use super::{BaseTable, FieldInfo, RowHandle, TableValue};
use crate::error::PluginError;
use crate::fields::FieldValueType;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct Inner {
    fields: Vec<FieldInfo>,
    rows: Vec<Option<HashMap<String, TableValue>>>,
    by_key: BTreeMap<TableValue, usize>,
}

/// A table whose storage lives entirely in this process's own memory,
/// whether it was published by the host itself or by a plugin that chose to
/// use the high-level native API rather than rolling its own FFI vtable.
#[derive(Debug)]
pub struct NativeTable {
    name: String,
    key_type: FieldValueType,
    inner: Mutex<Inner>,
}

impl NativeTable {
    pub fn new(name: impl Into<String>, key_type: FieldValueType) -> Self {
        Self {
            name: name.into(),
            key_type,
            inner: Mutex::new(Inner { fields: Vec::new(), rows: Vec::new(), by_key: BTreeMap::new() }),
        }
    }

    fn check_key_type(&self, key: &TableValue) -> Result<(), PluginError> {
        if key.value_type() != self.key_type {
            return Err(PluginError::compatibility(
                &self.name,
                format!("key type {} does not match table key type {}", key.value_type(), self.key_type),
            ));
        }
        Ok(())
    }
}

impl BaseTable for NativeTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_type(&self) -> FieldValueType {
        self.key_type
    }

    fn fields(&self) -> Vec<FieldInfo> {
        self.inner.lock().fields.clone()
    }

    fn get_or_create_field(&self, name: &str, value_type: FieldValueType) -> Result<(), PluginError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.fields.iter().find(|f| f.name == name) {
            if existing.value_type != value_type {
                return Err(PluginError::compatibility(
                    &self.name,
                    format!("field {name:?} already exists with a different type"),
                ));
            }
            return Ok(());
        }
        inner.fields.push(FieldInfo { name: name.to_string(), value_type });
        Ok(())
    }

    fn size(&self) -> u64 {
        self.inner.lock().by_key.len() as u64
    }

    fn lookup(&self, key: &TableValue) -> Option<RowHandle> {
        self.inner.lock().by_key.get(key).map(|&idx| RowHandle(idx))
    }

    fn iterate(&self, visit: &mut dyn FnMut(&TableValue, RowHandle) -> bool) {
        let snapshot: Vec<(TableValue, usize)> =
            self.inner.lock().by_key.iter().map(|(k, &v)| (k.clone(), v)).collect();
        for (key, idx) in snapshot {
            if !visit(&key, RowHandle(idx)) {
                break;
            }
        }
    }

    fn read_field(&self, row: RowHandle, field: &str) -> Result<TableValue, PluginError> {
        let inner = self.inner.lock();
        let row = inner
            .rows
            .get(row.0)
            .and_then(|r| r.as_ref())
            .ok_or_else(|| PluginError::runtime(&self.name, "stale or erased row handle"))?;
        row.get(field)
            .cloned()
            .ok_or_else(|| PluginError::compatibility(&self.name, format!("no such field {field:?}")))
    }

    fn create_entry(&self, key: TableValue) -> Result<RowHandle, PluginError> {
        self.check_key_type(&key)?;
        let mut inner = self.inner.lock();
        let idx = inner.rows.len();
        inner.rows.push(Some(HashMap::new()));
        inner.by_key.insert(key, idx);
        Ok(RowHandle(idx))
    }

    fn erase_entry(&self, key: &TableValue) -> Result<(), PluginError> {
        self.check_key_type(key)?;
        let mut inner = self.inner.lock();
        match inner.by_key.remove(key) {
            Some(idx) => {
                inner.rows[idx] = None;
                Ok(())
            }
            None => Err(PluginError::runtime(&self.name, "erase: no such key")),
        }
    }

    fn write_field(&self, row: RowHandle, field: &str, value: TableValue) -> Result<(), PluginError> {
        let mut inner = self.inner.lock();
        let declared = inner
            .fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.value_type)
            .ok_or_else(|| PluginError::compatibility(&self.name, format!("no such field {field:?}")))?;
        if declared != value.value_type() {
            return Err(PluginError::compatibility(
                &self.name,
                format!("field {field:?} expects {declared}, got {}", value.value_type()),
            ));
        }
        let row = inner
            .rows
            .get_mut(row.0)
            .and_then(|r| r.as_mut())
            .ok_or_else(|| PluginError::runtime(&self.name, "stale or erased row handle"))?;
        row.insert(field.to_string(), value);
        Ok(())
    }

    fn clear(&self) -> Result<(), PluginError> {
        let mut inner = self.inner.lock();
        inner.rows.clear();
        inner.by_key.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_write_read_round_trip() {
        let t = NativeTable::new("procs", FieldValueType::Uint64);
        t.get_or_create_field("comm", FieldValueType::String).unwrap();

        let row = t.create_entry(TableValue::Uint64(42)).unwrap();
        t.write_field(row, "comm", TableValue::String("bash".into())).unwrap();

        let looked_up = t.lookup(&TableValue::Uint64(42)).unwrap();
        assert_eq!(t.read_field(looked_up, "comm").unwrap(), TableValue::String("bash".into()));
        assert_eq!(t.size(), 1);
    }

    #[test]
    fn erase_removes_from_lookup() {
        let t = NativeTable::new("procs", FieldValueType::Uint64);
        t.create_entry(TableValue::Uint64(1)).unwrap();
        t.erase_entry(&TableValue::Uint64(1)).unwrap();
        assert!(t.lookup(&TableValue::Uint64(1)).is_none());
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn wrong_key_type_rejected() {
        let t = NativeTable::new("procs", FieldValueType::Uint64);
        let err = t.create_entry(TableValue::String("x".into())).unwrap_err();
        assert!(matches!(err, PluginError::Compatibility { .. }));
    }
}

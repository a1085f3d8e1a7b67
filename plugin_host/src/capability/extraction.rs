//! Extraction adapter: derives typed field values from an
//! event, for consumption by the filter/expression engine via the
//! field-check adapter ([`crate::filtercheck`]).

use crate::error::PluginError;
use crate::fields::{FieldArg, FieldCatalog, FieldValueType};
use crate::plugin::PluginCore;
use crate::tables::TableValue;
use bumpalo::Bump;
use plugin_abi::{ss_plugin_event, ss_plugin_extract_field, SS_PLUGIN_SUCCESS};
use std::ffi::{CStr, CString};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// One field the caller wants extracted from an event.
#[derive(Debug, Clone)]
pub struct FieldRequest {
    pub field_id: u32,
    pub field_name: String,
    pub arg: FieldArg,
    pub value_type: FieldValueType,
    pub is_list: bool,
}

/// The decoded result of one extraction request, widened to a list when
/// `IS_LIST` is set.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Scalar(TableValue),
    List(Vec<TableValue>),
}

/// Wraps a plugin's EXTRACTION capability. Carries no source/event-type
/// compatibility logic of its own; that gating belongs to the
/// field-check adapter that sits in front of it, so this
/// adapter is a thin, reusable FFI translation for `extract_fields`.
pub struct ExtractionAdapter {
    core: Arc<PluginCore>,
    fields: FieldCatalog,
}

impl ExtractionAdapter {
    pub(crate) fn new(core: Arc<PluginCore>, fields: FieldCatalog) -> Self {
        Self { core, fields }
    }

    pub fn fields(&self) -> &FieldCatalog {
        &self.fields
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    /// Issues one `extract_fields` call covering every request in
    /// `requests`: builds a request vector and lets the plugin fill in
    /// per-request result buffers. Per-call scratch (the request array,
    /// staged C strings) is arena-allocated and freed in one shot when this
    /// call returns.
    pub fn extract_fields(
        &self,
        payload: &[u8],
        requests: &[FieldRequest],
    ) -> Result<Vec<Option<ExtractedValue>>, PluginError> {
        let state = self.core.state()?;
        let extract_fields = self
            .core
            .api
            .extract_fields
            .ok_or_else(|| PluginError::compatibility(self.name(), "plugin does not declare EXTRACTION"))?;

        let arena = Bump::new();
        let mut raw_fields: Vec<ss_plugin_extract_field> = Vec::with_capacity(requests.len());
        // Keep the backing CStrings alive in the arena for the duration of
        // the FFI call; `ss_plugin_extract_field` only borrows pointers.
        for req in requests {
            let field_name = arena.alloc(CString::new(req.field_name.as_str()).map_err(|e| PluginError::argument(self.name(), e.to_string()))?);
            let (arg_key, arg_index, arg_present) = match &req.arg {
                FieldArg::None => (std::ptr::null(), 0u64, 0u8),
                FieldArg::Index(idx) => (std::ptr::null(), *idx, 1u8),
                FieldArg::Key(key) => {
                    let key_c = arena.alloc(CString::new(key.as_str()).map_err(|e| PluginError::argument(self.name(), e.to_string()))?);
                    (key_c.as_ptr(), 0u64, 1u8)
                }
            };
            raw_fields.push(ss_plugin_extract_field {
                field_id: req.field_id,
                field: field_name.as_ptr(),
                arg_key,
                arg_index,
                arg_present,
                ftype: req.value_type.to_abi(),
                flist: req.is_list as u8,
                res_len: 0,
                res: plugin_abi::ss_plugin_extract_value { u64_: std::ptr::null() },
            });
        }

        let raw_event = ss_plugin_event { len: payload.len() as u32, data: payload.as_ptr() };
        let rc = unsafe {
            extract_fields(state, &raw_event as *const _, raw_fields.len() as u32, raw_fields.as_mut_ptr())
        };
        if rc != SS_PLUGIN_SUCCESS {
            return Err(PluginError::runtime(self.name(), self.core.last_error()));
        }

        raw_fields
            .iter()
            .map(|f| unsafe { decode_result(f) }.map_err(|e| PluginError::runtime(self.name(), e)))
            .collect()
    }
}

/// Decodes one filled-in `ss_plugin_extract_field`. `res_len == 0` (and no
/// `IS_LIST`) means the plugin had no value for this event; represented as
/// `Ok(None)`.
unsafe fn decode_result(f: &ss_plugin_extract_field) -> Result<Option<ExtractedValue>, String> {
    let Some(value_type) = FieldValueType::from_abi(f.ftype) else {
        return Err(format!("extract result has unknown field type {}", f.ftype));
    };
    if f.res_len == 0 {
        return Ok(None);
    }
    if f.flist != 0 {
        return Ok(Some(ExtractedValue::List(unsafe { decode_list(value_type, f)? })));
    }
    Ok(Some(ExtractedValue::Scalar(unsafe { decode_scalar(value_type, f)? })))
}

unsafe fn decode_scalar(value_type: FieldValueType, f: &ss_plugin_extract_field) -> Result<TableValue, String> {
    unsafe {
        Ok(match value_type {
            FieldValueType::Uint64 => TableValue::Uint64(*f.res.u64_),
            FieldValueType::RelativeTime => TableValue::RelativeTime(*f.res.u64_),
            FieldValueType::AbsoluteTime => TableValue::AbsoluteTime(*f.res.u64_),
            FieldValueType::Bool => TableValue::Bool(*f.res.u32_ != 0),
            FieldValueType::Ipv4Addr => TableValue::Ipv4Addr(Ipv4Addr::from(*f.res.u32_)),
            FieldValueType::String => {
                let cptr = *f.res.str_;
                if cptr.is_null() {
                    return Err("string result pointer was null".to_string());
                }
                TableValue::String(CStr::from_ptr(cptr).to_string_lossy().into_owned())
            }
            FieldValueType::Ipv4Net => {
                let buf = &*f.res.buf;
                let bytes = std::slice::from_raw_parts(buf.ptr, buf.len as usize);
                if bytes.len() != 5 {
                    return Err("ipv4net result buffer has unexpected length".to_string());
                }
                TableValue::Ipv4Net(Ipv4Addr::from(<[u8; 4]>::try_from(&bytes[..4]).unwrap()), bytes[4])
            }
            FieldValueType::Ipv6Addr => {
                let buf = &*f.res.buf;
                let bytes = std::slice::from_raw_parts(buf.ptr, buf.len as usize);
                let octets: [u8; 16] = bytes.try_into().map_err(|_| "ipv6addr result buffer is not 16 bytes".to_string())?;
                TableValue::Ipv6Addr(Ipv6Addr::from(octets))
            }
            FieldValueType::Ipv6Net => {
                let buf = &*f.res.buf;
                let bytes = std::slice::from_raw_parts(buf.ptr, buf.len as usize);
                if bytes.len() != 17 {
                    return Err("ipv6net result buffer has unexpected length".to_string());
                }
                TableValue::Ipv6Net(Ipv6Addr::from(<[u8; 16]>::try_from(&bytes[..16]).unwrap()), bytes[16])
            }
            FieldValueType::IpNet => {
                let buf = &*f.res.buf;
                let bytes = std::slice::from_raw_parts(buf.ptr, buf.len as usize);
                match bytes.len() {
                    5 => TableValue::IpNet(std::net::IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(&bytes[..4]).unwrap())), bytes[4]),
                    17 => TableValue::IpNet(std::net::IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(&bytes[..16]).unwrap())), bytes[16]),
                    n => return Err(format!("ipnet result buffer has unexpected length {n}")),
                }
            }
        })
    }
}

/// Decodes a list result. Only `uint64`-family and `string` lists are
/// meaningful per the real plugin API (byte-buffer types are not declared
/// as list-capable); any other combination is a malformed result.
unsafe fn decode_list(value_type: FieldValueType, f: &ss_plugin_extract_field) -> Result<Vec<TableValue>, String> {
    unsafe {
        match value_type {
            FieldValueType::Uint64 | FieldValueType::RelativeTime | FieldValueType::AbsoluteTime => {
                let ptr = f.res.u64_;
                if ptr.is_null() {
                    return Ok(Vec::new());
                }
                let values = std::slice::from_raw_parts(ptr, f.res_len as usize);
                Ok(values
                    .iter()
                    .map(|&v| match value_type {
                        FieldValueType::RelativeTime => TableValue::RelativeTime(v),
                        FieldValueType::AbsoluteTime => TableValue::AbsoluteTime(v),
                        _ => TableValue::Uint64(v),
                    })
                    .collect())
            }
            FieldValueType::String => {
                let ptr = f.res.str_;
                if ptr.is_null() {
                    return Ok(Vec::new());
                }
                let ptrs = std::slice::from_raw_parts(ptr, f.res_len as usize);
                ptrs.iter()
                    .map(|&p| {
                        if p.is_null() {
                            Err("string list entry was null".to_string())
                        } else {
                            Ok(TableValue::String(CStr::from_ptr(p).to_string_lossy().into_owned()))
                        }
                    })
                    .collect()
            }
            other => Err(format!("field type {other} does not support IS_LIST")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_uint64_list_result() {
        let values: [u64; 2] = [7, 8];
        let f = ss_plugin_extract_field {
            field_id: 0,
            field: std::ptr::null(),
            arg_key: std::ptr::null(),
            arg_index: 0,
            arg_present: 0,
            ftype: FieldValueType::Uint64.to_abi(),
            flist: 1,
            res_len: 2,
            res: plugin_abi::ss_plugin_extract_value { u64_: values.as_ptr() },
        };
        let decoded = unsafe { decode_result(&f) }.unwrap().unwrap();
        assert_eq!(decoded, ExtractedValue::List(vec![TableValue::Uint64(7), TableValue::Uint64(8)]));
    }

    #[test]
    fn zero_length_result_is_no_value() {
        let f = ss_plugin_extract_field {
            field_id: 0,
            field: std::ptr::null(),
            arg_key: std::ptr::null(),
            arg_index: 0,
            arg_present: 0,
            ftype: FieldValueType::Uint64.to_abi(),
            flist: 0,
            res_len: 0,
            res: plugin_abi::ss_plugin_extract_value { u64_: std::ptr::null() },
        };
        assert!(unsafe { decode_result(&f) }.unwrap().is_none());
    }
}

//! Encodes/decodes [`TableValue`]s to and from the fixed-width or
//! length-prefixed representations used across the FFI boundary. The same
//! type-to-representation mapping applies identically to table field I/O
//! and to extracted field results.

use super::TableValue;
use crate::fields::FieldValueType;
use plugin_abi::ss_plugin_byte_buffer;
use std::ffi::{c_void, CStr, CString};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Decode a scalar value out of a raw buffer whose shape is determined by
/// `value_type`:
/// - uint64/reltime/abstime: 8-byte LE `u64`
/// - bool/ipv4addr: 4-byte `u32`
/// - string: `*const c_char`, NUL-terminated
/// - ipv4net/ipv6addr/ipv6net/ipnet: `ss_plugin_byte_buffer`
///
/// # Safety
/// `ptr` must point to storage matching `value_type`'s representation and
/// must be valid for the duration of this call.
pub unsafe fn decode(value_type: FieldValueType, ptr: *const c_void) -> Result<TableValue, String> {
    unsafe {
        Ok(match value_type {
            FieldValueType::Uint64 => TableValue::Uint64(u64::from_le_bytes(*(ptr as *const [u8; 8]))),
            FieldValueType::RelativeTime => TableValue::RelativeTime(u64::from_le_bytes(*(ptr as *const [u8; 8]))),
            FieldValueType::AbsoluteTime => TableValue::AbsoluteTime(u64::from_le_bytes(*(ptr as *const [u8; 8]))),
            FieldValueType::Bool => TableValue::Bool(*(ptr as *const u32) != 0),
            FieldValueType::Ipv4Addr => TableValue::Ipv4Addr(Ipv4Addr::from(*(ptr as *const u32))),
            FieldValueType::String => {
                let cptr = *(ptr as *const *const std::ffi::c_char);
                if cptr.is_null() {
                    return Err("string field pointer was null".to_string());
                }
                let s = CStr::from_ptr(cptr).to_string_lossy().into_owned();
                TableValue::String(s)
            }
            FieldValueType::Ipv4Net => {
                let (addr, prefix) = decode_net_buf(ptr, 4)?;
                TableValue::Ipv4Net(Ipv4Addr::from(<[u8; 4]>::try_from(addr).unwrap()), prefix)
            }
            FieldValueType::Ipv6Addr => {
                let buf = &*(ptr as *const ss_plugin_byte_buffer);
                let bytes = std::slice::from_raw_parts(buf.ptr, buf.len as usize);
                let octets: [u8; 16] = bytes.try_into().map_err(|_| "ipv6addr buffer is not 16 bytes".to_string())?;
                TableValue::Ipv6Addr(Ipv6Addr::from(octets))
            }
            FieldValueType::Ipv6Net => {
                let (addr, prefix) = decode_net_buf(ptr, 16)?;
                TableValue::Ipv6Net(Ipv6Addr::from(<[u8; 16]>::try_from(addr).unwrap()), prefix)
            }
            FieldValueType::IpNet => {
                let buf = &*(ptr as *const ss_plugin_byte_buffer);
                let bytes = std::slice::from_raw_parts(buf.ptr, buf.len as usize);
                match bytes.len() {
                    6 => TableValue::IpNet(IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(&bytes[..4]).unwrap())), bytes[4]),
                    18 => TableValue::IpNet(IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(&bytes[..16]).unwrap())), bytes[16]),
                    n => return Err(format!("ipnet buffer has unexpected length {n}")),
                }
            }
        })
    }
}

unsafe fn decode_net_buf(ptr: *const c_void, addr_len: usize) -> Result<(Vec<u8>, u8), String> {
    unsafe {
        let buf = &*(ptr as *const ss_plugin_byte_buffer);
        let bytes = std::slice::from_raw_parts(buf.ptr, buf.len as usize);
        if bytes.len() != addr_len + 1 {
            return Err(format!("net buffer has unexpected length {}", bytes.len()));
        }
        Ok((bytes[..addr_len].to_vec(), bytes[addr_len]))
    }
}

/// Owned, short-lived encoding of a [`TableValue`] suitable for handing a
/// `*const c_void` pointer to a plugin's `write_entry_field`. Must outlive
/// the FFI call it's used for; it is never stashed beyond that.
pub enum Encoded {
    U64([u8; 8]),
    U32(u32),
    CString(CString, *const std::ffi::c_char),
    Bytes(Vec<u8>, ss_plugin_byte_buffer),
}

impl Encoded {
    pub fn as_ptr(&self) -> *const c_void {
        match self {
            Self::U64(bytes) => bytes.as_ptr() as *const c_void,
            Self::U32(v) => v as *const u32 as *const c_void,
            Self::CString(_, ptr) => ptr as *const *const std::ffi::c_char as *const c_void,
            Self::Bytes(_, buf) => buf as *const ss_plugin_byte_buffer as *const c_void,
        }
    }
}

pub fn encode(value: &TableValue) -> Result<Encoded, String> {
    Ok(match value {
        TableValue::Uint64(v) | TableValue::RelativeTime(v) | TableValue::AbsoluteTime(v) => {
            Encoded::U64(v.to_le_bytes())
        }
        TableValue::Bool(v) => Encoded::U32(*v as u32),
        TableValue::Ipv4Addr(v) => Encoded::U32(u32::from(*v)),
        TableValue::String(s) => {
            let c = CString::new(s.as_str()).map_err(|e| e.to_string())?;
            let ptr = c.as_ptr();
            Encoded::CString(c, ptr)
        }
        TableValue::Ipv4Net(addr, prefix) => {
            let mut bytes = addr.octets().to_vec();
            bytes.push(*prefix);
            let buf = ss_plugin_byte_buffer { ptr: bytes.as_ptr(), len: bytes.len() as u32 };
            Encoded::Bytes(bytes, buf)
        }
        TableValue::Ipv6Addr(addr) => {
            let bytes = addr.octets().to_vec();
            let buf = ss_plugin_byte_buffer { ptr: bytes.as_ptr(), len: bytes.len() as u32 };
            Encoded::Bytes(bytes, buf)
        }
        TableValue::Ipv6Net(addr, prefix) => {
            let mut bytes = addr.octets().to_vec();
            bytes.push(*prefix);
            let buf = ss_plugin_byte_buffer { ptr: bytes.as_ptr(), len: bytes.len() as u32 };
            Encoded::Bytes(bytes, buf)
        }
        TableValue::IpNet(addr, prefix) => {
            let mut bytes = match addr {
                IpAddr::V4(a) => a.octets().to_vec(),
                IpAddr::V6(a) => a.octets().to_vec(),
            };
            bytes.push(*prefix);
            let buf = ss_plugin_byte_buffer { ptr: bytes.as_ptr(), len: bytes.len() as u32 };
            Encoded::Bytes(bytes, buf)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_round_trips() {
        let v = TableValue::Uint64(0x1122_3344_5566_7788);
        let enc = encode(&v).unwrap();
        let decoded = unsafe { decode(FieldValueType::Uint64, enc.as_ptr()) }.unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn string_round_trips() {
        let v = TableValue::String("hello".to_string());
        let enc = encode(&v).unwrap();
        let decoded = unsafe { decode(FieldValueType::String, enc.as_ptr()) }.unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn ipv4_addr_round_trips() {
        let v = TableValue::Ipv4Addr(Ipv4Addr::new(10, 0, 0, 1));
        let enc = encode(&v).unwrap();
        let decoded = unsafe { decode(FieldValueType::Ipv4Addr, enc.as_ptr()) }.unwrap();
        assert_eq!(decoded, v);
    }
}

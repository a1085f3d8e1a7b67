//! Field descriptor catalog and the JSON grammar it is parsed from.

mod arg;
mod json;

pub use arg::{parse_arg, split_token, FieldArg};
pub use json::parse_field_json;

use std::fmt;

/// One of the value types a field (or table column) can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValueType {
    String,
    Uint64,
    Bool,
    RelativeTime,
    AbsoluteTime,
    Ipv4Addr,
    Ipv4Net,
    Ipv6Addr,
    Ipv6Net,
    IpNet,
}

impl FieldValueType {
    pub fn from_json_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "uint64" => Self::Uint64,
            "bool" => Self::Bool,
            "reltime" => Self::RelativeTime,
            "abstime" => Self::AbsoluteTime,
            "ipv4addr" => Self::Ipv4Addr,
            "ipv4net" => Self::Ipv4Net,
            "ipv6addr" => Self::Ipv6Addr,
            "ipv6net" => Self::Ipv6Net,
            "ipnet" => Self::IpNet,
            _ => return None,
        })
    }

    pub fn from_abi(value: plugin_abi::ss_plugin_field_type) -> Option<Self> {
        Some(match value {
            plugin_abi::FIELD_TYPE_STRING => Self::String,
            plugin_abi::FIELD_TYPE_UINT64 => Self::Uint64,
            plugin_abi::FIELD_TYPE_BOOL => Self::Bool,
            plugin_abi::FIELD_TYPE_RELTIME => Self::RelativeTime,
            plugin_abi::FIELD_TYPE_ABSTIME => Self::AbsoluteTime,
            plugin_abi::FIELD_TYPE_IPV4ADDR => Self::Ipv4Addr,
            plugin_abi::FIELD_TYPE_IPV4NET => Self::Ipv4Net,
            plugin_abi::FIELD_TYPE_IPV6ADDR => Self::Ipv6Addr,
            plugin_abi::FIELD_TYPE_IPV6NET => Self::Ipv6Net,
            plugin_abi::FIELD_TYPE_IPNET => Self::IpNet,
            _ => return None,
        })
    }

    pub fn to_abi(self) -> plugin_abi::ss_plugin_field_type {
        match self {
            Self::String => plugin_abi::FIELD_TYPE_STRING,
            Self::Uint64 => plugin_abi::FIELD_TYPE_UINT64,
            Self::Bool => plugin_abi::FIELD_TYPE_BOOL,
            Self::RelativeTime => plugin_abi::FIELD_TYPE_RELTIME,
            Self::AbsoluteTime => plugin_abi::FIELD_TYPE_ABSTIME,
            Self::Ipv4Addr => plugin_abi::FIELD_TYPE_IPV4ADDR,
            Self::Ipv4Net => plugin_abi::FIELD_TYPE_IPV4NET,
            Self::Ipv6Addr => plugin_abi::FIELD_TYPE_IPV6ADDR,
            Self::Ipv6Net => plugin_abi::FIELD_TYPE_IPV6NET,
            Self::IpNet => plugin_abi::FIELD_TYPE_IPNET,
        }
    }
}

impl fmt::Display for FieldValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Uint64 => "uint64",
            Self::Bool => "bool",
            Self::RelativeTime => "reltime",
            Self::AbsoluteTime => "abstime",
            Self::Ipv4Addr => "ipv4addr",
            Self::Ipv4Net => "ipv4net",
            Self::Ipv6Addr => "ipv6addr",
            Self::Ipv6Net => "ipv6net",
            Self::IpNet => "ipnet",
        };
        f.write_str(s)
    }
}

bitflags::bitflags! {
    /// Flags attached to a field descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u16 {
        const IS_LIST      = 1 << 0;
        const ARG_ALLOWED  = 1 << 1;
        const ARG_REQUIRED = 1 << 2;
        const ARG_INDEX    = 1 << 3;
        const ARG_KEY      = 1 << 4;
        const TABLE_ONLY   = 1 << 5;
        const INFO         = 1 << 6;
        const CONVERSATION = 1 << 7;
    }
}

/// A single typed, flagged field exposed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub display_name: Option<String>,
    pub description: String,
    pub value_type: FieldValueType,
    pub flags: FieldFlags,
}

impl FieldDescriptor {
    /// Invariant 3: the flag closure must hold.
    pub fn validate(&self, plugin_name: &str) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("[{plugin_name}] field has an empty name"));
        }
        if self.description.trim().is_empty() {
            return Err(format!("[{plugin_name}] field {:?} has an empty description", self.name));
        }
        if self.flags.contains(FieldFlags::ARG_REQUIRED)
            && !(self.flags.contains(FieldFlags::ARG_INDEX) || self.flags.contains(FieldFlags::ARG_KEY))
        {
            return Err(format!(
                "[{plugin_name}] field {:?} has ARG_REQUIRED without ARG_INDEX or ARG_KEY",
                self.name
            ));
        }
        if (self.flags.contains(FieldFlags::ARG_INDEX) || self.flags.contains(FieldFlags::ARG_KEY))
            && !self.flags.contains(FieldFlags::ARG_ALLOWED)
        {
            return Err(format!(
                "[{plugin_name}] field {:?} accepts an argument shape without ARG_ALLOWED",
                self.name
            ));
        }
        Ok(())
    }
}

/// The full, ordered catalog parsed from one plugin's field JSON. Order
/// matters: a field's position is its `field_id` for extraction requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldCatalog(pub Vec<FieldDescriptor>);

impl FieldCatalog {
    pub fn get(&self, id: u32) -> Option<&FieldDescriptor> {
        self.0.get(id as usize)
    }

    pub fn position_of(&self, name: &str) -> Option<u32> {
        self.0.iter().position(|f| f.name == name).map(|i| i as u32)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.0.iter()
    }
}

//! Plugin identity metadata.

use plugin_abi::{CAP_EXTRACTION, CAP_PARSING, CAP_SOURCING};
use semver::Version;
use std::collections::BTreeSet;
use std::fmt;

/// The three orthogonal capabilities a plugin may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Sourcing,
    Extraction,
    Parsing,
}

/// The decoded form of the bitset returned by `plugin_get_capabilities`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn from_bits(bits: u32) -> Self {
        let mut set = BTreeSet::new();
        if bits & CAP_SOURCING != 0 {
            set.insert(Capability::Sourcing);
        }
        if bits & CAP_EXTRACTION != 0 {
            set.insert(Capability::Extraction);
        }
        if bits & CAP_PARSING != 0 {
            set.insert(Capability::Parsing);
        }
        Self(set)
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .0
            .iter()
            .map(|c| match c {
                Capability::Sourcing => "sourcing",
                Capability::Extraction => "extraction",
                Capability::Parsing => "parsing",
            })
            .collect();
        write!(f, "{}", names.join("+"))
    }
}

/// Event-source compatibility advertised by an EXTRACTION or PARSING
/// capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCompatibility {
    /// Empty means "all sources".
    pub sources: BTreeSet<String>,
    /// Empty means the defaulting rule in [`SourceCompatibility::with_defaults`] applies.
    pub event_types: BTreeSet<u16>,
}

impl SourceCompatibility {
    /// Apply the default-when-empty rule: if no event types were declared
    /// and the source set is compatible with `syscall`, default to "all
    /// syscall events"; otherwise default to the plugin-event code alone.
    ///
    /// `syscall_event_types` is always empty in this host, since it has no
    /// syscall event-type table to enumerate. A plugin with no declared
    /// source set falls into the first branch and so ends up with an empty
    /// `event_types`, meaning it accepts no event at all rather than "any
    /// event". Such a plugin must declare its sources explicitly to
    /// extract or parse anything.
    pub fn with_defaults(mut self, plugin_event_type: u16, syscall_event_types: &[u16]) -> Self {
        if self.event_types.is_empty() {
            if self.sources.is_empty() || self.sources.contains(plugin_abi::SYSCALL_SOURCE_NAME) {
                self.event_types.extend(syscall_event_types.iter().copied());
            } else {
                self.event_types.insert(plugin_event_type);
            }
        }
        self
    }

    pub fn accepts_source(&self, source_name: &str) -> bool {
        self.sources.is_empty() || self.sources.contains(source_name)
    }

    pub fn accepts_event_type(&self, event_type: u16) -> bool {
        self.event_types.contains(&event_type)
    }
}

/// Immutable metadata extracted from a plugin at load time.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub description: String,
    pub contact: String,
    pub plugin_version: Version,
    pub required_api_version: Version,
    pub capabilities: CapabilitySet,

    /// Non-zero numeric source id; `None` means "generic/no id" (sourcing only).
    pub source_id: Option<u32>,
    /// The event-source name this plugin produces (sourcing only).
    pub event_source: Option<String>,

    pub extract_compat: Option<SourceCompatibility>,
    pub parse_compat: Option<SourceCompatibility>,
}

impl PluginDescriptor {
    /// A successfully-loaded plugin must be describable.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("plugin name is empty".to_string());
        }
        if self.capabilities.is_empty() {
            return Err("plugin declares no capabilities".to_string());
        }
        if self.capabilities.has(Capability::Sourcing) && self.event_source.is_none() {
            return Err("plugin declares SOURCING but returned no event source name".to_string());
        }
        Ok(())
    }
}

//! API version negotiation.
//!
//! A plugin declares the minimum host API version it requires via
//! `plugin_get_required_api_version`. The host rejects plugins whose
//! requirement falls outside the range it supports, naming both versions in
//! the resulting error.

use crate::error::PluginError;
use semver::Version;
use std::ffi::CStr;

/// The API version range this host build supports.
#[derive(Debug, Clone)]
pub struct SupportedApiRange {
    pub min: Version,
    pub max: Version,
}

impl SupportedApiRange {
    pub fn new(min: Version, max: Version) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: &Version) -> bool {
        *v >= self.min && *v <= self.max
    }
}

impl Default for SupportedApiRange {
    fn default() -> Self {
        Self::new(Version::new(3, 0, 0), Version::new(3, 255, 255))
    }
}

/// Parse the raw, NUL-terminated semver string a plugin returns from
/// `plugin_get_required_api_version`, and check it against `range`.
pub fn negotiate(
    plugin_name: &str,
    raw_version: &CStr,
    range: &SupportedApiRange,
) -> Result<Version, PluginError> {
    let s = raw_version
        .to_str()
        .map_err(|e| PluginError::load(plugin_name, format!("required API version is not UTF-8: {e}")))?;
    let required = Version::parse(s)
        .map_err(|e| PluginError::load(plugin_name, format!("required API version {s:?} is not valid semver: {e}")))?;

    if range.contains(&required) {
        Ok(required)
    } else {
        Err(PluginError::load(
            plugin_name,
            format!(
                "plugin requires API version {required}, host supports {}..={}",
                range.min, range.max
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_version_in_range() {
        let range = SupportedApiRange::default();
        let v = negotiate("p", c"3.2.0", &range).unwrap();
        assert_eq!(v, Version::new(3, 2, 0));
    }

    #[test]
    fn rejects_version_out_of_range_naming_both() {
        let range = SupportedApiRange::default();
        let err = negotiate("p", c"2.9.0", &range).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2.9.0"));
        assert!(msg.contains("3.0.0"));
        assert!(msg.contains('p'));
    }

    #[test]
    fn rejects_garbage_version() {
        let range = SupportedApiRange::default();
        assert!(negotiate("p", c"not-a-version", &range).is_err());
    }
}

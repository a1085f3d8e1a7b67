//! Error taxonomy for the plugin host.
//!
//! Every variant carries the plugin name so a caller juggling several
//! loaded plugins can tell which one misbehaved without threading context
//! through every call site, and so every error message carries a
//! consistent `[plugin_name]` prefix.

use thiserror::Error;

/// One of the error kinds a plugin host operation can fail with.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("[{plugin}] failed to load: {detail}")]
    Load { plugin: String, detail: String },

    #[error("[{plugin}] init config rejected by schema: {detail}")]
    Schema { plugin: String, detail: String },

    #[error("[{plugin}] init failed: {detail}")]
    Init { plugin: String, detail: String },

    #[error("[{plugin}] invalid state: {detail}")]
    State { plugin: String, detail: String },

    #[error("[{plugin}] malformed descriptor: {detail}")]
    Descriptor { plugin: String, detail: String },

    #[error("[{plugin}] incompatible: {detail}")]
    Compatibility { plugin: String, detail: String },

    #[error("[{plugin}] bad argument: {detail}")]
    Argument { plugin: String, detail: String },

    #[error("[{plugin}] plugin call failed: {detail}")]
    Runtime { plugin: String, detail: String },
}

impl PluginError {
    pub fn load(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Load { plugin: plugin.into(), detail: detail.into() }
    }

    pub fn schema(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Schema { plugin: plugin.into(), detail: detail.into() }
    }

    pub fn init(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Init { plugin: plugin.into(), detail: detail.into() }
    }

    pub fn state(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::State { plugin: plugin.into(), detail: detail.into() }
    }

    pub fn descriptor(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Descriptor { plugin: plugin.into(), detail: detail.into() }
    }

    pub fn compatibility(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Compatibility { plugin: plugin.into(), detail: detail.into() }
    }

    pub fn argument(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Argument { plugin: plugin.into(), detail: detail.into() }
    }

    pub fn runtime(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Runtime { plugin: plugin.into(), detail: detail.into() }
    }

    /// The plugin name this error is attributed to, for callers that want to
    /// log/report without matching on the full variant set.
    pub fn plugin_name(&self) -> &str {
        match self {
            Self::Load { plugin, .. }
            | Self::Schema { plugin, .. }
            | Self::Init { plugin, .. }
            | Self::State { plugin, .. }
            | Self::Descriptor { plugin, .. }
            | Self::Compatibility { plugin, .. }
            | Self::Argument { plugin, .. }
            | Self::Runtime { plugin, .. } => plugin,
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;

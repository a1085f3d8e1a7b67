//! Sourcing adapter: produces events from a plugin-defined
//! source.

use crate::error::PluginError;
use crate::plugin::PluginCore;
use plugin_abi::{ss_instance_t, ss_plugin_event_batch, PLUGIN_EVENT_TYPE, SS_PLUGIN_EOF, SS_PLUGIN_SUCCESS};
use std::ffi::{CStr, CString};
use std::sync::Arc;

/// One event read off a [`SourceHandle`], with its payload copied out of
/// the plugin's own buffer (which is only guaranteed valid until the next
/// `next_batch` call).
#[derive(Debug, Clone)]
pub struct SourcedEvent {
    pub source_id: u32,
    pub event_type: u16,
    pub payload: Vec<u8>,
}

/// An open source session (the result of `open`). Closing is automatic on
/// drop; `close`
/// is also exposed explicitly for callers that want to release it before
/// the handle's natural scope ends.
pub struct SourceHandle {
    core: Arc<PluginCore>,
    instance: *mut ss_instance_t,
    source_id: u32,
}

// SAFETY: `instance` is only ever passed back into the owning plugin's own
// vtable functions.
unsafe impl Send for SourceHandle {}

impl SourceHandle {
    pub fn close(self) {
        // Drop performs the actual `close` call.
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        if let (Some(close), Ok(state)) = (self.core.api.close, self.core.state()) {
            unsafe { close(state, self.instance) };
        }
    }
}

/// Wraps a plugin's SOURCING capability: `open`/`close`/`next_batch`/
/// `get_progress`/`event_to_string`/`list_open_params`.
pub struct SourcingAdapter {
    core: Arc<PluginCore>,
    source_id: u32,
}

impl SourcingAdapter {
    pub(crate) fn new(core: Arc<PluginCore>, source_id: u32) -> Self {
        Self { core, source_id }
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    pub fn open(&self, params: &str) -> Result<SourceHandle, PluginError> {
        let state = self.core.state()?;
        let open = self
            .core
            .api
            .open
            .ok_or_else(|| PluginError::compatibility(self.name(), "plugin does not declare SOURCING"))?;
        let params_c = CString::new(params).map_err(|e| PluginError::argument(self.name(), e.to_string()))?;
        let mut rc = SS_PLUGIN_SUCCESS;
        let instance = unsafe { open(state, params_c.as_ptr(), &mut rc as *mut _) };
        if rc != SS_PLUGIN_SUCCESS || instance.is_null() {
            return Err(PluginError::runtime(self.name(), self.core.last_error()));
        }
        Ok(SourceHandle { core: Arc::clone(&self.core), instance, source_id: self.source_id })
    }

    /// Reads the next batch of events, copying each payload into owned
    /// storage. `Ok(events)` with an empty `Vec` and no error signals
    /// end-of-stream (`SS_PLUGIN_EOF`); any other non-success status is a
    /// `PluginRuntimeError`.
    pub fn next_batch(&self, handle: &SourceHandle) -> Result<Vec<SourcedEvent>, PluginError> {
        let state = self.core.state()?;
        let next_batch = self
            .core
            .api
            .next_batch
            .ok_or_else(|| PluginError::compatibility(self.name(), "plugin does not declare SOURCING"))?;
        let mut batch = ss_plugin_event_batch { events: std::ptr::null(), nevents: 0 };
        let rc = unsafe { next_batch(state, handle.instance, &mut batch as *mut _) };
        if rc == SS_PLUGIN_EOF {
            return Ok(Vec::new());
        }
        if rc != SS_PLUGIN_SUCCESS {
            return Err(PluginError::runtime(self.name(), self.core.last_error()));
        }
        if batch.events.is_null() {
            return Ok(Vec::new());
        }
        let raw = unsafe { std::slice::from_raw_parts(batch.events, batch.nevents as usize) };
        let mut out = Vec::with_capacity(raw.len());
        for &evt_ptr in raw {
            if evt_ptr.is_null() {
                continue;
            }
            let evt = unsafe { &*evt_ptr };
            let payload = if evt.data.is_null() {
                Vec::new()
            } else {
                unsafe { std::slice::from_raw_parts(evt.data, evt.len as usize) }.to_vec()
            };
            out.push(SourcedEvent { source_id: handle.source_id, event_type: PLUGIN_EVENT_TYPE, payload });
        }
        Ok(out)
    }

    pub fn get_progress(&self, handle: &SourceHandle) -> Result<(String, u32), PluginError> {
        let state = self.core.state()?;
        let Some(get_progress) = self.core.api.get_progress else {
            return Ok((String::new(), 0));
        };
        let mut pct = 0u32;
        let raw = unsafe { get_progress(state, handle.instance, &mut pct as *mut _) };
        let text = if raw.is_null() { String::new() } else { unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned() };
        Ok((text, pct.min(100)))
    }

    pub fn event_to_string(&self, event: &SourcedEvent) -> Result<String, PluginError> {
        let state = self.core.state()?;
        let Some(f) = self.core.api.event_to_string else {
            return Ok(String::new());
        };
        let raw_event = plugin_abi::ss_plugin_event { len: event.payload.len() as u32, data: event.payload.as_ptr() };
        let raw = unsafe { f(state, &raw_event as *const _) };
        if raw.is_null() {
            Ok(String::new())
        } else {
            Ok(unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned())
        }
    }

    /// One entry of `list_open_params()`; the `separator` field is threaded
    /// through to the caller.
    pub fn list_open_params(&self) -> Result<Vec<OpenParam>, PluginError> {
        let state = self.core.state()?;
        let Some(f) = self.core.api.list_open_params else {
            return Ok(Vec::new());
        };
        let mut rc = SS_PLUGIN_SUCCESS;
        let raw = unsafe { f(state, &mut rc as *mut _) };
        if rc != SS_PLUGIN_SUCCESS {
            return Err(PluginError::runtime(self.name(), self.core.last_error()));
        }
        if raw.is_null() {
            return Ok(Vec::new());
        }
        let json = unsafe { CStr::from_ptr(raw) }.to_string_lossy();
        parse_open_params(self.name(), &json)
    }
}

/// One entry returned by `list_open_params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenParam {
    pub value: String,
    pub desc: String,
    pub separator: char,
}

#[derive(serde::Deserialize)]
struct RawOpenParam {
    value: String,
    #[serde(default)]
    desc: String,
    #[serde(default = "default_separator")]
    separator: String,
}

fn default_separator() -> String {
    ",".to_string()
}

fn parse_open_params(plugin_name: &str, json: &str) -> Result<Vec<OpenParam>, PluginError> {
    let raw: Vec<RawOpenParam> = serde_json::from_str(json)
        .map_err(|e| PluginError::runtime(plugin_name, format!("list_open_params did not return a JSON array: {e}")))?;
    raw.into_iter()
        .map(|p| {
            if p.value.is_empty() {
                return Err(PluginError::runtime(plugin_name, "list_open_params entry has an empty \"value\""));
            }
            Ok(OpenParam { value: p.value, desc: p.desc, separator: p.separator.chars().next().unwrap_or(',') })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_params_rejecting_empty_value() {
        let json = r#"[{"value":"a","desc":"d","separator":","}]"#;
        let parsed = parse_open_params("p", json).unwrap();
        assert_eq!(parsed, vec![OpenParam { value: "a".into(), desc: "d".into(), separator: ',' }]);

        let bad = r#"[{"value":"","desc":"d"}]"#;
        assert!(parse_open_params("p", bad).is_err());
    }

    #[test]
    fn default_separator_is_comma() {
        let json = r#"[{"value":"a"}]"#;
        let parsed = parse_open_params("p", json).unwrap();
        assert_eq!(parsed[0].separator, ',');
    }
}

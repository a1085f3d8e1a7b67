//! Process-global registry of open plugin libraries.
//!
//! Replaces the implicit module-scope table the source assumes with an
//! explicit, owned object. The registry tracks *reference counts* per path
//! rather than a single boolean, since loading the same path twice is
//! permitted and must yield two independent descriptors that each release
//! their own library handle on drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct LoadedLibraryRegistry {
    open: Mutex<HashMap<PathBuf, usize>>,
}

impl LoadedLibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure query: is `path` currently open by at least one loaded plugin?
    pub fn is_plugin_loaded(&self, path: &Path) -> bool {
        self.open.lock().contains_key(path)
    }

    /// All currently-open paths, for diagnostics/listing.
    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.open.lock().keys().cloned().collect()
    }

    pub(crate) fn track_open(&self, path: &Path) {
        *self.open.lock().entry(path.to_path_buf()).or_insert(0) += 1;
    }

    pub(crate) fn track_close(&self, path: &Path) {
        let mut open = self.open.lock();
        if let Some(count) = open.get_mut(path) {
            *count -= 1;
            if *count == 0 {
                open.remove(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_same_path_twice_is_idempotent_to_query() {
        let reg = LoadedLibraryRegistry::new();
        let p = PathBuf::from("/tmp/does-not-need-to-exist.so");
        assert!(!reg.is_plugin_loaded(&p));

        reg.track_open(&p);
        assert!(reg.is_plugin_loaded(&p));

        reg.track_open(&p);
        assert!(reg.is_plugin_loaded(&p));

        reg.track_close(&p);
        assert!(reg.is_plugin_loaded(&p), "still open: second loader instance holds it");

        reg.track_close(&p);
        assert!(!reg.is_plugin_loaded(&p));
    }
}

//! Process-wide outputs store.
//!
//! Each stack's output dictionary is merged into `<home>/Outputs/<key>.yaml`,
//! one file per top-level reference segment. Files are loaded on first touch
//! and written through on every merge.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::{
    application::{ApplicationError, ports::Filesystem},
    domain::{Reference, lookup_leaf, merge_mappings},
    error::StrataResult,
};

use super::layout::StateLayout;

pub struct OutputsStore {
    layout: StateLayout,
    loaded: Mutex<HashMap<String, Mapping>>,
}

impl OutputsStore {
    pub fn new(layout: StateLayout) -> Self {
        Self {
            layout,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Merge a stack's output dictionary and write each touched key.
    pub fn add(&self, fs: &dyn Filesystem, outputs: &Mapping) -> StrataResult<()> {
        let mut loaded = self
            .loaded
            .lock()
            .map_err(|_| ApplicationError::StoreLockError)?;

        for (key, value) in outputs {
            let Some(name) = key.as_str() else {
                continue;
            };
            let doc = Self::load_into(&mut loaded, &self.layout, fs, name)?;
            let mut incoming = Mapping::new();
            incoming.insert(key.clone(), value.clone());
            merge_mappings(doc, incoming);
            self.save(fs, name, doc)?;
        }
        Ok(())
    }

    /// The `__name__` leaf stored for `reference`, if any.
    pub fn lookup(&self, fs: &dyn Filesystem, reference: &Reference) -> StrataResult<Option<String>> {
        let mut loaded = self
            .loaded
            .lock()
            .map_err(|_| ApplicationError::StoreLockError)?;
        let doc = Self::load_into(&mut loaded, &self.layout, fs, reference.root())?;
        Ok(lookup_leaf(doc, reference.parts()).map(str::to_string))
    }

    /// Write every loaded key back to disk.
    pub fn flush(&self, fs: &dyn Filesystem) -> StrataResult<()> {
        let loaded = self
            .loaded
            .lock()
            .map_err(|_| ApplicationError::StoreLockError)?;
        for (key, doc) in loaded.iter().filter(|(_, doc)| !doc.is_empty()) {
            self.save(fs, key, doc)?;
        }
        Ok(())
    }

    // ----- Internal Helpers -----

    fn load_into<'a>(
        loaded: &'a mut HashMap<String, Mapping>,
        layout: &StateLayout,
        fs: &dyn Filesystem,
        key: &str,
    ) -> StrataResult<&'a mut Mapping> {
        if !loaded.contains_key(key) {
            let path = layout.outputs_file(key);
            let doc = match fs.read_to_string(&path)? {
                Some(text) => match serde_yaml::from_str::<Value>(&text) {
                    Ok(Value::Mapping(map)) => map,
                    Ok(_) => Mapping::new(),
                    Err(e) => {
                        return Err(ApplicationError::Serialization {
                            path,
                            reason: e.to_string(),
                        }
                        .into());
                    }
                },
                None => Mapping::new(),
            };
            debug!(key, entries = doc.len(), "Loaded outputs");
            loaded.insert(key.to_string(), doc);
        }
        loaded
            .get_mut(key)
            .ok_or_else(|| ApplicationError::StoreLockError.into())
    }

    fn save(&self, fs: &dyn Filesystem, key: &str, doc: &Mapping) -> StrataResult<()> {
        let path = self.layout.outputs_file(key);
        let text = serde_yaml::to_string(doc).map_err(|e| ApplicationError::Serialization {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs.write_file(&path, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::output::MockFilesystem;
    use crate::domain::output_dict;
    use std::sync::{Arc, Mutex as StdMutex};

    fn recording_fs(
        existing: Option<&'static str>,
        writes: Arc<StdMutex<Vec<(String, String)>>>,
    ) -> MockFilesystem {
        let mut fs = MockFilesystem::new();
        fs.expect_read_to_string()
            .returning(move |_| Ok(existing.map(str::to_string)));
        fs.expect_write_file().returning(move |path, content| {
            writes
                .lock()
                .unwrap()
                .push((path.display().to_string(), content.to_string()));
            Ok(())
        });
        fs
    }

    #[test]
    fn add_writes_through_per_top_level_key() {
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let fs = recording_fs(None, Arc::clone(&writes));
        let store = OutputsStore::new(StateLayout::new("/p"));

        let mut outputs = output_dict("netenv.dev.vpc.id", "vpc-1");
        merge_mappings(&mut outputs, output_dict("accounts.dev.id", "123"));
        store.add(&fs, &outputs).unwrap();

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().any(|(p, _)| p == "/p/Outputs/netenv.yaml"));
        assert!(writes.iter().any(|(p, _)| p == "/p/Outputs/accounts.yaml"));
    }

    #[test]
    fn lookup_reads_existing_file_and_preserves_siblings() {
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let fs = recording_fs(
            Some("netenv:\n  dev:\n    subnet:\n      __name__: sn-1\n"),
            Arc::clone(&writes),
        );
        let store = OutputsStore::new(StateLayout::new("/p"));
        store
            .add(&fs, &output_dict("netenv.dev.vpc", "vpc-9"))
            .unwrap();

        let subnet = Reference::from_path("netenv.dev.subnet").unwrap();
        let vpc = Reference::from_path("netenv.dev.vpc").unwrap();
        assert_eq!(store.lookup(&fs, &subnet).unwrap().as_deref(), Some("sn-1"));
        assert_eq!(store.lookup(&fs, &vpc).unwrap().as_deref(), Some("vpc-9"));
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let fs = recording_fs(Some("netenv: [unclosed"), writes);
        let store = OutputsStore::new(StateLayout::new("/p"));
        let reference = Reference::from_path("netenv.x").unwrap();
        let err = store.lookup(&fs, &reference).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StrataError::Application(ApplicationError::Serialization { .. })
        ));
    }
}

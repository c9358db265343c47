// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Collaborators that supply and post-process artifact bytes.

use crate::error::Result;
use crate::models::{normalize_resource_path, resource_package, unit_path};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Where a provider's bytes come from. The loader never interprets the
/// bytes; it only cares whether a lookup succeeded.
pub trait ArtifactSource: Send + Sync {
    /// Reads the artifact at `path`, or `None` when the source lacks it.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    fn contains(&self, path: &str) -> bool {
        matches!(self.read(path), Ok(Some(_)))
    }

    /// Packages this source holds content for.
    fn packages(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Post-processing applied to a unit's bytes before it is materialised.
pub trait TransformHook: Send + Sync {
    fn transform(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<u8>>;
}

impl<F> TransformHook for F
where
    F: Fn(&str, Vec<u8>) -> Result<Vec<u8>> + Send + Sync,
{
    fn transform(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
        self(name, bytes)
    }
}

/// In-memory source keyed by normalised resource path.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: RwLock<BTreeMap<String, Arc<[u8]>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(self, name: &str, bytes: impl AsRef<[u8]>) -> Self {
        self.insert_unit(name, bytes);
        self
    }

    pub fn with_resource(self, path: &str, bytes: impl AsRef<[u8]>) -> Self {
        self.insert_resource(path, bytes);
        self
    }

    pub fn insert_unit(&self, name: &str, bytes: impl AsRef<[u8]>) {
        self.insert_resource(&unit_path(name), bytes);
    }

    pub fn insert_resource(&self, path: &str, bytes: impl AsRef<[u8]>) {
        self.entries.write().insert(
            normalize_resource_path(path).to_string(),
            Arc::from(bytes.as_ref()),
        );
    }

    pub fn remove(&self, path: &str) -> bool {
        self.entries
            .write()
            .remove(normalize_resource_path(path))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ArtifactSource for MemorySource {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .get(normalize_resource_path(path))
            .map(|bytes| bytes.to_vec()))
    }

    fn contains(&self, path: &str) -> bool {
        self.entries
            .read()
            .contains_key(normalize_resource_path(path))
    }

    fn packages(&self) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .map(|path| resource_package(path))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoaderError;

    #[test]
    fn memory_source_reads_units_and_resources() {
        let source = MemorySource::new()
            .with_unit("com.a.Foo", b"foo")
            .with_resource("/com/a/data.txt", b"data");

        assert!(source.contains("com/a/Foo.unit"));
        assert!(source.contains("com/a/data.txt"));
        assert_eq!(source.read("/com/a/data.txt").unwrap(), Some(b"data".to_vec()));
        assert_eq!(source.read("com/a/Bar.unit").unwrap(), None);
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn memory_source_lists_packages_once() {
        let source = MemorySource::new()
            .with_unit("com.a.Foo", b"")
            .with_unit("com.a.Bar", b"")
            .with_unit("org.b.Baz", b"");
        assert_eq!(source.packages(), vec!["com.a".to_string(), "org.b".to_string()]);

        assert!(source.remove("org/b/Baz.unit"));
        assert_eq!(source.packages(), vec!["com.a".to_string()]);
    }

    #[test]
    fn closures_act_as_transform_hooks() {
        let upper = |_: &str, bytes: Vec<u8>| -> Result<Vec<u8>> { Ok(bytes.to_ascii_uppercase()) };
        assert_eq!(upper.transform("com.a.Foo", b"abc".to_vec()).unwrap(), b"ABC".to_vec());

        let failing =
            |name: &str, _: Vec<u8>| -> Result<Vec<u8>> { Err(LoaderError::Transform(name.to_string())) };
        assert!(matches!(
            failing.transform("com.a.Foo", Vec::new()),
            Err(LoaderError::Transform(_))
        ));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mount registry: named KV stores under one mount root.
//!
//! The registry map is guarded by a reader-writer lock. Data operations run
//! under the read side for their whole duration; `create` and `restore` take
//! the write side. Sealing clears the map through the write side, which
//! drains every in-flight data operation before key material is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::crypto::Cipher;
use crate::kv::{KvConfig, KvStore};
use crate::{CancelToken, Result, VaultError};

/// Mount creation request: a type plus a free-form config block.
#[derive(Debug, Clone, Default)]
pub struct MountSpec {
    pub mount_type: String,
    pub config: Map<String, Value>,
}

/// Registry of active mounts, keyed by normalized mount path.
pub struct MountRegistry {
    root: PathBuf,
    stores: RwLock<HashMap<String, Arc<KvStore>>>,
}

impl MountRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stores: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create and register a new mount.
    ///
    /// The path is normalized by collapsing redundant separators and must
    /// not contain `.`. Only the `kv` mount type is supported.
    pub fn create_mount(
        &self,
        ctx: &CancelToken,
        path: &str,
        spec: &MountSpec,
        cipher: &Arc<Cipher>,
    ) -> Result<String> {
        let name = normalize_mount_path(path)?;

        if spec.mount_type != "kv" {
            return Err(VaultError::UnknownMountType(spec.mount_type.clone()));
        }
        let config = parse_kv_config(&spec.config)?;

        let mut stores = self.stores.write();
        if stores.contains_key(&name) {
            return Err(VaultError::MountExists(name));
        }

        ctx.check()?;
        let store = KvStore::create(&self.root, &name, &config, Arc::clone(cipher))?;
        stores.insert(name.clone(), Arc::new(store));
        Ok(name)
    }

    /// Rebind every mount found under `<root>/data/` using the given cipher.
    ///
    /// A mount that fails to restore is skipped with a warning; it does not
    /// abort the unseal. Returns the number of restored mounts.
    pub fn restore(&self, ctx: &CancelToken, cipher: &Arc<Cipher>) -> Result<usize> {
        let mut stores = self.stores.write();
        ctx.check()?;
        stores.clear();

        let data_dir = self.root.join("data");
        let entries = match std::fs::read_dir(&data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(VaultError::IoFailure(e.to_string())),
        };

        for entry in entries {
            let entry = entry.map_err(|e| VaultError::IoFailure(e.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("skipping mount with non-UTF-8 name");
                continue;
            };
            match KvStore::open(&self.root, &name, Arc::clone(cipher)) {
                Ok(store) => {
                    stores.insert(name, Arc::new(store));
                },
                Err(err) => {
                    tracing::warn!(mount = %name, error = %err, "skipping mount that failed to restore");
                },
            }
        }

        Ok(stores.len())
    }

    /// Drop every registered store. Blocks until in-flight data operations
    /// holding the read side have finished.
    pub fn clear(&self) {
        self.stores.write().clear();
    }

    /// Run `f` against a mounted store, holding the registry's read side for
    /// the duration of the call.
    pub fn with_store<R>(&self, mount: &str, f: impl FnOnce(&KvStore) -> Result<R>) -> Result<R> {
        let stores = self.stores.read();
        let store = stores.get(mount).ok_or(VaultError::NotFound)?;
        f(store)
    }

    /// Names of the currently registered mounts, sorted.
    #[must_use]
    pub fn mount_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Collapse redundant separators and reject empty or dotted paths.
fn normalize_mount_path(path: &str) -> Result<String> {
    if path.contains('.') {
        return Err(VaultError::PathContainsDot);
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(VaultError::BadConfig("mount path is empty".to_string()));
    }
    Ok(segments.join("/"))
}

/// Pull the recognized keys out of a mount config block.
///
/// Unknown keys are ignored; wrongly typed values are rejected.
fn parse_kv_config(config: &Map<String, Value>) -> Result<KvConfig> {
    let mut parsed = KvConfig::default();
    for (key, value) in config {
        match key.as_str() {
            "casRequired" => {
                parsed.cas_required = value.as_bool().ok_or_else(|| {
                    VaultError::BadConfig("casRequired must be a boolean".to_string())
                })?;
            },
            "deleteVersionAfter" => {
                parsed.delete_version_after = value
                    .as_str()
                    .ok_or_else(|| {
                        VaultError::BadConfig("deleteVersionAfter must be a string".to_string())
                    })?
                    .to_string();
            },
            "maxVersions" => {
                parsed.max_versions = value.as_u64().ok_or_else(|| {
                    VaultError::BadConfig("maxVersions must be a non-negative integer".to_string())
                })?;
            },
            _ => {},
        }
    }
    Ok(parsed)
}

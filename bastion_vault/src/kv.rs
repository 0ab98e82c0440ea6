// SPDX-License-Identifier: MIT OR Apache-2.0
//! Versioned key/value engine, one instance per mount.
//!
//! Each secret path maps to a single file holding every version of that
//! secret plus its metadata. The whole document is serialized to JSON and
//! encrypted as one AEAD frame before it touches disk. Filenames are the
//! standard-base64 encoding of the secret path, which flattens hierarchical
//! keys into one directory.
//!
//! The record array is canonical: a record's version is always its index
//! plus one, and `current_version` always equals the array length. The
//! persisted `version` field is written for readability but never trusted
//! over the index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::crypto::Cipher;
use crate::{fsio, CancelToken, Result, VaultError};

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn rfc3339_now() -> String {
    now().format(&Rfc3339).unwrap_or_default()
}

/// Per-mount engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvConfig {
    /// Require a check-and-set parameter on every write.
    #[serde(default)]
    pub cas_required: bool,
    /// Opaque duration string after which deleted versions may be reaped.
    #[serde(default)]
    pub delete_version_after: String,
    /// Maximum retained versions per secret; 0 means unbounded.
    #[serde(default)]
    pub max_versions: u64,
}

/// Per-version bookkeeping attached to a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
    #[serde(default)]
    pub custom_metadata: Option<Value>,
    /// RFC 3339 deletion timestamp; empty string while the record is live.
    #[serde(default)]
    pub deletion_time: String,
    #[serde(default)]
    pub destroyed: bool,
    pub version: u64,
}

/// One version of a secret. `data` is `None` once the version is destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub data: Option<Map<String, Value>>,
    pub metadata: RecordMetadata,
}

impl Record {
    /// A record is live while it is neither destroyed nor soft-deleted.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.metadata.destroyed && self.metadata.deletion_time.is_empty()
    }
}

/// Per-version summary exposed in secret metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
    #[serde(default)]
    pub deletion_time: String,
    #[serde(default)]
    pub destroyed: bool,
}

/// Secret-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub cas_required: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
    pub current_version: u64,
    pub delete_version_after: String,
    pub max_versions: u64,
    pub oldest_version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_time: OffsetDateTime,
    #[serde(default)]
    pub custom_metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionSummary>,
}

/// Policy fields an `update_meta` call overwrites.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaUpdate {
    #[serde(default)]
    pub cas_required: bool,
    #[serde(default)]
    pub delete_version_after: String,
    #[serde(default)]
    pub max_versions: u64,
    #[serde(default)]
    pub custom_metadata: Option<Map<String, Value>>,
}

/// On-disk document: every version of one secret plus its metadata.
#[derive(Debug, Serialize, Deserialize)]
struct SecretDocument {
    records: Vec<Record>,
    meta: Metadata,
}

/// Versioned KV store bound to one mount's directories.
///
/// All operations serialize on a store-local mutex so every caller observes
/// a consistent document snapshot.
pub struct KvStore {
    name: String,
    config_file: PathBuf,
    data_dir: PathBuf,
    cipher: Arc<Cipher>,
    lock: Mutex<()>,
}

impl KvStore {
    fn layout(root: &Path, name: &str, cipher: Arc<Cipher>) -> Self {
        Self {
            name: name.to_string(),
            config_file: root.join(name).join(BASE64.encode("config")),
            data_dir: root.join("data").join(name),
            cipher,
            lock: Mutex::new(()),
        }
    }

    /// Create a mount's directories and config file, then bind to them.
    pub(crate) fn create(
        root: &Path,
        name: &str,
        config: &KvConfig,
        cipher: Arc<Cipher>,
    ) -> Result<Self> {
        let store = Self::layout(root, name, cipher);
        fsio::create_dir_all(&store.data_dir)?;
        store.write_config(config)?;
        Ok(store)
    }

    /// Re-bind to an existing mount, validating its config file.
    pub(crate) fn open(root: &Path, name: &str, cipher: Arc<Cipher>) -> Result<Self> {
        let store = Self::layout(root, name, cipher);
        store.read_config()?;
        fsio::create_dir_all(&store.data_dir)?;
        Ok(store)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- config ----

    pub fn config(&self, ctx: &CancelToken) -> Result<KvConfig> {
        let _guard = self.lock.lock();
        ctx.check()?;
        self.read_config()
    }

    pub fn update_config(&self, ctx: &CancelToken, config: &KvConfig) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;
        self.write_config(config)
    }

    fn read_config(&self) -> Result<KvConfig> {
        let bytes = fsio::read(&self.config_file)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VaultError::Corrupt(format!("mount config: {e}")))
    }

    fn write_config(&self, config: &KvConfig) -> Result<()> {
        let bytes = serde_json::to_vec(config)
            .map_err(|e| VaultError::Corrupt(format!("mount config: {e}")))?;
        fsio::atomic_write(&self.config_file, &bytes)
    }

    // ---- secret data ----

    /// Write a new version of a secret, creating the document on first use.
    ///
    /// When the existing metadata has `cas_required` set, `cas` must equal
    /// the current version before the append.
    pub fn save(
        &self,
        ctx: &CancelToken,
        path: &str,
        data: Map<String, Value>,
        cas: Option<u64>,
    ) -> Result<Record> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let (mut doc, record) = match self.read_document(path)? {
            None => {
                let config = match self.read_config() {
                    Ok(config) => config,
                    Err(VaultError::NotFound) => KvConfig::default(),
                    Err(err) => return Err(err),
                };
                let doc = Self::new_document(data, &config);
                let record = doc.records[0].clone();
                (doc, record)
            },
            Some(mut doc) => {
                if doc.meta.cas_required && cas != Some(doc.meta.current_version) {
                    return Err(VaultError::CasMismatch);
                }
                let record = Record {
                    data: Some(data),
                    metadata: RecordMetadata {
                        created_time: now(),
                        custom_metadata: None,
                        deletion_time: String::new(),
                        destroyed: false,
                        version: doc.records.len() as u64 + 1,
                    },
                };
                doc.records.push(record.clone());
                doc.meta.current_version = doc.records.len() as u64;
                doc.meta.updated_time = now();
                Self::prune(&mut doc);
                (doc, record)
            },
        };

        self.write_document(path, &mut doc)?;
        Ok(record)
    }

    /// Replace the payload of the newest live version in place.
    ///
    /// A missing document is created as if by [`KvStore::save`]; no new
    /// version is appended otherwise.
    pub fn update(
        &self,
        ctx: &CancelToken,
        path: &str,
        data: Map<String, Value>,
    ) -> Result<Record> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let (mut doc, record) = match self.read_document(path)? {
            None => {
                let config = match self.read_config() {
                    Ok(config) => config,
                    Err(VaultError::NotFound) => KvConfig::default(),
                    Err(err) => return Err(err),
                };
                let doc = Self::new_document(data, &config);
                let record = doc.records[0].clone();
                (doc, record)
            },
            Some(mut doc) => {
                let record = {
                    let newest = doc
                        .records
                        .iter_mut()
                        .rev()
                        .find(|r| r.is_live())
                        .ok_or(VaultError::NotFound)?;
                    newest.data = Some(data);
                    newest.clone()
                };
                doc.meta.updated_time = now();
                (doc, record)
            },
        };

        self.write_document(path, &mut doc)?;
        Ok(record)
    }

    /// Return the newest live version.
    pub fn get(&self, ctx: &CancelToken, path: &str) -> Result<Record> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        let mut record = doc
            .records
            .iter()
            .rev()
            .find(|r| r.is_live())
            .cloned()
            .ok_or(VaultError::NotFound)?;
        record.metadata.custom_metadata = doc.meta.custom_metadata.clone().map(Value::Object);
        Ok(record)
    }

    /// Return a specific version if it is live.
    pub fn get_version(&self, ctx: &CancelToken, path: &str, version: u64) -> Result<Record> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        let index = usize::try_from(version)
            .ok()
            .and_then(|v| v.checked_sub(1))
            .ok_or(VaultError::VersionNotFound)?;
        let mut record = doc
            .records
            .get(index)
            .filter(|r| r.is_live())
            .cloned()
            .ok_or(VaultError::VersionNotFound)?;
        record.metadata.custom_metadata = doc.meta.custom_metadata.clone().map(Value::Object);
        Ok(record)
    }

    /// Soft-delete the newest live version.
    pub fn delete(&self, ctx: &CancelToken, path: &str) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let mut doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        {
            let newest = doc
                .records
                .iter_mut()
                .rev()
                .find(|r| r.is_live())
                .ok_or(VaultError::NotFound)?;
            newest.metadata.deletion_time = rfc3339_now();
        }
        self.write_document(path, &mut doc)
    }

    /// Soft-delete every listed version that is currently live.
    pub fn delete_versions(&self, ctx: &CancelToken, path: &str, versions: &[u64]) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let mut doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        let stamp = rfc3339_now();
        let mut changed = false;
        for record in &mut doc.records {
            if record.is_live() && versions.contains(&record.metadata.version) {
                record.metadata.deletion_time = stamp.clone();
                changed = true;
            }
        }
        if !changed {
            return Err(VaultError::NotFound);
        }
        self.write_document(path, &mut doc)
    }

    /// Clear the deletion mark on the newest soft-deleted, non-destroyed
    /// version. No-op when nothing qualifies.
    pub fn undelete(&self, ctx: &CancelToken, path: &str) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let mut doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        let found = doc
            .records
            .iter_mut()
            .rev()
            .find(|r| !r.metadata.destroyed && !r.metadata.deletion_time.is_empty());
        if let Some(record) = found {
            record.metadata.deletion_time.clear();
            self.write_document(path, &mut doc)?;
        }
        Ok(())
    }

    /// Clear the deletion mark on one version. No-op when it is not
    /// soft-deleted or already destroyed.
    pub fn undelete_version(&self, ctx: &CancelToken, path: &str, version: u64) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let mut doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        let found = doc.records.iter_mut().find(|r| {
            r.metadata.version == version
                && !r.metadata.destroyed
                && !r.metadata.deletion_time.is_empty()
        });
        if let Some(record) = found {
            record.metadata.deletion_time.clear();
            self.write_document(path, &mut doc)?;
        }
        Ok(())
    }

    /// Permanently destroy the listed versions, zeroizing their payloads.
    pub fn destroy(&self, ctx: &CancelToken, path: &str, versions: &[u64]) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let mut doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        let mut changed = false;
        for record in &mut doc.records {
            if !record.metadata.destroyed && versions.contains(&record.metadata.version) {
                record.metadata.destroyed = true;
                record.data = None;
                changed = true;
            }
        }
        if !changed {
            return Err(VaultError::NotFound);
        }
        self.write_document(path, &mut doc)
    }

    /// Return the secret's metadata with the per-version map rebuilt from
    /// the current record states.
    pub fn get_meta(&self, ctx: &CancelToken, path: &str) -> Result<Metadata> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        let mut meta = doc.meta.clone();
        meta.versions = Self::version_summaries(&doc.records);
        Ok(meta)
    }

    /// Overwrite the secret's policy fields.
    pub fn update_meta(&self, ctx: &CancelToken, path: &str, update: &MetaUpdate) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;

        let mut doc = self.read_document(path)?.ok_or(VaultError::NotFound)?;
        doc.meta.cas_required = update.cas_required;
        doc.meta.delete_version_after = update.delete_version_after.clone();
        doc.meta.max_versions = update.max_versions;
        doc.meta.custom_metadata = update.custom_metadata.clone();
        doc.meta.updated_time = now();
        self.write_document(path, &mut doc)
    }

    /// Remove the secret file entirely, all versions included.
    pub fn delete_meta(&self, ctx: &CancelToken, path: &str) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;
        fsio::remove(&self.secret_file(path))
    }

    // ---- internals ----

    fn new_document(data: Map<String, Value>, config: &KvConfig) -> SecretDocument {
        let created = now();
        let record = Record {
            data: Some(data),
            metadata: RecordMetadata {
                created_time: created,
                custom_metadata: None,
                deletion_time: String::new(),
                destroyed: false,
                version: 1,
            },
        };
        SecretDocument {
            records: vec![record],
            meta: Metadata {
                cas_required: config.cas_required,
                created_time: created,
                current_version: 1,
                delete_version_after: config.delete_version_after.clone(),
                max_versions: config.max_versions,
                oldest_version: 1,
                updated_time: created,
                custom_metadata: None,
                versions: BTreeMap::new(),
            },
        }
    }

    /// Enforce `max_versions`: destroy the oldest surviving payloads until
    /// the bound holds, advancing `oldest_version` past what was pruned.
    fn prune(doc: &mut SecretDocument) {
        if doc.meta.max_versions == 0 {
            return;
        }
        let mut pruned = false;
        loop {
            let retained = doc
                .records
                .iter()
                .filter(|r| !r.metadata.destroyed)
                .count() as u64;
            if retained <= doc.meta.max_versions {
                break;
            }
            match doc.records.iter_mut().find(|r| !r.metadata.destroyed) {
                Some(oldest) => {
                    oldest.data = None;
                    oldest.metadata.destroyed = true;
                    pruned = true;
                },
                None => break,
            }
        }
        if pruned {
            doc.meta.oldest_version = doc
                .records
                .iter()
                .find(|r| !r.metadata.destroyed)
                .map_or(doc.meta.current_version, |r| r.metadata.version);
        }
    }

    fn version_summaries(records: &[Record]) -> BTreeMap<String, VersionSummary> {
        records
            .iter()
            .map(|r| {
                (
                    r.metadata.version.to_string(),
                    VersionSummary {
                        created_time: r.metadata.created_time,
                        deletion_time: r.metadata.deletion_time.clone(),
                        destroyed: r.metadata.destroyed,
                    },
                )
            })
            .collect()
    }

    fn secret_file(&self, path: &str) -> PathBuf {
        self.data_dir.join(BASE64.encode(path.as_bytes()))
    }

    fn read_document(&self, path: &str) -> Result<Option<SecretDocument>> {
        let frame = match fsio::read(&self.secret_file(path)) {
            Ok(frame) => frame,
            Err(VaultError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        };
        let plain = self
            .cipher
            .open(&frame)
            .map_err(|_| VaultError::Corrupt("secret document failed authentication".to_string()))?;
        let doc = serde_json::from_slice(&plain)
            .map_err(|e| VaultError::Corrupt(format!("secret document: {e}")))?;
        Ok(Some(doc))
    }

    fn write_document(&self, path: &str, doc: &mut SecretDocument) -> Result<()> {
        doc.meta.versions = Self::version_summaries(&doc.records);
        let plain = serde_json::to_vec(doc)
            .map_err(|e| VaultError::Corrupt(format!("secret document: {e}")))?;
        let frame = self.cipher.seal(&plain)?;
        fsio::atomic_write(&self.secret_file(path), &frame)
    }
}

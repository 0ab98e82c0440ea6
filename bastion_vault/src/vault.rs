// SPDX-License-Identifier: MIT OR Apache-2.0
//! Public vault facade.
//!
//! Composes the seal controller with the mount registry and enforces the one
//! rule every data-plane caller depends on: a sealed vault rejects data
//! operations before anything touches a mount. Every operation gets a fresh
//! request id in its response envelope.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::crypto::{Cipher, EncryptionMethod};
use crate::kv::{KvConfig, Metadata, MetaUpdate, Record};
use crate::mounts::{MountRegistry, MountSpec};
use crate::seal::{InitOptions, InitResult, SealController, SealStatus};
use crate::{CancelToken, Result};

/// Receiver for one audit event per vault operation.
///
/// Injected into the facade rather than discovered from process state; the
/// default sink emits a `tracing` event and stores nothing.
pub trait AuditSink: Send + Sync {
    fn record(&self, op: &str, mount: Option<&str>, path: Option<&str>);
}

/// Audit sink that logs through `tracing` and keeps nothing.
#[derive(Debug, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, op: &str, mount: Option<&str>, path: Option<&str>) {
        tracing::info!(
            target: "bastion::audit",
            op,
            mount = mount.unwrap_or(""),
            path = path.unwrap_or(""),
            "vault operation"
        );
    }
}

/// Response envelope attached to every vault operation.
#[derive(Debug, Clone, Serialize)]
pub struct Response<T> {
    pub request_id: String,
    pub lease_id: String,
    pub renewable: bool,
    pub lease_duration: u64,
    pub data: Option<T>,
    pub warnings: Option<Value>,
    pub wrap_info: Option<Value>,
    pub auth: Option<Value>,
    pub mount_type: String,
}

impl<T> Response<T> {
    fn envelope(data: Option<T>, mount_type: &str) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            lease_id: String::new(),
            renewable: false,
            lease_duration: 0,
            data,
            warnings: None,
            wrap_info: None,
            auth: None,
            mount_type: mount_type.to_string(),
        }
    }

    /// Envelope for a KV data-plane result.
    #[must_use]
    pub fn kv(data: T) -> Self {
        Self::envelope(Some(data), "kv")
    }

    /// Envelope for a KV operation with no payload.
    #[must_use]
    pub fn kv_empty() -> Self {
        Self::envelope(None, "kv")
    }

    /// Envelope for a system operation.
    #[must_use]
    pub fn sys(data: T) -> Self {
        Self::envelope(Some(data), "")
    }
}

/// The vault: seal lifecycle plus named versioned KV mounts.
pub struct Vault {
    controller: SealController,
    registry: MountRegistry,
    audit: Box<dyn AuditSink>,
}

impl Vault {
    /// Bind a vault to its mount root, recovering seal state from disk.
    ///
    /// Fails with [`crate::VaultError::CorruptSealFile`] when a sealed-key
    /// file exists but cannot be parsed; a daemon must treat that as fatal.
    pub fn open(root: impl Into<PathBuf>, method: EncryptionMethod) -> Result<Self> {
        let root = root.into();
        let controller = SealController::boot(root.clone(), method)?;
        Ok(Self {
            controller,
            registry: MountRegistry::new(root),
            audit: Box::new(TracingAudit),
        })
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    // ---- seal lifecycle ----

    pub fn init(&self, ctx: &CancelToken, opts: &InitOptions) -> Result<InitResult> {
        self.audit.record("sys.init", None, None);
        self.controller.init(ctx, opts)
    }

    pub fn unseal(&self, ctx: &CancelToken, key: &str, reset: bool) -> Result<SealStatus> {
        self.audit.record("sys.unseal", None, None);
        self.controller.unseal(ctx, key, reset, &self.registry)
    }

    pub fn seal(&self, ctx: &CancelToken) -> Result<()> {
        self.audit.record("sys.seal", None, None);
        self.controller.seal(ctx, &self.registry)
    }

    #[must_use]
    pub fn seal_status(&self) -> SealStatus {
        self.controller.status()
    }

    // ---- mounts ----

    /// Create a new mount. Rejected while sealed.
    pub fn create_mount(
        &self,
        ctx: &CancelToken,
        path: &str,
        spec: &MountSpec,
    ) -> Result<Response<Value>> {
        let cipher = self.controller.data_cipher()?;
        self.audit.record("sys.mount", Some(path), None);
        self.registry.create_mount(ctx, path, spec, &cipher)?;
        Ok(Response::envelope(None, ""))
    }

    /// Names of the mounts currently bound. Empty while sealed.
    #[must_use]
    pub fn mounts(&self) -> Vec<String> {
        self.registry.mount_names()
    }

    // ---- KV data plane ----

    pub fn save_secret(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
        data: Map<String, Value>,
        cas: Option<u64>,
    ) -> Result<Response<Record>> {
        let record = self.data_op("kv.save", mount, path, |kv| kv.save(ctx, path, data, cas))?;
        Ok(Response::kv(record))
    }

    pub fn update_secret(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
        data: Map<String, Value>,
    ) -> Result<Response<Record>> {
        let record = self.data_op("kv.update", mount, path, |kv| kv.update(ctx, path, data))?;
        Ok(Response::kv(record))
    }

    pub fn get_secret(&self, ctx: &CancelToken, mount: &str, path: &str) -> Result<Response<Record>> {
        let record = self.data_op("kv.get", mount, path, |kv| kv.get(ctx, path))?;
        Ok(Response::kv(record))
    }

    pub fn get_secret_version(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
        version: u64,
    ) -> Result<Response<Record>> {
        let record = self.data_op("kv.get", mount, path, |kv| {
            kv.get_version(ctx, path, version)
        })?;
        Ok(Response::kv(record))
    }

    pub fn delete_secret(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
    ) -> Result<Response<Value>> {
        self.data_op("kv.delete", mount, path, |kv| kv.delete(ctx, path))?;
        Ok(Response::kv_empty())
    }

    pub fn delete_secret_versions(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
        versions: &[u64],
    ) -> Result<Response<Value>> {
        self.data_op("kv.delete", mount, path, |kv| {
            kv.delete_versions(ctx, path, versions)
        })?;
        Ok(Response::kv_empty())
    }

    pub fn undelete_secret(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
    ) -> Result<Response<Value>> {
        self.data_op("kv.undelete", mount, path, |kv| kv.undelete(ctx, path))?;
        Ok(Response::kv_empty())
    }

    pub fn undelete_secret_versions(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
        versions: &[u64],
    ) -> Result<Response<Value>> {
        self.data_op("kv.undelete", mount, path, |kv| {
            for &version in versions {
                kv.undelete_version(ctx, path, version)?;
            }
            Ok(())
        })?;
        Ok(Response::kv_empty())
    }

    pub fn destroy_secret_versions(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
        versions: &[u64],
    ) -> Result<Response<Value>> {
        self.data_op("kv.destroy", mount, path, |kv| {
            kv.destroy(ctx, path, versions)
        })?;
        Ok(Response::kv_empty())
    }

    pub fn get_metadata(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
    ) -> Result<Response<Metadata>> {
        let meta = self.data_op("kv.metadata", mount, path, |kv| kv.get_meta(ctx, path))?;
        Ok(Response::kv(meta))
    }

    pub fn update_metadata(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
        update: &MetaUpdate,
    ) -> Result<Response<Value>> {
        self.data_op("kv.metadata", mount, path, |kv| {
            kv.update_meta(ctx, path, update)
        })?;
        Ok(Response::kv_empty())
    }

    pub fn delete_metadata(
        &self,
        ctx: &CancelToken,
        mount: &str,
        path: &str,
    ) -> Result<Response<Value>> {
        self.data_op("kv.metadata", mount, path, |kv| kv.delete_meta(ctx, path))?;
        Ok(Response::kv_empty())
    }

    pub fn get_config(&self, ctx: &CancelToken, mount: &str) -> Result<Response<KvConfig>> {
        let config = self.data_op("kv.config", mount, "", |kv| kv.config(ctx))?;
        Ok(Response::kv(config))
    }

    pub fn update_config(
        &self,
        ctx: &CancelToken,
        mount: &str,
        config: &KvConfig,
    ) -> Result<Response<Value>> {
        self.data_op("kv.config", mount, "", |kv| kv.update_config(ctx, config))?;
        Ok(Response::kv_empty())
    }

    /// Shared data-plane preamble: sealed check, audit event, store lookup.
    ///
    /// The registry's read side is held for the whole closure, so sealing
    /// drains this operation before key material is dropped. The controller
    /// lock is not held across the store call.
    fn data_op<R>(
        &self,
        op: &str,
        mount: &str,
        path: &str,
        f: impl FnOnce(&crate::kv::KvStore) -> Result<R>,
    ) -> Result<R> {
        self.controller.check_unsealed()?;
        self.audit
            .record(op, Some(mount), if path.is_empty() { None } else { Some(path) });
        self.registry.with_store(mount, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VaultError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    fn ctx() -> CancelToken {
        CancelToken::new()
    }

    fn kv_spec() -> MountSpec {
        MountSpec {
            mount_type: "kv".to_string(),
            config: Map::new(),
        }
    }

    fn payload(value: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("k".to_string(), Value::String(value.to_string()));
        map
    }

    fn open_vault() -> (TempDir, Vault) {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path(), EncryptionMethod::ChaCha20Poly1305).unwrap();
        (dir, vault)
    }

    fn unseal_fully(vault: &Vault) -> InitResult {
        let result = vault.init(&ctx(), &InitOptions::default()).unwrap();
        for key in &result.keys[..2] {
            vault.unseal(&ctx(), key, false).unwrap();
        }
        result
    }

    #[test]
    fn test_data_ops_rejected_while_sealed() {
        let (_dir, vault) = open_vault();
        unseal_fully(&vault);
        vault
            .create_mount(&ctx(), "secret", &kv_spec())
            .unwrap();
        vault
            .save_secret(&ctx(), "secret", "a", payload("v"), None)
            .unwrap();

        vault.seal(&ctx()).unwrap();

        assert!(matches!(
            vault.get_secret(&ctx(), "secret", "a"),
            Err(VaultError::Sealed)
        ));
        assert!(matches!(
            vault.save_secret(&ctx(), "secret", "a", payload("v"), None),
            Err(VaultError::Sealed)
        ));
        assert!(matches!(
            vault.create_mount(&ctx(), "other", &kv_spec()),
            Err(VaultError::Sealed)
        ));
    }

    #[test]
    fn test_uninitialized_data_op() {
        let (_dir, vault) = open_vault();
        assert!(matches!(
            vault.get_secret(&ctx(), "secret", "a"),
            Err(VaultError::Uninitialized)
        ));
    }

    #[test]
    fn test_envelope_has_fresh_request_ids() {
        let (_dir, vault) = open_vault();
        unseal_fully(&vault);
        vault.create_mount(&ctx(), "secret", &kv_spec()).unwrap();

        let r1 = vault
            .save_secret(&ctx(), "secret", "a", payload("v1"), None)
            .unwrap();
        let r2 = vault.get_secret(&ctx(), "secret", "a").unwrap();

        assert_ne!(r1.request_id, r2.request_id);
        assert_eq!(r1.mount_type, "kv");
        assert_eq!(r1.lease_id, "");
        assert!(!r1.renewable);
        assert_eq!(r1.lease_duration, 0);
    }

    #[test]
    fn test_secret_roundtrip_through_facade() {
        let (_dir, vault) = open_vault();
        unseal_fully(&vault);
        vault.create_mount(&ctx(), "secret", &kv_spec()).unwrap();

        vault
            .save_secret(&ctx(), "secret", "a/b", payload("v1"), None)
            .unwrap();
        let saved = vault
            .save_secret(&ctx(), "secret", "a/b", payload("v2"), None)
            .unwrap();
        assert_eq!(saved.data.as_ref().unwrap().metadata.version, 2);

        let current = vault.get_secret(&ctx(), "secret", "a/b").unwrap();
        assert_eq!(
            current.data.unwrap().data.unwrap()["k"],
            Value::String("v2".to_string())
        );

        let old = vault
            .get_secret_version(&ctx(), "secret", "a/b", 1)
            .unwrap();
        assert_eq!(
            old.data.unwrap().data.unwrap()["k"],
            Value::String("v1".to_string())
        );
    }

    #[test]
    fn test_unknown_mount_not_found() {
        let (_dir, vault) = open_vault();
        unseal_fully(&vault);

        assert!(matches!(
            vault.get_secret(&ctx(), "nope", "a"),
            Err(VaultError::NotFound)
        ));
    }

    #[test]
    fn test_mount_listing() {
        let (_dir, vault) = open_vault();
        unseal_fully(&vault);
        vault.create_mount(&ctx(), "alpha", &kv_spec()).unwrap();
        vault.create_mount(&ctx(), "beta", &kv_spec()).unwrap();

        assert_eq!(vault.mounts(), vec!["alpha", "beta"]);

        vault.seal(&ctx()).unwrap();
        assert!(vault.mounts().is_empty());
    }

    #[test]
    fn test_reseal_then_unseal_restores_data() {
        let (_dir, vault) = open_vault();
        let result = unseal_fully(&vault);
        vault.create_mount(&ctx(), "secret", &kv_spec()).unwrap();
        vault
            .save_secret(&ctx(), "secret", "a", payload("v1"), None)
            .unwrap();

        vault.seal(&ctx()).unwrap();
        for key in &result.keys[3..] {
            vault.unseal(&ctx(), key, false).unwrap();
        }

        let record = vault.get_secret(&ctx(), "secret", "a").unwrap();
        assert_eq!(
            record.data.unwrap().data.unwrap()["k"],
            Value::String("v1".to_string())
        );
    }

    struct CountingAudit(Arc<AtomicUsize>);

    impl AuditSink for CountingAudit {
        fn record(&self, _op: &str, _mount: Option<&str>, _path: Option<&str>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_audit_sink_sees_operations() {
        let dir = tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let vault = Vault::open(dir.path(), EncryptionMethod::Aes)
            .unwrap()
            .with_audit(Box::new(CountingAudit(Arc::clone(&count))));

        // init + two unseal calls
        unseal_fully(&vault);
        assert_eq!(count.load(Ordering::SeqCst), 3);

        vault.create_mount(&ctx(), "secret", &kv_spec()).unwrap();
        vault
            .save_secret(&ctx(), "secret", "a", payload("v"), None)
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }
}

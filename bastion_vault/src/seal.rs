// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seal lifecycle: initialization, share collection, and key recovery.
//!
//! The controller owns the only copy of the data encryption key. At init the
//! root scalar is split into shares and the DEK is written to disk wrapped
//! under the root scalar's bytes; both are then dropped from memory and the
//! vault stays sealed. Unsealing collects shares until the threshold is met,
//! reconstructs the root scalar, unwraps the DEK, and rebinds every mount.
//!
//! The sealed-key file at `<root>/key` is written exactly once:
//! `base64(wrapped_dek) "#" <shares> "#" <threshold>`.

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::crypto::{Cipher, DataKey, EncryptionMethod};
use crate::mounts::MountRegistry;
use crate::shamir::{self, Commitment, Share};
use crate::{fsio, CancelToken, Result, VaultError};

/// Name of the sealed-key file under the mount root.
pub const SEALED_KEY_FILE: &str = "key";

const DEFAULT_SHARES: u8 = 5;
const DEFAULT_THRESHOLD: u8 = 2;

/// Parameters for [`SealController::init`]. Zero fields select defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    pub secret_shares: u8,
    pub secret_threshold: u8,
}

/// Returned exactly once by [`SealController::init`].
#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    /// Externally encoded unseal shares.
    pub keys: Vec<String>,
    /// Base64 encoding of the root scalar bytes.
    pub root_token: String,
}

/// Snapshot of the seal state machine, safe to expose in any state.
#[derive(Debug, Clone, Serialize)]
pub struct SealStatus {
    #[serde(rename = "type")]
    pub seal_type: String,
    pub initialized: bool,
    pub sealed: bool,
    pub t: u8,
    pub n: u8,
    pub progress: usize,
    pub cluster_name: String,
    pub cluster_id: String,
    pub build_date: String,
    pub storage_type: String,
    pub version: String,
}

struct ControllerState {
    initialized: bool,
    sealed: bool,
    shares: u8,
    threshold: u8,
    progress: Vec<String>,
    commitment: Option<Commitment>,
    cipher: Option<Arc<Cipher>>,
}

/// Process-wide seal state machine.
pub struct SealController {
    root: PathBuf,
    method: EncryptionMethod,
    cluster_id: String,
    cluster_name: String,
    build_date: String,
    state: RwLock<ControllerState>,
}

impl SealController {
    /// Bind to a mount root and recover the boot-time seal state.
    ///
    /// A missing sealed-key file means the vault is uninitialized. A present
    /// but unparsable one is fatal: the daemon must refuse to start rather
    /// than silently re-initialize.
    pub fn boot(root: impl Into<PathBuf>, method: EncryptionMethod) -> Result<Self> {
        let root = root.into();
        let mut state = ControllerState {
            initialized: false,
            sealed: true,
            shares: 0,
            threshold: 0,
            progress: Vec::new(),
            commitment: None,
            cipher: None,
        };

        match fsio::read(&root.join(SEALED_KEY_FILE)) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    VaultError::CorruptSealFile("sealed-key file is not UTF-8".to_string())
                })?;
                let (_, shares, threshold) = parse_sealed_key_file(&text)?;
                state.initialized = true;
                state.shares = shares;
                state.threshold = threshold;
            },
            Err(VaultError::NotFound) => {},
            Err(err) => return Err(err),
        }

        let cluster_id = Uuid::new_v4().to_string();
        let cluster_name = format!("bastion-cluster-{}", &cluster_id[..8]);
        Ok(Self {
            root,
            method,
            cluster_id,
            cluster_name,
            build_date: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            state: RwLock::new(state),
        })
    }

    /// Initialize the vault: split a fresh root scalar into shares, generate
    /// the DEK, and persist the DEK wrapped under the root scalar's bytes.
    ///
    /// Shares and the root token leave this function exactly once; neither
    /// the root scalar nor the DEK survives in controller memory. The vault
    /// remains sealed.
    pub fn init(&self, ctx: &CancelToken, opts: &InitOptions) -> Result<InitResult> {
        let mut state = self.state.write();
        if state.initialized {
            return Err(VaultError::AlreadyInitialized);
        }

        let shares = if opts.secret_shares == 0 {
            DEFAULT_SHARES
        } else {
            opts.secret_shares
        };
        let threshold = if opts.secret_threshold == 0 {
            DEFAULT_THRESHOLD
        } else {
            opts.secret_threshold
        };

        let mut root_scalar = shamir::random_secret();
        let (share_set, commitment) = shamir::split(&root_scalar, shares, threshold)?;

        let dek = DataKey::generate();
        let wrap = Cipher::new(
            self.method,
            DataKey::from_bytes(shamir::scalar_bytes(&root_scalar)),
        );
        let wrapped = wrap.seal(dek.as_bytes())?;

        ctx.check()?;
        let payload = format!("{}#{shares}#{threshold}", BASE64.encode(&wrapped));
        fsio::atomic_write(&self.root.join(SEALED_KEY_FILE), payload.as_bytes())?;

        let keys = share_set.iter().map(Share::encode).collect();
        let root_token = BASE64.encode(shamir::scalar_bytes(&root_scalar));
        root_scalar.zeroize();

        state.initialized = true;
        state.sealed = true;
        state.shares = shares;
        state.threshold = threshold;
        state.commitment = Some(commitment);
        state.progress.clear();

        tracing::info!(shares, threshold, "vault initialized");
        Ok(InitResult { keys, root_token })
    }

    /// Feed one share into the unseal progress.
    ///
    /// Below the threshold this records the share and reports progress. At
    /// the threshold it reconstructs the root scalar, unwraps the DEK,
    /// rebinds all mounts, and opens the vault. Any share failure at the
    /// threshold step clears the accumulated progress and leaves the vault
    /// sealed. Unsealing an open vault is a no-op.
    pub fn unseal(
        &self,
        ctx: &CancelToken,
        key: &str,
        reset: bool,
        registry: &MountRegistry,
    ) -> Result<SealStatus> {
        let mut state = self.state.write();
        if !state.initialized {
            return Err(VaultError::Uninitialized);
        }
        if !state.sealed {
            return Ok(self.report(&state));
        }
        ctx.check()?;

        if reset {
            state.progress.clear();
        }
        if !state.progress.iter().any(|p| p == key) {
            state.progress.push(key.to_string());
        }
        if state.progress.len() < state.threshold as usize {
            return Ok(self.report(&state));
        }

        match self.recover_dek(ctx, &state.progress, state.commitment.as_ref(), registry) {
            Ok(cipher) => {
                state.cipher = Some(cipher);
                state.progress.clear();
                state.sealed = false;
                tracing::info!("vault unsealed");
                Ok(self.report(&state))
            },
            Err(err) => {
                if matches!(err, VaultError::InvalidShare) {
                    state.progress.clear();
                }
                Err(err)
            },
        }
    }

    /// Wipe the DEK and return to the sealed state. Idempotent.
    ///
    /// Dropping the mount stores through the registry's writer lock waits
    /// for in-flight data operations before the key material goes away.
    pub fn seal(&self, ctx: &CancelToken, registry: &MountRegistry) -> Result<()> {
        let mut state = self.state.write();
        if state.sealed {
            return Ok(());
        }
        ctx.check()?;

        registry.clear();
        state.cipher = None;
        state.progress.clear();
        state.sealed = true;
        tracing::info!("vault sealed");
        Ok(())
    }

    /// Current seal status. Safe in every state.
    #[must_use]
    pub fn status(&self) -> SealStatus {
        self.report(&self.state.read())
    }

    /// Handle to the data cipher, available only while unsealed.
    pub fn data_cipher(&self) -> Result<Arc<Cipher>> {
        let state = self.state.read();
        if !state.initialized {
            return Err(VaultError::Uninitialized);
        }
        if state.sealed {
            return Err(VaultError::Sealed);
        }
        state.cipher.clone().ok_or(VaultError::Sealed)
    }

    /// Reject data-plane traffic unless the vault is open.
    pub fn check_unsealed(&self) -> Result<()> {
        self.data_cipher().map(|_| ())
    }

    fn recover_dek(
        &self,
        ctx: &CancelToken,
        progress: &[String],
        commitment: Option<&Commitment>,
        registry: &MountRegistry,
    ) -> Result<Arc<Cipher>> {
        let shares = progress
            .iter()
            .map(|encoded| Share::decode(encoded))
            .collect::<Result<Vec<_>>>()?;

        if let Some(commitment) = commitment {
            if shares.iter().any(|share| !commitment.verify(share)) {
                return Err(VaultError::InvalidShare);
            }
        }

        let mut root_scalar = shamir::combine(&shares)?;
        let wrap = Cipher::new(
            self.method,
            DataKey::from_bytes(shamir::scalar_bytes(&root_scalar)),
        );
        root_scalar.zeroize();

        ctx.check()?;
        let bytes = match fsio::read(&self.root.join(SEALED_KEY_FILE)) {
            Ok(bytes) => bytes,
            Err(VaultError::NotFound) => return Err(VaultError::Uninitialized),
            Err(err) => return Err(err),
        };
        let text = String::from_utf8(bytes).map_err(|_| {
            VaultError::CorruptSealFile("sealed-key file is not UTF-8".to_string())
        })?;
        let (wrapped, _, _) = parse_sealed_key_file(&text)?;

        // Authentication failure here proves the share set is wrong.
        let mut dek_bytes = wrap.open(&wrapped).map_err(|_| VaultError::InvalidShare)?;
        let dek = DataKey::from_slice(&dek_bytes);
        dek_bytes.zeroize();

        let cipher = Arc::new(Cipher::new(self.method, dek?));
        let restored = registry.restore(ctx, &cipher)?;
        tracing::debug!(mounts = restored, "mounts rebound");
        Ok(cipher)
    }

    fn report(&self, state: &ControllerState) -> SealStatus {
        SealStatus {
            seal_type: "shamir".to_string(),
            initialized: state.initialized,
            sealed: state.sealed,
            t: state.threshold,
            n: state.shares,
            progress: state.progress.len(),
            cluster_name: self.cluster_name.clone(),
            cluster_id: self.cluster_id.clone(),
            build_date: self.build_date.clone(),
            storage_type: "file".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Split the sealed-key file into its wrapped-DEK, share-count, and
/// threshold fields.
fn parse_sealed_key_file(text: &str) -> Result<(Vec<u8>, u8, u8)> {
    let fields: Vec<&str> = text.split('#').collect();
    let [wrapped_b64, shares, threshold] = fields.as_slice() else {
        return Err(VaultError::CorruptSealFile(format!(
            "expected 3 fields, found {}",
            fields.len()
        )));
    };

    let wrapped = BASE64.decode(wrapped_b64).map_err(|_| {
        VaultError::CorruptSealFile("wrapped key is not valid base64".to_string())
    })?;
    let shares: u8 = shares.parse().map_err(|_| {
        VaultError::CorruptSealFile("share count is not a number".to_string())
    })?;
    let threshold: u8 = threshold.trim_end().parse().map_err(|_| {
        VaultError::CorruptSealFile("threshold is not a number".to_string())
    })?;

    if threshold == 0 || shares == 0 || threshold > shares {
        return Err(VaultError::CorruptSealFile(format!(
            "impossible threshold {threshold} of {shares}"
        )));
    }
    Ok((wrapped, shares, threshold))
}

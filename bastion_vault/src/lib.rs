// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bastion vault engine: sealed, file-backed versioned secret storage.
//!
//! Secrets live in named mounts as append-only version logs, encrypted at
//! rest with a data encryption key. The DEK itself is only ever stored
//! wrapped under a root key that is split into Shamir shares at
//! initialization and never persisted. The engine starts sealed: until a
//! threshold of shares has been replayed, no data operation can run.
//!
//! Layout on disk, under a single mount root:
//!
//! ```text
//! <root>/key                              sealed-key file
//! <root>/<mount>/base64("config")         mount config
//! <root>/data/<mount>/base64(<secret>)    encrypted secret documents
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod cancel;
mod crypto;
mod error;
mod fsio;
mod kv;
mod mounts;
mod seal;
pub mod shamir;
mod vault;

pub use cancel::CancelToken;
pub use crypto::{Cipher, DataKey, EncryptionMethod, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{Result, VaultError};
pub use kv::{KvConfig, KvStore, MetaUpdate, Metadata, Record, RecordMetadata, VersionSummary};
pub use mounts::{MountRegistry, MountSpec};
pub use seal::{InitOptions, InitResult, SealController, SealStatus, SEALED_KEY_FILE};
pub use vault::{AuditSink, Response, TracingAudit, Vault};

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for vault operations.

use thiserror::Error;

/// Vault error type.
///
/// Every variant is a stable, machine-readable kind; messages stay short
/// and never embed filesystem paths or key material.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VaultError {
    /// The vault is sealed; data operations are rejected.
    #[error("vault is sealed")]
    Sealed,

    /// `init` was called on an already initialized vault.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// The operation requires an initialized vault.
    #[error("vault is not initialized")]
    Uninitialized,

    /// An unseal share failed to decode, verify, or reconstruct the root key.
    #[error("invalid unseal share")]
    InvalidShare,

    /// The sealed-key file exists but cannot be parsed.
    #[error("sealed-key file is corrupt: {0}")]
    CorruptSealFile(String),

    /// A mount with the same name already exists.
    #[error("mount already exists: {0}")]
    MountExists(String),

    /// The mount type is not supported.
    #[error("unknown mount type: {0}")]
    UnknownMountType(String),

    /// A mount configuration value has the wrong shape.
    #[error("invalid config: {0}")]
    BadConfig(String),

    /// Mount paths must not contain `.`.
    #[error("mount path must not contain '.'")]
    PathContainsDot,

    /// The secret, mount, or config does not exist.
    #[error("not found")]
    NotFound,

    /// The requested secret version does not exist or is not live.
    #[error("version not found")]
    VersionNotFound,

    /// The check-and-set precondition did not match the current version.
    #[error("check-and-set parameter did not match the current version")]
    CasMismatch,

    /// An on-disk document exists but cannot be decrypted or parsed.
    #[error("stored document is corrupt: {0}")]
    Corrupt(String),

    /// A filesystem operation failed for a reason other than not-found.
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// A cryptographic operation failed outside the unseal path.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl VaultError {
    /// Stable identifier for the error kind, independent of the message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sealed => "sealed",
            Self::AlreadyInitialized => "already_initialized",
            Self::Uninitialized => "uninitialized",
            Self::InvalidShare => "invalid_share",
            Self::CorruptSealFile(_) => "corrupt_seal_file",
            Self::MountExists(_) => "mount_exists",
            Self::UnknownMountType(_) => "unknown_mount_type",
            Self::BadConfig(_) => "bad_config",
            Self::PathContainsDot => "path_contains_dot",
            Self::NotFound => "not_found",
            Self::VersionNotFound => "version_not_found",
            Self::CasMismatch => "cas_mismatch",
            Self::Corrupt(_) => "corrupt",
            Self::IoFailure(_) => "io_failure",
            Self::CryptoFailure(_) => "crypto_failure",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

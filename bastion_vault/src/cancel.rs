// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for vault operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{Result, VaultError};

/// Cancellation flag shared between a caller and an in-flight operation.
///
/// Operations check the token before touching the filesystem and return
/// [`VaultError::Cancelled`] once it has fired. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Return `Err(Cancelled)` if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(VaultError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_fires_check() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(VaultError::Cancelled)));
    }

    #[test]
    fn test_clone_shares_flag() {
        let token = CancelToken::new();
        let clone = token.clone();

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_concurrent_cancel() {
        let token = CancelToken::new();
        let t1 = token.clone();

        let handle = std::thread::spawn(move || t1.cancel());
        handle.join().unwrap();

        assert!(token.is_cancelled());
    }
}

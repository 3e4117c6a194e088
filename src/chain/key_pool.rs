//! Backend signing-key pool with per-key transaction-nonce lanes
//!
//! Every full-access key on the backend account carries its own access-key
//! nonce on chain, so each derived key forms an independent submission lane.
//! Concurrent verifications round-robin across lanes and allocate strictly
//! increasing nonces from an atomic counter per lane, which lets many
//! registry transactions be in flight at once without nonce collisions.
//!
//! A lane's counter starts unsynced (zero) and is seeded lazily from the
//! chain. `fetch_max` keeps a concurrent resync from ever moving the
//! counter backwards.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ed25519_dalek::{Signature, Signer, SigningKey};

use crate::crypto::{derive_lane_signing_key, public_key_text};

/// One derived key and its transaction-nonce counter.
pub struct BackendKey {
    signing_key: SigningKey,
    public_key: String,
    /// Next nonce to hand out; zero means "not yet synced from chain".
    next_nonce: AtomicU64,
}

impl BackendKey {
    fn new(signing_key: SigningKey) -> Self {
        let public_key = public_key_text(&signing_key);
        Self {
            signing_key,
            public_key,
            next_nonce: AtomicU64::new(0),
        }
    }

    /// The `ed25519:<base58>` form registered on the backend account.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// True until the lane has been seeded from the on-chain key nonce.
    pub fn needs_sync(&self) -> bool {
        self.next_nonce.load(Ordering::SeqCst) == 0
    }

    /// Seed the lane from the on-chain access-key nonce.
    ///
    /// The next transaction must use a nonce strictly greater than the
    /// key's, so the counter jumps to `on_chain + 1`. `fetch_max` means a
    /// stale observation can never rewind nonces already handed out.
    pub fn sync_nonce(&self, on_chain: u64) {
        self.next_nonce.fetch_max(on_chain + 1, Ordering::SeqCst);
    }

    /// Force a resync before the next use (after an InvalidNonce rejection).
    pub fn mark_stale(&self) {
        self.next_nonce.store(0, Ordering::SeqCst);
    }

    fn take_nonce(&self) -> u64 {
        self.next_nonce.fetch_add(1, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for BackendKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendKey")
            .field("public_key", &self.public_key)
            .field("next_nonce", &self.next_nonce.load(Ordering::SeqCst))
            .finish()
    }
}

/// Round-robin pool of derived backend keys.
pub struct SigningKeyPool {
    account_id: String,
    keys: Vec<BackendKey>,
    cursor: AtomicUsize,
}

impl SigningKeyPool {
    /// Derive `size` lanes from the root seed. `size` must be at least 1.
    pub fn derive(account_id: &str, root_seed: &[u8; 32], size: u32) -> Self {
        let keys = (0..size.max(1))
            .map(|index| BackendKey::new(derive_lane_signing_key(root_seed, index)))
            .collect();
        Self {
            account_id: account_id.to_string(),
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Public keys of every lane, in lane order.
    pub fn public_keys(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.public_key.clone()).collect()
    }

    /// Pick the next lane round-robin.
    pub fn next_lane(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len()
    }

    pub fn lane(&self, index: usize) -> &BackendKey {
        &self.keys[index]
    }

    /// Snapshot a signer for one transaction, consuming a lane nonce.
    ///
    /// The lane must be synced first; callers check `needs_sync` and seed
    /// the counter from a `view_access_key` query before calling this.
    pub fn signer(&self, lane: usize) -> LaneSigner {
        let key = &self.keys[lane];
        LaneSigner {
            account_id: self.account_id.clone(),
            public_key: key.public_key.clone(),
            tx_nonce: key.take_nonce(),
            signing_key: key.signing_key.clone(),
        }
    }
}

impl std::fmt::Debug for SigningKeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPool")
            .field("account_id", &self.account_id)
            .field("lanes", &self.keys.len())
            .finish()
    }
}

/// Everything needed to sign one transaction on one lane.
pub struct LaneSigner {
    pub account_id: String,
    pub public_key: String,
    pub tx_nonce: u64,
    signing_key: SigningKey,
}

impl LaneSigner {
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for LaneSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneSigner")
            .field("account_id", &self.account_id)
            .field("public_key", &self.public_key)
            .field("tx_nonce", &self.tx_nonce)
            .finish()
    }
}

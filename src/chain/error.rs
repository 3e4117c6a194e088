//! Chain RPC error classification
//!
//! Every failure talking to the RPC node funnels into [`ChainError`]. The
//! classifier methods drive three decisions elsewhere in the gateway:
//! retry (transient transport trouble), lane resync (stale transaction
//! nonce), and duplicate detection (the registry contract refusing a
//! nullifier or account that is already registered).

/// Errors from chain RPC calls and transaction submission
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Network-level failure reaching the RPC node
    #[error("chain rpc transport failure: {0}")]
    Transport(String),

    /// The RPC node answered with an error object
    #[error("chain rpc rejected the request: {0}")]
    Rpc(String),

    /// A response or payload did not have the expected shape
    #[error("malformed chain payload: {0}")]
    Malformed(String),

    /// The queried access key does not exist on the account
    #[error("access key {public_key} not found on {account_id}")]
    UnknownAccessKey {
        account_id: String,
        public_key: String,
    },

    /// The submitted transaction nonce is behind the access-key nonce
    #[error("transaction nonce {tx_nonce} is stale (access-key nonce {key_nonce})")]
    InvalidNonce { tx_nonce: u64, key_nonce: u64 },

    /// The transaction was included but its receipt carries a failure
    #[error("transaction execution failed: {0}")]
    Execution(String),
}

/// Contract panic markers that mean the record is already on chain.
const DUPLICATE_MARKERS: &[&str] = &[
    "already verified",
    "already registered",
    "nullifier already used",
];

impl ChainError {
    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Transport(_) => true,
            ChainError::Rpc(message) => {
                let message = message.to_ascii_lowercase();
                message.contains("timeout")
                    || message.contains("unavailable")
                    || message.contains("too many requests")
            }
            _ => false,
        }
    }

    /// Stale lane nonce; the caller should resync the lane and retry once.
    pub fn is_invalid_nonce(&self) -> bool {
        matches!(self, ChainError::InvalidNonce { .. })
    }

    /// AddKey raced with another replica registering the same key.
    pub fn is_key_exists(&self) -> bool {
        match self {
            ChainError::Execution(message) => {
                let message = message.to_ascii_lowercase();
                message.contains("addkeyalreadyexists") || message.contains("already exists")
            }
            _ => false,
        }
    }

    /// The registry contract rejected the record as a duplicate.
    pub fn is_duplicate_record(&self) -> bool {
        match self {
            ChainError::Execution(message) => {
                let message = message.to_ascii_lowercase();
                DUPLICATE_MARKERS.iter().any(|m| message.contains(m))
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChainError::Malformed(e.to_string())
        } else {
            ChainError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_and_timeouts_are_retryable() {
        assert!(ChainError::Transport("connection refused".into()).is_retryable());
        assert!(ChainError::Rpc("TIMEOUT_ERROR: node busy".into()).is_retryable());
        assert!(ChainError::Rpc("server unavailable".into()).is_retryable());
        assert!(!ChainError::Rpc("UNKNOWN_BLOCK".into()).is_retryable());
        assert!(!ChainError::Execution("panicked".into()).is_retryable());
        assert!(!ChainError::InvalidNonce {
            tx_nonce: 5,
            key_nonce: 9
        }
        .is_retryable());
    }

    #[test]
    fn test_duplicate_markers_match_case_insensitively() {
        let already = ChainError::Execution(
            "Smart contract panicked: Passport ALREADY VERIFIED for this account".into(),
        );
        assert!(already.is_duplicate_record());

        let nullifier =
            ChainError::Execution("Smart contract panicked: nullifier already used".into());
        assert!(nullifier.is_duplicate_record());

        let registered = ChainError::Execution("account already registered".into());
        assert!(registered.is_duplicate_record());

        let unrelated = ChainError::Execution("Smart contract panicked: bad input".into());
        assert!(!unrelated.is_duplicate_record());

        // Only execution failures can signal a duplicate
        assert!(!ChainError::Rpc("already verified".into()).is_duplicate_record());
    }

    #[test]
    fn test_key_exists_detection() {
        let wire = ChainError::Execution(r#"{"ActionError":{"kind":{"AddKeyAlreadyExists":{"account_id":"backend.near","public_key":"ed25519:abc"}}}}"#.into());
        assert!(wire.is_key_exists());
        assert!(!ChainError::Execution("panicked".into()).is_key_exists());
    }
}

//! JSON-RPC chain client
//!
//! Talks to a NEAR-compatible RPC node:
//! - read-only queries (`call_function`, `view_access_key`,
//!   `view_access_key_list`)
//! - transaction submission (`broadcast_tx_commit`) over borsh-encoded
//!   signed transactions
//!
//! Every call is single-attempt with a bounded timeout. Retry policy
//! belongs to the callers: the verification pipeline never retries within
//! a request, and the key bootstrapper runs its own probe-and-backoff
//! loop. The [`ChainRpc`] trait is the seam those callers are tested
//! against.

use async_trait::async_trait;
use base64::Engine;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::error::ChainError;
use super::key_pool::LaneSigner;

/// Default gas attached to registry function calls (100 Tgas).
pub const DEFAULT_FUNCTION_CALL_GAS: u64 = 100_000_000_000_000;

/// An access key as reported by `view_access_key`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessKeyView {
    pub nonce: u64,
    /// Either the string `"FullAccess"` or a `FunctionCall` object.
    pub permission: Value,
}

impl AccessKeyView {
    pub fn is_full_access(&self) -> bool {
        self.permission.as_str() == Some("FullAccess")
    }
}

/// One entry of `view_access_key_list`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessKeyInfo {
    pub public_key: String,
    pub access_key: AccessKeyView,
}

/// Actions the gateway submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAction {
    FunctionCall {
        method_name: String,
        args: Vec<u8>,
        gas: u64,
        deposit: u128,
    },
    AddFullAccessKey {
        public_key: String,
    },
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub transaction_hash: String,
    pub success_value: Option<Vec<u8>>,
}

/// Chain access as the rest of the gateway sees it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Call a read-only contract method; returns its JSON result.
    async fn view_function(
        &self,
        contract_id: &str,
        method_name: &str,
        args: &Value,
    ) -> Result<Value, ChainError>;

    /// Look up one access key on an account.
    async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView, ChainError>;

    /// List every access key on an account.
    async fn list_access_keys(&self, account_id: &str) -> Result<Vec<AccessKeyInfo>, ChainError>;

    /// Sign a transaction on the given lane and wait for it to commit.
    async fn sign_and_submit(
        &self,
        signer: &LaneSigner,
        receiver_id: &str,
        actions: Vec<ChainAction>,
    ) -> Result<TxOutcome, ChainError>;
}

// ============================================================================
// Borsh wire types (NEAR transaction format)
// ============================================================================

/// Minimal borsh mirror of the chain's transaction schema. Enum
/// discriminants must match the protocol's declaration order, hence the
/// explicit values on the action and permission enums.
mod wire {
    use borsh::BorshSerialize;

    #[derive(BorshSerialize)]
    pub enum PublicKey {
        Ed25519([u8; 32]),
    }

    #[derive(BorshSerialize)]
    pub enum Signature {
        Ed25519([u8; 64]),
    }

    #[derive(BorshSerialize)]
    #[borsh(use_discriminant = true)]
    #[repr(u8)]
    pub enum Action {
        FunctionCall(FunctionCallAction) = 2,
        AddKey(AddKeyAction) = 5,
    }

    #[derive(BorshSerialize)]
    pub struct FunctionCallAction {
        pub method_name: String,
        pub args: Vec<u8>,
        pub gas: u64,
        pub deposit: u128,
    }

    #[derive(BorshSerialize)]
    pub struct AddKeyAction {
        pub public_key: PublicKey,
        pub access_key: AccessKey,
    }

    #[derive(BorshSerialize)]
    pub struct AccessKey {
        pub nonce: u64,
        pub permission: AccessKeyPermission,
    }

    #[derive(BorshSerialize)]
    #[borsh(use_discriminant = true)]
    #[repr(u8)]
    pub enum AccessKeyPermission {
        FullAccess = 1,
    }

    #[derive(BorshSerialize)]
    pub struct Transaction {
        pub signer_id: String,
        pub public_key: PublicKey,
        pub nonce: u64,
        pub receiver_id: String,
        pub block_hash: [u8; 32],
        pub actions: Vec<Action>,
    }

    #[derive(BorshSerialize)]
    pub struct SignedTransaction {
        pub transaction: Transaction,
        pub signature: Signature,
    }
}

fn decode_key_text(text: &str) -> Result<[u8; 32], ChainError> {
    let encoded = text.strip_prefix("ed25519:").unwrap_or(text);
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| ChainError::Malformed(format!("public key {text}: {e}")))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| ChainError::Malformed(format!("public key length {}", v.len())))
}

fn to_wire_action(action: ChainAction) -> Result<wire::Action, ChainError> {
    Ok(match action {
        ChainAction::FunctionCall {
            method_name,
            args,
            gas,
            deposit,
        } => wire::Action::FunctionCall(wire::FunctionCallAction {
            method_name,
            args,
            gas,
            deposit,
        }),
        ChainAction::AddFullAccessKey { public_key } => wire::Action::AddKey(wire::AddKeyAction {
            public_key: wire::PublicKey::Ed25519(decode_key_text(&public_key)?),
            access_key: wire::AccessKey {
                nonce: 0,
                permission: wire::AccessKeyPermission::FullAccess,
            },
        }),
    })
}

/// Encode and sign a transaction; returns the borsh bytes of the signed
/// transaction and the transaction hash (base58 of SHA-256 over the
/// unsigned bytes, which is also what gets signed).
fn build_signed_transaction(
    signer: &LaneSigner,
    receiver_id: &str,
    block_hash: [u8; 32],
    actions: Vec<ChainAction>,
) -> Result<(Vec<u8>, String), ChainError> {
    let actions = actions
        .into_iter()
        .map(to_wire_action)
        .collect::<Result<Vec<_>, _>>()?;

    let transaction = wire::Transaction {
        signer_id: signer.account_id.clone(),
        public_key: wire::PublicKey::Ed25519(signer.public_key_bytes()),
        nonce: signer.tx_nonce,
        receiver_id: receiver_id.to_string(),
        block_hash,
        actions,
    };

    let unsigned = borsh::to_vec(&transaction)
        .map_err(|e| ChainError::Malformed(format!("transaction encoding: {e}")))?;
    let digest: [u8; 32] = Sha256::digest(&unsigned).into();
    let signature = signer.sign(&digest);

    let signed = wire::SignedTransaction {
        transaction,
        signature: wire::Signature::Ed25519(signature.to_bytes()),
    };
    let bytes = borsh::to_vec(&signed)
        .map_err(|e| ChainError::Malformed(format!("transaction encoding: {e}")))?;

    Ok((bytes, bs58::encode(digest).into_string()))
}

// ============================================================================
// Response parsing
// ============================================================================

/// Map a JSON-RPC `error` object onto [`ChainError`].
fn classify_rpc_error(error: &Value) -> ChainError {
    if let Some(invalid) = error.pointer("/data/TxExecutionError/InvalidTxError/InvalidNonce") {
        return ChainError::InvalidNonce {
            tx_nonce: invalid
                .get("tx_nonce")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
            key_nonce: invalid
                .get("ak_nonce")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        };
    }
    ChainError::Rpc(error.to_string())
}

/// Extract the outcome from a `broadcast_tx_commit` result.
fn parse_tx_outcome(result: &Value) -> Result<TxOutcome, ChainError> {
    let transaction_hash = result
        .pointer("/transaction/hash")
        .or_else(|| result.pointer("/transaction_outcome/id"))
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::Malformed("transaction hash missing from outcome".into()))?
        .to_string();

    let status = result
        .get("status")
        .ok_or_else(|| ChainError::Malformed("status missing from outcome".into()))?;

    if let Some(failure) = status.get("Failure") {
        return Err(ChainError::Execution(failure.to_string()));
    }
    if let Some(encoded) = status.get("SuccessValue").and_then(Value::as_str) {
        let value = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ChainError::Malformed(format!("success value: {e}")))?;
        return Ok(TxOutcome {
            transaction_hash,
            success_value: (!value.is_empty()).then_some(value),
        });
    }
    if status.get("SuccessReceiptId").is_some() {
        return Ok(TxOutcome {
            transaction_hash,
            success_value: None,
        });
    }
    Err(ChainError::Malformed(format!("unexpected status {status}")))
}

fn decode_block_hash(text: &str) -> Result<[u8; 32], ChainError> {
    let bytes = bs58::decode(text)
        .into_vec()
        .map_err(|e| ChainError::Malformed(format!("block hash: {e}")))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| ChainError::Malformed(format!("block hash length {}", v.len())))
}

// ============================================================================
// HTTP client
// ============================================================================

/// Production [`ChainRpc`] over HTTP JSON-RPC.
pub struct JsonRpcChain {
    http: reqwest::Client,
    rpc_url: String,
}

impl JsonRpcChain {
    pub fn new(rpc_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "dontcare",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let envelope: Value = response.json().await?;

        if let Some(error) = envelope.get("error") {
            return Err(classify_rpc_error(error));
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::Malformed("rpc response missing result".into()))
    }

    async fn query(&self, params: Value) -> Result<Value, ChainError> {
        self.call("query", params).await
    }

    async fn final_block_hash(&self) -> Result<[u8; 32], ChainError> {
        let result = self.call("block", json!({"finality": "final"})).await?;
        let hash = result
            .pointer("/header/hash")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::Malformed("block header hash missing".into()))?;
        decode_block_hash(hash)
    }
}

#[async_trait]
impl ChainRpc for JsonRpcChain {
    async fn view_function(
        &self,
        contract_id: &str,
        method_name: &str,
        args: &Value,
    ) -> Result<Value, ChainError> {
        let args_base64 =
            base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(args).map_err(
                |e| ChainError::Malformed(format!("view args for {method_name}: {e}")),
            )?);

        let result = self
            .query(json!({
                "request_type": "call_function",
                "finality": "optimistic",
                "account_id": contract_id,
                "method_name": method_name,
                "args_base64": args_base64,
            }))
            .await?;

        let bytes: Vec<u8> = serde_json::from_value(
            result
                .get("result")
                .cloned()
                .ok_or_else(|| ChainError::Malformed("call_function result missing".into()))?,
        )
        .map_err(|e| ChainError::Malformed(format!("call_function bytes: {e}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| ChainError::Malformed(format!("{method_name} returned non-JSON: {e}")))
    }

    async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView, ChainError> {
        let not_found = || ChainError::UnknownAccessKey {
            account_id: account_id.to_string(),
            public_key: public_key.to_string(),
        };

        let result = self
            .query(json!({
                "request_type": "view_access_key",
                "finality": "optimistic",
                "account_id": account_id,
                "public_key": public_key,
            }))
            .await
            .map_err(|e| match e {
                // Newer nodes reject unknown keys at the rpc-error level
                ChainError::Rpc(message) if message.contains("UNKNOWN_ACCESS_KEY") => not_found(),
                other => other,
            })?;

        // Older nodes report a missing key inside the result body
        if let Some(message) = result.get("error").and_then(Value::as_str) {
            if message.contains("does not exist") {
                return Err(not_found());
            }
            return Err(ChainError::Rpc(message.to_string()));
        }

        serde_json::from_value(result)
            .map_err(|e| ChainError::Malformed(format!("access key view: {e}")))
    }

    async fn list_access_keys(&self, account_id: &str) -> Result<Vec<AccessKeyInfo>, ChainError> {
        let result = self
            .query(json!({
                "request_type": "view_access_key_list",
                "finality": "optimistic",
                "account_id": account_id,
            }))
            .await?;

        let keys = result
            .get("keys")
            .cloned()
            .ok_or_else(|| ChainError::Malformed("access key list missing keys".into()))?;
        serde_json::from_value(keys)
            .map_err(|e| ChainError::Malformed(format!("access key list: {e}")))
    }

    async fn sign_and_submit(
        &self,
        signer: &LaneSigner,
        receiver_id: &str,
        actions: Vec<ChainAction>,
    ) -> Result<TxOutcome, ChainError> {
        let block_hash = self.final_block_hash().await?;
        let (signed_tx, tx_hash) =
            build_signed_transaction(signer, receiver_id, block_hash, actions)?;

        tracing::debug!(
            tx_hash,
            signer = %signer.public_key,
            nonce = signer.tx_nonce,
            receiver_id,
            "submitting transaction"
        );

        let encoded = base64::engine::general_purpose::STANDARD.encode(signed_tx);
        let result = self.call("broadcast_tx_commit", json!([encoded])).await?;
        parse_tx_outcome(&result)
    }
}

// ============================================================================
// Tests
// ============================================================================

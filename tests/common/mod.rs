//! Common test utilities and fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use http_body_util::BodyExt;
use tower::ServiceExt;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use personhood_gateway::chain::{
    AccessKeyInfo, AccessKeyView, BootstrapReport, ChainAction, ChainError, ChainRpc,
    IdentityRegistry, SigningKeyPool, TxOutcome, REGISTER_METHOD,
};
use personhood_gateway::crypto::{public_key_text, SignedMessagePayload};
use personhood_gateway::domain::{DiscloseOutput, ValidityFlags, VerificationRequest};
use personhood_gateway::infra::InMemoryNonceStore;
use personhood_gateway::pipeline::{
    ProofVerifier, VerificationPipeline, VerificationPolicy, VerifierError,
};
use personhood_gateway::projection::InMemorySessionStore;
use personhood_gateway::server::{build_router, AppState, GatewayConfig};
use personhood_gateway::VerifierOutcome;
use personhood_gateway::chain::LaneSigner;

// ============================================================================
// Shared fixtures
// ============================================================================

pub const CHALLENGE: &str = "I confirm this passport belongs to me";
pub const RECIPIENT: &str = "registry.test.near";
pub const BACKEND_ACCOUNT: &str = "backend.test.near";
pub const USER_ACCOUNT: &str = "alice.test.near";
pub const SESSION_ID: &str = "7d4a1e2b-8c3f-4e5a-9b6d-0f1a2b3c4d5e";
pub const POOL_SEED: [u8; 32] = [2u8; 32];
pub const WALLET_SEED: [u8; 32] = [9u8; 32];

pub fn wallet_key() -> SigningKey {
    SigningKey::from_bytes(&WALLET_SEED)
}

/// The embedded wallet-signature payload, carrying a real signature over
/// the canonical digest of `challenge`/`recipient`.
pub fn embedded_signature_json(
    challenge: &str,
    recipient: &str,
    nonce: [u8; 32],
    timestamp_ms: i64,
) -> String {
    let key = wallet_key();
    let payload = SignedMessagePayload::new(challenge, nonce, recipient);
    let signature = key.sign(&payload.signing_digest().unwrap());

    json!({
        "accountId": USER_ACCOUNT,
        "signature": BASE64.encode(signature.to_bytes()),
        "publicKey": public_key_text(&key),
        "nonce": BASE64.encode(nonce),
        "timestamp": timestamp_ms,
    })
    .to_string()
}

/// Wrap a payload the way size-constrained carriers deliver it: hex-encoded
/// with trailing NUL padding.
pub fn hex_wrapped(payload_json: &str, nul_padding: usize) -> String {
    let mut bytes = payload_json.as_bytes().to_vec();
    bytes.resize(bytes.len() + nul_padding, 0u8);
    hex::encode(bytes)
}

pub fn user_public_key() -> String {
    public_key_text(&wallet_key())
}

/// A verifier outcome that passes every business rule.
pub fn accepted_outcome(nullifier: &str, user_defined_data: Value) -> VerifierOutcome {
    VerifierOutcome {
        validity: ValidityFlags {
            is_valid: true,
            is_minimum_age_valid: true,
            is_ofac_match: false,
        },
        disclose: DiscloseOutput {
            nullifier: Some(nullifier.to_string()),
            nationality: Some("FRA".to_string()),
            ..DiscloseOutput::default()
        },
        user_identifier: SESSION_ID.to_string(),
        user_defined_data,
    }
}

/// A well-formed submission body; the proof content is opaque to the
/// gateway and only checked for shape.
pub fn submission_json() -> Value {
    json!({
        "attestationId": 1,
        "proof": {
            "a": ["11", "12"],
            "b": [["21", "22"], ["23", "24"]],
            "c": ["31", "32"],
        },
        "publicSignals": ["401", "402"],
        "userContextData": "00aa11bb",
    })
}

// ============================================================================
// Scripted proof verifier
// ============================================================================

/// A verifier that accepts everything with a fixed outcome.
pub struct ScriptedVerifier {
    outcome: VerifierOutcome,
}

impl ScriptedVerifier {
    pub fn new(outcome: VerifierOutcome) -> Self {
        Self { outcome }
    }
}

#[async_trait]
impl ProofVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        _request: &VerificationRequest,
    ) -> Result<VerifierOutcome, VerifierError> {
        Ok(self.outcome.clone())
    }
}

/// A verifier that is never reachable.
pub struct UnreachableVerifier;

#[async_trait]
impl ProofVerifier for UnreachableVerifier {
    async fn verify(
        &self,
        _request: &VerificationRequest,
    ) -> Result<VerifierOutcome, VerifierError> {
        Err(VerifierError::Unreachable(
            "connect timeout to 10.1.2.3:8443".to_string(),
        ))
    }
}

// ============================================================================
// In-memory chain
// ============================================================================

#[derive(Debug)]
pub struct RecordedSubmission {
    pub signer_public_key: String,
    pub signer_nonce: u64,
    pub receiver_id: String,
    pub actions: Vec<ChainAction>,
}

/// An in-memory stand-in for the chain: access keys, registry contract
/// state, and submitted transactions.
#[derive(Default)]
pub struct FakeChain {
    access_keys: Mutex<HashMap<String, HashMap<String, AccessKeyView>>>,
    used_nullifiers: Mutex<HashSet<String>>,
    verified_accounts: Mutex<HashSet<String>>,
    submissions: Mutex<Vec<RecordedSubmission>>,
    submit_failures: Mutex<VecDeque<ChainError>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a full-access key on an account.
    pub fn register_key(&self, account_id: &str, public_key: &str, nonce: u64) {
        self.access_keys
            .lock()
            .unwrap()
            .entry(account_id.to_string())
            .or_default()
            .insert(
                public_key.to_string(),
                AccessKeyView {
                    nonce,
                    permission: json!("FullAccess"),
                },
            );
    }

    /// Register every key of a pool, as a completed bootstrap would.
    pub fn seed_pool(&self, pool: &SigningKeyPool) {
        for (i, public_key) in pool.public_keys().iter().enumerate() {
            self.register_key(pool.account_id(), public_key, (i as u64 + 1) * 10);
        }
    }

    pub fn mark_nullifier_used(&self, nullifier: &str) {
        self.used_nullifiers
            .lock()
            .unwrap()
            .insert(nullifier.to_string());
    }

    pub fn mark_account_verified(&self, account_id: &str) {
        self.verified_accounts
            .lock()
            .unwrap()
            .insert(account_id.to_string());
    }

    /// Queue an error for the next `sign_and_submit` call.
    pub fn fail_next_submission(&self, error: ChainError) {
        self.submit_failures.lock().unwrap().push_back(error);
    }

    pub fn submissions(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn submitted_records(&self) -> Vec<Value> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .flat_map(|s| s.actions.iter())
            .filter_map(|action| match action {
                ChainAction::FunctionCall {
                    method_name, args, ..
                } if method_name == REGISTER_METHOD => serde_json::from_slice(args).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn added_keys(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .flat_map(|s| s.actions.iter())
            .filter_map(|action| match action {
                ChainAction::AddFullAccessKey { public_key } => Some(public_key.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_key(&self, account_id: &str, public_key: &str) -> bool {
        self.access_keys
            .lock()
            .unwrap()
            .get(account_id)
            .map(|keys| keys.contains_key(public_key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn view_function(
        &self,
        _contract_id: &str,
        method_name: &str,
        args: &Value,
    ) -> Result<Value, ChainError> {
        match method_name {
            "is_nullifier_used" => {
                let nullifier = args["nullifier"].as_str().unwrap_or_default();
                Ok(json!(self
                    .used_nullifiers
                    .lock()
                    .unwrap()
                    .contains(nullifier)))
            }
            "is_account_verified" => {
                let account_id = args["account_id"].as_str().unwrap_or_default();
                Ok(json!(self
                    .verified_accounts
                    .lock()
                    .unwrap()
                    .contains(account_id)))
            }
            other => Err(ChainError::Rpc(format!("unknown view method {other}"))),
        }
    }

    async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView, ChainError> {
        self.access_keys
            .lock()
            .unwrap()
            .get(account_id)
            .and_then(|keys| keys.get(public_key))
            .cloned()
            .ok_or_else(|| ChainError::UnknownAccessKey {
                account_id: account_id.to_string(),
                public_key: public_key.to_string(),
            })
    }

    async fn list_access_keys(&self, account_id: &str) -> Result<Vec<AccessKeyInfo>, ChainError> {
        Ok(self
            .access_keys
            .lock()
            .unwrap()
            .get(account_id)
            .map(|keys| {
                keys.iter()
                    .map(|(public_key, view)| AccessKeyInfo {
                        public_key: public_key.clone(),
                        access_key: view.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn sign_and_submit(
        &self,
        signer: &LaneSigner,
        receiver_id: &str,
        actions: Vec<ChainAction>,
    ) -> Result<TxOutcome, ChainError> {
        if let Some(error) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        // Validate every action before applying any, the way a failing
        // action discards the whole transaction on chain.
        let mut used = self.used_nullifiers.lock().unwrap();
        let mut accounts = self.access_keys.lock().unwrap();
        let mut records: Vec<Value> = Vec::new();
        let mut new_keys: Vec<String> = Vec::new();
        for action in &actions {
            match action {
                ChainAction::FunctionCall {
                    method_name, args, ..
                } if method_name == REGISTER_METHOD => {
                    let record: Value = serde_json::from_slice(args)
                        .map_err(|e| ChainError::Execution(format!("bad args: {e}")))?;
                    let nullifier = record["nullifier"].as_str().unwrap_or_default();
                    if used.contains(nullifier) {
                        return Err(ChainError::Execution(
                            "Smart contract panicked: nullifier already used".to_string(),
                        ));
                    }
                    records.push(record);
                }
                ChainAction::FunctionCall { method_name, .. } => {
                    return Err(ChainError::Execution(format!(
                        "MethodNotFound: {method_name}"
                    )));
                }
                ChainAction::AddFullAccessKey { public_key } => {
                    let exists = accounts
                        .get(&signer.account_id)
                        .map(|keys| keys.contains_key(public_key))
                        .unwrap_or(false);
                    if exists {
                        return Err(ChainError::Execution(format!(
                            "ActionError: AddKeyAlreadyExists {public_key}"
                        )));
                    }
                    new_keys.push(public_key.clone());
                }
            }
        }

        for record in records {
            let nullifier = record["nullifier"].as_str().unwrap_or_default().to_string();
            let account = record["account_id"].as_str().unwrap_or_default().to_string();
            used.insert(nullifier);
            self.verified_accounts.lock().unwrap().insert(account);
        }
        for public_key in new_keys {
            accounts.entry(signer.account_id.clone()).or_default().insert(
                public_key,
                AccessKeyView {
                    nonce: 0,
                    permission: json!("FullAccess"),
                },
            );
        }
        drop(used);
        drop(accounts);

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(RecordedSubmission {
            signer_public_key: signer.public_key.clone(),
            signer_nonce: signer.tx_nonce,
            receiver_id: receiver_id.to_string(),
            actions,
        });
        Ok(TxOutcome {
            transaction_hash: format!("faketx{}", submissions.len()),
            success_value: None,
        })
    }
}

// ============================================================================
// Gateway assembly
// ============================================================================

pub struct TestGateway {
    pub app: Router,
    pub chain: Arc<FakeChain>,
    pub keys: Arc<SigningKeyPool>,
    pub bootstrap: Arc<RwLock<BootstrapReport>>,
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        verifier_url: "http://verifier.invalid".to_string(),
        verifier_timeout: Duration::from_secs(5),
        chain_rpc_url: "http://rpc.invalid".to_string(),
        chain_rpc_timeout: Duration::from_secs(5),
        registry_contract_id: RECIPIENT.to_string(),
        backend_account_id: BACKEND_ACCOUNT.to_string(),
        key_pool_root_seed: POOL_SEED,
        key_pool_size: 2,
        signing_challenge: CHALLENGE.to_string(),
        signing_recipient: RECIPIENT.to_string(),
        signature_max_age: Duration::from_millis(600_000),
        clock_skew: Duration::from_millis(10_000),
        sanctions_check_enabled: true,
        database_url: None,
        max_db_connections: 2,
        session_ttl: Duration::from_secs(3600),
        status_fallback_grace: Duration::from_millis(5_000),
        cors_allowed_origins: None,
    }
}

/// Assemble a full gateway over the fake chain and a scripted verifier.
pub fn build_gateway(outcome: VerifierOutcome, chain: Arc<FakeChain>) -> TestGateway {
    build_gateway_with_verifier(Arc::new(ScriptedVerifier::new(outcome)), chain)
}

pub fn build_gateway_with_verifier(
    verifier: Arc<dyn ProofVerifier>,
    chain: Arc<FakeChain>,
) -> TestGateway {
    let config = test_config();

    let rpc: Arc<dyn ChainRpc> = chain.clone();
    let keys = Arc::new(SigningKeyPool::derive(
        BACKEND_ACCOUNT,
        &POOL_SEED,
        config.key_pool_size,
    ));
    chain.seed_pool(&keys);
    let registry = Arc::new(IdentityRegistry::new(
        Arc::clone(&rpc),
        config.registry_contract_id.clone(),
    ));
    let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl));

    let pipeline = Arc::new(VerificationPipeline::new(
        verifier,
        Arc::clone(&rpc),
        Arc::clone(&registry),
        Arc::new(InMemoryNonceStore::new()),
        sessions.clone(),
        Arc::clone(&keys),
        VerificationPolicy {
            challenge: config.signing_challenge.clone(),
            recipient: config.signing_recipient.clone(),
            max_signature_age: config.signature_max_age,
            clock_skew: config.clock_skew,
            sanctions_check_enabled: config.sanctions_check_enabled,
            ..VerificationPolicy::default()
        },
    ));

    let bootstrap = Arc::new(RwLock::new(BootstrapReport::default()));
    let state = AppState {
        pipeline,
        sessions,
        registry,
        keys: Arc::clone(&keys),
        bootstrap: Arc::clone(&bootstrap),
        status_fallback_grace: config.status_fallback_grace,
    };

    let app = build_router(&config).unwrap().with_state(state);
    TestGateway {
        app,
        chain,
        keys,
        bootstrap,
    }
}

/// Send a request to the test router.
pub async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    let body = body
        .map(|v| Body::from(serde_json::to_vec(&v).unwrap()))
        .unwrap_or_else(|| Body::from(Vec::new()));

    let response = app
        .clone()
        .into_service::<Body>()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();

    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }))
    };

    (status, json)
}

//! Shared fixtures for scenario tests (spec §8): a mocked JSON-RPC chain
//! node reachable through a real [`ProviderCache`], plus the `Config` that
//! points at it, so every scenario test builds its workers' contexts the
//! same way the real binaries do instead of hand-rolling fakes per test.
//!
//! Lives under `tests/support/` rather than `src/` so `wiremock` stays a
//! `[dev-dependencies]`-only concern (mirrors `r402-http`'s
//! `facilitator_client` tests, the one place in the corpus that mocks a
//! JSON-RPC-shaped HTTP endpoint this way).
//!
//! Not every scenario test exercises every helper here (a validation-only
//! test never touches the mocked node at all), so this module is broadly
//! `allow(dead_code)` rather than tuned per included-binary.
#![allow(dead_code)]

use serde_json::{json, Value};
use wdp_broadcast_worker::{BroadcastContext, BroadcastRegistry};
use wdp_chain::{FeeCache, ProviderCache, SignerSet};
use wdp_config::Config;
use wdp_monitor::MonitorContext;
use wdp_nonce::fake::FakeStore;
use wdp_nonce::NonceCoordinator;
use wdp_signing_worker::SigningContext;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A well-known Hardhat/Ganache default-account private key. Not a secret —
/// every scenario test signs against a mocked node, never a real chain.
pub const TEST_SIGNER_KEY: &str =
    "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";

pub const USDC_ADDR: &str = "0x0000000000000000000000000000000000d00d";
pub const MULTICALL_ADDR: &str = "0x000000000000000000000000000000000ca11c";
pub const RECIPIENT_ADDR: &str = "0x000000000000000000000000000000000000aa";
pub const NATIVE_ADDR: &str = "0x0000000000000000000000000000000000000000";

/// One mocked chain node plus the `Config` pointed at it. Every RPC method
/// the pipeline actually calls (spec §4.2-§4.4: `eth_getTransactionCount`,
/// `eth_gasPrice`, `eth_sendRawTransaction`, `eth_getTransactionReceipt`,
/// `eth_blockNumber`) is stubbed per test via the `stub_*` methods below;
/// nothing is mocked until a test asks for it, so an unexpected call surfaces
/// as a connection/404 failure rather than silently succeeding.
pub struct ChainHarness {
    pub server: MockServer,
    pub config: Config,
}

impl ChainHarness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let json = format!(
            r#"{{
                "store": {{ "redis_url": "redis://localhost:6379", "database_url": "postgres://localhost/wdp" }},
                "chains": [
                    {{
                        "chain": "polygon",
                        "network": "mainnet",
                        "signers": ["{key}"],
                        "rpc": [{{ "http": "{uri}" }}],
                        "confirmations": 1,
                        "supported_tokens": [
                            {{ "symbol": "USDC", "address": "{usdc}", "decimals": 6 }}
                        ],
                        "multicall_address": "{multicall}"
                    }}
                ],
                "monitor": {{ "backoff_stages_ms": [5, 5, 5], "pending_alert_after_secs": 1800 }}
            }}"#,
            key = TEST_SIGNER_KEY,
            uri = server.uri(),
            usdc = USDC_ADDR,
            multicall = MULTICALL_ADDR,
        );
        let config: Config = serde_json::from_str(&json).expect("fixture config must parse");
        Self { server, config }
    }

    /// A [`SigningContext`] wired to this harness's mocked node, backed by a
    /// fresh [`FakeStore`] nonce pool local to this context.
    pub async fn signing_context(&self) -> SigningContext<FakeStore> {
        SigningContext {
            providers: ProviderCache::from_configs(&self.config.chains).await.unwrap(),
            signers: SignerSet::from_configs(&self.config.chains).unwrap(),
            fees: FeeCache::new(),
            nonces: NonceCoordinator::with_store(FakeStore::new()),
            config: self.config.clone(),
        }
    }

    /// A [`BroadcastContext`] wired to this harness's mocked node. Its nonce
    /// pool is a separate [`FakeStore`] from [`Self::signing_context`]'s —
    /// drain ordering lives in [`BroadcastState`](wdp_broadcast_worker::BroadcastState),
    /// not the nonce store, so the seam doesn't need to be shared for these
    /// scenarios to exercise real ordering/retry behavior.
    pub async fn broadcast_context(&self) -> BroadcastContext<FakeStore> {
        BroadcastContext {
            providers: ProviderCache::from_configs(&self.config.chains).await.unwrap(),
            signers: SignerSet::from_configs(&self.config.chains).unwrap(),
            fees: FeeCache::new(),
            nonces: NonceCoordinator::with_store(FakeStore::new()),
            config: self.config.clone(),
            registry: BroadcastRegistry::default(),
        }
    }

    pub async fn monitor_context(&self) -> MonitorContext {
        MonitorContext {
            providers: ProviderCache::from_configs(&self.config.chains).await.unwrap(),
            config: self.config.clone(),
        }
    }

    pub async fn stub_pending_nonce(&self, nonce: u64) {
        self.stub_method("eth_getTransactionCount", json!(format!("0x{nonce:x}")))
            .await;
    }

    pub async fn stub_gas_price(&self, wei: u128) {
        self.stub_method("eth_gasPrice", json!(format!("0x{wei:x}")))
            .await;
    }

    pub async fn stub_block_number(&self, number: u64) {
        self.stub_method("eth_blockNumber", json!(format!("0x{number:x}")))
            .await;
    }

    pub async fn stub_send_raw_success(&self, tx_hash: &str) {
        self.stub_method("eth_sendRawTransaction", json!(tx_hash)).await;
    }

    /// Fails the first `failures` broadcast attempts with a transport error,
    /// then succeeds — S6 (transient RPC failure recovers on redelivery).
    /// Relies on wiremock priority: the failing mock is checked first and
    /// stops matching once its budget is spent, letting the always-on
    /// success mock underneath take over.
    pub async fn stub_send_raw_fails_then_succeeds(&self, failures: u64, tx_hash: &str) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({ "method": "eth_sendRawTransaction" })))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(failures)
            .with_priority(1)
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({ "method": "eth_sendRawTransaction" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_envelope(json!(tx_hash))))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    pub async fn stub_receipt_confirmed(&self, tx_hash: &str, block_number: u64, gas_used: u64) {
        self.stub_method(
            "eth_getTransactionReceipt",
            receipt_json(tx_hash, true, block_number, gas_used),
        )
        .await;
    }

    pub async fn stub_receipt_reverted(&self, tx_hash: &str, block_number: u64) {
        self.stub_method(
            "eth_getTransactionReceipt",
            receipt_json(tx_hash, false, block_number, 21_000),
        )
        .await;
    }

    /// How many `eth_sendRawTransaction` calls this node has received so
    /// far, for asserting a retried broadcast actually re-attempted the RPC
    /// rather than short-circuiting.
    pub async fn send_raw_call_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|req| {
                serde_json::from_slice::<Value>(&req.body)
                    .ok()
                    .and_then(|body| body.get("method").and_then(|m| m.as_str().map(str::to_string)))
                    .as_deref()
                    == Some("eth_sendRawTransaction")
            })
            .count()
    }

    async fn stub_method(&self, method_name: &str, result: Value) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({ "method": method_name })))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_envelope(result)))
            .mount(&self.server)
            .await;
    }
}

/// Every mocked response uses a fixed `id: 1`. Alloy's plain HTTP transport
/// makes one request per call with no concurrent in-flight id-routing table
/// (unlike its WS/IPC transports), so a static id never causes a mismatch —
/// this mirrors how the rest of the ecosystem mocks JSON-RPC over HTTP.
fn rpc_envelope(result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result })
}

fn receipt_json(tx_hash: &str, success: bool, block_number: u64, gas_used: u64) -> Value {
    json!({
        "transactionHash": tx_hash,
        "transactionIndex": "0x0",
        "blockHash": format!("0x{}", "11".repeat(32)),
        "blockNumber": format!("0x{block_number:x}"),
        "from": "0x0000000000000000000000000000000000000000",
        "to": Value::Null,
        "cumulativeGasUsed": format!("0x{gas_used:x}"),
        "effectiveGasPrice": "0x3b9aca00",
        "gasUsed": format!("0x{gas_used:x}"),
        "contractAddress": Value::Null,
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "status": if success { "0x1" } else { "0x0" },
        "type": "0x2",
    })
}

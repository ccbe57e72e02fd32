//! S7 (spec §8): a transaction that mines but reverts on-chain is terminal —
//! the Monitor marks the request FAILED and never treats a revert as
//! something worth retrying.

mod support;

use support::{ChainHarness, NATIVE_ADDR, RECIPIENT_ADDR};
use wdp_ingress::intake::IntakeRequest;
use wdp_monitor::MonitorOutcome;
use wdp_storage::memory::InMemoryStorage;
use wdp_storage::outbox::OutboxRepo;
use wdp_storage::WithdrawalRequestRepo;
use wdp_types::{TxRequestMessage, WithdrawalStatus};

#[tokio::test]
async fn reverted_receipt_marks_the_request_failed() {
    let harness = ChainHarness::new().await;
    let tx_hash = format!("0x{}", "12".repeat(32));

    harness.stub_pending_nonce(0).await;
    harness.stub_gas_price(30_000_000_000).await;
    harness.stub_send_raw_success(&tx_hash).await;
    harness.stub_receipt_reverted(&tx_hash, 500).await;
    harness.stub_block_number(500).await;

    let storage = InMemoryStorage::new();
    let request_id = wdp_ingress::submit(
        &storage,
        &harness.config,
        IntakeRequest {
            request_id: None,
            amount: "2.0".to_string(),
            to_address: RECIPIENT_ADDR.to_string(),
            token_address: NATIVE_ADDR.to_string(),
            chain: wdp_types::Chain::Polygon,
            network: wdp_types::Network::Mainnet,
            symbol: None,
        },
    )
    .await
    .unwrap();

    let rows = storage.fetch_unpublished(10).await.unwrap();
    let tx_request: TxRequestMessage = serde_json::from_value(rows[0].payload.clone()).unwrap();
    storage.mark_published(rows[0].id).await.unwrap();

    let signing_ctx = harness.signing_context().await;
    let signed = wdp_signing_worker::sign_single(&storage, &signing_ctx, &tx_request)
        .await
        .unwrap();

    let broadcast_ctx = harness.broadcast_context().await;
    let outcome = wdp_broadcast_worker::enqueue_and_drain(
        &storage,
        &broadcast_ctx,
        signed,
        "signed-tx-handle".to_string(),
    )
    .await;
    let (_, broadcast_msg) = outcome.broadcasted.into_iter().next().expect("broadcast succeeds");

    let monitor_ctx = harness.monitor_context().await;
    let outcome = wdp_monitor::monitor_transaction(&storage, &monitor_ctx, &broadcast_msg)
        .await
        .unwrap();
    assert!(matches!(outcome, MonitorOutcome::Failed(reason) if reason == "reverted"));

    let persisted = storage.get(request_id).await.unwrap();
    assert_eq!(persisted.status, WithdrawalStatus::Failed);
    assert!(persisted.error_message.is_some());
}

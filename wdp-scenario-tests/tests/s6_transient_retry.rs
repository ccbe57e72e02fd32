//! S6 (spec §8): a transient RPC failure broadcasting a signed transaction
//! leaves the head nonce buffered rather than failing it, and a later
//! redelivery of the same `signed-tx` message succeeds once the node
//! recovers.

mod support;

use support::{ChainHarness, NATIVE_ADDR, RECIPIENT_ADDR};
use wdp_ingress::intake::IntakeRequest;
use wdp_storage::memory::InMemoryStorage;
use wdp_storage::outbox::OutboxRepo;
use wdp_storage::WithdrawalRequestRepo;
use wdp_types::{TxRequestMessage, WithdrawalStatus};

#[tokio::test]
async fn redelivery_after_transient_failure_eventually_broadcasts() {
    let harness = ChainHarness::new().await;
    let tx_hash = format!("0x{}", "ef".repeat(32));

    harness.stub_pending_nonce(3).await;
    harness.stub_gas_price(30_000_000_000).await;
    harness.stub_send_raw_fails_then_succeeds(2, &tx_hash).await;

    let storage = InMemoryStorage::new();
    let request_id = wdp_ingress::submit(
        &storage,
        &harness.config,
        IntakeRequest {
            request_id: None,
            amount: "0.5".to_string(),
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

    let first = wdp_broadcast_worker::enqueue_and_drain(
        &storage,
        &broadcast_ctx,
        signed.clone(),
        "signed-tx-handle".to_string(),
    )
    .await;
    assert!(first.broadcasted.is_empty());
    assert!(first.stalled.is_some(), "a transient failure should stall, not fail, the head");
    assert_eq!(harness.send_raw_call_count().await, 1);
    assert_eq!(
        storage.get(request_id).await.unwrap().status,
        WithdrawalStatus::Broadcasting,
        "the request stays BROADCASTING while retries are in flight"
    );

    let second = wdp_broadcast_worker::enqueue_and_drain(
        &storage,
        &broadcast_ctx,
        signed.clone(),
        "signed-tx-handle".to_string(),
    )
    .await;
    assert!(second.broadcasted.is_empty());
    assert!(second.stalled.is_some());
    assert_eq!(harness.send_raw_call_count().await, 2);

    let third = wdp_broadcast_worker::enqueue_and_drain(
        &storage,
        &broadcast_ctx,
        signed,
        "signed-tx-handle".to_string(),
    )
    .await;
    assert_eq!(third.broadcasted.len(), 1, "the third redelivery reaches a recovered node");
    assert!(third.stalled.is_none());
    assert_eq!(harness.send_raw_call_count().await, 3);
    assert_eq!(
        storage.get(request_id).await.unwrap().status,
        WithdrawalStatus::Sent
    );
}

//! S1 (spec §8): a single native-token withdrawal flows end to end —
//! submit -> outbox -> sign -> broadcast -> confirm.

mod support;

use support::{ChainHarness, NATIVE_ADDR, RECIPIENT_ADDR};
use wdp_ingress::intake::IntakeRequest;
use wdp_storage::memory::InMemoryStorage;
use wdp_storage::outbox::OutboxRepo;
use wdp_storage::WithdrawalRequestRepo;
use wdp_types::{TxRequestMessage, WithdrawalStatus};

#[tokio::test]
async fn native_withdrawal_reaches_confirmed() {
    let harness = ChainHarness::new().await;
    let tx_hash = format!("0x{}", "ab".repeat(32));

    harness.stub_pending_nonce(7).await;
    harness.stub_gas_price(30_000_000_000).await;
    harness.stub_send_raw_success(&tx_hash).await;
    harness.stub_receipt_confirmed(&tx_hash, 1_000, 21_000).await;
    harness.stub_block_number(1_000).await;

    let storage = InMemoryStorage::new();

    let request_id = wdp_ingress::submit(
        &storage,
        &harness.config,
        IntakeRequest {
            request_id: None,
            amount: "1.5".to_string(),
            to_address: RECIPIENT_ADDR.to_string(),
            token_address: NATIVE_ADDR.to_string(),
            chain: wdp_types::Chain::Polygon,
            network: wdp_types::Network::Mainnet,
            symbol: None,
        },
    )
    .await
    .expect("valid native withdrawal is admitted");

    assert_eq!(
        storage.get(request_id).await.unwrap().status,
        WithdrawalStatus::Pending
    );

    // The outbox row is what the real flusher in `wdp-ingress`'s
    // `flush_outbox` would publish to `tx-request`; read it back the same
    // way to drive the signing worker with the exact message Ingress built.
    let rows = storage.fetch_unpublished(10).await.unwrap();
    assert_eq!(rows.len(), 1);
    let tx_request: TxRequestMessage = serde_json::from_value(rows[0].payload.clone()).unwrap();
    storage.mark_published(rows[0].id).await.unwrap();
    assert_eq!(tx_request.request_id, request_id);

    let signing_ctx = harness.signing_context().await;
    let signed = wdp_signing_worker::sign_single(&storage, &signing_ctx, &tx_request)
        .await
        .expect("signing succeeds against the mocked node");
    assert_eq!(
        storage.get(request_id).await.unwrap().status,
        WithdrawalStatus::Signed
    );

    let broadcast_ctx = harness.broadcast_context().await;
    let outcome = wdp_broadcast_worker::enqueue_and_drain(
        &storage,
        &broadcast_ctx,
        signed,
        "signed-tx-handle".to_string(),
    )
    .await;
    assert_eq!(outcome.broadcasted.len(), 1);
    assert!(outcome.stalled.is_none());
    assert_eq!(
        storage.get(request_id).await.unwrap().status,
        WithdrawalStatus::Sent
    );

    let (_, broadcast_msg) = outcome.broadcasted.into_iter().next().unwrap();
    let monitor_ctx = harness.monitor_context().await;
    let outcome = wdp_monitor::monitor_transaction(&storage, &monitor_ctx, &broadcast_msg)
        .await
        .expect("monitoring succeeds against the mocked node");
    assert!(matches!(outcome, wdp_monitor::MonitorOutcome::Confirmed));
    assert_eq!(
        storage.get(request_id).await.unwrap().status,
        WithdrawalStatus::Confirmed
    );
}

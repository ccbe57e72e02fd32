//! S3 (spec §8): enough same-token ERC-20 transfers in one receive-cycle
//! meet the batching thresholds and get folded into a single Multicall3-
//! style transaction instead of five individual sends.

mod support;

use support::{ChainHarness, RECIPIENT_ADDR, USDC_ADDR};
use wdp_ingress::intake::IntakeRequest;
use wdp_signing_worker::{group_by_token, partition_group};
use wdp_storage::memory::InMemoryStorage;
use wdp_storage::outbox::OutboxRepo;
use wdp_storage::WithdrawalRequestRepo;
use wdp_types::{Subject, TxRequestMessage, WithdrawalStatus};

#[tokio::test]
async fn five_same_token_transfers_are_folded_into_one_batch() {
    let harness = ChainHarness::new().await;
    let tx_hash = format!("0x{}", "cd".repeat(32));
    harness.stub_pending_nonce(0).await;
    harness.stub_gas_price(30_000_000_000).await;
    harness.stub_send_raw_success(&tx_hash).await;

    let storage = InMemoryStorage::new();
    let mut request_ids = Vec::new();
    for i in 0..5 {
        let request_id = wdp_ingress::submit(
            &storage,
            &harness.config,
            IntakeRequest {
                request_id: None,
                amount: "1.0".to_string(),
                to_address: RECIPIENT_ADDR.to_string(),
                token_address: USDC_ADDR.to_string(),
                chain: wdp_types::Chain::Polygon,
                network: wdp_types::Network::Mainnet,
                symbol: Some(format!("USDC-{i}")),
            },
        )
        .await
        .unwrap();
        request_ids.push(request_id);
    }

    let rows = storage.fetch_unpublished(10).await.unwrap();
    assert_eq!(rows.len(), 5);
    let messages: Vec<TxRequestMessage> = rows
        .iter()
        .map(|r| serde_json::from_value(r.payload.clone()).unwrap())
        .collect();
    for row in &rows {
        storage.mark_published(row.id).await.unwrap();
    }

    let groups = group_by_token(messages);
    assert_eq!(groups.len(), 1, "all five transfers share one token group");
    let (_, group) = groups.into_iter().next().unwrap();

    let chain_config = harness.config.chain(wdp_types::Chain::Polygon, wdp_types::Network::Mainnet).unwrap();
    let (singles, batched) = partition_group(group, false, chain_config.batch_gas_limit_cap, &harness.config.batching);
    assert!(singles.is_empty(), "the group should qualify for batching");
    let batch = batched.expect("five eligible transfers should batch");
    assert_eq!(batch.len(), 5);

    let signing_ctx = harness.signing_context().await;
    let signed = wdp_signing_worker::sign_batch(&storage, &signing_ctx, &batch)
        .await
        .expect("batch signing succeeds against the mocked node");

    match &signed.subject {
        Subject::Batch { request_ids: ids, .. } => {
            assert_eq!(ids.len(), 5);
        }
        Subject::Single { .. } => panic!("expected a batched subject"),
    }
    assert_eq!(signed.to, chain_config.multicall_address);

    for request_id in &request_ids {
        assert_eq!(
            storage.get(*request_id).await.unwrap().status,
            WithdrawalStatus::Signed
        );
    }

    let broadcast_ctx = harness.broadcast_context().await;
    let outcome = wdp_broadcast_worker::enqueue_and_drain(
        &storage,
        &broadcast_ctx,
        signed,
        "signed-tx-handle".to_string(),
    )
    .await;
    assert_eq!(outcome.broadcasted.len(), 1, "one multicall covers all five transfers");
    assert_eq!(harness.send_raw_call_count().await, 1);
}

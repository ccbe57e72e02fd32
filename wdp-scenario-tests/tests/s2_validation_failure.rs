//! S2 (spec §8): a withdrawal request that fails validation is rejected
//! immediately with status FAILED and never reaches the outbox — no chain
//! interaction happens at all, so this test never touches the mocked node.

mod support;

use support::{ChainHarness, NATIVE_ADDR, RECIPIENT_ADDR};
use wdp_ingress::error::IngressError;
use wdp_ingress::intake::IntakeRequest;
use wdp_storage::memory::InMemoryStorage;
use wdp_storage::outbox::OutboxRepo;
use wdp_storage::WithdrawalRequestRepo;
use wdp_types::WithdrawalStatus;

#[tokio::test]
async fn excess_precision_amount_is_rejected_without_publishing() {
    let harness = ChainHarness::new().await;
    let storage = InMemoryStorage::new();

    let mut request = IntakeRequest {
        request_id: None,
        amount: "1.1234567890".to_string(),
        to_address: RECIPIENT_ADDR.to_string(),
        token_address: NATIVE_ADDR.to_string(),
        chain: wdp_types::Chain::Polygon,
        network: wdp_types::Network::Mainnet,
        symbol: None,
    };
    let request_id = *request.request_id.get_or_insert_with(wdp_types::RequestId::new);

    let result = wdp_ingress::submit(&storage, &harness.config, request).await;
    assert!(matches!(result, Err(IngressError::InvalidAmount(_))));

    let persisted = storage.get(request_id).await.unwrap();
    assert_eq!(persisted.status, WithdrawalStatus::Failed);
    assert!(persisted.error_message.is_some());

    assert!(storage.fetch_unpublished(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_token_is_rejected_without_publishing() {
    let harness = ChainHarness::new().await;
    let storage = InMemoryStorage::new();

    let mut request = IntakeRequest {
        request_id: None,
        amount: "1.5".to_string(),
        to_address: RECIPIENT_ADDR.to_string(),
        token_address: "0x00000000000000000000000000000000000bad".to_string(),
        chain: wdp_types::Chain::Polygon,
        network: wdp_types::Network::Mainnet,
        symbol: Some("BAD".to_string()),
    };
    let request_id = *request.request_id.get_or_insert_with(wdp_types::RequestId::new);

    let result = wdp_ingress::submit(&storage, &harness.config, request).await;
    assert!(matches!(result, Err(IngressError::UnknownToken { .. })));

    let persisted = storage.get(request_id).await.unwrap();
    assert_eq!(persisted.status, WithdrawalStatus::Failed);
    assert!(storage.fetch_unpublished(10).await.unwrap().is_empty());
}

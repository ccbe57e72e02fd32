//! The intake request shape Ingress accepts (spec §4.1).
//!
//! spec.md deliberately leaves the front-end transport out of scope; this
//! crate consumes `IntakeRequest` values off an `intake` queue rather than
//! terminating an HTTP request directly, so whatever front-end exists
//! (REST gateway, internal RPC, CLI) only needs to publish this shape.

use serde::{Deserialize, Serialize};
use wdp_types::{Chain, Network, RequestId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRequest {
    /// Client-supplied idempotency key. Submitting the same `request_id`
    /// twice is a no-op (spec §4.1: "duplicate submissions ... are
    /// idempotent no-ops"). Generated by Ingress if absent.
    #[serde(default)]
    pub request_id: Option<RequestId>,
    pub amount: String,
    pub to_address: String,
    pub token_address: String,
    pub chain: Chain,
    pub network: Network,
    #[serde(default)]
    pub symbol: Option<String>,
}

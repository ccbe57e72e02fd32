//! Deliberately empty. Scenario tests (spec §8, S1-S7) live under `tests/`
//! as ordinary Cargo integration tests, driving the pipeline crates' public
//! library entry points directly against [`wdp_storage::memory::InMemoryStorage`],
//! [`wdp_queue::memory::MemoryQueue`], [`wdp_nonce::fake::FakeStore`], and a
//! `wiremock`-mocked JSON-RPC endpoint standing in for a chain node. This
//! crate exists only to host those tests; it has no runtime code of its own.

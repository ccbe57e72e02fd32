//! DLQ Handler: classifies escalated messages by error kind and either
//! reschedules them to their original upstream queue with exponential
//! backoff, or marks the underlying request(s) permanently FAILED
//! (spec §4.5).

pub mod backoff;
pub mod error;
pub mod worker;

pub use backoff::{decide, Decision};
pub use error::DlqError;
pub use worker::{process_dlq_message, RequestIds};

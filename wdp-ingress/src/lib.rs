//! Ingress: validates and admits withdrawal requests into the pipeline
//! (spec §4.1).

pub mod error;
pub mod intake;
pub mod submit;
pub mod validation;

pub use error::IngressError;
pub use intake::IntakeRequest;
pub use submit::{submit, TX_REQUEST_QUEUE};

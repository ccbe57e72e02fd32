//! Shared tracing bootstrap and graceful-shutdown plumbing for every worker
//! binary, grounded on the teacher's `src/util.rs` (`SigDown`) and
//! `src/telemetry.rs` (`Telemetry`) — pulled into one crate here since five
//! binaries need the identical bootstrap rather than one HTTP server.

mod sig_down;
mod telemetry;

pub use sig_down::SigDown;
pub use telemetry::Telemetry;

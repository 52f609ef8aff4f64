//! Shared HTTP transport plumbing: the process-wide client singleton and the
//! SSRF connect-time address filter (spec.md §4.3).

pub mod ssrf;
pub mod transport;

pub use ssrf::is_blocked_address;
pub use transport::{async_client_for, client_for, shared_client, shutdown};

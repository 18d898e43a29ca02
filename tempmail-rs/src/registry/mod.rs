//! Domain registry
//!
//! Holds the configured receiving domains, their quotas and counters, and
//! balances address allocation across them in round-robin order.

pub mod manager;
pub mod types;

pub use manager::DomainRegistry;
pub use types::{Domain, DomainStats};

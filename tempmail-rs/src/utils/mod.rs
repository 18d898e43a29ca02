//! Utility modules
//!
//! - [`email`]: address parsing, subject extraction, domain validation

pub mod email;

pub use email::{domain_of, extract_address, extract_subject, generate_local_part, validate_domain};

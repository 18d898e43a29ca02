//! Message storage
//!
//! - [`store`]: the in-memory message store with its JSON mirror and retention sweep
//! - [`snapshot`]: whole-collection JSON snapshot files
//! - [`types`]: message records and query types

pub mod snapshot;
pub mod store;
pub mod types;

pub use store::MailStore;
pub use types::{MailStats, Message, MessageNotification, MessagePage, MessageQuery};

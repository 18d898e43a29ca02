//! tempmail-rs: multi-domain disposable mailbox server
//!
//! Receives mail for a set of configured domains, one SMTP listener per
//! domain, and keeps every accepted message for a bounded retention window.
//!
//! # Features
//!
//! - **SMTP**: receive-only sessions (HELO/EHLO, MAIL, RCPT, DATA, RSET, NOOP, QUIT)
//! - **Domains**: round-robin address allocation with per-domain acceptance quotas
//! - **Storage**: JSON snapshots with an hourly retention sweep
//! - **API**: JSON endpoints for listing, reading and deleting messages
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tempmail_rs::config::Config;
//! use tempmail_rs::smtp::{ListenerSet, SessionSettings};
//! use tempmail_rs::{DomainRegistry, MailStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::development();
//!     let registry = Arc::new(DomainRegistry::open(config.registry_path(), &config.domains).await?);
//!     let store = Arc::new(MailStore::open(config.messages_path(), registry.clone()).await?);
//!
//!     let shutdown = CancellationToken::new();
//!     let listeners = ListenerSet::start(
//!         &registry.list_enabled().await,
//!         &config.smtp.bind_addr,
//!         store,
//!         SessionSettings::default(),
//!         shutdown,
//!     )
//!     .await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     listeners.shutdown(std::time::Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`registry`]: Domain registry and balancer
//! - [`smtp`]: SMTP listeners and sessions
//! - [`storage`]: Message store and retention
//! - [`api`]: JSON API
//! - [`setup`]: Configuration bootstrap for `init`

pub mod api;
pub mod config;
pub mod error;
pub mod registry;
pub mod setup;
pub mod smtp;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{MailError, Result};
pub use registry::DomainRegistry;
pub use storage::MailStore;

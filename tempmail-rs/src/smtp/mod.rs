//! Inbound SMTP (RFC 5321 subset)
//!
//! - [`server`]: one listener per enabled domain, grouped in a [`ListenerSet`]
//! - [`session`]: per-connection state machine
//! - [`commands`]: command line parsing
//! - [`codec`]: line reassembly across socket reads

pub mod codec;
pub mod commands;
pub mod server;
pub mod session;

pub use commands::SmtpCommand;
pub use server::{ListenerSet, SmtpServer};
pub use session::{SessionSettings, SmtpSession, SmtpState};

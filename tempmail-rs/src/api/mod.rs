//! JSON API over the registry and the message store
//!
//! Consumed by the web UI; not part of the SMTP surface.

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::ApiServer;

//! # shadow-server
//!
//! WebSocket RPC front end for the vehicle signal store.
//!
//! One task per connection decodes requests and runs them against the shared
//! [`SignalStore`]; one delivery task per subscription forwards its queue to
//! the connection.

pub mod server;
pub mod session;

pub use server::{ServerConfig, ShadowServer, STREAM_PATH};
pub use session::ClientSession;
pub use shadow_core::SignalStore;

//! # shadow-core
//!
//! Core vehicle shadow data model and signal store.
//!
//! This crate provides:
//! - Typed signal values and declarations
//! - Path parsing
//! - Lock tokens with lazy expiry
//! - Subscription hub with bounded per-subscriber queues
//! - The signal store that sequences every mutation
//! - The default signal catalog and configuration types
//!
//! This crate contains no async runtime. Subscriber queues are
//! `tokio::sync` channels, which work under any executor or from plain
//! threads.

pub mod catalog;
pub mod config;
pub mod error;
pub mod hub;
pub mod lock;
pub mod model;
pub mod path;
pub mod store;

pub use catalog::{default_catalog, CatalogEntry};
pub use config::{load_settings, ConfigError, ShadowSettings, SimulatorSettings, StoreConfig};
pub use error::{ErrorCode, ShadowError, ShadowResult};
pub use hub::{CloseReason, Subscription, SubscriptionHub, SubscriptionId, SubscriptionStatus};
pub use lock::{LockManager, LockToken, TokenId};
pub use model::*;
pub use path::{PathError, SignalPath};
pub use store::{SetResult, SetStatus, SignalStore, StoreStats};

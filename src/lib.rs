//! iPedia encyclopedia lookup server library.

// Wire protocol and request handling
pub mod protocol;
pub mod session;
pub mod identity;
pub mod article;

// Shared state and data
pub mod routing;
pub mod storage;

// Operator surface
pub mod admin;
pub mod client;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::ServerConfig;
pub use lifecycle::{RunningServer, Shutdown};

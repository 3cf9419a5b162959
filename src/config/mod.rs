//! Server configuration.
//!
//! # Data Flow
//! ```text
//! ipedia.toml
//!     → loader.rs (toml → ServerConfig, every section defaulted)
//!     → validation.rs (addresses, ranges, pinned database names)
//!     → lifecycle::start
//!
//! With --watch:
//!     watcher.rs (notify event, debounced)
//!     → reload + validate
//!     → RuntimeSwitches swapped into the ArcSwap read by sessions
//! ```
//!
//! # Design Decisions
//! - Only `protocol.force_upgrade` and `[limits]` change without a restart
//! - A reload that fails to parse or validate is logged and ignored

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, LimitsConfig, ListenerConfig, ObservabilityConfig, ProtocolConfig,
    RuntimeSwitches, ServerConfig, StorageConfig,
};

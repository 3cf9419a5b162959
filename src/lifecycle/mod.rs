//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! start (startup.rs):
//!     stores → DatabaseRouter::initialize → SessionContext
//!     → admin listener → client listener
//!
//! stop:
//!     SIGINT/SIGTERM (signals.rs) → Shutdown::trigger (shutdown.rs)
//!     → listeners return → open sessions drain (bounded wait)
//! ```
//!
//! # Design Decisions
//! - Any startup failure is fatal
//! - The client port opens last, once a database of every usable language
//!   is current

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{
    load_memory_stores, save_memory_stores, start, MemoryStores, RunningServer, StartupError,
};

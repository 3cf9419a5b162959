//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request lines:
//!     → limits.rs (line length, line count)
//!     → session parses and resolves identity
//!     → rate_limit.rs (unregistered lookup allowance, Get-Article only)
//!     → handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed: a guard violation ends the request with a protocol error
//! - No trust in client input

pub mod limits;
pub mod rate_limit;

pub use limits::RequestLimits;
pub use rate_limit::LookupLimiter;

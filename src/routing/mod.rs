//! Database routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     DatabaseCatalog::list_databases
//!     → dbname.rs (parse names, group by language)
//!     → router.rs (newest database per language passing the size guard)
//!
//! Per request:
//!     DatabaseRouter::snapshot → RouterState → current(lang)
//!
//! Admin `use <db>`:
//!     DatabaseRouter::switch_to → re-check stats → swap RouterState
//! ```
//!
//! # Design Decisions
//! - RouterState is immutable; updates replace it wholesale
//! - Deterministic: the newest database is the greatest name, compared as a string

pub mod dbname;
pub mod router;

pub use dbname::{DbName, Lang};
pub use router::{ActiveDatabase, DatabaseListing, DatabaseRouter, DbInfo, RouterState, SwitchError};

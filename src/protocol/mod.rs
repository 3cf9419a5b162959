//! Client wire protocol.
//!
//! # Data Flow
//! ```text
//! raw line
//!     → codec.rs (line grammar)
//!     → fields.rs (catalog lookup, argument rules)
//!     → ParsedRequest (one per connection)
//!
//! session output
//!     → codec.rs FieldWriter (plain and payload fields)
//!     → socket
//! ```
//!
//! # Design Decisions
//! - Field names form a closed enum; unknown names never reach handlers
//! - Errors on the wire are numbers from a closed set (error.rs)

pub mod codec;
pub mod device_info;
pub mod error;
pub mod fields;

pub use codec::{decode_field, decode_response, encode_request, DecodedResponse, FieldWriter};
pub use device_info::DeviceInfo;
pub use error::{ProtocolResult, ServerError};
pub use fields::{FieldName, ParsedRequest, RequestField, ResponseField};

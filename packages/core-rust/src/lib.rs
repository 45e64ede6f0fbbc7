//! Service callee core — operation ids, profile descriptors, call/response
//! model, and the handler and advertiser contracts.

pub mod messages;
pub mod traits;
pub mod types;

pub use messages::{Call, CallStatus, ProcessOutput, Response, SERVICE_SPECIFIC_ERROR};
pub use traits::{Advertiser, ProfileHandler};
pub use types::{OperationId, ProfileDescriptor, Value};

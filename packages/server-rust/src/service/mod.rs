//! Profile registration and call dispatch.
//!
//! 1. **Registry** (`registry`): operation id -> handler, with advertisement
//! 2. **Dispatch** (`dispatcher`): validates a call and delegates to its handler
//! 3. **Callee** (`callee`): owns both; what the middleware constructs
//! 4. **Advertisers** (`advertise`): stock advertisement collaborators

pub mod advertise;
pub mod callee;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;

// Re-export key types for convenient access.
pub use advertise::{
    AdvertisementEvent, CompositeAdvertiser, InMemoryAdvertiser, NoopAdvertiser,
    TracingAdvertiser,
};
pub use callee::ServiceCallee;
pub use config::{CalleeConfig, DuplicatePolicy, LogFormat, RemovalMatch};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{DispatchError, DispatchRejection, RegistryError};
pub use registry::ProfileRegistry;

//! Service callee — runtime registry of profile handlers and the dispatcher
//! that routes incoming calls to them.

pub mod logging;
pub mod service;

pub use service::{
    CalleeConfig, Dispatcher, ProfileRegistry, RegistryError, ServiceCallee,
};

/// What the registry does when a handler is added under an id that is
/// already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Last writer wins. The previous handler is dropped from routing and a
    /// warning is logged.
    #[default]
    Replace,
    /// Keep the existing handler and return `RegistryError::DuplicateOperation`.
    Reject,
}

/// How `ProfileRegistry::remove` finds the entry to remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalMatch {
    /// The entry holding this exact handler, under the id it was registered
    /// with. Unaffected by later changes to the handler's descriptor.
    #[default]
    RegisteredIdentity,
    /// Whatever entry sits under the handler's current descriptor id,
    /// regardless of which handler it holds.
    CurrentDescriptor,
}

/// Output format of the tracing subscriber installed by
/// [`init_tracing`](crate::logging::init_tracing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for a service callee.
///
/// Controls registry conflict handling and the logging setup of the embedding
/// process.
#[derive(Debug, Clone)]
pub struct CalleeConfig {
    /// Behaviour on duplicate operation ids.
    pub duplicate_policy: DuplicatePolicy,
    /// Matching rule for handler removal.
    pub removal_match: RemovalMatch,
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Subscriber output format.
    pub log_format: LogFormat,
}

impl Default for CalleeConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Replace,
            removal_match: RemovalMatch::RegisteredIdentity,
            log_filter: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

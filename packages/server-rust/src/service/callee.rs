use std::sync::Arc;

use callee_core::{Advertiser, Call, ProfileHandler, Response};
use tracing::{info, warn};

use super::config::CalleeConfig;
use super::dispatcher::Dispatcher;
use super::error::RegistryError;
use super::registry::ProfileRegistry;

/// The unit the middleware constructs: a profile registry plus the dispatcher
/// routing calls into it.
///
/// Handlers are registered and unregistered at runtime (e.g. as plugins load
/// and unload) while calls keep flowing through [`ServiceCallee::handle_call`].
pub struct ServiceCallee {
    registry: Arc<ProfileRegistry>,
    dispatcher: Dispatcher,
}

impl ServiceCallee {
    /// Creates a callee serving `handlers` and publishes their descriptors.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if any initial handler cannot be
    /// registered under the configured policy.
    pub fn new(
        config: &CalleeConfig,
        advertiser: Arc<dyn Advertiser>,
        handlers: Vec<Arc<dyn ProfileHandler>>,
    ) -> Result<Self, RegistryError> {
        let registry = Arc::new(ProfileRegistry::with_handlers(config, advertiser, handlers)?);
        info!(profiles = registry.len(), "service callee ready");
        Ok(Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
        })
    }

    /// Registers another handler.
    ///
    /// # Errors
    ///
    /// See [`ProfileRegistry::add`].
    pub fn add_profile(&self, handler: Arc<dyn ProfileHandler>) -> Result<(), RegistryError> {
        self.registry.add(handler)
    }

    /// Unregisters a handler; `false` if it was not registered.
    pub fn remove_profile(&self, handler: &Arc<dyn ProfileHandler>) -> bool {
        self.registry.remove(handler)
    }

    /// Routes `call` to its handler. See [`Dispatcher::handle_call`].
    pub fn handle_call(&self, call: Option<&Call>) -> Response {
        self.dispatcher.handle_call(call)
    }

    /// The connection to the service bus was lost.
    ///
    /// Registered profiles are kept so they can be served again once the
    /// middleware reconnects.
    pub fn communication_channel_broken(&self) {
        warn!(
            profiles = self.registry.len(),
            "communication channel broken; keeping registered profiles"
        );
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ProfileRegistry> {
        &self.registry
    }

    /// A dispatcher sharing this callee's registry, usable as a
    /// `tower::Service`.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }
}

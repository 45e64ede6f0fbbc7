use crate::messages::{Call, Response};
use crate::types::ProfileDescriptor;

/// A pluggable unit implementing one service operation.
///
/// Registered as `Arc<dyn ProfileHandler>`; the registry only ever talks to
/// it through these two methods.
pub trait ProfileHandler: Send + Sync {
    /// Descriptor to route and advertise this handler under.
    fn describe(&self) -> ProfileDescriptor;

    /// Handle a call whose operation id matched this handler.
    ///
    /// Any failure must be expressed as a response; the dispatcher returns it
    /// to the caller unchanged.
    fn handle_call(&self, call: &Call) -> Response;
}

/// External system told when operations become available or unavailable.
///
/// Invoked by the registry after the mapping change is committed, exactly
/// once per descriptor per mutation.
pub trait Advertiser: Send + Sync {
    /// The operation described by `descriptor` is now offered.
    fn publish(&self, descriptor: &ProfileDescriptor);

    /// The operation described by `descriptor` is no longer offered.
    fn withdraw(&self, descriptor: &ProfileDescriptor);

    /// Publish a batch, e.g. the initial set of handlers.
    fn publish_all(&self, descriptors: &[ProfileDescriptor]) {
        for descriptor in descriptors {
            self.publish(descriptor);
        }
    }
}

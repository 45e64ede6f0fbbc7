//! Stock [`Advertiser`] implementations.
//!
//! - [`NoopAdvertiser`]: ignores every notification
//! - [`TracingAdvertiser`]: logs publish/withdraw events
//! - [`InMemoryAdvertiser`]: keeps the set of currently offered descriptors
//! - [`CompositeAdvertiser`]: fans out to several advertisers

use std::collections::BTreeMap;
use std::sync::Arc;

use callee_core::{Advertiser, OperationId, ProfileDescriptor};
use parking_lot::RwLock;
use tracing::info;

// ---------------------------------------------------------------------------
// NoopAdvertiser
// ---------------------------------------------------------------------------

/// Advertiser for callees that are not announced anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAdvertiser;

impl Advertiser for NoopAdvertiser {
    fn publish(&self, _descriptor: &ProfileDescriptor) {}

    fn withdraw(&self, _descriptor: &ProfileDescriptor) {}
}

// ---------------------------------------------------------------------------
// TracingAdvertiser
// ---------------------------------------------------------------------------

/// Logs every advertisement change at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAdvertiser;

impl Advertiser for TracingAdvertiser {
    fn publish(&self, descriptor: &ProfileDescriptor) {
        info!(
            operation_id = %descriptor.operation_id,
            metadata_keys = descriptor.metadata.len(),
            "profile published"
        );
    }

    fn withdraw(&self, descriptor: &ProfileDescriptor) {
        info!(operation_id = %descriptor.operation_id, "profile withdrawn");
    }
}

// ---------------------------------------------------------------------------
// InMemoryAdvertiser
// ---------------------------------------------------------------------------

/// A single advertisement notification, as recorded by [`InMemoryAdvertiser`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdvertisementEvent {
    Published(ProfileDescriptor),
    Withdrawn(ProfileDescriptor),
}

#[derive(Debug, Default)]
struct AdvertisementState {
    offered: BTreeMap<OperationId, ProfileDescriptor>,
    events: Vec<AdvertisementEvent>,
}

/// Tracks which operations are currently offered, plus the full history of
/// notifications in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryAdvertiser {
    state: RwLock<AdvertisementState>,
}

impl InMemoryAdvertiser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently offered descriptors, ordered by operation id.
    #[must_use]
    pub fn offered(&self) -> Vec<ProfileDescriptor> {
        self.state.read().offered.values().cloned().collect()
    }

    #[must_use]
    pub fn is_offered(&self, operation_id: &str) -> bool {
        self.state.read().offered.contains_key(operation_id)
    }

    /// Every notification received so far.
    #[must_use]
    pub fn events(&self) -> Vec<AdvertisementEvent> {
        self.state.read().events.clone()
    }
}

impl Advertiser for InMemoryAdvertiser {
    fn publish(&self, descriptor: &ProfileDescriptor) {
        let mut state = self.state.write();
        state
            .offered
            .insert(descriptor.operation_id.clone(), descriptor.clone());
        state
            .events
            .push(AdvertisementEvent::Published(descriptor.clone()));
    }

    fn withdraw(&self, descriptor: &ProfileDescriptor) {
        let mut state = self.state.write();
        state.offered.remove(descriptor.operation_id.as_str());
        state
            .events
            .push(AdvertisementEvent::Withdrawn(descriptor.clone()));
    }
}

// ---------------------------------------------------------------------------
// CompositeAdvertiser
// ---------------------------------------------------------------------------

/// Fans every notification out to all wrapped advertisers, in order.
#[derive(Default)]
pub struct CompositeAdvertiser {
    advertisers: Vec<Arc<dyn Advertiser>>,
}

impl CompositeAdvertiser {
    #[must_use]
    pub fn new(advertisers: Vec<Arc<dyn Advertiser>>) -> Self {
        Self { advertisers }
    }

    /// Adds an advertiser after construction.
    pub fn add(&mut self, advertiser: Arc<dyn Advertiser>) {
        self.advertisers.push(advertiser);
    }
}

impl Advertiser for CompositeAdvertiser {
    fn publish(&self, descriptor: &ProfileDescriptor) {
        for advertiser in &self.advertisers {
            advertiser.publish(descriptor);
        }
    }

    fn withdraw(&self, descriptor: &ProfileDescriptor) {
        for advertiser in &self.advertisers {
            advertiser.withdraw(descriptor);
        }
    }

    fn publish_all(&self, descriptors: &[ProfileDescriptor]) {
        for advertiser in &self.advertisers {
            advertiser.publish_all(descriptors);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

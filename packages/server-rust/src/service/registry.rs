use std::sync::Arc;

use callee_core::{Advertiser, OperationId, ProfileDescriptor, ProfileHandler};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::config::{CalleeConfig, DuplicatePolicy, RemovalMatch};
use super::error::RegistryError;

// ---------------------------------------------------------------------------
// RegisteredProfile
// ---------------------------------------------------------------------------

/// A handler together with the descriptor it was registered under.
///
/// The descriptor is captured once at registration so that withdrawal always
/// advertises exactly what was published.
struct RegisteredProfile {
    handler: Arc<dyn ProfileHandler>,
    descriptor: ProfileDescriptor,
}

// ---------------------------------------------------------------------------
// ProfileRegistry
// ---------------------------------------------------------------------------

/// Mapping from operation id to the handler that serves it.
///
/// Backed by a `DashMap`, so every `add`, `remove` and `lookup` is atomic with
/// respect to the others and lookups never see a half-applied mutation. Shard
/// locks are held only for the map operation itself, and a handler returned
/// by `lookup` runs with no lock held.
///
/// Mutations additionally take a writer lock spanning commit and notification,
/// so the advertiser sees changes in the same order the map applied them.
/// Lookups never take it.
pub struct ProfileRegistry {
    entries: DashMap<OperationId, RegisteredProfile>,
    /// Serializes mutate-then-notify sequences.
    writer: Mutex<()>,
    advertiser: Arc<dyn Advertiser>,
    duplicate_policy: DuplicatePolicy,
    removal_match: RemovalMatch,
}

impl ProfileRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: &CalleeConfig, advertiser: Arc<dyn Advertiser>) -> Self {
        Self {
            entries: DashMap::new(),
            writer: Mutex::new(()),
            advertiser,
            duplicate_policy: config.duplicate_policy,
            removal_match: config.removal_match,
        }
    }

    /// Creates a registry seeded with `handlers`.
    ///
    /// All seeds are committed first, then their descriptors are published as
    /// one batch. A seed replaced by a later one with the same id is not
    /// published.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] raised by a seed; nothing is
    /// published in that case.
    pub fn with_handlers<I>(
        config: &CalleeConfig,
        advertiser: Arc<dyn Advertiser>,
        handlers: I,
    ) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Arc<dyn ProfileHandler>>,
    {
        let registry = Self::new(config, advertiser);
        let mut seeded: Vec<ProfileDescriptor> = Vec::new();
        for handler in handlers {
            let descriptor = registry.insert(handler)?;
            seeded.retain(|d| d.operation_id != descriptor.operation_id);
            seeded.push(descriptor);
        }
        registry.advertiser.publish_all(&seeded);
        debug!(count = seeded.len(), "profile registry seeded");
        Ok(registry)
    }

    /// Registers `handler` under the id its descriptor names, then publishes
    /// the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyOperationId`] if the descriptor has an
    /// empty id, or [`RegistryError::DuplicateOperation`] if the id is taken
    /// and the duplicate policy is `Reject`.
    pub fn add(&self, handler: Arc<dyn ProfileHandler>) -> Result<(), RegistryError> {
        let _writer = self.writer.lock();
        let descriptor = self.insert(handler)?;
        self.advertiser.publish(&descriptor);
        Ok(())
    }

    /// Commits a new entry and returns the descriptor to publish.
    fn insert(&self, handler: Arc<dyn ProfileHandler>) -> Result<ProfileDescriptor, RegistryError> {
        let descriptor = handler.describe();
        if descriptor.operation_id.is_empty() {
            return Err(RegistryError::EmptyOperationId);
        }
        let operation_id = descriptor.operation_id.clone();
        let profile = RegisteredProfile {
            handler,
            descriptor: descriptor.clone(),
        };

        match self.duplicate_policy {
            DuplicatePolicy::Replace => {
                let incoming = Arc::clone(&profile.handler);
                if let Some(previous) = self.entries.insert(operation_id, profile) {
                    warn!(
                        operation_id = %descriptor.operation_id,
                        same_handler = Arc::ptr_eq(&previous.handler, &incoming),
                        "operation re-registered; previous handler replaced"
                    );
                }
            }
            DuplicatePolicy::Reject => match self.entries.entry(operation_id) {
                Entry::Occupied(occupied) => {
                    return Err(RegistryError::DuplicateOperation {
                        operation_id: occupied.key().clone(),
                    });
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(profile);
                }
            },
        }

        debug!(operation_id = %descriptor.operation_id, "profile registered");
        Ok(descriptor)
    }

    /// Removes the entry for `handler` and withdraws its descriptor.
    ///
    /// Which entry matches depends on the configured [`RemovalMatch`].
    /// Returns `false`, without notifying the advertiser, if nothing matched.
    pub fn remove(&self, handler: &Arc<dyn ProfileHandler>) -> bool {
        let _writer = self.writer.lock();
        let removed = match self.removal_match {
            RemovalMatch::RegisteredIdentity => self.remove_by_identity(handler),
            RemovalMatch::CurrentDescriptor => {
                let descriptor = handler.describe();
                self.entries
                    .remove(descriptor.operation_id.as_str())
                    .map(|(_, profile)| profile)
            }
        };
        self.withdraw_removed(removed)
    }

    /// Removes whatever handler is registered under `operation_id`.
    pub fn remove_operation(&self, operation_id: &str) -> bool {
        let _writer = self.writer.lock();
        let removed = self.entries.remove(operation_id).map(|(_, profile)| profile);
        self.withdraw_removed(removed)
    }

    fn remove_by_identity(&self, handler: &Arc<dyn ProfileHandler>) -> Option<RegisteredProfile> {
        let is_same = |_: &OperationId, profile: &RegisteredProfile| {
            Arc::ptr_eq(&profile.handler, handler)
        };

        // Usual case: the descriptor has not changed since registration.
        let current = handler.describe();
        if let Some((_, profile)) = self.entries.remove_if(current.operation_id.as_str(), is_same) {
            return Some(profile);
        }

        let registered_id = self
            .entries
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.value().handler, handler))
            .map(|entry| entry.key().clone())?;
        self.entries
            .remove_if(registered_id.as_str(), is_same)
            .map(|(_, profile)| profile)
    }

    fn withdraw_removed(&self, removed: Option<RegisteredProfile>) -> bool {
        match removed {
            Some(profile) => {
                debug!(operation_id = %profile.descriptor.operation_id, "profile removed");
                self.advertiser.withdraw(&profile.descriptor);
                true
            }
            None => false,
        }
    }

    /// Handler registered under `operation_id`, if any.
    pub fn lookup(&self, operation_id: &str) -> Option<Arc<dyn ProfileHandler>> {
        self.entries
            .get(operation_id)
            .map(|entry| Arc::clone(&entry.value().handler))
    }

    #[must_use]
    pub fn contains(&self, operation_id: &str) -> bool {
        self.entries.contains_key(operation_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of registered ids, sorted.
    #[must_use]
    pub fn operation_ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<OperationId> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Snapshot of the descriptors captured at registration, sorted by id.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ProfileDescriptor> {
        let mut descriptors: Vec<ProfileDescriptor> = self
            .entries
            .iter()
            .map(|entry| entry.value().descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
        descriptors
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Weak};
    use std::thread;
    use std::time::Duration;

    use callee_core::{Call, Response};
    use parking_lot::{Mutex, RwLock};
    use proptest::prelude::*;

    use super::*;
    use crate::service::advertise::{AdvertisementEvent, InMemoryAdvertiser};

    /// Handler whose descriptor can be changed after registration.
    struct StubHandler {
        operation_id: RwLock<String>,
    }

    impl StubHandler {
        fn arc(operation_id: &str) -> Arc<dyn ProfileHandler> {
            Arc::new(Self::new(operation_id))
        }

        fn new(operation_id: &str) -> Self {
            Self {
                operation_id: RwLock::new(operation_id.to_string()),
            }
        }
    }

    impl ProfileHandler for StubHandler {
        fn describe(&self) -> ProfileDescriptor {
            ProfileDescriptor::new(self.operation_id.read().as_str())
        }

        fn handle_call(&self, _call: &Call) -> Response {
            Response::succeeded()
        }
    }

    fn make_registry(config: &CalleeConfig) -> (ProfileRegistry, Arc<InMemoryAdvertiser>) {
        let advertiser = Arc::new(InMemoryAdvertiser::new());
        (ProfileRegistry::new(config, advertiser.clone()), advertiser)
    }

    #[test]
    fn add_then_lookup_returns_same_handler() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        let handler = StubHandler::arc("op-1");

        registry.add(handler.clone()).unwrap();

        let found = registry.lookup("op-1").unwrap();
        assert!(Arc::ptr_eq(&found, &handler));
        assert!(advertiser.is_offered("op-1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_unregistered_returns_none() {
        let (registry, _) = make_registry(&CalleeConfig::default());
        assert!(registry.lookup("missing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_after_add_clears_entry_and_withdraws() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        let handler = StubHandler::arc("op-1");
        registry.add(handler.clone()).unwrap();

        assert!(registry.remove(&handler));

        assert!(registry.lookup("op-1").is_none());
        assert!(!advertiser.is_offered("op-1"));
        assert_eq!(
            advertiser.events(),
            vec![
                AdvertisementEvent::Published(ProfileDescriptor::new("op-1")),
                AdvertisementEvent::Withdrawn(ProfileDescriptor::new("op-1")),
            ]
        );
    }

    #[test]
    fn removing_unregistered_handler_is_noop() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        let handler = StubHandler::arc("never-added");

        assert!(!registry.remove(&handler));
        assert!(advertiser.events().is_empty());
    }

    #[test]
    fn empty_operation_id_is_rejected() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        let err = registry.add(StubHandler::arc("")).unwrap_err();
        assert_eq!(err, RegistryError::EmptyOperationId);
        assert!(registry.is_empty());
        assert!(advertiser.events().is_empty());
    }

    #[test]
    fn duplicate_id_last_writer_wins() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        let first = StubHandler::arc("dup");
        let second = StubHandler::arc("dup");

        registry.add(first).unwrap();
        registry.add(second.clone()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.lookup("dup").unwrap(), &second));
        assert_eq!(advertiser.events().len(), 2);
    }

    #[test]
    fn duplicate_id_rejected_when_configured() {
        let config = CalleeConfig {
            duplicate_policy: DuplicatePolicy::Reject,
            ..CalleeConfig::default()
        };
        let (registry, advertiser) = make_registry(&config);
        let first = StubHandler::arc("dup");

        registry.add(first.clone()).unwrap();
        let err = registry.add(StubHandler::arc("dup")).unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateOperation {
                operation_id: OperationId::from("dup")
            }
        );
        assert!(Arc::ptr_eq(&registry.lookup("dup").unwrap(), &first));
        assert_eq!(advertiser.events().len(), 1);
    }

    #[test]
    fn identity_removal_does_not_remove_replacement() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        let old = StubHandler::arc("op");
        let new = StubHandler::arc("op");
        registry.add(old.clone()).unwrap();
        registry.add(new.clone()).unwrap();

        assert!(!registry.remove(&old));

        assert!(Arc::ptr_eq(&registry.lookup("op").unwrap(), &new));
        assert!(advertiser.is_offered("op"));
    }

    #[test]
    fn identity_removal_follows_registered_id_after_descriptor_change() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        let stub = Arc::new(StubHandler::new("before"));
        let handler: Arc<dyn ProfileHandler> = stub.clone();
        registry.add(handler.clone()).unwrap();

        *stub.operation_id.write() = "after".to_string();
        assert!(registry.remove(&handler));

        assert!(registry.is_empty());
        assert!(!advertiser.is_offered("before"));
        assert_eq!(
            advertiser.events().last(),
            Some(&AdvertisementEvent::Withdrawn(ProfileDescriptor::new("before")))
        );
    }

    #[test]
    fn current_descriptor_removal_matches_by_id_only() {
        let config = CalleeConfig {
            removal_match: RemovalMatch::CurrentDescriptor,
            ..CalleeConfig::default()
        };
        let (registry, _) = make_registry(&config);
        let registered = StubHandler::arc("op");
        let other = StubHandler::arc("op");
        registry.add(registered).unwrap();

        assert!(registry.remove(&other));
        assert!(registry.lookup("op").is_none());
    }

    #[test]
    fn current_descriptor_removal_misses_after_descriptor_change() {
        let config = CalleeConfig {
            removal_match: RemovalMatch::CurrentDescriptor,
            ..CalleeConfig::default()
        };
        let (registry, _) = make_registry(&config);
        let stub = Arc::new(StubHandler::new("before"));
        let handler: Arc<dyn ProfileHandler> = stub.clone();
        registry.add(handler.clone()).unwrap();

        *stub.operation_id.write() = "after".to_string();

        assert!(!registry.remove(&handler));
        assert!(registry.contains("before"));
    }

    #[test]
    fn remove_operation_by_id() {
        let (registry, advertiser) = make_registry(&CalleeConfig::default());
        registry.add(StubHandler::arc("op")).unwrap();

        assert!(registry.remove_operation("op"));
        assert!(!registry.remove_operation("op"));
        assert!(!advertiser.is_offered("op"));
    }

    #[test]
    fn seeded_registry_publishes_after_commit() {
        let advertiser = Arc::new(InMemoryAdvertiser::new());
        let registry = ProfileRegistry::with_handlers(
            &CalleeConfig::default(),
            advertiser.clone(),
            vec![StubHandler::arc("b"), StubHandler::arc("a")],
        )
        .unwrap();

        assert_eq!(
            registry.operation_ids(),
            vec![OperationId::from("a"), OperationId::from("b")]
        );
        assert_eq!(
            advertiser.offered(),
            vec![ProfileDescriptor::new("a"), ProfileDescriptor::new("b")]
        );
        assert_eq!(registry.descriptors(), advertiser.offered());
    }

    #[test]
    fn seeding_with_empty_id_publishes_nothing() {
        let advertiser = Arc::new(InMemoryAdvertiser::new());
        let result = ProfileRegistry::with_handlers(
            &CalleeConfig::default(),
            advertiser.clone(),
            vec![StubHandler::arc("ok"), StubHandler::arc("")],
        );

        assert!(matches!(result, Err(RegistryError::EmptyOperationId)));
        assert!(advertiser.events().is_empty());
    }

    #[test]
    fn replaced_seed_is_published_once() {
        let advertiser = Arc::new(InMemoryAdvertiser::new());
        let first = StubHandler::arc("dup");
        let second = StubHandler::arc("dup");
        let registry = ProfileRegistry::with_handlers(
            &CalleeConfig::default(),
            advertiser.clone(),
            vec![first, StubHandler::arc("other"), second.clone()],
        )
        .unwrap();

        assert!(Arc::ptr_eq(&registry.lookup("dup").unwrap(), &second));
        assert_eq!(
            advertiser.events(),
            vec![
                AdvertisementEvent::Published(ProfileDescriptor::new("other")),
                AdvertisementEvent::Published(ProfileDescriptor::new("dup")),
            ]
        );
    }

    /// Holds the first `publish` until the test releases it.
    struct GatedAdvertiser {
        inner: InMemoryAdvertiser,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl Advertiser for GatedAdvertiser {
        fn publish(&self, descriptor: &ProfileDescriptor) {
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.inner.publish(descriptor);
        }

        fn withdraw(&self, descriptor: &ProfileDescriptor) {
            self.inner.withdraw(descriptor);
        }
    }

    #[test]
    fn remove_waits_for_pending_publish() {
        let (release, gate) = mpsc::channel();
        let advertiser = Arc::new(GatedAdvertiser {
            inner: InMemoryAdvertiser::new(),
            gate: Mutex::new(Some(gate)),
        });
        let registry = ProfileRegistry::new(&CalleeConfig::default(), advertiser.clone());
        let handler = StubHandler::arc("op");

        thread::scope(|s| {
            let adder = s.spawn(|| registry.add(handler.clone()).unwrap());
            // Committed, publish still held at the gate.
            while !registry.contains("op") {
                thread::yield_now();
            }

            let remover = s.spawn(|| registry.remove(&handler));
            thread::sleep(Duration::from_millis(50));
            release.send(()).unwrap();

            adder.join().unwrap();
            assert!(remover.join().unwrap());
        });

        assert!(registry.is_empty());
        assert!(!advertiser.inner.is_offered("op"));
        assert_eq!(
            advertiser.inner.events(),
            vec![
                AdvertisementEvent::Published(ProfileDescriptor::new("op")),
                AdvertisementEvent::Withdrawn(ProfileDescriptor::new("op")),
            ]
        );
    }

    /// Records, at notification time, whether the registry already reflects
    /// the change being advertised.
    #[derive(Default)]
    struct OrderCheckingAdvertiser {
        registry: RwLock<Weak<ProfileRegistry>>,
        observations: Mutex<Vec<(String, bool)>>,
    }

    impl Advertiser for OrderCheckingAdvertiser {
        fn publish(&self, descriptor: &ProfileDescriptor) {
            let visible = self
                .registry
                .read()
                .upgrade()
                .is_some_and(|r| r.contains(descriptor.operation_id.as_str()));
            self.observations
                .lock()
                .push((format!("publish:{}", descriptor.operation_id), visible));
        }

        fn withdraw(&self, descriptor: &ProfileDescriptor) {
            let visible = self
                .registry
                .read()
                .upgrade()
                .is_some_and(|r| r.contains(descriptor.operation_id.as_str()));
            self.observations
                .lock()
                .push((format!("withdraw:{}", descriptor.operation_id), visible));
        }
    }

    #[test]
    fn mapping_changes_before_advertisement() {
        let advertiser = Arc::new(OrderCheckingAdvertiser::default());
        let registry = Arc::new(ProfileRegistry::new(
            &CalleeConfig::default(),
            advertiser.clone(),
        ));
        *advertiser.registry.write() = Arc::downgrade(&registry);

        let handler = StubHandler::arc("op");
        registry.add(handler.clone()).unwrap();
        registry.remove(&handler);

        assert_eq!(
            advertiser.observations.lock().clone(),
            vec![
                ("publish:op".to_string(), true),
                ("withdraw:op".to_string(), false),
            ]
        );
    }

    proptest! {
        #[test]
        fn add_lookup_remove_roundtrip(id in "[a-zA-Z0-9:#/_-]{1,32}") {
            let (registry, _) = make_registry(&CalleeConfig::default());
            let handler = StubHandler::arc(&id);

            registry.add(handler.clone()).unwrap();
            let found = registry.lookup(&id).unwrap();
            prop_assert!(Arc::ptr_eq(&found, &handler));
            let described = found.describe();
            prop_assert_eq!(described.operation_id.as_str(), id.as_str());

            prop_assert!(registry.remove(&handler));
            prop_assert!(registry.lookup(&id).is_none());
        }

        #[test]
        fn duplicates_leave_one_entry(id in "[a-z]{1,8}", copies in 2usize..6) {
            let (registry, _) = make_registry(&CalleeConfig::default());
            let handlers: Vec<_> = (0..copies).map(|_| StubHandler::arc(&id)).collect();
            for handler in &handlers {
                registry.add(handler.clone()).unwrap();
            }

            prop_assert_eq!(registry.len(), 1);
            let last = handlers.last().unwrap();
            prop_assert!(Arc::ptr_eq(&registry.lookup(&id).unwrap(), last));
        }
    }
}

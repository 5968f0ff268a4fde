//! The process-wide service registry.
//!
//! Entries hold *weak* references: the registry never keeps a service alive.
//! The owning reference lives with the service's runner task, so a service
//! whose task completes decays out of lookups automatically, without an
//! explicit deregistration call on every shutdown path. The cost is that a
//! lookup can miss a service that is mid-teardown; callers must treat
//! `NotFound` as covering both "never registered" and "registered then torn
//! down".

use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use meridian_core::Service;

/// Errors that can occur during registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The requested service was not found (or its owning task completed).
    #[error("service not found: {0}")]
    NotFound(String),

    /// A live service with this name is already registered.
    #[error("service already registered: {0}")]
    AlreadyRegistered(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// What happens when a name is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Reject the second registration with [`RegistryError::AlreadyRegistered`].
    #[default]
    Reject,
    /// Last write wins: the new entry shadows the old one.
    Replace,
}

/// How a registered service came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Supplied pre-built by the caller.
    Supplied,
    /// Constructed by a host-invoked factory.
    Constructed,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supplied => write!(f, "supplied"),
            Self::Constructed => write!(f, "constructed"),
        }
    }
}

struct ServiceEntry {
    service: Weak<dyn Service>,
    provenance: Provenance,
    registered_at: Instant,
}

/// Process-wide index of active services by name.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceEntry>,
    policy: DuplicatePolicy,
}

impl ServiceRegistry {
    /// Creates an empty registry with the given duplicate policy.
    #[must_use]
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            services: DashMap::new(),
            policy,
        }
    }

    /// Registers a service under its own name.
    ///
    /// Stores only a weak association; registering does not start the service
    /// and the registry never keeps it alive. Under
    /// [`DuplicatePolicy::Reject`], a name whose previous entry still
    /// upgrades is refused; a decayed entry is silently reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] on a live duplicate when
    /// the policy forbids shadowing.
    pub fn register(&self, service: &Arc<dyn Service>, provenance: Provenance) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        let name = service.name().to_owned();
        let entry = ServiceEntry {
            service: Arc::downgrade(service),
            provenance,
            registered_at: Instant::now(),
        };

        match self.services.entry(name.clone()) {
            Entry::Occupied(mut occupied) => {
                let live = occupied.get().service.strong_count() > 0;
                if live && self.policy == DuplicatePolicy::Reject {
                    debug!(service = %name, "service already registered");
                    return Err(RegistryError::AlreadyRegistered(name));
                }

                info!(service = %name, shadowed = live, "service registered");
                occupied.insert(entry);
                Ok(())
            }
            Entry::Vacant(vacant) => {
                info!(service = %name, "service registered");
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Looks up a live service by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the name was never registered
    /// or its weak reference no longer upgrades. The two cases are
    /// indistinguishable by design.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Service>> {
        self.services
            .get(name)
            .and_then(|entry| entry.service.upgrade())
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))
    }

    /// Returns the provenance recorded for a name, live or not.
    #[must_use]
    pub fn provenance(&self, name: &str) -> Option<Provenance> {
        self.services.get(name).map(|entry| entry.provenance)
    }

    /// Returns how long ago the name was registered, live or not.
    #[must_use]
    pub fn registered_ago(&self, name: &str) -> Option<std::time::Duration> {
        self.services
            .get(name)
            .map(|entry| entry.registered_at.elapsed())
    }

    /// Enumerates all currently-resolvable (name, service) pairs.
    ///
    /// Iteration order is unspecified. Entries whose owning task has
    /// completed are skipped, not removed.
    #[must_use]
    pub fn live(&self) -> Vec<(String, Arc<dyn Service>)> {
        self.services
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .service
                    .upgrade()
                    .map(|service| (entry.key().clone(), service))
            })
            .collect()
    }

    /// Returns the number of entries, including decayed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if no entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("entries", &self.services.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meridian_core::MethodTable;

    struct Stub {
        name: String,
        methods: MethodTable,
    }

    impl Stub {
        fn new(name: &str) -> Arc<dyn Service> {
            Arc::new(Self {
                name: name.to_owned(),
                methods: MethodTable::builder().build(),
            })
        }
    }

    #[async_trait]
    impl Service for Stub {
        fn name(&self) -> &str {
            &self.name
        }

        fn methods(&self) -> &MethodTable {
            &self.methods
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ServiceRegistry::new(DuplicatePolicy::Reject);
        let service = Stub::new("billing");

        registry.register(&service, Provenance::Supplied).unwrap();

        let found = registry.lookup("billing").unwrap();
        assert_eq!(found.name(), "billing");
        assert_eq!(registry.provenance("billing"), Some(Provenance::Supplied));
        assert!(registry.registered_ago("billing").is_some());
        assert!(registry.registered_ago("nonexistent").is_none());
    }

    #[test]
    fn lookup_missing_is_not_found() {
        let registry = ServiceRegistry::new(DuplicatePolicy::Reject);

        let result = registry.lookup("nonexistent");
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = ServiceRegistry::new(DuplicatePolicy::Reject);
        let first = Stub::new("billing");
        let second = Stub::new("billing");

        registry.register(&first, Provenance::Supplied).unwrap();
        let result = registry.register(&second, Provenance::Supplied);

        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn replace_policy_shadows() {
        let registry = ServiceRegistry::new(DuplicatePolicy::Replace);
        let first = Stub::new("billing");
        let second = Stub::new("billing");

        registry.register(&first, Provenance::Supplied).unwrap();
        registry.register(&second, Provenance::Constructed).unwrap();

        let found = registry.lookup("billing").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(
            registry.provenance("billing"),
            Some(Provenance::Constructed)
        );
    }

    #[test]
    fn decayed_entry_is_not_found_and_reclaimable() {
        let registry = ServiceRegistry::new(DuplicatePolicy::Reject);

        let service = Stub::new("ephemeral");
        registry.register(&service, Provenance::Supplied).unwrap();
        assert!(registry.lookup("ephemeral").is_ok());

        // Dropping the owning reference decays the weak entry.
        drop(service);
        assert!(matches!(
            registry.lookup("ephemeral"),
            Err(RegistryError::NotFound(_))
        ));

        // A decayed name can be registered again even under Reject.
        let replacement = Stub::new("ephemeral");
        registry
            .register(&replacement, Provenance::Supplied)
            .unwrap();
        assert!(registry.lookup("ephemeral").is_ok());
    }

    #[test]
    fn live_skips_decayed_entries() {
        let registry = ServiceRegistry::new(DuplicatePolicy::Reject);

        let kept = Stub::new("kept");
        let dropped = Stub::new("dropped");
        registry.register(&kept, Provenance::Supplied).unwrap();
        registry.register(&dropped, Provenance::Supplied).unwrap();
        drop(dropped);

        let live = registry.live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, "kept");

        // The decayed entry is skipped, not removed.
        assert_eq!(registry.len(), 2);
    }
}

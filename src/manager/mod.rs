//! Generic object manager.
//!
//! # Data Flow
//! ```text
//! desired sections of one kind (validated, unique names)
//!     → Manager::reconcile
//!         - known name, same config   → skipped
//!         - known name, new config    → object.reconcile(new)
//!         - unknown name              → returned in `create` (caller builds it)
//!         - stored name not desired   → object.close(), removed
//!     → ManagerReport (create list, updated, deleted, restart flag)
//! ```
//!
//! # Design Decisions
//! - The manager never constructs objects; factories need collaborators
//!   (sockets, resolver, logger) the manager does not own
//! - The map lock is never held while an object reconciles
//! - A hard error stops the pass; updates already applied stay applied

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::SectionConfig;
use crate::object::{Object, ObjectError, ReconcileOutcome};
use crate::observability::metrics;

/// What one reconciliation pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerReport<C> {
    /// Desired configs with no live object; the caller must create them.
    pub create: Vec<C>,
    /// Names of objects reconciled in place.
    pub updated: Vec<String>,
    /// Names of objects closed and removed.
    pub deleted: Vec<String>,
    /// Whether any update or deletion requires a restart.
    pub restart: bool,
}

impl<C> Default for ManagerReport<C> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            restart: false,
        }
    }
}

impl<C> ManagerReport<C> {
    /// True if the pass found nothing to do.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Name-keyed store of the live objects of one kind.
pub struct Manager<O: Object> {
    objects: RwLock<HashMap<String, Arc<O>>>,
}

impl<O: Object> Default for Manager<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Object> Manager<O> {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Diff `desired` against the live objects and apply the changes.
    pub fn reconcile(
        &self,
        desired: &[O::Config],
    ) -> Result<ManagerReport<O::Config>, ObjectError> {
        let kind = O::KIND;
        let mut report = ManagerReport::default();
        let mut jobs = Vec::new();

        {
            let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
            for config in desired {
                let name = config.config_name();
                let Some(object) = objects.get(&name) else {
                    tracing::debug!(kind = %kind, name = %name, "Object scheduled for creation");
                    report.create.push(config.clone());
                    continue;
                };

                let mut current = object.config();
                if let Err(e) = current.validate() {
                    tracing::warn!(kind = %kind, name = %name, error = %e, "Live config no longer validates");
                }
                if current == *config {
                    tracing::trace!(kind = %kind, name = %name, "Object unchanged");
                    continue;
                }
                jobs.push((Arc::clone(object), config));
            }
        }

        let wanted: HashSet<String> = desired.iter().map(|c| c.config_name()).collect();
        let removed: Vec<(String, Arc<O>)> = {
            let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
            let stale: Vec<String> = objects
                .keys()
                .filter(|name| !wanted.contains(*name))
                .cloned()
                .collect();
            stale
                .into_iter()
                .filter_map(|name| objects.remove(&name).map(|object| (name, object)))
                .collect()
        };
        for (name, object) in removed {
            if let Err(e) = object.close() {
                tracing::warn!(kind = %kind, name = %name, error = %e, "Failed to close object");
            }
            tracing::info!(kind = %kind, name = %name, "Object deleted");
            report.restart |= kind.policy().on_delete;
            report.deleted.push(name);
        }

        for (object, config) in jobs {
            match object.reconcile(config)? {
                ReconcileOutcome::Updated => {}
                ReconcileOutcome::RestartRequired => {
                    tracing::info!(kind = %kind, name = %object.name(), "Update requires restart");
                    report.restart = true;
                }
            }
            report.updated.push(object.name().to_string());
        }

        report.deleted.sort();
        metrics::record_objects(kind.as_str(), self.len());
        Ok(report)
    }

    /// Live object by name.
    pub fn get(&self, name: &str) -> Option<Arc<O>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Store a newly created object.
    pub fn insert(&self, object: O) -> Result<Arc<O>, ObjectError> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let name = object.name().to_string();
        if objects.contains_key(&name) {
            return Err(ObjectError::Duplicate {
                kind: O::KIND,
                name,
            });
        }
        let object = Arc::new(object);
        objects.insert(name, Arc::clone(&object));
        metrics::record_objects(O::KIND.as_str(), objects.len());
        Ok(object)
    }

    /// Names of the live objects, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Live objects, sorted by name.
    pub fn objects(&self) -> Vec<Arc<O>> {
        let mut objects: Vec<Arc<O>> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        objects.sort_by(|a, b| a.name().cmp(b.name()));
        objects
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and remove every object.
    pub fn close_all(&self) {
        let drained: Vec<Arc<O>> = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, object)| object)
            .collect();
        for object in drained {
            if let Err(e) = object.close() {
                tracing::warn!(kind = %O::KIND, name = %object.name(), error = %e, "Failed to close object");
            }
        }
        metrics::record_objects(O::KIND.as_str(), 0);
    }
}

impl<O: Object> std::fmt::Debug for Manager<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("kind", &O::KIND)
            .field("objects", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::config::ValidationError;
    use crate::object::ObjectKind;

    #[derive(Debug, Clone, PartialEq)]
    struct TestConfig {
        name: String,
        value: u32,
        socket: u32,
    }

    impl fmt::Display for TestConfig {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}={}/{}", self.name, self.value, self.socket)
        }
    }

    impl SectionConfig for TestConfig {
        fn validate(&mut self) -> Result<(), ValidationError> {
            if self.value == 0 {
                return Err(ValidationError::new("test", &self.name, "value", "zero"));
            }
            Ok(())
        }

        fn config_name(&self) -> String {
            self.name.clone()
        }
    }

    /// Behaves like a listener: `socket` changes need a restart.
    struct TestObject {
        name: String,
        config: Mutex<TestConfig>,
        closed: AtomicBool,
    }

    impl TestObject {
        fn new(config: TestConfig) -> Self {
            Self {
                name: config.name.clone(),
                config: Mutex::new(config),
                closed: AtomicBool::new(false),
            }
        }
    }

    impl Object for TestObject {
        type Config = TestConfig;
        type Status = ();

        const KIND: ObjectKind = ObjectKind::Listener;

        fn name(&self) -> &str {
            &self.name
        }

        fn reconcile(&self, config: &TestConfig) -> Result<ReconcileOutcome, ObjectError> {
            let mut next = config.clone();
            next.validate()?;
            let mut current = self.config.lock().unwrap();
            let restart = current.socket != next.socket;
            *current = next;
            Ok(if restart {
                ReconcileOutcome::RestartRequired
            } else {
                ReconcileOutcome::Updated
            })
        }

        fn config(&self) -> TestConfig {
            self.config.lock().unwrap().clone()
        }

        fn close(&self) -> Result<(), ObjectError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn status(&self) {}
    }

    fn conf(name: &str, value: u32, socket: u32) -> TestConfig {
        TestConfig {
            name: name.into(),
            value,
            socket,
        }
    }

    fn populate(manager: &Manager<TestObject>, desired: &[TestConfig]) {
        let report = manager.reconcile(desired).unwrap();
        for config in report.create {
            manager.insert(TestObject::new(config)).unwrap();
        }
    }

    #[test]
    fn test_create_list_and_idempotence() {
        let manager = Manager::<TestObject>::new();
        let desired = vec![conf("a", 1, 1), conf("b", 1, 1)];

        let report = manager.reconcile(&desired).unwrap();
        assert_eq!(report.create, desired);
        assert!(!report.restart);
        for config in report.create {
            manager.insert(TestObject::new(config)).unwrap();
        }

        let report = manager.reconcile(&desired).unwrap();
        assert!(report.is_empty());
        assert!(!report.restart);
        assert_eq!(manager.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_update_in_place_and_restart() {
        let manager = Manager::<TestObject>::new();
        populate(&manager, &[conf("a", 1, 1), conf("b", 1, 1)]);

        let report = manager.reconcile(&[conf("a", 2, 1), conf("b", 1, 1)]).unwrap();
        assert_eq!(report.updated, vec!["a".to_string()]);
        assert!(!report.restart);
        assert_eq!(manager.get("a").unwrap().config().value, 2);

        let report = manager.reconcile(&[conf("a", 2, 9), conf("b", 1, 1)]).unwrap();
        assert_eq!(report.updated, vec!["a".to_string()]);
        assert!(report.restart);
    }

    #[test]
    fn test_delete_follows_policy() {
        let manager = Manager::<TestObject>::new();
        populate(&manager, &[conf("a", 1, 1), conf("b", 1, 1)]);
        let b = manager.get("b").unwrap();

        let report = manager.reconcile(&[conf("a", 1, 1)]).unwrap();
        assert_eq!(report.deleted, vec!["b".to_string()]);
        assert!(report.restart);
        assert!(b.closed.load(Ordering::SeqCst));
        assert!(manager.get("b").is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_hard_error_keeps_earlier_updates() {
        let manager = Manager::<TestObject>::new();
        populate(&manager, &[conf("a", 1, 1), conf("b", 1, 1), conf("c", 1, 1)]);

        let result = manager.reconcile(&[conf("a", 5, 1), conf("b", 0, 1), conf("c", 5, 1)]);
        assert!(matches!(result, Err(ObjectError::Validation(_))));
        assert_eq!(manager.get("a").unwrap().config().value, 5);
        assert_eq!(manager.get("b").unwrap().config().value, 1);
        assert_eq!(manager.get("c").unwrap().config().value, 1);
    }

    #[test]
    fn test_names_stay_unique() {
        let manager = Manager::<TestObject>::new();
        populate(&manager, &[conf("a", 1, 1)]);

        assert!(matches!(
            manager.insert(TestObject::new(conf("a", 3, 3))),
            Err(ObjectError::Duplicate { .. })
        ));
        for object in manager.objects() {
            assert_eq!(manager.get(object.name()).unwrap().name(), object.name());
        }

        manager.close_all();
        assert!(manager.is_empty());
    }
}

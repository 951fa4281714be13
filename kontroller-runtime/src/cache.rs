//! Caches objects in memory, nested by kind then uid
use std::sync::Arc;

use ahash::AHashMap;
use kontroller_core::{ResourceObject, ResourceVersion};
use parking_lot::Mutex;

type Objects = AHashMap<String, ResourceObject>;

#[derive(Debug, Default)]
struct State {
    kinds: AHashMap<String, Objects>,
    /// Highest resource version seen across every kind and source
    resource_version: ResourceVersion,
}

/// The in-memory mirror of every watched kind
///
/// Cloning produces a new handle to the same backing state. Only the dispatcher writes
/// to it; other handles may read, and every read or write holds the lock for a single
/// in-memory map operation only.
#[derive(Clone, Debug, Default)]
pub struct Cache {
    state: Arc<Mutex<State>>,
}

impl Cache {
    /// Insert or replace an object under its `(kind, uid)`
    pub(crate) fn add(&self, obj: ResourceObject) {
        let mut state = self.state.lock();
        state
            .kinds
            .entry(obj.kind.clone())
            .or_default()
            .insert(obj.uid.clone(), obj);
    }

    /// Replace the stored value of an object
    ///
    /// Inserts the object if it was not known yet.
    pub(crate) fn update(&self, obj: ResourceObject) {
        self.add(obj);
    }

    /// Remove an object, returning the value that was stored
    pub(crate) fn delete(&self, obj: &ResourceObject) -> Option<ResourceObject> {
        let mut state = self.state.lock();
        let objects = state.kinds.get_mut(&obj.kind)?;
        objects.remove(&obj.uid)
    }

    /// Evict every object of `kind`, returning how many were dropped
    pub(crate) fn flush(&self, kind: &str) -> usize {
        let mut state = self.state.lock();
        state.kinds.get_mut(kind).map_or(0, |objects| {
            let count = objects.len();
            objects.clear();
            count
        })
    }

    /// Raise the resource version high-water mark
    ///
    /// Returns whether the mark moved. Tokens older than the mark are ignored.
    pub(crate) fn observe_resource_version(&self, rv: ResourceVersion) -> bool {
        let mut state = self.state.lock();
        if rv > state.resource_version {
            state.resource_version = rv;
            true
        } else {
            false
        }
    }

    /// Retrieve a `clone()` of the object of `kind` with `uid`, if cached
    #[must_use]
    pub fn get(&self, kind: &str, uid: &str) -> Option<ResourceObject> {
        let state = self.state.lock();
        state.kinds.get(kind)?.get(uid).cloned()
    }

    /// Highest resource version observed so far
    #[must_use]
    pub fn resource_version(&self) -> ResourceVersion {
        self.state.lock().resource_version
    }

    /// Number of cached objects across all kinds
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().kinds.values().map(|objects| objects.len()).sum()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over a consistent view of the whole cache
    ///
    /// The lock is held until `f` returns, so `f` must not call back into this cache.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&Snapshot<'_>) -> R) -> R {
        let state = self.state.lock();
        f(&Snapshot { kinds: &state.kinds })
    }
}

/// A read-only view of the cache, valid while the cache lock is held
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    kinds: &'a AHashMap<String, Objects>,
}

impl<'a> Snapshot<'a> {
    /// Look up a single object
    #[must_use]
    pub fn get(&self, kind: &str, uid: &str) -> Option<&'a ResourceObject> {
        self.kinds.get(kind)?.get(uid)
    }

    /// All cached objects of `kind`, in no particular order
    pub fn objects(&self, kind: &str) -> impl Iterator<Item = &'a ResourceObject> + 'a {
        self.kinds.get(kind).into_iter().flat_map(|objects| objects.values())
    }

    /// The kinds that currently hold at least one object
    pub fn kinds(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.kinds
            .iter()
            .filter(|(_, objects)| !objects.is_empty())
            .map(|(kind, _)| kind.as_str())
    }

    /// Every cached object, across all kinds
    pub fn iter(&self) -> impl Iterator<Item = &'a ResourceObject> + 'a {
        self.kinds.values().flat_map(|objects| objects.values())
    }

    /// Number of cached objects of `kind`
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.kinds.get(kind).map_or(0, |objects| objects.len())
    }

    /// Number of cached objects across all kinds
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.values().map(|objects| objects.len()).sum()
    }

    /// Whether the view holds no objects
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::Cache;
    use kontroller_core::{ResourceObject, ResourceVersion};

    fn pod(uid: &str) -> ResourceObject {
        ResourceObject::new("Pod", uid, uid).within("default")
    }

    #[test]
    fn should_allow_getting_added_objects() {
        let cache = Cache::default();
        cache.add(pod("a"));
        assert_eq!(cache.get("Pod", "a"), Some(pod("a")));
        assert_eq!(cache.get("Job", "a"), None);
    }

    #[test]
    fn should_key_by_kind_then_uid() {
        let cache = Cache::default();
        cache.add(pod("same"));
        cache.add(ResourceObject::new("Job", "same", "same"));
        assert_eq!(cache.len(), 2);
        cache.delete(&pod("same"));
        assert!(cache.get("Pod", "same").is_none());
        assert!(cache.get("Job", "same").is_some());
    }

    #[test]
    fn update_replaces_in_place() {
        let cache = Cache::default();
        cache.add(pod("a"));
        cache.update(pod("a").with_resource_version(9));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("Pod", "a").unwrap().resource_version,
            ResourceVersion::new(9)
        );
    }

    #[test]
    fn deleting_unknown_objects_is_a_noop() {
        let cache = Cache::default();
        assert_eq!(cache.delete(&pod("ghost")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn flush_only_evicts_one_kind() {
        let cache = Cache::default();
        cache.add(pod("a"));
        cache.add(pod("b"));
        cache.add(ResourceObject::new("Namespace", "default", "ns"));
        assert_eq!(cache.flush("Pod"), 2);
        assert_eq!(cache.flush("Secret"), 0);
        assert_eq!(cache.len(), 1);
        cache.with_snapshot(|snap| {
            assert_eq!(snap.kinds().collect::<Vec<_>>(), vec!["Namespace"]);
            assert_eq!(snap.count("Pod"), 0);
        });
    }

    #[test]
    fn resource_version_never_moves_backwards() {
        let cache = Cache::default();
        assert!(cache.observe_resource_version(ResourceVersion::new(5)));
        assert!(!cache.observe_resource_version(ResourceVersion::new(3)));
        assert!(!cache.observe_resource_version(ResourceVersion::new(5)));
        assert!(cache.observe_resource_version(ResourceVersion::new(8)));
        assert_eq!(cache.resource_version(), ResourceVersion::new(8));
    }

    #[test]
    fn snapshot_sees_every_kind() {
        let cache = Cache::default();
        cache.add(pod("a"));
        cache.add(ResourceObject::new("Job", "j", "j"));
        let names = cache.with_snapshot(|snap| {
            let mut names = snap.iter().map(|o| o.name.clone()).collect::<Vec<_>>();
            names.sort();
            names
        });
        assert_eq!(names, vec!["a", "j"]);
    }

    #[test]
    fn counts_add_up_across_kinds() {
        let cache = Cache::default();
        cache.add(pod("a"));
        cache.add(pod("b"));
        cache.add(ResourceObject::new("Job", "j", "j"));
        assert_eq!(cache.len(), 3);
        cache.with_snapshot(|snap| {
            assert_eq!(snap.len(), 3);
            assert_eq!(snap.count("Pod"), 2);
            assert_eq!(snap.count("Job"), 1);
            assert_eq!(snap.count("Secret"), 0);
        });
    }
}

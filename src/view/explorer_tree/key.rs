use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of a hashable, comparable key
trait DynKey: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynKey) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<K> DynKey for K
where
    K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynKey) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }

    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity of a child node within its loader group
///
/// Wraps whatever key the loader extracts from a fetched item. Two keys are
/// equal only when they have the same concrete type and compare equal, so
/// loaders keyed by different types never collide.
#[derive(Clone)]
pub struct ChildKey(Arc<dyn DynKey>);

impl ChildKey {
    /// Wrap a concrete key
    pub fn new<K>(key: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(key))
    }

    /// Borrow the concrete key, if it has type `K`
    pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
        self.0.as_any().downcast_ref::<K>()
    }
}

impl PartialEq for ChildKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}

impl Eq for ChildKey {}

impl Hash for ChildKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.dyn_fmt(f)
    }
}

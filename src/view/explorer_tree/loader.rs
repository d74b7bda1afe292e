//! Child loader groups
//!
//! A `ChildLoader` pairs an async fetch of raw items with a factory that wraps
//! each item in a child `Node`. Loaders are declared on a typed `Node<T>` and
//! bound to its value; the tree only ever sees the erased `LoaderGroup`.

use super::key::ChildKey;
use super::node::{Node, NodeSeed};
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Boxed future returned by fetch functions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type FetchFn<T, C> = Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, anyhow::Result<Vec<C>>> + Send + Sync>;
pub(crate) type MakeChildFn<T, C> = Arc<dyn Fn(C, &T) -> Node<C> + Send + Sync>;
type KeyFn<C> = Arc<dyn Fn(&C) -> ChildKey + Send + Sync>;

/// Why a loader group ended up `Failed`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The resource-listing collaborator returned an error
    #[error("{0}")]
    Fetch(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("loader panicked")]
    Panicked,

    /// The fetch task was aborted because a newer load superseded it
    #[error("load was aborted")]
    Aborted,
}

/// Lists the children of a parent resource
///
/// This is the narrow interface through which loaders reach a cloud SDK or
/// any other listing service.
#[async_trait]
pub trait ResourceLister<P, C>: Send + Sync {
    async fn list(&self, parent: &P) -> anyhow::Result<Vec<C>>;
}

/// A lazily evaluated group of children of a `Node<T>`
pub struct ChildLoader<T, C> {
    name: Option<String>,
    fetch: FetchFn<T, C>,
    make_child: MakeChildFn<T, C>,
    key: KeyFn<C>,
}

impl<T, C> ChildLoader<T, C>
where
    T: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Create a loader whose children are identified by the items themselves
    pub fn new<F, Fut, M>(fetch: F, make_child: M) -> Self
    where
        C: Hash + Eq + fmt::Debug + Clone,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<C>>> + Send + 'static,
        M: Fn(C, &T) -> Node<C> + Send + Sync + 'static,
    {
        Self::keyed(fetch, C::clone, make_child)
    }

    /// Create a loader whose children are identified by an extracted key
    pub fn keyed<F, Fut, K, KF, M>(fetch: F, key: KF, make_child: M) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<C>>> + Send + 'static,
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
        KF: Fn(&C) -> K + Send + Sync + 'static,
        M: Fn(C, &T) -> Node<C> + Send + Sync + 'static,
    {
        Self {
            name: None,
            fetch: Arc::new(
                move |owner: Arc<T>| -> BoxFuture<'static, anyhow::Result<Vec<C>>> {
                    Box::pin(fetch(owner))
                },
            ),
            make_child: Arc::new(make_child),
            key: Arc::new(move |item: &C| ChildKey::new(key(item))),
        }
    }

    /// Create a keyed loader backed by a `ResourceLister`
    pub fn from_lister<L, K, KF, M>(lister: Arc<L>, key: KF, make_child: M) -> Self
    where
        L: ResourceLister<T, C> + 'static,
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
        KF: Fn(&C) -> K + Send + Sync + 'static,
        M: Fn(C, &T) -> Node<C> + Send + Sync + 'static,
    {
        Self::keyed(
            move |owner: Arc<T>| {
                let lister = Arc::clone(&lister);
                async move { lister.list(&owner).await }
            },
            key,
            make_child,
        )
    }

    /// Give the group a name the host can look it up by
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Bind this loader to the value of the node that owns it
    pub(crate) fn bind(self, owner: Arc<T>) -> Arc<dyn LoaderGroup> {
        Arc::new(BoundLoader {
            owner: RwLock::new(owner),
            loader: self,
        })
    }
}

/// A fetched item that has not been turned into a node yet
///
/// A key that is new to the group is built into a node; a key the group
/// already holds only hands its fresh value to the existing node, so kept
/// children are never rebuilt.
pub(crate) struct FetchedChild {
    pub key: ChildKey,
    item: Box<dyn PendingItem>,
}

impl FetchedChild {
    pub(crate) fn new<T, C>(key: ChildKey, item: C, owner: Arc<T>, make_child: MakeChildFn<T, C>) -> Self
    where
        T: Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        Self {
            key,
            item: Box::new(Pending {
                item,
                owner,
                make_child,
            }),
        }
    }

    /// Run the factory for a key the group does not hold yet
    pub(crate) fn build(self) -> NodeSeed {
        self.item.build()
    }

    /// The fetched value, for a node that already exists
    pub(crate) fn into_value(self) -> Arc<dyn Any + Send + Sync> {
        self.item.into_value()
    }
}

impl fmt::Debug for FetchedChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedChild")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

trait PendingItem: Send {
    fn build(self: Box<Self>) -> NodeSeed;

    fn into_value(self: Box<Self>) -> Arc<dyn Any + Send + Sync>;
}

struct Pending<T, C> {
    item: C,
    owner: Arc<T>,
    make_child: MakeChildFn<T, C>,
}

impl<T, C> PendingItem for Pending<T, C>
where
    T: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn build(self: Box<Self>) -> NodeSeed {
        (self.make_child)(self.item, &self.owner).into_seed()
    }

    fn into_value(self: Box<Self>) -> Arc<dyn Any + Send + Sync> {
        Arc::new(self.item)
    }
}

/// A loader bound to its owner's value, with the child type erased
pub(crate) trait LoaderGroup: Send + Sync {
    fn name(&self) -> Option<&str>;

    fn fetch(&self) -> BoxFuture<'static, Result<Vec<FetchedChild>, LoadError>>;

    /// Point later fetches at a refreshed owner value of the same type
    fn rebind_owner(&self, owner: &Arc<dyn Any + Send + Sync>);
}

struct BoundLoader<T, C> {
    owner: RwLock<Arc<T>>,
    loader: ChildLoader<T, C>,
}

impl<T, C> BoundLoader<T, C> {
    fn owner(&self) -> Arc<T> {
        Arc::clone(&self.owner.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T, C> LoaderGroup for BoundLoader<T, C>
where
    T: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn name(&self) -> Option<&str> {
        self.loader.name.as_deref()
    }

    fn fetch(&self) -> BoxFuture<'static, Result<Vec<FetchedChild>, LoadError>> {
        let owner = self.owner();
        let items = (self.loader.fetch)(Arc::clone(&owner));
        let make_child = Arc::clone(&self.loader.make_child);
        let key = Arc::clone(&self.loader.key);

        Box::pin(async move {
            let items = items
                .await
                .map_err(|e| LoadError::Fetch(format!("{e:#}")))?;

            Ok(items
                .into_iter()
                .map(|item| {
                    FetchedChild::new(key(&item), item, Arc::clone(&owner), Arc::clone(&make_child))
                })
                .collect())
        })
    }

    fn rebind_owner(&self, owner: &Arc<dyn Any + Send + Sync>) {
        if let Ok(owner) = Arc::clone(owner).downcast::<T>() {
            *self.owner.write().unwrap_or_else(PoisonError::into_inner) = owner;
        }
    }
}

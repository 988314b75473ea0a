//! Cached collections of server objects.
//!
//! A [`CachedList`] owns a retrieval function and materializes its result on
//! first access. [`IndexedList`] additionally keeps a hash index over a key
//! projection of every element, rebuilt whenever the list is (re)loaded.
//! [`NameIndexedList`] is the name-keyed variant used for most CMS objects.
//!
//! A list may be tied to a [`CacheEpoch`]. Objects that live in the list hold
//! a clone of the epoch and bump it when they change server state the list
//! reflects (e.g. a page deleting itself); the list then treats its cache as
//! stale and fetches again on the next access.

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use futures::future::{BoxFuture, FutureExt};

use crate::error::Result;

/// Fetches the current contents of a collection from the server.
pub type Retriever<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>>> + Send + Sync>;

/// Objects that have a display name used for lookups.
pub trait Named {
    fn name(&self) -> &str;
}

/// Shared invalidation counter between a list and the objects it contains.
#[derive(Debug, Clone, Default)]
pub struct CacheEpoch(Arc<AtomicU64>);

impl CacheEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Mark every list tied to this epoch as stale.
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

// ============================================================================
// CachedList
// ============================================================================

/// A list fetched on first access and cached until invalidated.
pub struct CachedList<T> {
    items: Option<Vec<T>>,
    retrieve: Retriever<T>,
    epoch: Option<CacheEpoch>,
    /// Epoch value observed when `items` was fetched.
    seen: u64,
}

impl<T: Send + 'static> CachedList<T> {
    pub fn new<R, Fut>(retrieve: R) -> Self
    where
        R: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        Self {
            items: None,
            retrieve: Arc::new(move || retrieve().boxed()),
            epoch: None,
            seen: 0,
        }
    }
}

impl<T> CachedList<T> {
    /// Tie the cache to `epoch`; bumping it makes the cache stale.
    pub fn with_epoch(mut self, epoch: CacheEpoch) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Whether items are cached and still current.
    pub fn is_cached(&self) -> bool {
        let current = self.epoch.as_ref().map_or(0, CacheEpoch::current);
        self.items.is_some() && current == self.seen
    }

    /// Items held in the cache, stale or not, without fetching.
    pub fn cached(&self) -> Option<&[T]> {
        self.items.as_deref()
    }

    async fn fetch(&mut self) -> Result<Vec<T>> {
        // Read the epoch first so a bump during the fetch is not lost.
        let epoch = self.epoch.as_ref().map_or(0, CacheEpoch::current);
        let items = (self.retrieve)().await?;
        tracing::debug!("Loaded list of {} item(s)", items.len());
        self.seen = epoch;
        Ok(items)
    }

    async fn ensure(&mut self) -> Result<&mut Vec<T>> {
        let fresh = self.is_cached();
        let items = match self.items.take() {
            Some(items) if fresh => items,
            _ => self.fetch().await?,
        };
        Ok(self.items.insert(items))
    }

    /// All items, fetching them if nothing is cached.
    pub async fn items(&mut self) -> Result<&[T]> {
        Ok(self.ensure().await?.as_slice())
    }

    /// All items, mutable (e.g. to lazily load fields of an element).
    pub async fn items_mut(&mut self) -> Result<&mut [T]> {
        Ok(self.ensure().await?.as_mut_slice())
    }

    pub async fn len(&mut self) -> Result<usize> {
        Ok(self.ensure().await?.len())
    }

    pub async fn is_empty(&mut self) -> Result<bool> {
        Ok(self.ensure().await?.is_empty())
    }

    pub async fn get(&mut self, index: usize) -> Result<Option<&T>> {
        Ok(self.ensure().await?.get(index))
    }

    pub async fn get_mut(&mut self, index: usize) -> Result<Option<&mut T>> {
        Ok(self.ensure().await?.get_mut(index))
    }

    /// Fetch again now, replacing the cache. On failure the old cache is kept.
    pub async fn refresh(&mut self) -> Result<&[T]> {
        let items = self.fetch().await?;
        Ok(self.items.insert(items).as_slice())
    }

    /// Drop the cache; the next access fetches again.
    pub fn invalidate(&mut self) {
        self.items = None;
    }
}

impl<T: Clone> CachedList<T> {
    pub async fn to_vec(&mut self) -> Result<Vec<T>> {
        Ok(self.ensure().await?.clone())
    }
}

impl<T: Clone> Clone for CachedList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            retrieve: Arc::clone(&self.retrieve),
            epoch: self.epoch.clone(),
            seen: self.seen,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CachedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedList")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// IndexedList
// ============================================================================

/// A cached list with an O(1) index over a key projection of its elements.
///
/// When several elements share a key, the first one in list order is indexed.
pub struct IndexedList<K, T> {
    list: CachedList<T>,
    key: fn(&T) -> K,
    index: AHashMap<K, usize>,
}

/// Cached list indexed by element name.
pub type NameIndexedList<T> = IndexedList<String, T>;

impl<K, T> IndexedList<K, T>
where
    K: Eq + Hash,
    T: Send + 'static,
{
    pub fn new<R, Fut>(retrieve: R, key: fn(&T) -> K) -> Self
    where
        R: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        Self {
            list: CachedList::new(retrieve),
            key,
            index: AHashMap::new(),
        }
    }
}

impl<K: Eq + Hash, T> IndexedList<K, T> {
    /// Tie the cache to `epoch`; bumping it makes the cache stale.
    pub fn with_epoch(mut self, epoch: CacheEpoch) -> Self {
        self.list = self.list.with_epoch(epoch);
        self
    }

    pub fn is_cached(&self) -> bool {
        self.list.is_cached()
    }

    async fn ensure(&mut self) -> Result<()> {
        if !self.list.is_cached() {
            self.list.refresh().await?;
            self.rebuild_index();
        }
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        if let Some(items) = self.list.cached() {
            for (i, item) in items.iter().enumerate() {
                self.index.entry((self.key)(item)).or_insert(i);
            }
        }
    }

    pub async fn items(&mut self) -> Result<&[T]> {
        self.ensure().await?;
        self.list.items().await
    }

    pub async fn items_mut(&mut self) -> Result<&mut [T]> {
        self.ensure().await?;
        self.list.items_mut().await
    }

    pub async fn len(&mut self) -> Result<usize> {
        Ok(self.items().await?.len())
    }

    pub async fn get(&mut self, index: usize) -> Result<Option<&T>> {
        Ok(self.items().await?.get(index))
    }

    pub async fn get_by_key<Q>(&mut self, key: &Q) -> Result<Option<&T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ensure().await?;
        let position = self.index.get(key).copied();
        Ok(position.and_then(|i| self.list.cached().and_then(|items| items.get(i))))
    }

    /// Mutable access by key. Changing the key field of the element leaves
    /// the index stale until the next [`IndexedList::invalidate`] or
    /// [`IndexedList::refresh`].
    pub async fn get_by_key_mut<Q>(&mut self, key: &Q) -> Result<Option<&mut T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ensure().await?;
        match self.index.get(key).copied() {
            Some(i) => self.list.get_mut(i).await,
            None => Ok(None),
        }
    }

    pub async fn contains_key<Q>(&mut self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ensure().await?;
        Ok(self.index.contains_key(key))
    }

    /// Fetch again now and rebuild the index. On failure the old cache is kept.
    pub async fn refresh(&mut self) -> Result<&[T]> {
        self.list.refresh().await?;
        self.rebuild_index();
        self.list.items().await
    }

    /// Drop the cache and the index; the next access fetches again.
    pub fn invalidate(&mut self) {
        self.list.invalidate();
        self.index.clear();
    }
}

impl<T: Named> IndexedList<String, T> {
    pub async fn get_by_name(&mut self, name: &str) -> Result<Option<&T>> {
        self.get_by_key(name).await
    }

    pub async fn get_by_name_mut(&mut self, name: &str) -> Result<Option<&mut T>> {
        self.get_by_key_mut(name).await
    }

    pub async fn contains_name(&mut self, name: &str) -> Result<bool> {
        self.contains_key(name).await
    }
}

impl<T: Named + Send + 'static> IndexedList<String, T> {
    /// A list indexed by [`Named::name`].
    pub fn by_name<R, Fut>(retrieve: R) -> Self
    where
        R: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        Self::new(retrieve, |item: &T| item.name().to_string())
    }
}

impl<K: Clone, T: Clone> Clone for IndexedList<K, T> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            key: self.key,
            index: self.index.clone(),
        }
    }
}

impl<K, T: fmt::Debug> fmt::Debug for IndexedList<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedList")
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}

//! Lazily loaded object state.
//!
//! Server objects are often first seen in a list reply that carries only a
//! few of their attributes. [`Partial`] holds whatever is known plus a
//! "fully loaded" flag: reading an unknown field of an object that is not
//! fully loaded triggers one full fetch, which fills every field at once.
//!
//! [`LazyLoad`] is the single-value variant: compute on first access, keep
//! the result until invalidated.

use std::future::Future;

use crate::error::Result;

// ============================================================================
// Partial
// ============================================================================

/// Field set of a server object together with its load state.
///
/// `F` is a struct of `Option` fields; `None` means "not known yet".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partial<F> {
    fields: F,
    fully_loaded: bool,
}

impl<F: Default> Partial<F> {
    /// Nothing known yet; the first field access fetches.
    pub fn unloaded() -> Self {
        Self {
            fields: F::default(),
            fully_loaded: false,
        }
    }

    /// Some fields known from a list reply; unknown fields are fetched on demand.
    pub fn partial(fields: F) -> Self {
        Self {
            fields,
            fully_loaded: false,
        }
    }

    /// Built from a complete record; never fetches.
    pub fn complete(fields: F) -> Self {
        Self {
            fields,
            fully_loaded: true,
        }
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded
    }

    /// The currently known fields, without fetching.
    pub fn known(&self) -> &F {
        &self.fields
    }

    /// Read one field, fetching the full record first if the field is unknown
    /// and the object is not fully loaded.
    ///
    /// Returns `Ok(None)` only when the server's full record has no value for
    /// the field either.
    pub async fn get<'a, T, P, L, Fut>(&'a mut self, pick: P, load: L) -> Result<Option<&'a T>>
    where
        T: ?Sized + 'a,
        P: Fn(&F) -> Option<&T>,
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<F>>,
    {
        if !self.fully_loaded && pick(&self.fields).is_none() {
            let fields = load().await?;
            self.apply(fields);
        }
        Ok(pick(&self.fields))
    }

    /// Fetch the full record unless it is already loaded.
    pub async fn ensure_loaded<L, Fut>(&mut self, load: L) -> Result<&F>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<F>>,
    {
        if !self.fully_loaded {
            let fields = load().await?;
            self.apply(fields);
        }
        Ok(&self.fields)
    }

    /// Replace all fields with a complete record.
    pub fn apply(&mut self, fields: F) {
        self.fields = fields;
        self.fully_loaded = true;
    }

    /// Record values the server is now known to hold, e.g. after a
    /// successful mutation. Does not change the load state.
    pub fn update(&mut self, change: impl FnOnce(&mut F)) {
        change(&mut self.fields);
    }

    /// Forget everything; the next field access fetches again.
    pub fn invalidate(&mut self) {
        self.fields = F::default();
        self.fully_loaded = false;
    }
}

// ============================================================================
// LazyLoad
// ============================================================================

/// A value computed on first access and cached until invalidated.
#[derive(Debug, Clone, PartialEq)]
pub struct LazyLoad<T> {
    value: Option<T>,
}

impl<T> Default for LazyLoad<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> LazyLoad<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: T) -> Self {
        Self { value: Some(value) }
    }

    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// The cached value, without loading.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// The cached value, loading it first if needed. A failed load leaves
    /// the cache empty.
    pub async fn get_or_load<L, Fut>(&mut self, load: L) -> Result<&mut T>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = match self.value.take() {
            Some(v) => v,
            None => load().await?,
        };
        Ok(self.value.insert(value))
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    pub fn invalidate(&mut self) {
        self.value = None;
    }
}

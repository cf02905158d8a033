use domain::ServiceError;
use std::sync::{Arc, OnceLock};

/// A store handle that may be installed after the service was built.
///
/// Services hold the slot, not the store, so wiring order does not matter.
/// Reading an empty slot is `RepositoryUninitialized`; callers check it
/// before doing anything with side effects.
pub struct RepositorySlot<T: ?Sized> {
    name: &'static str,
    inner: Arc<OnceLock<Arc<T>>>,
}

impl<T: ?Sized> Clone for RepositorySlot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> RepositorySlot<T> {
    pub fn empty(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(OnceLock::new()),
        }
    }

    pub fn filled(name: &'static str, store: Arc<T>) -> Self {
        let slot = Self::empty(name);
        // A fresh lock is always empty
        let _ = slot.inner.set(store);
        slot
    }

    /// Install the store. Returns it back if one was already installed.
    pub fn install(&self, store: Arc<T>) -> Result<(), Arc<T>> {
        self.inner.set(store)
    }

    pub fn is_installed(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<T>, ServiceError> {
        self.inner
            .get()
            .cloned()
            .ok_or(ServiceError::RepositoryUninitialized(self.name))
    }
}

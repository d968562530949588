use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id source shared by tracked resources and GPU contexts.
static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A GPU object tagged with a unique id.
///
/// Ids are never reused, so comparing ids tells whether a domain was
/// reallocated between two observations (wgpu handles have no identity of
/// their own that survives a clone).
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    inner: T,
    id: u64,
}

impl<T> Tracked<T> {
    /// Wraps a resource and assigns it a fresh id.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            id: next_id(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

//! Page resources and the backend that produces and releases them.

use std::fmt;

use crate::error::PageResult;
use crate::store::PageIndex;

/// Document backend the engine fetches pages from.
///
/// The engine never knows where bytes come from. It only calls
/// `fetch_page` off the state lock and hands every materialized resource
/// back through `release_resource` exactly once.
pub trait PageBackend: Send + Sync + 'static {
    /// Displayable content of one page.
    ///
    /// Cloning must be cheap (a shared buffer or URL); clones are handed to
    /// readers, while the engine keeps the one copy it will release.
    type Resource: Clone + Send + 'static;

    /// Materialize page `index`. May block; always called without engine locks held.
    fn fetch_page(&self, index: PageIndex) -> PageResult<Self::Resource>;

    /// Free a resource previously returned by `fetch_page`.
    fn release_resource(&self, resource: Self::Resource);
}

/// Exclusive ownership of one fetched resource.
///
/// Created when a fetch succeeds. It lives inside the page's record while
/// resident and is consumed by [`release`](Self::release) on eviction,
/// clear, or stale completion. Consuming `self` makes a second release
/// impossible.
#[must_use = "a resource handle must be released exactly once"]
pub struct ResourceHandle<R> {
    index: PageIndex,
    resource: R,
}

impl<R> ResourceHandle<R> {
    pub(crate) fn new(index: PageIndex, resource: R) -> Self {
        Self { index, resource }
    }

    /// Page this resource was fetched for.
    pub fn index(&self) -> PageIndex {
        self.index
    }

    /// Borrow the resource.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Hand the resource back to the backend that produced it.
    pub fn release<B>(self, backend: &B)
    where
        B: PageBackend<Resource = R> + ?Sized,
    {
        backend.release_resource(self.resource);
    }
}

impl<R> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingBackend;

    #[test]
    fn test_release_hands_resource_back() {
        let backend = RecordingBackend::new();
        let handle = ResourceHandle::new(4, backend.fetch_page(4).unwrap());

        assert_eq!(handle.index(), 4);
        assert_eq!(handle.resource().index, 4);

        handle.release(&backend);
        assert_eq!(backend.release_count(4), 1);
        assert_eq!(backend.total_released(), 1);
    }

    #[test]
    fn test_debug_hides_resource() {
        let handle = ResourceHandle::new(2, vec![0u8; 16]);
        let debug = format!("{handle:?}");
        assert!(debug.contains("index: 2"));
        assert!(!debug.contains("0, 0"));
        drop(handle);
    }
}

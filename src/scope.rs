//! Resolution contexts
//!
//! Request-scoped instances are cached per [`ContextId`]. A context is opened
//! with [`RequestScope`] and closed when the handle is released or dropped;
//! closing evicts every instance cached for it.

use crate::container::ModuleContainer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::debug;

/// Identifier grouping the resolutions of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Context of singletons
    pub const STATIC: ContextId = ContextId(0);

    /// Generate a new unique context id.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Whether this is the singleton context
    #[inline]
    pub fn is_static(&self) -> bool {
        self.0 == 0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_static() {
            f.write_str("static")
        } else {
            write!(f, "context-{}", self.0)
        }
    }
}

/// Owned handle of a request context.
///
/// Every request-scoped instance resolved through the handle is cached until
/// [`release`](Self::release) is called or the handle is dropped.
///
/// # Examples
///
/// ```rust
/// # async fn demo(app: modular_di::ApplicationContext) -> modular_di::Result<()> {
/// let scope = app.create_request_scope();
/// let first = app.resolve("REQUEST_ID", Some(&scope)).await?;
/// let again = app.resolve("REQUEST_ID", Some(&scope)).await?;
/// assert!(std::sync::Arc::ptr_eq(&first, &again));
/// scope.release();
/// # Ok(())
/// # }
/// ```
pub struct RequestScope {
    id: ContextId,
    container: Weak<ModuleContainer>,
    released: bool,
}

impl RequestScope {
    pub(crate) fn open(container: &Arc<ModuleContainer>) -> Self {
        let id = ContextId::new();
        container.register_context(id);

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_di",
            context = %id,
            "Opened request scope"
        );

        Self {
            id,
            container: Arc::downgrade(container),
            released: false,
        }
    }

    /// Context id of this scope
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Close the context and drop its instances.
    pub fn release(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let Some(container) = self.container.upgrade() else {
            return;
        };
        let evicted = container.release_context(self.id);

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_di",
            context = %self.id,
            evicted,
            "Released request scope"
        );

        #[cfg(not(feature = "logging"))]
        let _ = evicted;
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContainerConfig;

    #[test]
    fn test_context_ids_are_unique() {
        let first = ContextId::new();
        let second = ContextId::new();

        assert_ne!(first, second);
        assert!(!first.is_static());
        assert!(ContextId::STATIC.is_static());
        assert_eq!(ContextId::STATIC.to_string(), "static");
        assert!(first.to_string().starts_with("context-"));
    }

    #[test]
    fn test_release_unregisters_context() {
        let container = ModuleContainer::new(ContainerConfig::default());
        let scope = RequestScope::open(&container);
        let id = scope.id();

        assert!(container.is_context_live(id));
        scope.release();
        assert!(!container.is_context_live(id));
    }

    #[test]
    fn test_drop_unregisters_context() {
        let container = ModuleContainer::new(ContainerConfig::default());
        let id = {
            let scope = RequestScope::open(&container);
            scope.id()
        };
        assert!(!container.is_context_live(id));
    }
}

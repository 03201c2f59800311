//! SecurityContextManager port - the identity a handler runs as.

/// Establishes and tears down the identity context of the running handler.
pub trait SecurityContextManager: Send + Sync {
    fn establish(&self, owner: Option<&str>);

    fn clear(&self);
}

/// Scoped security context. The context is cleared when the scope is dropped,
/// on every exit path.
///
/// # Example
/// ```
/// use shuttle_core::impls::InMemorySecurityContext;
/// use shuttle_core::ports::SecurityScope;
///
/// let ctx = InMemorySecurityContext::new();
/// {
///     let _scope = SecurityScope::enter(&ctx, Some("administrator"));
///     assert_eq!(ctx.current().as_deref(), Some("administrator"));
/// }
/// assert!(ctx.current().is_none());
/// ```
#[must_use = "the context is cleared as soon as the scope is dropped"]
pub struct SecurityScope<'a> {
    manager: &'a dyn SecurityContextManager,
}

impl<'a> SecurityScope<'a> {
    pub fn enter(manager: &'a dyn SecurityContextManager, owner: Option<&str>) -> Self {
        manager.establish(owner);
        Self { manager }
    }
}

impl Drop for SecurityScope<'_> {
    fn drop(&mut self) {
        self.manager.clear();
    }
}

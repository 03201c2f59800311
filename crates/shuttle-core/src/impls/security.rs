//! InMemorySecurityContext - keeps the current identity in a mutex.

use std::sync::Mutex;

use crate::ports::SecurityContextManager;

/// Identity used when a task has no owner.
pub const SYSTEM_IDENTITY: &str = "system";

#[derive(Default)]
pub struct InMemorySecurityContext {
    current: Mutex<Option<String>>,
    established: Mutex<Vec<String>>,
}

impl InMemorySecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every identity established so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.established
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SecurityContextManager for InMemorySecurityContext {
    fn establish(&self, owner: Option<&str>) {
        let identity = owner.unwrap_or(SYSTEM_IDENTITY).to_string();
        self.established
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(identity.clone());
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(identity);
    }

    fn clear(&self) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SecurityScope;

    #[test]
    fn scope_clears_context_even_on_panic() {
        let ctx = InMemorySecurityContext::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = SecurityScope::enter(&ctx, None);
            assert_eq!(ctx.current().as_deref(), Some(SYSTEM_IDENTITY));
            panic!("handler blew up");
        }));

        assert!(outcome.is_err());
        assert!(ctx.current().is_none());
        assert_eq!(ctx.history(), vec![SYSTEM_IDENTITY.to_string()]);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{HandlerRef, RegistryError};
use crate::ports::{HandlerResolver, TaskHandler};

/// Registry of handlers (handler_ref -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, behind an `Arc`).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerRef, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a handler reference. Registering the same
    /// reference twice is an error.
    pub fn register(
        &mut self,
        handler_ref: HandlerRef,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&handler_ref) {
            return Err(RegistryError::DuplicateHandler(handler_ref.to_string()));
        }
        self.handlers.insert(handler_ref, handler);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, handler_ref: &HandlerRef) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(handler_ref).cloned()
    }
}

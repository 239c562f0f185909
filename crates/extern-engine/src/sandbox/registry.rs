use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use extern_core::view::{Component, ErrorView, LoadingView};

use super::ModuleResolver;

/// Specifier prefix reserved for the built-in views.
pub const BUILTIN_PREFIX: &str = "extern:";

/// Host-populated components that view modules may import by specifier.
#[derive(Default)]
pub struct ComponentRegistry {
    components: RwLock<HashMap<String, Arc<dyn Component>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under `specifier`, replacing any previous one.
    pub fn register(&self, specifier: impl Into<String>, component: Arc<dyn Component>) {
        let specifier = specifier.into();
        if specifier.starts_with(BUILTIN_PREFIX) {
            tracing::warn!(specifier = %specifier, "built-in specifiers cannot be overridden");
            return;
        }
        self.components.write().insert(specifier, component);
    }

    pub fn unregister(&self, specifier: &str) -> bool {
        self.components.write().remove(specifier).is_some()
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.components.read().contains_key(specifier)
    }

    /// Registered specifiers, sorted.
    pub fn specifiers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ModuleResolver for ComponentRegistry {
    fn resolve(&self, specifier: &str) -> Option<Arc<dyn Component>> {
        match specifier.strip_prefix(BUILTIN_PREFIX) {
            Some("loading") => Some(Arc::new(LoadingView)),
            Some("error") => Some(Arc::new(ErrorView)),
            Some(_) => None,
            None => self.components.read().get(specifier).cloned(),
        }
    }
}

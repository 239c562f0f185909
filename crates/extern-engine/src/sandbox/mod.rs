//! Isolated compilation and memoized execution of downloaded view modules.
//!
//! A module only ever sees the [`Capabilities`] it is handed: the view
//! library and the module resolver. Compilation happens at registration,
//! execution on the first [`ModuleExecutor::invoke`].

pub mod library;
pub mod registry;
pub mod template;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use extern_core::errors::{CompileError, ExecutionError, RenderError};
use extern_core::events::EventSink;
use extern_core::view::Component;

pub use library::ViewLibrary;
pub use registry::ComponentRegistry;
pub use template::TemplateCompiler;

/// Resolves import specifiers to components.
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, specifier: &str) -> Option<Arc<dyn Component>>;
}

/// Everything a running module is allowed to touch.
#[derive(Clone)]
pub struct Capabilities {
    pub library: ViewLibrary,
    pub resolver: Arc<dyn ModuleResolver>,
}

impl Capabilities {
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            library: ViewLibrary,
            resolver,
        }
    }
}

/// A compiled module, ready to run once.
pub trait ExecutionUnit: Send + Sync {
    fn execute(&self, capabilities: &Capabilities) -> Result<Arc<dyn Component>, ExecutionError>;
}

/// Turns module source text into an [`ExecutionUnit`].
pub trait ModuleCompiler: Send + Sync {
    fn compile(&self, pathname: &str, source: &str) -> Result<Arc<dyn ExecutionUnit>, CompileError>;
}

enum Entry {
    Compiled(Arc<dyn ExecutionUnit>),
    CompileFailed(CompileError),
    Materialized(Result<Arc<dyn Component>, RenderError>),
}

/// Cache of compiled view modules keyed by pathname.
pub struct ModuleExecutor {
    compiler: Arc<dyn ModuleCompiler>,
    capabilities: Capabilities,
    entries: Mutex<HashMap<String, Entry>>,
    events: EventSink,
    executions: AtomicUsize,
}

impl ModuleExecutor {
    pub fn new(compiler: Arc<dyn ModuleCompiler>, capabilities: Capabilities, events: EventSink) -> Self {
        Self {
            compiler,
            capabilities,
            entries: Mutex::new(HashMap::new()),
            events,
            executions: AtomicUsize::new(0),
        }
    }

    /// Executor with the template compiler, resolving imports through `registry`.
    pub fn with_registry(registry: Arc<ComponentRegistry>, events: EventSink) -> Self {
        Self::new(Arc::new(TemplateCompiler), Capabilities::new(registry), events)
    }

    /// Compile `source` and install it under `pathname`. A pathname that
    /// already has an entry is left alone and `false` is returned.
    ///
    /// Compile failures are reported on the event sink; the entry is still
    /// installed and invoking it yields the failure.
    pub fn register(&self, pathname: &str, source: &str) -> bool {
        if self.contains(pathname) {
            tracing::debug!(pathname, "module already registered");
            return false;
        }

        let entry = match self.compiler.compile(pathname, source) {
            Ok(unit) => Entry::Compiled(unit),
            Err(e) => {
                tracing::debug!(pathname, error = %e, "failed to compile module");
                Entry::CompileFailed(e)
            }
        };

        let mut entries = self.entries.lock();
        if entries.contains_key(pathname) {
            return false;
        }
        if let Entry::CompileFailed(e) = &entry {
            self.events.error(e.clone());
        }
        entries.insert(pathname.to_string(), entry);
        true
    }

    pub fn contains(&self, pathname: &str) -> bool {
        self.entries.lock().contains_key(pathname)
    }

    /// The component behind `pathname`, running the module on first use.
    /// `None` when nothing is registered under that pathname.
    pub fn invoke(&self, pathname: &str) -> Option<Result<Arc<dyn Component>, RenderError>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(pathname)?;

        let materialized = match entry {
            Entry::Materialized(result) => return Some(result.clone()),
            Entry::CompileFailed(e) => Err(RenderError::from(e.clone())),
            Entry::Compiled(unit) => {
                self.executions.fetch_add(1, Ordering::Relaxed);
                match unit.execute(&self.capabilities) {
                    Ok(component) => Ok(component),
                    Err(e @ ExecutionError::NoExport { .. }) => {
                        tracing::debug!(pathname, "module exported nothing");
                        Err(RenderError::from(e))
                    }
                    Err(e) => {
                        self.events.error(e.clone());
                        Err(RenderError::from(e))
                    }
                }
            }
        };

        *entry = Entry::Materialized(materialized.clone());
        Some(materialized)
    }

    /// Number of module executions so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

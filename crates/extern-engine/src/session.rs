use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};

use extern_core::errors::{ExternError, LoadError, LoadPhase};
use extern_core::events::{ErrorInfo, EventSink, SessionEvent};
use extern_core::fragment::Fragment;

use crate::compositor::Compositor;
use crate::coordinator::Coordinator;
use crate::loader::AssetLoader;
use crate::parser::BoundaryParser;
use crate::sandbox::ModuleExecutor;

/// Result of one fragment's asset loading.
#[derive(Debug)]
pub struct LoadOutcome {
    pub fragment: String,
    pub result: Result<(), LoadError>,
}

pub type LoadTask = BoxFuture<'static, LoadOutcome>;

/// All protocol state of one connection: parsing, the fragment graph and the
/// render surface. Loading is handed back to the caller as [`LoadTask`]s so
/// the session itself never awaits.
pub struct Session {
    parser: BoundaryParser,
    coordinator: Coordinator,
    compositor: Compositor,
    loader: AssetLoader,
    events: EventSink,
}

impl Session {
    pub fn new(parser: BoundaryParser, loader: AssetLoader, compositor: Compositor, events: EventSink) -> Self {
        Self {
            parser,
            coordinator: Coordinator::new(),
            compositor,
            loader,
            events,
        }
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn executor(&self) -> &Arc<ModuleExecutor> {
        self.compositor.executor()
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn buffer(&self) -> &str {
        self.parser.buffer()
    }

    pub fn mount_loading(&mut self, message: Option<&str>) {
        self.compositor.mount_loading(message);
    }

    pub fn mount_error(&mut self) {
        self.compositor.mount_error();
    }

    /// Feed received text. Every complete record is decoded and registered in
    /// stream order; the returned tasks load the new fragments.
    pub fn ingest(&mut self, chunk: &str) -> Vec<LoadTask> {
        let mut records = Vec::new();
        self.parser.feed(chunk, |record| records.push(record.to_string()));

        let mut tasks = Vec::new();
        for record in records {
            match Fragment::decode(&record) {
                Ok(fragment) => tasks.push(self.accept(fragment)),
                Err(e) => {
                    tracing::debug!(excerpt = %e.excerpt, "dropping undecodable record");
                    self.events.error(e);
                }
            }
        }
        tasks
    }

    fn accept(&mut self, fragment: Fragment) -> LoadTask {
        tracing::debug!(fragment = %fragment.name, parent = ?fragment.parent(), "received fragment");
        let name = fragment.name.clone();
        let load = self.loader.load(&fragment);
        self.coordinator.register(fragment);

        load.map(move |result| LoadOutcome { fragment: name, result })
            .boxed()
    }

    /// Apply a finished load: signal it and render whatever became renderable.
    pub fn complete(&mut self, outcome: LoadOutcome) {
        let LoadOutcome { fragment, result } = outcome;
        match result {
            Ok(()) => {
                self.events.emit(SessionEvent::Loaded {
                    fragment: fragment.clone(),
                    error: None,
                });
                let plan = self.coordinator.mark_loaded(&fragment);
                self.render_plan(plan);
            }
            // Global dependencies failed: the fragment never reaches `loaded`.
            Err(e) if e.phase == LoadPhase::Dependencies => {
                self.events.error(e);
            }
            Err(e) => {
                let error = ExternError::from(e);
                tracing::debug!(%fragment, error = %error, "failed to load fragment assets");
                self.events.emit(SessionEvent::Loaded {
                    fragment,
                    error: Some(ErrorInfo::from(&error)),
                });
                self.events.error(error);
            }
        }
    }

    fn render_plan(&mut self, plan: Vec<String>) {
        for name in plan {
            self.events.emit(SessionEvent::Render { fragment: name.clone() });

            let Some(fragment) = self.coordinator.fragment(&name) else {
                continue;
            };
            if self.compositor.render_fragment(fragment) {
                self.events.emit(SessionEvent::Rendered {
                    state: fragment.state.clone(),
                    fragment: name,
                });
            }
        }
    }

    /// Ingest `chunk` and run its loads to completion, applying each as it finishes.
    pub async fn ingest_and_load(&mut self, chunk: &str) {
        let mut pending: FuturesUnordered<LoadTask> = self.ingest(chunk).into_iter().collect();
        while let Some(outcome) = pending.next().await {
            self.complete(outcome);
        }
    }

    /// Drop a partial record left over from a closed connection.
    pub fn discard_buffer(&mut self) {
        if !self.parser.buffer().is_empty() {
            tracing::debug!(len = self.parser.buffer().len(), "discarding partial record");
        }
        self.parser.clear();
    }

    /// Forget every fragment and compiled module and drop buffered text.
    pub fn reset(&mut self) {
        self.parser.clear();
        self.coordinator.clear();
        self.executor().clear();
    }
}

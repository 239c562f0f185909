use std::sync::Arc;

use serde_json::Value;

use extern_core::events::EventSink;
use extern_core::fragment::Fragment;
use extern_core::surface::RenderSurface;
use extern_core::view::{merge_props, Component, ErrorView, LoadingView, Props};

use crate::sandbox::ModuleExecutor;

/// Mounts components on the render surface, substituting the error view
/// for anything that fails.
pub struct Compositor {
    executor: Arc<ModuleExecutor>,
    surface: Box<dyn RenderSurface>,
    /// Host props, merged under every spread.
    base_props: Props,
    events: EventSink,
}

impl Compositor {
    pub fn new(
        executor: Arc<ModuleExecutor>,
        surface: Box<dyn RenderSurface>,
        base_props: Props,
        events: EventSink,
    ) -> Self {
        Self {
            executor,
            surface,
            base_props,
            events,
        }
    }

    pub fn executor(&self) -> &Arc<ModuleExecutor> {
        &self.executor
    }

    /// Mount `component` with the base props overlaid by `spread`. Returns
    /// `false` when the surface refused it and the error view went up instead.
    pub fn mount(&mut self, component: &dyn Component, spread: &Props) -> bool {
        let props = merge_props(&self.base_props, spread);
        match self.surface.mount(component, &props) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(component = component.name(), error = %e, "mount failed");
                self.events.error(e);
                self.mount_error();
                false
            }
        }
    }

    pub fn mount_loading(&mut self, message: Option<&str>) {
        let mut spread = Props::new();
        if let Some(message) = message {
            spread.insert("message".into(), Value::String(message.to_string()));
        }
        self.mount(&LoadingView, &spread);
    }

    /// Mount the error view. A surface that refuses even this is only logged.
    pub fn mount_error(&mut self) {
        let props = self.base_props.clone();
        if let Err(e) = self.surface.mount(&ErrorView, &props) {
            tracing::error!(error = %e, "failed to mount the error view");
        }
    }

    /// Render `fragment` with the component of its first registered module.
    /// Returns whether a component was found; failed modules count, as the
    /// error view is mounted in their place.
    pub fn render_fragment(&mut self, fragment: &Fragment) -> bool {
        let Some(pathname) = fragment
            .details
            .js
            .iter()
            .find(|p| self.executor.contains(p))
        else {
            tracing::debug!(fragment = %fragment.name, "no component to render");
            return false;
        };

        match self.executor.invoke(pathname) {
            Some(Ok(component)) => {
                tracing::debug!(fragment = %fragment.name, %pathname, "rendering");
                self.mount(component.as_ref(), &fragment.state);
            }
            Some(Err(e)) => {
                // Already reported by the executor.
                tracing::debug!(fragment = %fragment.name, %pathname, error = %e, "rendering fallback");
                self.mount_error();
            }
            None => return false,
        }
        true
    }
}

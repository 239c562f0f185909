use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::RenderError;
use crate::view::{Component, Node, Props};

/// The capability that turns a component and its props into visible output.
pub trait RenderSurface: Send {
    fn mount(&mut self, component: &dyn Component, props: &Props) -> Result<(), RenderError>;
}

#[derive(Debug, Default)]
struct SurfaceState {
    root: Option<Node>,
    mounted: Option<String>,
    mounts: usize,
}

/// Surface that keeps the latest mounted tree in memory.
///
/// Clones share the same state, so a host can hand one clone to the session
/// and read the output through another.
#[derive(Clone, Debug, Default)]
pub struct MemorySurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<Node> {
        self.state.lock().root.clone()
    }

    /// HTML of the current tree, empty before the first mount.
    pub fn html(&self) -> String {
        self.state
            .lock()
            .root
            .as_ref()
            .map(Node::to_html)
            .unwrap_or_default()
    }

    /// Name of the component mounted last.
    pub fn mounted(&self) -> Option<String> {
        self.state.lock().mounted.clone()
    }

    pub fn mount_count(&self) -> usize {
        self.state.lock().mounts
    }
}

impl RenderSurface for MemorySurface {
    fn mount(&mut self, component: &dyn Component, props: &Props) -> Result<(), RenderError> {
        // Render outside the lock; components are arbitrary code.
        let node = component.render(props)?;
        let mut state = self.state.lock();
        state.root = Some(node);
        state.mounted = Some(component.name().to_string());
        state.mounts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{ErrorView, LoadingView};

    struct Failing;

    impl Component for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn render(&self, _props: &Props) -> Result<Node, RenderError> {
            Err(RenderError::ForbiddenElement("script".into()))
        }
    }

    #[test]
    fn clones_share_output() {
        let surface = MemorySurface::new();
        let mut handle = surface.clone();
        assert_eq!(surface.html(), "");

        handle.mount(&LoadingView, &Props::new()).unwrap();
        assert!(surface.html().contains("Loading"));
        assert_eq!(surface.mounted().as_deref(), Some("LoadingView"));

        handle.mount(&ErrorView, &Props::new()).unwrap();
        assert!(surface.html().contains("error"));
        assert_eq!(surface.mount_count(), 2);
    }

    #[test]
    fn failed_render_leaves_previous_tree() {
        let surface = MemorySurface::new();
        let mut handle = surface.clone();
        handle.mount(&LoadingView, &Props::new()).unwrap();

        assert!(handle.mount(&Failing, &Props::new()).is_err());
        assert_eq!(surface.mounted().as_deref(), Some("LoadingView"));
        assert_eq!(surface.mount_count(), 1);
    }
}

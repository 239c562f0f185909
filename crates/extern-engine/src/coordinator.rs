use std::collections::{HashMap, HashSet};

use extern_core::fragment::Fragment;

struct FragmentNode {
    fragment: Fragment,
    loaded: bool,
    /// Render has fired for this fragment, whether or not it had a component to mount.
    rendered: bool,
}

/// Parent/child graph deciding when each fragment may render.
///
/// A fragment renders once it is loaded and its parent (if any) has rendered.
/// Whenever a fragment renders, its loaded children render again after it.
#[derive(Default)]
pub struct Coordinator {
    nodes: HashMap<String, FragmentNode>,
    /// Parent name to child names in registration order. Parents need not be
    /// registered yet.
    children: HashMap<String, Vec<String>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `fragment` to the graph. A name seen before is replaced and has to
    /// load again.
    pub fn register(&mut self, fragment: Fragment) {
        let name = fragment.name.clone();
        if let Some(previous) = self.nodes.remove(&name) {
            tracing::warn!(fragment = %name, "fragment declared twice, replacing");
            if let Some(parent) = previous.fragment.parent() {
                if let Some(siblings) = self.children.get_mut(parent) {
                    siblings.retain(|c| c != &name);
                }
            }
        }

        if let Some(parent) = fragment.parent() {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(name.clone());
        }

        self.nodes.insert(
            name,
            FragmentNode {
                fragment,
                loaded: false,
                rendered: false,
            },
        );
    }

    /// Record a successful load and return the fragments to render, in order.
    pub fn mark_loaded(&mut self, name: &str) -> Vec<String> {
        let Some(node) = self.nodes.get_mut(name) else {
            tracing::warn!(fragment = %name, "loaded signal for unknown fragment");
            return Vec::new();
        };
        node.loaded = true;
        self.try_render(name)
    }

    /// The render plan for `name`: empty unless it is loaded and its parent
    /// has rendered; otherwise `name` followed by its loaded descendants.
    pub fn try_render(&mut self, name: &str) -> Vec<String> {
        let mut plan = Vec::new();
        if self.can_render(name) {
            let mut visited = HashSet::new();
            self.cascade(name, &mut plan, &mut visited);
        } else {
            tracing::debug!(fragment = %name, "waiting for parent to render");
        }
        plan
    }

    fn can_render(&self, name: &str) -> bool {
        let Some(node) = self.nodes.get(name) else {
            return false;
        };
        node.loaded
            && match node.fragment.parent() {
                None => true,
                Some(parent) => self.is_rendered(parent),
            }
    }

    fn cascade(&mut self, name: &str, plan: &mut Vec<String>, visited: &mut HashSet<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(name) {
            node.rendered = true;
        }
        plan.push(name.to_string());

        let children = self.children.get(name).cloned().unwrap_or_default();
        for child in children {
            if self.is_loaded(&child) {
                tracing::debug!(parent = %name, child = %child, "parent rendered, rendering child");
                self.cascade(&child, plan, visited);
            }
        }
    }

    pub fn fragment(&self, name: &str) -> Option<&Fragment> {
        self.nodes.get(name).map(|n| &n.fragment)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.loaded)
    }

    pub fn is_rendered(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.rendered)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.children.clear();
    }
}

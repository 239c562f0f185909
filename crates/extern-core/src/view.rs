//! View nodes, the component contract and the two built-in placeholder views.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RenderError;

/// Render properties handed to a component.
pub type Props = serde_json::Map<String, Value>;

/// A rendered view tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<Node>,
    },
    Text {
        text: String,
    },
    /// Children without a wrapping element.
    Fragment {
        children: Vec<Node>,
    },
}

impl Node {
    pub fn element(tag: impl Into<String>, attributes: Vec<(String, String)>, children: Vec<Node>) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes,
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Serialize to HTML, escaping text and attribute values.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Text { text } => escape_into(out, text),
            Self::Fragment { children } => {
                for child in children {
                    child.write_html(out);
                }
            }
            Self::Element {
                tag,
                attributes,
                children,
            } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attributes {
                    let _ = write!(out, " {name}=\"");
                    escape_into(out, value);
                    out.push('"');
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    /// Concatenated text content of the tree.
    pub fn text_content(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Element { children, .. } | Self::Fragment { children } => {
                children.iter().map(Node::text_content).collect()
            }
        }
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

/// Something that turns props into a view tree.
pub trait Component: Send + Sync {
    /// Display name, used in logs and error reports.
    fn name(&self) -> &str;

    fn render(&self, props: &Props) -> Result<Node, RenderError>;
}

/// Shallow merge: keys of `spread` override keys of `base`.
pub fn merge_props(base: &Props, spread: &Props) -> Props {
    let mut merged = base.clone();
    for (key, value) in spread {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Placeholder mounted while the first fragments are on their way.
#[derive(Clone, Debug, Default)]
pub struct LoadingView;

impl LoadingView {
    pub const DEFAULT_MESSAGE: &'static str = "Loading, please wait.";
}

impl Component for LoadingView {
    fn name(&self) -> &str {
        "LoadingView"
    }

    fn render(&self, props: &Props) -> Result<Node, RenderError> {
        let message = props
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(Self::DEFAULT_MESSAGE);

        Ok(Node::element(
            "div",
            vec![("class".into(), "extern-loading".into())],
            vec![
                Node::element("i", vec![("class".into(), "extern-spinner".into())], vec![]),
                Node::text(message),
            ],
        ))
    }
}

/// Fallback for anything that failed to compile, execute or mount.
#[derive(Clone, Debug, Default)]
pub struct ErrorView;

impl Component for ErrorView {
    fn name(&self) -> &str {
        "ErrorView"
    }

    fn render(&self, _props: &Props) -> Result<Node, RenderError> {
        Ok(Node::element(
            "div",
            vec![("class".into(), "error".into())],
            vec![
                Node::element("h2", vec![], vec![Node::text("Yikes!")]),
                Node::element(
                    "p",
                    vec![],
                    vec![Node::text(
                        "Something's gone wrong, and we're working feverishly to fix the issue. \
                         Please wait a bit and try again.",
                    )],
                ),
            ],
        ))
    }
}

use extern_core::errors::RenderError;
use extern_core::view::Node;

const FORBIDDEN_TAGS: &[&str] = &["script", "iframe", "object", "embed"];
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "xlink:href"];
const SCRIPT_SCHEMES: &[&str] = &["javascript:", "vbscript:"];

/// Element factory handed to view modules. Refuses script elements, event
/// handler attributes and script URLs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ViewLibrary;

impl ViewLibrary {
    pub fn element(
        &self,
        tag: &str,
        attributes: Vec<(String, String)>,
        children: Vec<Node>,
    ) -> Result<Node, RenderError> {
        if FORBIDDEN_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return Err(RenderError::ForbiddenElement(tag.to_string()));
        }
        if let Some((name, _)) = attributes
            .iter()
            .find(|(name, value)| is_event_handler(name) || is_script_url(name, value))
        {
            return Err(RenderError::ForbiddenAttribute {
                tag: tag.to_string(),
                attribute: name.clone(),
            });
        }
        Ok(Node::element(tag, attributes, children))
    }

    pub fn text(&self, text: impl Into<String>) -> Node {
        Node::text(text)
    }
}

fn is_event_handler(attribute: &str) -> bool {
    attribute.len() > 2 && attribute.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

/// Browsers ignore ASCII whitespace and control characters inside the scheme.
fn is_script_url(attribute: &str, value: &str) -> bool {
    if !URL_ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(attribute)) {
        return false;
    }
    let scheme: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    SCRIPT_SCHEMES.iter().any(|s| scheme.starts_with(s))
}

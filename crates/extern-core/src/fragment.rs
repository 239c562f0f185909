use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::DecodeError;
use crate::view::Props;

/// Asset and ordering metadata attached to a fragment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentDetails {
    /// Fragment that must render before this one. `None` makes this a root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub css: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub js: Vec<String>,
    /// Global assets fetched before any of `css` / `js`.
    #[serde(deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
}

/// One named unit of page content streamed from the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: FragmentDetails,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: Props,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Fragment {
    /// Decode one raw record. A missing `details` block decodes to the empty default.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(raw).map_err(|e| DecodeError::new(&e, raw))
    }

    pub fn parent(&self) -> Option<&str> {
        self.details.parent.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.details.parent.is_none()
    }

    /// Fragment-local assets in load order: stylesheets first, then code.
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.details
            .css
            .iter()
            .chain(self.details.js.iter())
            .map(String::as_str)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.details.dependencies.iter().map(String::as_str)
    }
}

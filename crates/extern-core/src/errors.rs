use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport-level failures of the long-lived fragment stream.
/// Every variant ends the current connection and hands control to the backoff policy.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream interrupted: {0}")]
    Interrupted(String),
    #[error("stream idle for {0:?}")]
    IdleTimeout(Duration),
}

impl StreamError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "stream_connect",
            Self::Status { .. } => "stream_status",
            Self::Interrupted(_) => "stream_interrupted",
            Self::IdleTimeout(_) => "stream_idle_timeout",
        }
    }

    pub fn from_status(status: u16, body: String) -> Self {
        Self::Status { status, body }
    }
}

/// A record between two boundaries could not be turned into a fragment.
#[derive(Clone, Debug, thiserror::Error)]
#[error("failed to parse received JSON: {message}")]
pub struct DecodeError {
    pub message: String,
    /// Leading part of the offending record, for diagnostics.
    pub excerpt: String,
}

impl DecodeError {
    const EXCERPT_LEN: usize = 64;

    pub fn new(cause: &serde_json::Error, raw: &str) -> Self {
        let excerpt = match raw.char_indices().nth(Self::EXCERPT_LEN) {
            Some((idx, _)) => format!("{}...", &raw[..idx]),
            None => raw.to_string(),
        };
        Self {
            message: cause.to_string(),
            excerpt,
        }
    }
}

/// A single asset or module download failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("fetching {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("invalid asset url for {pathname}: {message}")]
    InvalidUrl { pathname: String, message: String },
}

impl AssetError {
    pub fn url(&self) -> &str {
        match self {
            Self::Status { url, .. } | Self::Network { url, .. } | Self::Timeout { url, .. } => url,
            Self::InvalidUrl { pathname, .. } => pathname,
        }
    }
}

/// Which of the two loading phases failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Dependencies,
    Assets,
}

impl std::fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Dependencies => "dependencies",
            Self::Assets => "assets",
        })
    }
}

/// A fragment's resources could not be loaded; carries the first failure of the phase.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to load {phase} for {fragment}: {source}")]
pub struct LoadError {
    pub fragment: String,
    pub phase: LoadPhase,
    #[source]
    pub source: AssetError,
}

/// A view module's source text could not be turned into an execution unit.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to compile {pathname} at {line}:{column}: {message}")]
pub struct CompileError {
    pub pathname: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Running a compiled view module failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("{pathname}: cannot resolve module {specifier:?}")]
    UnresolvedImport { pathname: String, specifier: String },
    #[error("{pathname} did not export a component")]
    NoExport { pathname: String },
}

/// Producing or mounting a view failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("element <{0}> is not allowed")]
    ForbiddenElement(String),
    #[error("attribute {attribute:?} on <{tag}> is not allowed")]
    ForbiddenAttribute { tag: String, attribute: String },
    #[error("render surface rejected {component}: {message}")]
    Surface { component: String, message: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Umbrella for everything surfaced on the session error signal.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ExternError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    AssetLoad(#[from] LoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),
}

impl ExternError {
    /// Short classification string for logging and the session error signal.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Decode(_) => "decode",
            Self::AssetLoad(_) => "asset_load",
            Self::Compile(_) => "compile",
            Self::Execution(_) => "execution",
            Self::Render(_) => "render",
            Self::ReconnectExhausted(_) => "reconnect_exhausted",
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::ExternError;
use crate::view::Props;

/// Per-fragment signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Loaded,
    Render,
    Rendered,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Render => "render",
            Self::Rendered => "rendered",
        }
    }
}

/// A `"<fragment-name>:<event>"` key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub fragment: String,
    pub kind: TopicKind,
}

impl Topic {
    pub fn new(fragment: impl Into<String>, kind: TopicKind) -> Self {
        Self {
            fragment: fragment.into(),
            kind,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fragment, self.kind.as_str())
    }
}

/// Lightweight error info carried on the session error signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&ExternError> for ErrorInfo {
    fn from(e: &ExternError) -> Self {
        Self {
            kind: e.error_kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Everything a host can observe about a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Loading of a fragment's assets finished; `error` is set when the asset phase failed.
    Loaded {
        fragment: String,
        error: Option<ErrorInfo>,
    },
    Render {
        fragment: String,
    },
    Rendered {
        fragment: String,
        state: Props,
    },
    Error {
        error: ErrorInfo,
    },
    /// The stream ended, cleanly or not.
    Done,
    Reconnecting {
        attempt: u32,
        delay_ms: u64,
    },
    Destroyed,
}

impl SessionEvent {
    /// The per-fragment topic of this event, if it has one.
    pub fn topic(&self) -> Option<Topic> {
        match self {
            Self::Loaded { fragment, .. } => Some(Topic::new(fragment.clone(), TopicKind::Loaded)),
            Self::Render { fragment } => Some(Topic::new(fragment.clone(), TopicKind::Render)),
            Self::Rendered { fragment, .. } => Some(Topic::new(fragment.clone(), TopicKind::Rendered)),
            _ => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::Render { .. } => "render",
            Self::Rendered { .. } => "rendered",
            Self::Error { .. } => "error",
            Self::Done => "done",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Destroyed => "destroyed",
        }
    }

    pub fn error(error: &ExternError) -> Self {
        Self::Error {
            error: ErrorInfo::from(error),
        }
    }
}

/// Cloneable broadcast handle used by every session component to publish events.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventSink {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SessionEvent) {
        if let Some(topic) = event.topic() {
            tracing::trace!(topic = %topic, "emit");
        }
        let _ = self.tx.send(event);
    }

    /// Log and publish a failure on the session error signal.
    pub fn error(&self, error: impl Into<ExternError>) {
        let error = error.into();
        tracing::warn!(kind = error.error_kind(), error = %error, "session error");
        self.emit(SessionEvent::error(&error));
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StreamError;

    #[test]
    fn topic_display() {
        assert_eq!(Topic::new("foo", TopicKind::Loaded).to_string(), "foo:loaded");
        assert_eq!(Topic::new("nav", TopicKind::Rendered).to_string(), "nav:rendered");
    }

    #[test]
    fn event_topics() {
        let evt = SessionEvent::Render { fragment: "a".into() };
        assert_eq!(evt.topic().unwrap().to_string(), "a:render");
        assert!(SessionEvent::Done.topic().is_none());
        assert_eq!(SessionEvent::Done.event_type(), "done");
    }

    #[test]
    fn error_info_from_extern_error() {
        let err = ExternError::from(StreamError::Connect("refused".into()));
        let info = ErrorInfo::from(&err);
        assert_eq!(info.kind, "stream");
        assert!(info.message.contains("refused"));
    }

    #[tokio::test]
    async fn sink_delivers_to_subscribers() {
        let sink = EventSink::default();
        sink.emit(SessionEvent::Done); // no subscribers yet, dropped
        let mut rx = sink.subscribe();
        sink.error(StreamError::Interrupted("eof".into()));
        match rx.recv().await.unwrap() {
            SessionEvent::Error { error } => assert_eq!(error.kind, "stream"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn serde_tagging() {
        let evt = SessionEvent::Loaded {
            fragment: "foo".into(),
            error: None,
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "loaded");
        assert_eq!(json["fragment"], "foo");
    }
}

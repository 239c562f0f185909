use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use extern_client::{BackoffConfig, ChunkStream, Collaborators, ConnectionSupervisor, ExternConfig, StreamClient};
use extern_core::errors::StreamError;
use extern_core::events::SessionEvent;
use extern_core::surface::MemorySurface;
use extern_engine::mock::MockFetcher;
use extern_engine::{ComponentRegistry, DEFAULT_BOUNDARY};

type Chunk = Result<String, StreamError>;

/// What the next `open` call does.
enum Script {
    Refuse(StreamError),
    Chunks(Vec<Chunk>),
    Live(mpsc::Receiver<Chunk>),
}

/// Stream client that plays back one script per connection and then hangs.
#[derive(Default)]
struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    opened: AtomicUsize,
}

impl ScriptedClient {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            opened: AtomicUsize::new(0),
        })
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamClient for ScriptedClient {
    async fn open(&self, _url: &Url) -> Result<ChunkStream, StreamError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script::Refuse(e)) => Err(e),
            Some(Script::Chunks(chunks)) => Ok(futures::stream::iter(chunks).boxed()),
            Some(Script::Live(rx)) => Ok(ReceiverStream::new(rx).boxed()),
            None => Ok(futures::stream::pending::<Chunk>().boxed()),
        }
    }
}

fn live() -> (mpsc::Sender<Chunk>, Script) {
    let (tx, rx) = mpsc::channel(16);
    (tx, Script::Live(rx))
}

fn refused() -> Script {
    Script::Refuse(StreamError::Connect("connection refused".into()))
}

fn record(raw: &str) -> String {
    format!("{raw}{DEFAULT_BOUNDARY}")
}

fn fast_backoff(retries: u32) -> BackoffConfig {
    BackoffConfig {
        min: 100,
        max: 1_000,
        factor: 2.0,
        jitter: 0.0,
        retries,
    }
}

struct Fixture {
    supervisor: ConnectionSupervisor,
    client: Arc<ScriptedClient>,
    surface: MemorySurface,
    rx: broadcast::Receiver<SessionEvent>,
}

/// Builds a manual supervisor, subscribes, then opens unless `manual`.
fn fixture(scripts: Vec<Script>, fetcher: MockFetcher, config: ExternConfig) -> Fixture {
    let manual = config.manual;
    let client = ScriptedClient::new(scripts);
    let fetcher = Arc::new(fetcher);
    let surface = MemorySurface::new();
    let parts = Collaborators {
        stream: client.clone(),
        assets: fetcher.clone(),
        modules: fetcher,
        surface: Box::new(surface.clone()),
        registry: Arc::new(ComponentRegistry::new()),
    };
    let url = Url::parse("https://site.test/page").unwrap();
    let supervisor = ConnectionSupervisor::new(url, ExternConfig { manual: true, ..config }, parts).unwrap();
    let rx = supervisor.subscribe();
    if !manual {
        assert!(supervisor.open());
    }
    Fixture {
        supervisor,
        client,
        surface,
        rx,
    }
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn events(rx: &mut broadcast::Receiver<SessionEvent>, n: usize) -> Vec<SessionEvent> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(next_event(rx).await);
    }
    out
}

fn error_kind(event: &SessionEvent) -> Option<&str> {
    match event {
        SessionEvent::Error { error } => Some(error.kind.as_str()),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn auto_open_renders_streamed_fragment() {
    let (tx, script) = live();
    let client = ScriptedClient::new(vec![script]);
    let fetcher = Arc::new(MockFetcher::new().module("/a.js", "export <div>X {greeting}</div>"));
    let surface = MemorySurface::new();
    let parts = Collaborators {
        stream: client.clone(),
        assets: fetcher.clone(),
        modules: fetcher.clone(),
        surface: Box::new(surface.clone()),
        registry: Arc::new(ComponentRegistry::new()),
    };

    let supervisor = ConnectionSupervisor::new(
        Url::parse("https://site.test/page").unwrap(),
        ExternConfig::default(),
        parts,
    )
    .unwrap();
    let mut rx = supervisor.subscribe();
    assert_eq!(surface.mounted().as_deref(), Some("LoadingView"));
    assert!(supervisor.is_running());

    tx.send(Ok(record(r#"{"name":"root","details":{"js":["/a.js"]},"state":{"greeting":"hi"}}"#)))
        .await
        .unwrap();

    let got = events(&mut rx, 3).await;
    assert!(matches!(&got[0], SessionEvent::Loaded { fragment, error: None } if fragment == "root"));
    assert_eq!(got[1], SessionEvent::Render { fragment: "root".into() });
    assert!(matches!(&got[2], SessionEvent::Rendered { fragment, .. } if fragment == "root"));
    assert_eq!(surface.html(), "<div>X hi</div>");
    assert_eq!(client.opened(), 1);
    assert_eq!(fetcher.request_count("/a.js"), 1);
}

#[tokio::test(start_paused = true)]
async fn loading_message_is_mounted_at_construction() {
    let f = fixture(
        vec![],
        MockFetcher::new(),
        ExternConfig {
            manual: true,
            loading: Some("Fetching page".into()),
            ..Default::default()
        },
    );
    assert_eq!(f.surface.mounted().as_deref(), Some("LoadingView"));
    assert!(f.surface.html().contains("Fetching page"));
}

#[tokio::test(start_paused = true)]
async fn manual_mode_waits_for_open() {
    let f = fixture(
        vec![],
        MockFetcher::new(),
        ExternConfig {
            manual: true,
            ..Default::default()
        },
    );
    tokio::task::yield_now().await;
    assert_eq!(f.client.opened(), 0);
    assert!(!f.supervisor.is_running());

    assert!(f.supervisor.open());
    assert!(!f.supervisor.open(), "second open while connected");

    tokio::time::timeout(Duration::from_secs(1), async {
        while f.client.opened() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(f.client.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_connections_back_off_exponentially() {
    let mut f = fixture(
        vec![refused(), refused()],
        MockFetcher::new(),
        ExternConfig {
            backoff: fast_backoff(5),
            ..Default::default()
        },
    );

    let got = events(&mut f.rx, 6).await;
    assert_eq!(error_kind(&got[0]), Some("stream"));
    assert_eq!(got[1], SessionEvent::Done);
    assert_eq!(got[2], SessionEvent::Reconnecting { attempt: 1, delay_ms: 100 });
    assert_eq!(error_kind(&got[3]), Some("stream"));
    assert_eq!(got[4], SessionEvent::Done);
    assert_eq!(got[5], SessionEvent::Reconnecting { attempt: 2, delay_ms: 200 });

    assert_eq!(f.surface.mounted().as_deref(), Some("ErrorView"));
}

#[tokio::test(start_paused = true)]
async fn clean_end_resets_backoff() {
    let mut f = fixture(
        vec![refused(), Script::Chunks(vec![]), refused()],
        MockFetcher::new(),
        ExternConfig {
            backoff: fast_backoff(5),
            ..Default::default()
        },
    );

    let got = events(&mut f.rx, 8).await;
    assert_eq!(got[2], SessionEvent::Reconnecting { attempt: 1, delay_ms: 100 });
    // the clean end emits no error
    assert_eq!(got[3], SessionEvent::Done);
    assert_eq!(got[4], SessionEvent::Reconnecting { attempt: 1, delay_ms: 100 });
    assert_eq!(error_kind(&got[5]), Some("stream"));
    assert_eq!(got[6], SessionEvent::Done);
    assert_eq!(got[7], SessionEvent::Reconnecting { attempt: 2, delay_ms: 200 });
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_retries() {
    let mut f = fixture(
        vec![refused(), refused(), refused()],
        MockFetcher::new(),
        ExternConfig {
            backoff: fast_backoff(2),
            ..Default::default()
        },
    );

    let got = events(&mut f.rx, 9).await;
    assert_eq!(got[5], SessionEvent::Reconnecting { attempt: 2, delay_ms: 200 });
    assert_eq!(got[7], SessionEvent::Done);
    assert_eq!(error_kind(&got[8]), Some("reconnect_exhausted"));

    f.supervisor.closed().await;
    assert!(!f.supervisor.is_running());
    assert_eq!(f.client.opened(), 3);
    assert!(!f.supervisor.is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn status_errors_also_reconnect() {
    let mut f = fixture(
        vec![Script::Refuse(StreamError::from_status(404, "not found".into()))],
        MockFetcher::new(),
        ExternConfig {
            backoff: fast_backoff(3),
            ..Default::default()
        },
    );

    let got = events(&mut f.rx, 3).await;
    match &got[0] {
        SessionEvent::Error { error } => assert!(error.message.contains("404")),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(got[2], SessionEvent::Reconnecting { attempt: 1, delay_ms: 100 });
}

#[tokio::test(start_paused = true)]
async fn chunk_error_ends_connection_with_error_view() {
    let mut f = fixture(
        vec![Script::Chunks(vec![
            Ok(record(r#"{"name":"a"}"#)),
            Err(StreamError::Interrupted("connection reset".into())),
        ])],
        MockFetcher::new(),
        ExternConfig {
            backoff: fast_backoff(3),
            ..Default::default()
        },
    );

    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut f.rx).await;
        let done = event == SessionEvent::Done;
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::Loaded { fragment, .. } if fragment == "a")));
    assert!(seen.iter().any(|e| error_kind(e) == Some("stream")));
    assert_eq!(f.surface.mounted().as_deref(), Some("ErrorView"));
}

#[tokio::test(start_paused = true)]
async fn bad_record_does_not_end_the_stream() {
    let (tx, script) = live();
    let mut f = fixture(vec![script], MockFetcher::new(), ExternConfig::default());

    tx.send(Ok(record("{oops"))).await.unwrap();
    tx.send(Ok(record(r#"{"name":"foo"}"#))).await.unwrap();

    let got = events(&mut f.rx, 2).await;
    assert_eq!(error_kind(&got[0]), Some("decode"));
    assert_eq!(
        got[1],
        SessionEvent::Loaded {
            fragment: "foo".into(),
            error: None
        }
    );
    assert_eq!(f.client.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn partial_record_is_dropped_on_reconnect() {
    let (first_tx, first) = live();
    let (second_tx, second) = live();
    let mut f = fixture(
        vec![first, second],
        MockFetcher::new(),
        ExternConfig {
            backoff: fast_backoff(3),
            ..Default::default()
        },
    );

    first_tx.send(Ok(r#"{"name":"par"#.to_string())).await.unwrap();
    drop(first_tx);

    let got = events(&mut f.rx, 2).await;
    assert_eq!(got[0], SessionEvent::Done);
    assert_eq!(got[1], SessionEvent::Reconnecting { attempt: 1, delay_ms: 100 });

    second_tx.send(Ok(record(r#"{"name":"b"}"#))).await.unwrap();
    assert_eq!(
        next_event(&mut f.rx).await,
        SessionEvent::Loaded {
            fragment: "b".into(),
            error: None
        }
    );
}

#[tokio::test(start_paused = true)]
async fn destroy_is_idempotent() {
    let (tx, script) = live();
    let mut f = fixture(vec![script], MockFetcher::new(), ExternConfig::default());
    tokio::time::timeout(Duration::from_secs(1), async {
        while f.client.opened() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert!(f.supervisor.destroy());
    assert!(!f.supervisor.destroy());
    assert!(f.supervisor.is_destroyed());
    assert_eq!(next_event(&mut f.rx).await, SessionEvent::Destroyed);

    f.supervisor.closed().await;
    assert!(!f.supervisor.open());
    // the driver dropped the stream
    assert!(tx.is_closed());
    assert!(f.rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn destroy_before_open_releases_session() {
    let f = fixture(
        vec![],
        MockFetcher::new(),
        ExternConfig {
            manual: true,
            ..Default::default()
        },
    );
    assert!(f.supervisor.destroy());
    assert!(!f.supervisor.open());
    f.supervisor.closed().await;
    assert_eq!(f.client.opened(), 0);
}

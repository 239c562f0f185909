//! Connection lifecycle: open the fragment stream, feed it to the session,
//! reconnect with backoff, tear everything down on destroy.
//!
//! All session state lives on a single driver task while connected. Loads
//! returned by the session are polled on the same task, so completions are
//! applied in between stream reads and never concurrently with them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use extern_core::errors::{ExternError, StreamError};
use extern_core::events::{EventSink, SessionEvent};
use extern_core::surface::RenderSurface;
use extern_engine::{
    AssetFetcher, AssetLoader, BoundaryParser, ComponentRegistry, Compositor, LoadTask, ModuleExecutor,
    ModuleFetcher, Session,
};

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, ExternConfig};
use crate::errors::Result;
use crate::http::HttpAssetFetcher;
use crate::stream::{HttpStreamClient, StreamClient};

/// External pieces a supervisor is assembled from.
pub struct Collaborators {
    pub stream: Arc<dyn StreamClient>,
    pub assets: Arc<dyn AssetFetcher>,
    pub modules: Arc<dyn ModuleFetcher>,
    pub surface: Box<dyn RenderSurface>,
    /// Host components importable by view modules.
    pub registry: Arc<ComponentRegistry>,
}

impl Collaborators {
    /// reqwest-backed transport configured from `config`.
    pub fn http(config: &ExternConfig, surface: Box<dyn RenderSurface>) -> Self {
        let fetcher = Arc::new(HttpAssetFetcher::new(config.timeout()));
        Self {
            stream: Arc::new(HttpStreamClient::new(config.idle_timeout())),
            assets: fetcher.clone(),
            modules: fetcher,
            surface,
            registry: Arc::new(ComponentRegistry::new()),
        }
    }
}

struct Inner {
    url: Url,
    client: Arc<dyn StreamClient>,
    backoff: BackoffConfig,
    events: EventSink,
    cancel: CancellationToken,
    destroyed: AtomicBool,
    /// The session while no driver owns it.
    idle: Mutex<Option<Session>>,
    running: watch::Sender<bool>,
}

/// Owns one fragment stream session.
///
/// Must be created inside a tokio runtime. Dropping the supervisor destroys
/// the session.
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

impl ConnectionSupervisor {
    /// Assemble the session, mount the loading view and, unless
    /// `config.manual` is set, connect.
    pub fn new(url: Url, config: ExternConfig, parts: Collaborators) -> Result<Self> {
        config.validate()?;
        let cdn = config.cdn_url(&url)?;

        let events = EventSink::default();
        let executor = Arc::new(ModuleExecutor::with_registry(parts.registry, events.clone()));
        let loader = AssetLoader::new(&cdn, parts.assets, parts.modules, executor.clone());
        let compositor = Compositor::new(executor, parts.surface, config.props.clone(), events.clone());
        let parser = BoundaryParser::with_boundary(config.boundary.clone());

        let mut session = Session::new(parser, loader, compositor, events.clone());
        session.mount_loading(config.loading.as_deref());

        let (running, _) = watch::channel(false);
        let supervisor = Self {
            inner: Arc::new(Inner {
                url,
                client: parts.stream,
                backoff: config.backoff.clone(),
                events,
                cancel: CancellationToken::new(),
                destroyed: AtomicBool::new(false),
                idle: Mutex::new(Some(session)),
                running,
            }),
        };

        if !config.manual {
            supervisor.open();
        }
        Ok(supervisor)
    }

    /// Start the driver. Returns `false` when already connected or destroyed.
    pub fn open(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        let Some(session) = self.inner.idle.lock().take() else {
            tracing::debug!(url = %self.inner.url, "already open");
            return false;
        };

        self.inner.running.send_replace(true);
        let span = tracing::info_span!("supervisor", url = %self.inner.url);
        tokio::spawn(drive(self.inner.clone(), session).instrument(span));
        true
    }

    /// Tear down the stream and release all session state. Only the first
    /// call has any effect and returns `true`.
    pub fn destroy(&self) -> bool {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!(url = %self.inner.url, "destroying session");
        self.inner.cancel.cancel();
        drop(self.inner.idle.lock().take());
        self.inner.events.emit(SessionEvent::Destroyed);
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventSink {
        &self.inner.events
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    /// Resolves once no driver is running: retries were exhausted or the
    /// session was destroyed.
    pub async fn closed(&self) {
        let mut rx = self.inner.running.subscribe();
        let _ = rx.wait_for(|running| !running).await;
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.destroy();
    }
}

enum Exit {
    Cancelled,
    Exhausted,
}

async fn drive(inner: Arc<Inner>, mut session: Session) {
    let mut loads: FuturesUnordered<LoadTask> = FuturesUnordered::new();
    let exit = run(&inner, &mut session, &mut loads).await;

    match exit {
        Exit::Cancelled => {
            tracing::debug!(pending_loads = loads.len(), "driver cancelled");
            drop(loads);
            session.reset();
        }
        Exit::Exhausted => {
            if drain(&inner, &mut session, &mut loads).await {
                session.reset();
            } else {
                let mut idle = inner.idle.lock();
                if !inner.destroyed.load(Ordering::SeqCst) {
                    *idle = Some(session);
                }
            }
        }
    }
    inner.running.send_replace(false);
}

async fn run(inner: &Inner, session: &mut Session, loads: &mut FuturesUnordered<LoadTask>) -> Exit {
    let mut backoff = Backoff::new(inner.backoff.clone());

    loop {
        let result = match connection(inner, session, loads).await {
            Some(result) => result,
            None => return Exit::Cancelled,
        };

        match result {
            Ok(()) => {
                tracing::info!("stream ended");
                backoff.reset();
            }
            Err(e) => {
                inner.events.error(e);
                session.mount_error();
            }
        }
        inner.events.emit(SessionEvent::Done);

        let Some(delay) = backoff.next_delay() else {
            inner.events.error(ExternError::ReconnectExhausted(backoff.retries()));
            return Exit::Exhausted;
        };
        let attempt = backoff.attempt();
        let delay_ms = delay.as_millis() as u64;
        tracing::info!(attempt, delay_ms, "reconnecting");
        inner.events.emit(SessionEvent::Reconnecting { attempt, delay_ms });
        session.discard_buffer();

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => return Exit::Cancelled,
                Some(outcome) = loads.next(), if !loads.is_empty() => session.complete(outcome),
                _ = &mut sleep => break,
            }
        }
    }
}

/// One connection from open to end. `None` when cancelled.
async fn connection(
    inner: &Inner,
    session: &mut Session,
    loads: &mut FuturesUnordered<LoadTask>,
) -> Option<std::result::Result<(), StreamError>> {
    let open = inner.client.open(&inner.url);
    tokio::pin!(open);
    let opened = loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return None,
            Some(outcome) = loads.next(), if !loads.is_empty() => session.complete(outcome),
            opened = &mut open => break opened,
        }
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => return Some(Err(e)),
    };
    tracing::debug!("connected");

    let result = loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return None,
            Some(outcome) = loads.next(), if !loads.is_empty() => session.complete(outcome),
            chunk = stream.next() => match chunk {
                Some(Ok(text)) => loads.extend(session.ingest(&text)),
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            },
        }
    };
    Some(result)
}

/// Finish outstanding loads after the last connection. `true` when cancelled.
async fn drain(inner: &Inner, session: &mut Session, loads: &mut FuturesUnordered<LoadTask>) -> bool {
    while !loads.is_empty() {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return true,
            Some(outcome) = loads.next() => session.complete(outcome),
        }
    }
    false
}

//! Render ordering over arbitrary fragment trees, arrival orders and chunkings.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use url::Url;

use extern_core::events::{EventSink, SessionEvent};
use extern_core::surface::MemorySurface;
use extern_core::view::Props;
use extern_engine::mock::MockFetcher;
use extern_engine::{
    AssetLoader, BoundaryParser, ComponentRegistry, Compositor, ModuleExecutor, Session, DEFAULT_BOUNDARY,
};

const FRAGMENTS: usize = 6;

fn session(fetcher: MockFetcher, events: EventSink) -> Session {
    let fetcher = Arc::new(fetcher);
    let executor = Arc::new(ModuleExecutor::with_registry(
        Arc::new(ComponentRegistry::new()),
        events.clone(),
    ));
    let loader = AssetLoader::new(
        &Url::parse("https://cdn.test/").unwrap(),
        fetcher.clone(),
        fetcher,
        executor.clone(),
    );
    let compositor = Compositor::new(executor, Box::new(MemorySurface::new()), Props::new(), events.clone());
    Session::new(BoundaryParser::new(), loader, compositor, events)
}

fn chunks(stream: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = stream.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fragments_render_after_loaded_and_parent(
        parents in proptest::collection::vec(any::<proptest::sample::Index>(), FRAGMENTS - 1),
        order in Just((0..FRAGMENTS).collect::<Vec<_>>()).prop_shuffle(),
        chunk_size in 1usize..48,
    ) {
        let parent_of = |i: usize| (i > 0).then(|| parents[i - 1].index(i));

        let mut fetcher = MockFetcher::new();
        for i in 0..FRAGMENTS {
            fetcher = fetcher.module(&format!("/f{i}.js"), &format!("export <p>f{i}</p>"));
        }

        let stream: String = order
            .iter()
            .map(|&i| {
                let parent = match parent_of(i) {
                    Some(p) => format!(r#","parent":"f{p}""#),
                    None => String::new(),
                };
                format!(r#"{{"name":"f{i}","details":{{"js":["/f{i}.js"]{parent}}}}}{DEFAULT_BOUNDARY}"#)
            })
            .collect();

        let events = EventSink::new(4096);
        let mut rx = events.subscribe();
        let mut session = session(fetcher, events);

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            for chunk in chunks(&stream, chunk_size) {
                session.ingest_and_load(&chunk).await;
            }
        });

        let mut loaded = HashSet::new();
        let mut rendered = HashSet::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                SessionEvent::Loaded { fragment, error: None } => {
                    loaded.insert(fragment);
                }
                SessionEvent::Render { fragment } => {
                    prop_assert!(loaded.contains(&fragment), "{} rendered before loaded", fragment);
                    let i: usize = fragment[1..].parse().unwrap();
                    if let Some(p) = parent_of(i) {
                        prop_assert!(rendered.contains(&format!("f{p}")), "{} rendered before parent f{}", fragment, p);
                    }
                    rendered.insert(fragment);
                }
                SessionEvent::Error { error } => {
                    prop_assert!(false, "unexpected error: {}", error.message);
                }
                _ => {}
            }
        }
        prop_assert_eq!(rendered.len(), FRAGMENTS);
    }
}

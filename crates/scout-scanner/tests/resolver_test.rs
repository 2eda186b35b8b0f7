//! URL resolver cache, single-flight rediscovery and candidate verification.

mod common;

use chrono::Utc;
use common::{listing, captcha_page, CountingSearch, RuleReasoner, Site, SiteSessions, StubVerifier};
use scout_core::{Company, ResolvedUrl, UrlSource, WorkItemKey};
use scout_db::MemoryStore;
use scout_llm::Reasoner;
use scout_scanner::{BrowserVerifier, CandidateVerifier, PageClassifier, ResolveError, UrlResolver};
use std::sync::Arc;
use std::time::Duration;

fn key() -> WorkItemKey {
    WorkItemKey::new(Company::MerrillLynch, "Texas")
}

fn resolver(
    store: Arc<MemoryStore>,
    search: Arc<CountingSearch>,
    verifier: StubVerifier,
    reasoner: RuleReasoner,
) -> UrlResolver {
    UrlResolver::new(store, search, Arc::new(reasoner), Arc::new(verifier))
}

#[tokio::test]
async fn test_unknown_key_resolves_to_seed_without_search() {
    let search = CountingSearch::new(vec![vec!["https://x.example"]]);
    let resolver = resolver(
        Arc::new(MemoryStore::new()),
        search.clone(),
        StubVerifier::default(),
        RuleReasoner::default(),
    );

    let resolved = resolver.resolve(&key()).await.expect("seed");
    assert_eq!(resolved.url, Company::MerrillLynch.seed_url());
    assert_eq!(resolved.source, UrlSource::Seed);
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn test_warm_cache_serves_persisted_entry() {
    let entry = ResolvedUrl {
        key: key(),
        url: "https://advisor.ml.com/tx".to_string(),
        confirmed_at: Utc::now(),
        source: UrlSource::Discovered,
    };
    let search = CountingSearch::new(vec![vec![]]);
    let resolver = resolver(
        Arc::new(MemoryStore::with_urls(vec![entry])),
        search.clone(),
        StubVerifier::default(),
        RuleReasoner::default(),
    );

    assert_eq!(resolver.warm().await.expect("warm"), 1);
    let resolved = resolver.resolve(&key()).await.expect("cached");
    assert_eq!(resolved.url, "https://advisor.ml.com/tx");
    assert_eq!(resolved.source, UrlSource::Cache);
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn test_second_write_replaces_cache_entry() {
    let store = Arc::new(MemoryStore::new());
    let search = CountingSearch::new(vec![
        vec!["https://first.example/advisors"],
        vec!["https://second.example/advisors"],
    ]);
    let resolver = resolver(
        store.clone(),
        search.clone(),
        StubVerifier::default(),
        RuleReasoner::default(),
    );

    resolver.invalidate(&key());
    let first = resolver.rediscover(&key()).await.expect("first discovery");
    resolver.invalidate(&key());
    let second = resolver.resolve(&key()).await.expect("second discovery");

    assert_eq!(first.url, "https://first.example/advisors");
    assert_eq!(second.url, "https://second.example/advisors");
    assert_eq!(search.calls(), 2);
    assert_eq!(resolver.cache_len(), 1);
    assert_eq!(resolver.snapshot().len(), 1);

    let saved = store.urls();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].url, "https://second.example/advisors");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_rediscovery_searches_once() {
    let search = CountingSearch::with_delay(
        vec![vec!["https://advisor.ml.com/tx"]],
        Duration::from_secs(2),
    );
    let resolver = resolver(
        Arc::new(MemoryStore::new()),
        search.clone(),
        StubVerifier::default(),
        RuleReasoner::default(),
    );

    resolver.invalidate(&key());
    let (k1, k2) = (key(), key());
    let (a, b) = tokio::join!(resolver.rediscover(&k1), resolver.rediscover(&k2));

    assert_eq!(a.expect("first").url, "https://advisor.ml.com/tx");
    assert_eq!(b.expect("second").url, "https://advisor.ml.com/tx");
    assert_eq!(search.calls(), 1);
}

#[tokio::test]
async fn test_ranked_candidates_tried_before_search_order() {
    let verifier = StubVerifier::rejecting(&["https://recommended.example/dir"]);
    let search = CountingSearch::new(vec![vec![
        "/relative",
        "https://one.example/dir",
        "https://one.example/dir",
        "https://two.example/dir",
    ]]);
    let reasoner = RuleReasoner {
        recommended: Some("https://recommended.example/dir".to_string()),
        ..RuleReasoner::default()
    };
    let verifier = Arc::new(verifier);
    let resolver = UrlResolver::new(
        Arc::new(MemoryStore::new()),
        search,
        Arc::new(reasoner),
        verifier.clone(),
    );

    let found = resolver.rediscover(&key()).await.expect("discovered");
    assert_eq!(found.url, "https://one.example/dir");
    assert_eq!(found.source, UrlSource::Discovered);
    assert_eq!(
        *verifier.checked.lock().unwrap(),
        vec![
            "https://recommended.example/dir".to_string(),
            "https://one.example/dir".to_string()
        ]
    );
}

#[tokio::test]
async fn test_discovery_exhausted_keeps_stale_entry() {
    let search = CountingSearch::new(vec![vec!["https://a.example", "https://b.example"]]);
    let resolver = resolver(
        Arc::new(MemoryStore::new()),
        search,
        StubVerifier::rejecting(&["https://a.example", "https://b.example"]),
        RuleReasoner::default(),
    );

    resolver.invalidate(&key());
    let err = resolver.rediscover(&key()).await.expect_err("nothing verifies");
    match err {
        ResolveError::DiscoveryExhausted { examined, .. } => assert_eq!(examined, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        resolver.cached(&key()).map(|e| e.url),
        Some(Company::MerrillLynch.seed_url().to_string())
    );
}

#[tokio::test]
async fn test_browser_verifier_requires_usable_directory_page() {
    let site = Site::new();
    site.page("https://good.example/advisors", listing(&["Ann Lee"], None))
        .page("https://blocked.example/advisors", captcha_page())
        .page("https://blog.example/post", listing(&["Bo Chan"], None));
    let reasoner: Arc<dyn Reasoner> = Arc::new(RuleReasoner {
        not_a_directory: vec!["https://blog.example/post".to_string()],
        ..RuleReasoner::default()
    });
    let verifier = BrowserVerifier::new(
        Arc::new(SiteSessions(site)),
        Arc::new(PageClassifier::new(reasoner.clone())),
        reasoner,
    );

    assert!(verifier.verify(&key(), "https://good.example/advisors").await);
    assert!(!verifier.verify(&key(), "https://blocked.example/advisors").await);
    assert!(!verifier.verify(&key(), "https://blog.example/post").await);
    assert!(!verifier.verify(&key(), "https://unreachable.example").await);
}

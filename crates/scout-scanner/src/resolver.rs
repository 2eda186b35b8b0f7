//! Maps (company, state) to a directory entry URL and heals stale entries.
//!
//! The cache is a keyed store: reads never lock, and a discovery for one key
//! holds that key's async mutex so at most one search-and-reason procedure
//! runs per key. Callers that queued behind a running discovery reuse its
//! result instead of searching again.

use crate::error::ResolveError;
use crate::search::SearchProvider;
use crate::verifier::CandidateVerifier;
use chrono::Utc;
use dashmap::DashMap;
use scout_core::{ResolvedUrl, UrlSource, WorkItemKey};
use scout_db::UrlCacheStore;
use scout_llm::Reasoner;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

const RANK_PROMPT: &str = r#"I'm looking for the official financial advisor directory (advisor search page) of a company.
Below are web search results. Identify the best URL for finding the company's advisors by location.
Prefer official company pages that allow searching advisors by location; avoid third-party sites
and general company pages.

Respond with JSON:
{
    "recommended_url": "the best URL found",
    "confidence": "high|medium|low",
    "reasoning": "why this URL is the best choice",
    "alternative_urls": ["other potential URLs, best first"]
}"#;

#[derive(Debug, Clone)]
struct CacheSlot {
    entry: ResolvedUrl,
    invalidated: bool,
    /// Bumped on every successful discovery for the key
    generation: u64,
}

/// URL resolver with a persisted, per-key locked cache.
pub struct UrlResolver {
    cache: DashMap<WorkItemKey, CacheSlot>,
    locks: DashMap<WorkItemKey, Arc<Mutex<()>>>,
    store: Arc<dyn UrlCacheStore>,
    search: Arc<dyn SearchProvider>,
    reasoner: Arc<dyn Reasoner>,
    verifier: Arc<dyn CandidateVerifier>,
    max_candidates: usize,
}

impl UrlResolver {
    /// Create a resolver with an empty in-memory cache.
    #[must_use]
    pub fn new(
        store: Arc<dyn UrlCacheStore>,
        search: Arc<dyn SearchProvider>,
        reasoner: Arc<dyn Reasoner>,
        verifier: Arc<dyn CandidateVerifier>,
    ) -> Self {
        Self {
            cache: DashMap::new(),
            locks: DashMap::new(),
            store,
            search,
            reasoner,
            verifier,
            max_candidates: 5,
        }
    }

    /// Bound the number of candidates verified per discovery.
    #[must_use]
    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    /// Load persisted entries into the cache; returns how many were loaded.
    pub async fn warm(&self) -> Result<usize, ResolveError> {
        let entries = self.store.load_all().await?;
        let count = entries.len();
        for entry in entries {
            self.cache.insert(
                entry.key.clone(),
                CacheSlot {
                    entry,
                    invalidated: false,
                    generation: 0,
                },
            );
        }
        tracing::info!(count, "URL cache loaded");
        Ok(count)
    }

    /// Entry URL for a key.
    ///
    /// A valid cache entry is returned without network activity. A key with
    /// no entry falls back to the company's seed URL. An invalidated entry
    /// triggers rediscovery.
    pub async fn resolve(&self, key: &WorkItemKey) -> Result<ResolvedUrl, ResolveError> {
        let cached = self.cache.get(key).map(|slot| slot.value().clone());
        match cached {
            Some(slot) if !slot.invalidated => Ok(ResolvedUrl {
                source: UrlSource::Cache,
                ..slot.entry
            }),
            Some(_) => self.rediscover(key).await,
            None => Ok(ResolvedUrl {
                key: key.clone(),
                url: key.company.seed_url().to_string(),
                confirmed_at: Utc::now(),
                source: UrlSource::Seed,
            }),
        }
    }

    /// Mark the entry for `key` stale. The entry is kept, never deleted.
    pub fn invalidate(&self, key: &WorkItemKey) {
        self.cache
            .entry(key.clone())
            .and_modify(|slot| slot.invalidated = true)
            .or_insert_with(|| CacheSlot {
                entry: ResolvedUrl {
                    key: key.clone(),
                    url: key.company.seed_url().to_string(),
                    confirmed_at: Utc::now(),
                    source: UrlSource::Seed,
                },
                invalidated: true,
                generation: 0,
            });
        tracing::info!(key = %key, "Entry URL invalidated");
    }

    /// Search for a new entry URL, verify it and overwrite the cache entry.
    pub async fn rediscover(&self, key: &WorkItemKey) -> Result<ResolvedUrl, ResolveError> {
        let seen_generation = self.generation(key);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller finished a discovery for this key while we queued
        if let Some(slot) = self.cache.get(key) {
            if slot.generation > seen_generation && !slot.invalidated {
                tracing::debug!(key = %key, "Reusing concurrent discovery result");
                return Ok(slot.entry.clone());
            }
        }

        tracing::info!(key = %key, "Rediscovering directory entry URL");
        let candidates = self.candidates(key).await;
        let mut examined = 0;

        for url in candidates {
            examined += 1;
            if !self.verifier.verify(key, &url).await {
                continue;
            }

            let entry = ResolvedUrl {
                key: key.clone(),
                url,
                confirmed_at: Utc::now(),
                source: UrlSource::Discovered,
            };
            if let Err(e) = self.store.save(&entry).await {
                tracing::warn!(key = %key, error = %e, "Failed to persist discovered URL");
            }
            self.cache.insert(
                key.clone(),
                CacheSlot {
                    entry: entry.clone(),
                    invalidated: false,
                    generation: seen_generation.max(self.generation(key)) + 1,
                },
            );
            tracing::info!(key = %key, url = %entry.url, examined, "Discovered entry URL");
            return Ok(entry);
        }

        tracing::warn!(key = %key, examined, "Discovery exhausted");
        Err(ResolveError::DiscoveryExhausted {
            company: key.company,
            state: key.state.clone(),
            examined,
        })
    }

    /// Number of cached keys.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Cached entry for a key, whether or not it is invalidated.
    #[must_use]
    pub fn cached(&self, key: &WorkItemKey) -> Option<ResolvedUrl> {
        self.cache.get(key).map(|slot| slot.entry.clone())
    }

    /// All cached entries that are not seeds.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResolvedUrl> {
        let mut entries: Vec<ResolvedUrl> = self
            .cache
            .iter()
            .filter(|slot| slot.entry.source != UrlSource::Seed)
            .map(|slot| slot.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    fn generation(&self, key: &WorkItemKey) -> u64 {
        self.cache.get(key).map_or(0, |slot| slot.generation)
    }

    /// Ranked, de-duplicated, absolute http(s) candidates; at most `max_candidates`.
    async fn candidates(&self, key: &WorkItemKey) -> Vec<String> {
        let query = format!(
            "{} {} advisor directory",
            key.company.search_terms(),
            key.state
        );
        let results = match self.search.search(&query).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Search failed during discovery");
                return Vec::new();
            }
        };
        if results.is_empty() {
            return Vec::new();
        }

        let listing = results
            .iter()
            .enumerate()
            .map(|(i, url)| format!("{}. {url}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{RANK_PROMPT}\n\nCompany: {}\nState: {}\n\nSearch results:\n{listing}",
            key.company.display_name(),
            key.state
        );

        let mut ranked = Vec::new();
        match self.reasoner.reason(&prompt, "").await {
            Ok(judgment) => {
                if let Some(url) = judgment.str_field("recommended_url") {
                    ranked.push(url.to_string());
                }
                ranked.extend(
                    judgment
                        .array_field("alternative_urls")
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| s.trim().to_string()),
                );
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Candidate ranking failed; using search order");
            }
        }
        ranked.extend(results);

        let mut seen = HashSet::new();
        ranked
            .into_iter()
            .filter(|url| is_absolute_http(url))
            .filter(|url| seen.insert(url.clone()))
            .take(self.max_candidates)
            .collect()
    }
}

fn is_absolute_http(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

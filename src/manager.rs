use crate::cache::SourceCache;
use crate::descramble::{CopyStep, ScrambleScheme, plan_steps};
use crate::fetch::FetchExecutor;
use crate::identity::SourceId;
use crate::pagination::{ContinuationState, ListingCursor};
use crate::source::{ChapterListPage, ChapterPage, ListingPage, MangaSource, SourceRegistry};
use crate::types::{CatalogEntry, ChapterContent, FilterSelection};
use crate::{Result, SourceError};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Whether to consult the detail and plan caches
    pub use_cache: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// Identity of one listing. Distinct keys are fully independent and may be
/// driven in parallel; calls for the same key must stay sequential, which is
/// the caller's obligation.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum ListingKey {
    Discovery {
        source: SourceId,
    },
    Search {
        source: SourceId,
        keyword: String,
    },
    ChapterList {
        source: SourceId,
        manga: String,
    },
    Chapter {
        source: SourceId,
        manga: String,
        chapter: String,
    },
}

/// Wires the registry, the network collaborator and the continuation
/// cursors into the full catalog flow: cursor → `prepare*` → execute →
/// `handle*` → cursor.
///
/// All methods are cancellable by dropping the returned future; the only
/// timeout lives in the executor.
pub struct SourceManager {
    registry: SourceRegistry,
    executor: Arc<dyn FetchExecutor>,
    cache: SourceCache,
    cursors: DashMap<ListingKey, ListingCursor>,
    config: ManagerConfig,
}

impl SourceManager {
    /// Create a new manager
    pub fn new(registry: SourceRegistry, executor: Arc<dyn FetchExecutor>) -> Self {
        Self::with_config(registry, executor, ManagerConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(
        registry: SourceRegistry,
        executor: Arc<dyn FetchExecutor>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            cache: SourceCache::new(),
            cursors: DashMap::new(),
            config,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn adapter(&self, source: SourceId) -> Result<Arc<dyn MangaSource>> {
        let adapter = self
            .registry
            .get(source)
            .ok_or(SourceError::UnsupportedOperation("unregistered source"))?;
        if adapter.metadata().disabled {
            return Err(SourceError::UnsupportedOperation("source is disabled"));
        }
        Ok(adapter)
    }

    /// Snapshot the continuation state for a listing, or `None` when the
    /// listing is terminal.
    fn begin(&self, key: &ListingKey) -> Option<ContinuationState> {
        let mut cursor = self.cursors.entry(key.clone()).or_default();
        if cursor.is_complete() {
            return None;
        }
        Some(cursor.begin_fetch())
    }

    fn abort(&self, key: &ListingKey) {
        if let Some(mut cursor) = self.cursors.get_mut(key) {
            cursor.abort();
        }
    }

    fn advance(
        &self,
        key: &ListingKey,
        can_load_more: bool,
        next_page: Option<u32>,
        next_extra: Option<crate::pagination::Extra>,
    ) {
        if let Some(mut cursor) = self.cursors.get_mut(key) {
            cursor.advance(can_load_more, next_page, next_extra);
        }
    }

    fn fail(&self, key: &ListingKey, source: SourceId, error: SourceError) -> SourceError {
        self.abort(key);
        if error.needs_challenge_recovery() {
            warn!(source = %source, "challenge detected; credential refresh required");
        }
        error
    }

    /// Reset one listing to `page = 1`, empty extra.
    pub fn reset_listing(&self, key: &ListingKey) {
        self.cursors.remove(key);
    }

    /// Fetch the next discovery page for a source. Returns the terminal
    /// empty page once the listing is complete.
    pub async fn discover(
        &self,
        source: SourceId,
        filters: &FilterSelection,
    ) -> Result<ListingPage> {
        let adapter = self.adapter(source)?;
        let key = ListingKey::Discovery { source };
        let Some(state) = self.begin(&key) else {
            return Ok(ListingPage::terminal());
        };

        debug!(source = %source, page = state.page, "discovery fetch");
        let descriptor = adapter
            .prepare_discovery_fetch(state.page, filters, &state.extra)
            .map_err(|e| self.fail(&key, source, e))?;
        let payload = self
            .executor
            .execute(&descriptor)
            .await
            .map_err(|e| self.fail(&key, source, e))?;

        match adapter.handle_discovery(&payload.body) {
            Ok(page) => {
                self.advance(&key, page.can_load_more, page.next_page, page.next_extra.clone());
                debug!(source = %source, entries = page.entries.len(), "discovery parsed");
                Ok(page)
            }
            Err(e) => Err(self.fail(&key, source, e)),
        }
    }

    /// Fetch the next result page for a keyword search.
    pub async fn search(
        &self,
        source: SourceId,
        keyword: &str,
        filters: &FilterSelection,
    ) -> Result<ListingPage> {
        let adapter = self.adapter(source)?;
        let key = ListingKey::Search {
            source,
            keyword: keyword.to_string(),
        };
        let Some(state) = self.begin(&key) else {
            return Ok(ListingPage::terminal());
        };

        debug!(source = %source, keyword, page = state.page, "search fetch");
        let descriptor = adapter
            .prepare_search_fetch(keyword, state.page, filters, &state.extra)
            .map_err(|e| self.fail(&key, source, e))?;
        let payload = self
            .executor
            .execute(&descriptor)
            .await
            .map_err(|e| self.fail(&key, source, e))?;

        match adapter.handle_search(&payload.body) {
            Ok(page) => {
                self.advance(&key, page.can_load_more, page.next_page, page.next_extra.clone());
                Ok(page)
            }
            Err(e) => Err(self.fail(&key, source, e)),
        }
    }

    /// Fetch the full detail entry, attaching chapters from the standalone
    /// list endpoint when the source has one.
    pub async fn manga_info(&self, source: SourceId, remote_id: &str) -> Result<CatalogEntry> {
        let adapter = self.adapter(source)?;

        if self.config.use_cache
            && let Some(cached) = self.cache.get_detail(source, remote_id).await
        {
            debug!(source = %source, remote_id, "detail cache hit");
            return Ok(cached);
        }

        let descriptor = adapter.prepare_manga_info_fetch(remote_id)?;
        let payload = self.executor.execute(&descriptor).await?;
        let mut entry = adapter.handle_manga_info(&payload.body, remote_id)?;

        if entry.chapters.is_empty()
            && let Some(descriptor) = adapter.prepare_chapter_list_fetch(remote_id, 1)?
        {
            let refs = match self.executor.execute(&descriptor).await {
                Ok(payload) => adapter
                    .handle_chapter_list(&payload.body, remote_id)
                    .map(|page| page.refs),
                Err(e) => Err(e),
            };
            match refs {
                Ok(refs) => entry.chapters = refs,
                Err(e) if e.needs_challenge_recovery() => return Err(e),
                Err(e) => {
                    warn!(source = %source, remote_id, error = %e, "chapter list unavailable");
                }
            }
        }

        if self.config.use_cache {
            self.cache.set_detail(source, remote_id, entry.clone()).await;
        }
        Ok(entry)
    }

    /// Fetch the next page of the standalone chapter list; sources that
    /// embed chapters in the info response are answered from there.
    pub async fn chapter_list(&self, source: SourceId, remote_id: &str) -> Result<ChapterListPage> {
        let adapter = self.adapter(source)?;
        let key = ListingKey::ChapterList {
            source,
            manga: remote_id.to_string(),
        };
        let Some(state) = self.begin(&key) else {
            return Ok(ChapterListPage {
                refs: Vec::new(),
                can_load_more: false,
            });
        };

        let descriptor = adapter
            .prepare_chapter_list_fetch(remote_id, state.page)
            .map_err(|e| self.fail(&key, source, e))?;

        let Some(descriptor) = descriptor else {
            self.abort(&key);
            let entry = self.manga_info(source, remote_id).await?;
            return Ok(ChapterListPage {
                refs: entry.chapters,
                can_load_more: false,
            });
        };

        let payload = self
            .executor
            .execute(&descriptor)
            .await
            .map_err(|e| self.fail(&key, source, e))?;

        match adapter.handle_chapter_list(&payload.body, remote_id) {
            Ok(page) => {
                self.advance(&key, page.can_load_more, None, None);
                Ok(page)
            }
            Err(e) => Err(self.fail(&key, source, e)),
        }
    }

    /// Fetch the next continuation step of a chapter's content.
    pub async fn chapter(
        &self,
        source: SourceId,
        remote_id: &str,
        chapter_id: &str,
    ) -> Result<ChapterPage> {
        let adapter = self.adapter(source)?;
        let key = ListingKey::Chapter {
            source,
            manga: remote_id.to_string(),
            chapter: chapter_id.to_string(),
        };
        let Some(state) = self.begin(&key) else {
            return Ok(ChapterPage {
                content: ChapterContent::new(source, remote_id, chapter_id, chapter_id),
                can_load_more: false,
                next_page: None,
                next_extra: None,
            });
        };

        debug!(source = %source, remote_id, chapter_id, page = state.page, "chapter fetch");
        let descriptor = adapter
            .prepare_chapter_fetch(remote_id, chapter_id, state.page, &state.extra)
            .map_err(|e| self.fail(&key, source, e))?;
        let payload = self
            .executor
            .execute(&descriptor)
            .await
            .map_err(|e| self.fail(&key, source, e))?;

        match adapter.handle_chapter(&payload.body, remote_id, chapter_id, state.page) {
            Ok(page) => {
                self.advance(&key, page.can_load_more, page.next_page, page.next_extra.clone());
                Ok(page)
            }
            Err(e) => Err(self.fail(&key, source, e)),
        }
    }

    /// Merge externally harvested session data into an adapter.
    pub fn sync_extra_data(&self, source: SourceId, blob: &serde_json::Value) -> Result<String> {
        let adapter = self.adapter(source)?;
        let message = adapter.sync_extra_data(blob)?;
        debug!(source = %source, message, "session data synced");
        Ok(message)
    }

    /// Compute (or recall) the descramble plan for one image.
    pub async fn descramble_plan(
        &self,
        identifier: &str,
        width: u32,
        height: u32,
        scheme: ScrambleScheme,
    ) -> Arc<Vec<CopyStep>> {
        if self.config.use_cache
            && let Some(plan) = self.cache.get_plan(identifier, width, height, scheme).await
        {
            return plan;
        }

        let steps = plan_steps(identifier, width, height, Some(scheme));
        if self.config.use_cache {
            self.cache
                .set_plan(identifier, width, height, scheme, steps)
                .await
        } else {
            Arc::new(steps)
        }
    }

    /// Cache statistics passthrough
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}

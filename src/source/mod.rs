pub(crate) mod firescans;
pub(crate) mod jmcomic;
mod registry;

pub use firescans::FireScans;
pub use jmcomic::JmComic;
pub use registry::SourceRegistry;

use crate::fetch::FetchDescriptor;
use crate::identity::SourceId;
use crate::pagination::Extra;
use crate::types::{CatalogEntry, ChapterContent, ChapterRef, FilterGroup, FilterSelection};
use crate::{Result, SourceError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Immutable per-adapter metadata.
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    pub id: SourceId,
    /// Human-readable display name
    pub name: &'static str,
    /// Short badge name
    pub short_name: &'static str,
    pub description: &'static str,
    /// Public origin of the site
    pub origin_url: &'static str,
    /// Default user agent for every fetch descriptor
    pub user_agent: &'static str,
    /// Headers applied to every fetch descriptor
    pub default_headers: Vec<(&'static str, &'static str)>,
    /// Ranking score used to order sources in the host application
    pub ranking: i32,
    /// Disabled adapters stay registered but reject operations
    pub disabled: bool,
    /// Source-specific challenge page title, checked on top of the shared
    /// marker list
    pub challenge_title: Option<&'static str>,
    pub discovery_filters: Vec<FilterGroup>,
    pub search_filters: Vec<FilterGroup>,
}

/// Mutable per-adapter session fields (cookies, tokens, derived keys).
///
/// Lives for the adapter's lifetime; mutated through `sync_extra_data` and by
/// `prepare*` calls for request-scoped derivations. Writes are serialized
/// against in-flight reads by the lock, so a descriptor is never built from
/// half-updated credentials.
#[derive(Debug, Default)]
pub struct SessionState {
    values: RwLock<HashMap<String, String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.read().clone()
    }

    /// Merge a flat string-keyed JSON object harvested by the embedded
    /// browser. Unknown keys are stored as-is, non-string values are ignored.
    /// Returns the applied keys.
    pub fn merge_json(&self, blob: &serde_json::Value) -> Vec<String> {
        let Some(object) = blob.as_object() else {
            return Vec::new();
        };

        let mut applied = Vec::new();
        let mut values = self.values.write();
        for (key, value) in object {
            if let Some(text) = value.as_str() {
                values.insert(key.clone(), text.to_string());
                applied.push(key.clone());
            }
        }
        applied
    }
}

/// One page of a discovery or search listing.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub entries: Vec<CatalogEntry>,
    pub can_load_more: bool,
    /// Overrides the naive page increment when present
    pub next_page: Option<u32>,
    /// Opaque bag carried verbatim into the next `prepare*` call
    pub next_extra: Option<Extra>,
}

impl ListingPage {
    /// The terminal empty page returned for completed listings.
    pub fn terminal() -> Self {
        Self {
            entries: Vec::new(),
            can_load_more: false,
            next_page: None,
            next_extra: None,
        }
    }
}

/// One page of a standalone chapter list.
#[derive(Debug, Clone)]
pub struct ChapterListPage {
    pub refs: Vec<ChapterRef>,
    pub can_load_more: bool,
}

/// One continuation step of a chapter-content fetch.
#[derive(Debug, Clone)]
pub struct ChapterPage {
    pub content: ChapterContent,
    pub can_load_more: bool,
    pub next_page: Option<u32>,
    pub next_extra: Option<Extra>,
}

/// The contract every adapter implements: three request/response pairs for
/// listings, one for details, one for chapters, plus optional session sync.
///
/// `prepare*` builds a [`FetchDescriptor`] from continuation state; `handle*`
/// parses the payload the network collaborator fetched. Handlers return
/// expected failures (missing field, unsupported operation) as `Err` values
/// of the recoverable variants; [`SourceError::ChallengeDetected`] is the
/// escalation path that triggers the credential-refresh flow instead of a
/// retry.
pub trait MangaSource: Send + Sync {
    fn metadata(&self) -> &SourceMetadata;

    fn prepare_discovery_fetch(
        &self,
        page: u32,
        filters: &FilterSelection,
        extra: &Extra,
    ) -> Result<FetchDescriptor>;

    fn handle_discovery(&self, payload: &str) -> Result<ListingPage>;

    fn prepare_search_fetch(
        &self,
        keyword: &str,
        page: u32,
        filters: &FilterSelection,
        extra: &Extra,
    ) -> Result<FetchDescriptor>;

    fn handle_search(&self, payload: &str) -> Result<ListingPage>;

    fn prepare_manga_info_fetch(&self, remote_id: &str) -> Result<FetchDescriptor>;

    fn handle_manga_info(&self, payload: &str, remote_id: &str) -> Result<CatalogEntry>;

    /// `Ok(None)` means the source embeds chapters in the info response.
    fn prepare_chapter_list_fetch(
        &self,
        _remote_id: &str,
        _page: u32,
    ) -> Result<Option<FetchDescriptor>> {
        Ok(None)
    }

    fn handle_chapter_list(&self, _payload: &str, _remote_id: &str) -> Result<ChapterListPage> {
        Err(SourceError::UnsupportedOperation(
            "standalone chapter list endpoint",
        ))
    }

    fn prepare_chapter_fetch(
        &self,
        remote_id: &str,
        chapter_id: &str,
        page: u32,
        extra: &Extra,
    ) -> Result<FetchDescriptor>;

    fn handle_chapter(
        &self,
        payload: &str,
        remote_id: &str,
        chapter_id: &str,
        page: u32,
    ) -> Result<ChapterPage>;

    /// Merge externally harvested session data (cookies, tokens) delivered by
    /// the embedded-browser flow. Returns a human-readable status line.
    fn sync_extra_data(&self, _blob: &serde_json::Value) -> Result<String> {
        Err(SourceError::UnsupportedOperation("session data sync"))
    }
}

mod cache;
mod client;
mod descramble;
mod fetch;
mod guard;
mod identity;
mod manager;
mod pagination;
mod source;
mod status;
mod types;

#[cfg(test)]
mod tests;

pub use cache::{CacheConfig, CacheStats, SourceCache};
pub use client::FetchClient;
pub use descramble::{CopyStep, ScrambleScheme, apply_steps, plan_steps};
pub use fetch::{FetchDescriptor, FetchExecutor, FetchPayload, Method, RequestBody};
pub use guard::check_challenge;
pub use identity::{Identity, SourceId};
pub use manager::{ListingKey, ManagerConfig, SourceManager};
pub use pagination::{ContinuationState, Extra, ListingCursor, ListingPhase};
pub use source::{
    ChapterListPage, ChapterPage, FireScans, JmComic, ListingPage, MangaSource, SessionState,
    SourceMetadata, SourceRegistry,
};
pub use status::StatusMap;
pub use types::{
    CatalogEntry, ChapterContent, ChapterRef, FILTER_UNSET, FilterGroup, FilterOption,
    FilterSelection, ImageRef, MangaStatus,
};

use std::sync::Arc;
use std::time::Duration;

/// Source result type
pub type Result<T> = std::result::Result<T, SourceError>;

/// Source error types
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation not supported by this source: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Response did not match the expected structure: {0}")]
    MalformedResponse(String),

    #[error("Anti-bot challenge detected: {marker}")]
    ChallengeDetected { marker: String },

    #[error("Source requires credentials: {0}")]
    AuthRequired(String),

    #[error("Source credentials expired: {0}")]
    AuthExpired(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SourceError {
    /// Whether the caller should run the credential-refresh flow instead of
    /// surfacing a plain error message.
    pub fn needs_challenge_recovery(&self) -> bool {
        matches!(self, Self::ChallengeDetected { .. })
    }
}

/// Build the registry with every bundled adapter.
#[must_use]
pub fn create_default_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(FireScans::new());
    registry.register(JmComic::new());
    registry
}

/// Create a manager wired to the default registry and the reqwest-backed
/// fetch executor.
#[must_use]
pub fn create_default_manager() -> SourceManager {
    SourceManager::new(create_default_registry(), Arc::new(FetchClient::new()))
}

use crate::descramble::ScrambleScheme;
use crate::identity::{Identity, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serialization status of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MangaStatus {
    #[default]
    Unknown,
    Serial,
    Ended,
}

impl std::fmt::Display for MangaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Serial => write!(f, "serial"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Unified catalog entry produced by any adapter.
///
/// List-style endpoints (discovery, search) produce partial entries that omit
/// chapters, status and the latest-chapter label; only the single-item detail
/// endpoint fills everything in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Stable opaque key (`sourceId&mangaId`)
    pub identity: String,
    /// Owning adapter
    pub source_id: SourceId,
    /// Human-readable source name
    pub source_name: String,
    /// Public page for this entry on the origin site
    pub origin_url: String,
    /// Source-specific id
    pub remote_id: String,
    /// Full-size cover URL, absolute
    pub cover_url: Option<String>,
    /// Thumbnail cover URL, absolute
    pub cover_thumb_url: Option<String>,
    /// Primary title
    pub title: String,
    /// Label of the most recent chapter (e.g. "Ch. 112")
    pub latest_label: Option<String>,
    /// Last update time reported by the source
    pub last_update: Option<DateTime<Utc>>,
    /// Authors
    pub authors: Vec<String>,
    /// Genres/tags
    pub tags: Vec<String>,
    /// Serialization status
    pub status: MangaStatus,
    /// Chapter list (detail endpoint only)
    pub chapters: Vec<ChapterRef>,
}

impl CatalogEntry {
    /// Create a new partial entry with required fields
    pub fn new(
        source_id: SourceId,
        source_name: impl Into<String>,
        remote_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let remote_id = remote_id.into();
        Self {
            identity: Identity::encode(source_id, &remote_id, None),
            source_id,
            source_name: source_name.into(),
            origin_url: String::new(),
            remote_id,
            cover_url: None,
            cover_thumb_url: None,
            title: title.into(),
            latest_label: None,
            last_update: None,
            authors: Vec::new(),
            tags: Vec::new(),
            status: MangaStatus::Unknown,
            chapters: Vec::new(),
        }
    }

    /// Builder pattern: set origin URL
    pub fn with_origin_url(mut self, url: impl Into<String>) -> Self {
        self.origin_url = url.into();
        self
    }

    /// Builder pattern: set cover URL
    pub fn with_cover(mut self, url: Option<String>) -> Self {
        self.cover_url = url;
        self
    }

    /// Builder pattern: set thumbnail cover URL
    pub fn with_cover_thumb(mut self, url: Option<String>) -> Self {
        self.cover_thumb_url = url;
        self
    }

    /// Builder pattern: set latest-chapter label
    pub fn with_latest_label(mut self, label: Option<String>) -> Self {
        self.latest_label = label;
        self
    }

    /// Builder pattern: set last update time
    pub fn with_last_update(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.last_update = at;
        self
    }

    /// Builder pattern: set status
    pub fn with_status(mut self, status: MangaStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder pattern: add an author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    /// Builder pattern: set authors
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    /// Builder pattern: set tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Builder pattern: set chapters
    pub fn with_chapters(mut self, chapters: Vec<ChapterRef>) -> Self {
        self.chapters = chapters;
        self
    }
}

/// Reference to a single chapter of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    /// Stable opaque key (`sourceId&mangaId&chapterId`)
    pub identity: String,
    pub manga_id: String,
    pub chapter_id: String,
    pub origin_url: String,
    pub title: String,
}

impl ChapterRef {
    pub fn new(
        source_id: SourceId,
        manga_id: impl Into<String>,
        chapter_id: impl Into<String>,
        origin_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let manga_id = manga_id.into();
        let chapter_id = chapter_id.into();
        Self {
            identity: Identity::encode(source_id, &manga_id, Some(&chapter_id)),
            manga_id,
            chapter_id,
            origin_url: origin_url.into(),
            title: title.into(),
        }
    }
}

/// Fully resolved chapter: everything the renderer needs to fetch pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterContent {
    pub identity: String,
    pub manga_id: String,
    pub chapter_id: String,
    pub display_name: Option<String>,
    pub title: String,
    /// Headers the renderer must send when fetching images
    pub request_headers: HashMap<String, String>,
    pub images: Vec<ImageRef>,
}

impl ChapterContent {
    pub fn new(
        source_id: SourceId,
        manga_id: impl Into<String>,
        chapter_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let manga_id = manga_id.into();
        let chapter_id = chapter_id.into();
        Self {
            identity: Identity::encode(source_id, &manga_id, Some(&chapter_id)),
            manga_id,
            chapter_id,
            display_name: None,
            title: title.into(),
            request_headers: HashMap::new(),
            images: Vec::new(),
        }
    }
}

/// One page image of a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub uri: String,
    /// Per-image header overrides; `None` falls back to the chapter headers
    pub request_headers: Option<HashMap<String, String>>,
    /// Whether the compositor must run the descrambling engine first
    pub needs_descramble: bool,
    pub scramble_scheme: Option<ScrambleScheme>,
}

impl ImageRef {
    /// Plain image, served as-is.
    pub fn plain(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            request_headers: None,
            needs_descramble: false,
            scramble_scheme: None,
        }
    }

    /// Image obfuscated with the given scheme.
    pub fn scrambled(uri: impl Into<String>, scheme: ScrambleScheme) -> Self {
        Self {
            uri: uri.into(),
            request_headers: None,
            needs_descramble: true,
            scramble_scheme: Some(scheme),
        }
    }
}

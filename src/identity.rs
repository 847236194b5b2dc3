use crate::{Result, SourceError};
use serde::{Deserialize, Serialize};

/// Separator used by the persisted identity format. Remote ids must never
/// contain it; adapters are responsible for choosing ids that satisfy this.
pub const SEPARATOR: char = '&';

/// Token identifying one adapter instance. The string form is persisted
/// externally (favorites, history) and must stay stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    FireScans,
    JmComic,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FireScans => "firescans",
            Self::JmComic => "jmcomic",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "firescans" => Some(Self::FireScans),
            "jmcomic" => Some(Self::JmComic),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable opaque key combining a source, a manga id and optionally a
/// chapter id.
pub struct Identity;

impl Identity {
    /// Encode `sourceId&mangaId` or `sourceId&mangaId&chapterId`.
    pub fn encode(source: SourceId, manga_id: &str, chapter_id: Option<&str>) -> String {
        match chapter_id {
            Some(chapter) => format!("{}{SEPARATOR}{manga_id}{SEPARATOR}{chapter}", source),
            None => format!("{}{SEPARATOR}{manga_id}", source),
        }
    }

    /// Exact inverse of [`Identity::encode`].
    pub fn decode(identity: &str) -> Result<(SourceId, String, Option<String>)> {
        let parts: Vec<&str> = identity.split(SEPARATOR).collect();
        let (source_token, manga_id, chapter_id) = match parts.as_slice() {
            [source, manga] => (*source, *manga, None),
            [source, manga, chapter] => (*source, *manga, Some((*chapter).to_string())),
            _ => {
                return Err(SourceError::MalformedResponse(format!(
                    "identity has {} segments: {identity}",
                    parts.len()
                )));
            }
        };

        let source = SourceId::parse(source_token).ok_or_else(|| {
            SourceError::MalformedResponse(format!("unknown source token: {source_token}"))
        })?;

        Ok((source, manga_id.to_string(), chapter_id))
    }
}

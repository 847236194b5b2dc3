use crate::types::MangaStatus;
use std::collections::HashMap;

/// Shared shape of the per-adapter status-label lookup.
///
/// Labels are genuinely site-specific (different scripts and languages), so
/// every adapter owns its own table; only the lookup semantics are shared:
/// trimmed exact match first, then ASCII-case-insensitive match, and
/// [`MangaStatus::Unknown`] for anything unmapped. Never fails.
#[derive(Debug, Clone)]
pub struct StatusMap {
    entries: HashMap<&'static str, MangaStatus>,
}

impl StatusMap {
    pub fn new(pairs: &[(&'static str, MangaStatus)]) -> Self {
        Self {
            entries: pairs.iter().copied().collect(),
        }
    }

    pub fn resolve(&self, label: &str) -> MangaStatus {
        let trimmed = label.trim();
        if let Some(status) = self.entries.get(trimmed) {
            return *status;
        }

        self.entries
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(trimmed))
            .map_or(MangaStatus::Unknown, |(_, status)| *status)
    }

    /// Every label the table knows, for totality tests.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

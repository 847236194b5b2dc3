use super::MangaSource;
use crate::identity::SourceId;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only lookup table from [`SourceId`] to adapter instance.
///
/// Built once at startup from an explicit list of adapters; no reflection,
/// no dynamic loading.
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<SourceId, Arc<dyn MangaSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. The last registration for an id wins.
    pub fn register<S: MangaSource + 'static>(&mut self, source: S) {
        self.sources
            .insert(source.metadata().id, Arc::new(source));
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn MangaSource>> {
        self.sources.get(&id).cloned()
    }

    /// Enabled adapters ordered by descending ranking score.
    pub fn enabled(&self) -> Vec<Arc<dyn MangaSource>> {
        let mut sources: Vec<_> = self
            .sources
            .values()
            .filter(|s| !s.metadata().disabled)
            .cloned()
            .collect();
        sources.sort_by_key(|s| std::cmp::Reverse(s.metadata().ranking));
        sources
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.sources.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_default_registry;

    #[test]
    fn default_registry_contains_all_bundled_sources() {
        let registry = create_default_registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.get(SourceId::FireScans).is_some());
        assert!(registry.get(SourceId::JmComic).is_some());
    }

    #[test]
    fn enabled_sources_are_ranked() {
        let registry = create_default_registry();
        let enabled = registry.enabled();
        assert!(!enabled.is_empty());
        for pair in enabled.windows(2) {
            assert!(pair[0].metadata().ranking >= pair[1].metadata().ranking);
        }
    }
}

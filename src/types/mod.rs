mod filter;
mod manga;

pub use filter::{FILTER_UNSET, FilterGroup, FilterOption, FilterSelection};
pub use manga::{CatalogEntry, ChapterContent, ChapterRef, ImageRef, MangaStatus};

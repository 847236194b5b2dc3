//! Madara-style WordPress source. Everything is server-rendered HTML except
//! the chapter list, which lives behind the theme's ajax endpoint.

use super::{ChapterListPage, ChapterPage, ListingPage, MangaSource, SessionState, SourceMetadata};
use crate::fetch::FetchDescriptor;
use crate::guard::check_challenge;
use crate::identity::SourceId;
use crate::pagination::Extra;
use crate::status::StatusMap;
use crate::types::{
    CatalogEntry, ChapterContent, ChapterRef, FILTER_UNSET, FilterGroup, FilterOption,
    FilterSelection, ImageRef, MangaStatus,
};
use crate::{Result, SourceError};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

const ORIGIN: &str = "https://firescans.xyz";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static STATUS: Lazy<StatusMap> = Lazy::new(|| {
    StatusMap::new(&[
        ("OnGoing", MangaStatus::Serial),
        ("Ongoing", MangaStatus::Serial),
        ("On Going", MangaStatus::Serial),
        ("Releasing", MangaStatus::Serial),
        ("Updating", MangaStatus::Serial),
        ("連載中", MangaStatus::Serial),
        ("Completed", MangaStatus::Ended),
        ("Complete", MangaStatus::Ended),
        ("Finished", MangaStatus::Ended),
        ("完結", MangaStatus::Ended),
    ])
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

static DISCOVERY_ITEM: Lazy<Selector> = Lazy::new(|| selector("div.page-item-detail"));
static SEARCH_ITEM: Lazy<Selector> = Lazy::new(|| selector("div.c-tabs-item__content"));
static ITEM_TITLE_LINK: Lazy<Selector> = Lazy::new(|| selector("div.post-title a"));
static ITEM_COVER: Lazy<Selector> = Lazy::new(|| selector("img"));
static DETAIL_TITLE: Lazy<Selector> = Lazy::new(|| selector("div.post-title h1"));
static DETAIL_COVER: Lazy<Selector> = Lazy::new(|| selector("div.summary_image img"));
static DETAIL_AUTHOR: Lazy<Selector> = Lazy::new(|| selector("div.author-content a"));
static DETAIL_TAG: Lazy<Selector> = Lazy::new(|| selector("div.genres-content a"));
static DETAIL_STATUS_ITEM: Lazy<Selector> = Lazy::new(|| selector("div.post-status div.post-content_item"));
static SUMMARY_HEADING: Lazy<Selector> = Lazy::new(|| selector("div.summary-heading"));
static SUMMARY_CONTENT: Lazy<Selector> = Lazy::new(|| selector("div.summary-content"));
static CHAPTER_LINK: Lazy<Selector> = Lazy::new(|| selector("li.wp-manga-chapter > a"));
static CHAPTER_DATE: Lazy<Selector> = Lazy::new(|| selector("li.wp-manga-chapter span.chapter-release-date"));
static READER_IMAGE: Lazy<Selector> = Lazy::new(|| selector("div.reading-content img"));

pub struct FireScans {
    metadata: SourceMetadata,
    session: SessionState,
}

impl Default for FireScans {
    fn default() -> Self {
        Self::new()
    }
}

impl FireScans {
    pub fn new() -> Self {
        let metadata = SourceMetadata {
            id: SourceId::FireScans,
            name: "Fire Scans",
            short_name: "FIRE",
            description: "English scanlation site on the Madara WordPress theme.",
            origin_url: ORIGIN,
            user_agent: USER_AGENT,
            default_headers: vec![
                ("Referer", ORIGIN),
                ("Accept-Language", "en-US,en;q=0.9"),
            ],
            ranking: 60,
            disabled: false,
            challenge_title: Some("Just a moment"),
            discovery_filters: vec![FilterGroup::new(
                "order",
                vec![
                    FilterOption::new("Latest", "latest"),
                    FilterOption::new("Trending", "trending"),
                    FilterOption::new("Most Views", "views"),
                    FilterOption::new("Rating", "rating"),
                    FilterOption::new("New", "new-manga"),
                    FilterOption::new("A-Z", "alphabet"),
                ],
            )],
            search_filters: vec![FilterGroup::new(
                "genre",
                vec![
                    FilterOption::new("Action", "action"),
                    FilterOption::new("Fantasy", "fantasy"),
                    FilterOption::new("Romance", "romance"),
                    FilterOption::new("Comedy", "comedy"),
                ],
            )],
        };

        Self {
            metadata,
            session: SessionState::new(),
        }
    }

    fn base_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), self.metadata.user_agent.to_string());
        for (name, value) in &self.metadata.default_headers {
            headers.insert((*name).to_string(), (*value).to_string());
        }
        if let Some(cookie) = self.session.get("cookie") {
            headers.insert("Cookie".to_string(), cookie);
        }
        headers
    }

    fn guard(&self, payload: &str) -> Result<()> {
        check_challenge(payload, self.metadata.challenge_title)
    }

    fn parse_listing_item(&self, item: ElementRef<'_>) -> Option<CatalogEntry> {
        let link = item.select(&ITEM_TITLE_LINK).next()?;
        let href = link.value().attr("href")?;
        let title = link.text().collect::<String>().trim().to_string();
        let remote_id = manga_slug(href)?;
        if title.is_empty() {
            return None;
        }

        let cover = item
            .select(&ITEM_COVER)
            .next()
            .and_then(image_source)
            .map(|src| absolutize(ORIGIN, &src));

        Some(
            CatalogEntry::new(SourceId::FireScans, self.metadata.name, remote_id, title)
                .with_origin_url(absolutize(ORIGIN, href))
                .with_cover(cover.clone())
                .with_cover_thumb(cover),
        )
    }

    fn parse_listing(&self, payload: &str, item_selector: &Selector) -> Result<ListingPage> {
        self.guard(payload)?;

        let document = Html::parse_document(payload);
        let mut entries = Vec::new();
        for item in document.select(item_selector) {
            match self.parse_listing_item(item) {
                Some(entry) => entries.push(entry),
                // One malformed card must not abort the batch.
                None => tracing::debug!("firescans: skipping malformed listing item"),
            }
        }

        let can_load_more = !entries.is_empty();
        Ok(ListingPage {
            entries,
            can_load_more,
            next_page: None,
            next_extra: None,
        })
    }
}

impl MangaSource for FireScans {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn prepare_discovery_fetch(
        &self,
        page: u32,
        filters: &FilterSelection,
        _extra: &Extra,
    ) -> Result<FetchDescriptor> {
        let mut url = format!("{ORIGIN}/manga/page/{page}/");
        let order = filters.get("order").map_or(FILTER_UNSET, String::as_str);
        if order != FILTER_UNSET {
            url.push_str(&format!("?m_orderby={}", urlencoding::encode(order)));
        }

        Ok(FetchDescriptor::get(url).with_headers(&self.base_headers()))
    }

    fn handle_discovery(&self, payload: &str) -> Result<ListingPage> {
        self.parse_listing(payload, &DISCOVERY_ITEM)
    }

    fn prepare_search_fetch(
        &self,
        keyword: &str,
        page: u32,
        filters: &FilterSelection,
        _extra: &Extra,
    ) -> Result<FetchDescriptor> {
        let mut url = format!(
            "{ORIGIN}/page/{page}/?s={}&post_type=wp-manga",
            urlencoding::encode(keyword)
        );
        let genre = filters.get("genre").map_or(FILTER_UNSET, String::as_str);
        if genre != FILTER_UNSET {
            url.push_str(&format!("&genre[]={}", urlencoding::encode(genre)));
        }

        Ok(FetchDescriptor::get(url).with_headers(&self.base_headers()))
    }

    fn handle_search(&self, payload: &str) -> Result<ListingPage> {
        self.parse_listing(payload, &SEARCH_ITEM)
    }

    fn prepare_manga_info_fetch(&self, remote_id: &str) -> Result<FetchDescriptor> {
        Ok(FetchDescriptor::get(format!("{ORIGIN}/manga/{remote_id}/"))
            .with_headers(&self.base_headers()))
    }

    fn handle_manga_info(&self, payload: &str, remote_id: &str) -> Result<CatalogEntry> {
        self.guard(payload)?;

        let document = Html::parse_document(payload);
        let title = document
            .select(&DETAIL_TITLE)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                SourceError::MalformedResponse(format!("missing title for {remote_id}"))
            })?;

        let authors: Vec<String> = document
            .select(&DETAIL_AUTHOR)
            .map(|a| a.text().collect::<String>().trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        let tags: Vec<String> = document
            .select(&DETAIL_TAG)
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let status = document
            .select(&DETAIL_STATUS_ITEM)
            .find(|item| {
                item.select(&SUMMARY_HEADING)
                    .next()
                    .map(|h| h.text().collect::<String>().to_lowercase().contains("status"))
                    .unwrap_or(false)
            })
            .and_then(|item| item.select(&SUMMARY_CONTENT).next())
            .map(|content| STATUS.resolve(&content.text().collect::<String>()))
            .unwrap_or(MangaStatus::Unknown);

        let latest_label = document
            .select(&CHAPTER_LINK)
            .next()
            .map(|a| a.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let last_update = document
            .select(&CHAPTER_DATE)
            .next()
            .map(|d| d.text().collect::<String>())
            .and_then(|text| parse_release_date(text.trim()));

        // Cover normalization is the final mapping step; the raw value is
        // kept protocol-relative until here.
        let cover = document
            .select(&DETAIL_COVER)
            .next()
            .and_then(image_source)
            .map(|src| absolutize(ORIGIN, &src));

        Ok(
            CatalogEntry::new(SourceId::FireScans, self.metadata.name, remote_id, title)
                .with_origin_url(format!("{ORIGIN}/manga/{remote_id}/"))
                .with_cover(cover.clone())
                .with_cover_thumb(cover)
                .with_tags(tags)
                .with_status(status)
                .with_latest_label(latest_label)
                .with_last_update(last_update)
                .with_authors(authors),
        )
    }

    fn prepare_chapter_list_fetch(
        &self,
        remote_id: &str,
        _page: u32,
    ) -> Result<Option<FetchDescriptor>> {
        Ok(Some(
            FetchDescriptor::post(format!("{ORIGIN}/manga/{remote_id}/ajax/chapters/"))
                .with_header("X-Requested-With", "XMLHttpRequest")
                .with_headers(&self.base_headers())
                .with_form(Vec::new()),
        ))
    }

    fn handle_chapter_list(&self, payload: &str, remote_id: &str) -> Result<ChapterListPage> {
        self.guard(payload)?;

        let document = Html::parse_document(payload);
        let mut refs = Vec::new();
        for link in document.select(&CHAPTER_LINK) {
            let Some(href) = link.value().attr("href") else {
                tracing::debug!("firescans: chapter link without href");
                continue;
            };
            let Some(chapter_id) = chapter_slug(href, remote_id) else {
                tracing::debug!(href, "firescans: chapter link outside manga path");
                continue;
            };
            let title = link.text().collect::<String>().trim().to_string();
            refs.push(ChapterRef::new(
                SourceId::FireScans,
                remote_id,
                chapter_id,
                absolutize(ORIGIN, href),
                title,
            ));
        }

        if refs.is_empty() {
            return Err(SourceError::MalformedResponse(format!(
                "no chapters in ajax response for {remote_id}"
            )));
        }

        // The ajax endpoint returns the entire list at once.
        Ok(ChapterListPage {
            refs,
            can_load_more: false,
        })
    }

    fn prepare_chapter_fetch(
        &self,
        remote_id: &str,
        chapter_id: &str,
        _page: u32,
        _extra: &Extra,
    ) -> Result<FetchDescriptor> {
        Ok(
            FetchDescriptor::get(format!("{ORIGIN}/manga/{remote_id}/{chapter_id}/"))
                .with_headers(&self.base_headers()),
        )
    }

    fn handle_chapter(
        &self,
        payload: &str,
        remote_id: &str,
        chapter_id: &str,
        _page: u32,
    ) -> Result<ChapterPage> {
        self.guard(payload)?;

        let document = Html::parse_document(payload);
        let images: Vec<ImageRef> = document
            .select(&READER_IMAGE)
            .filter_map(image_source)
            .map(|src| ImageRef::plain(absolutize(ORIGIN, src.trim())))
            .collect();

        if images.is_empty() {
            return Err(SourceError::MalformedResponse(format!(
                "no reader images for {remote_id}/{chapter_id}"
            )));
        }

        let mut content = ChapterContent::new(
            SourceId::FireScans,
            remote_id,
            chapter_id,
            chapter_id.replace('-', " "),
        );
        content.request_headers = self.base_headers();
        content.images = images;

        Ok(ChapterPage {
            content,
            can_load_more: false,
            next_page: None,
            next_extra: None,
        })
    }

    fn sync_extra_data(&self, blob: &serde_json::Value) -> Result<String> {
        let applied = self.session.merge_json(blob);
        if applied.is_empty() {
            Ok("no usable session fields in payload".to_string())
        } else {
            Ok(format!("applied {} session field(s)", applied.len()))
        }
    }
}

/// Pick the real image URL out of a lazy-loading `<img>`.
fn image_source(img: ElementRef<'_>) -> Option<String> {
    let element = img.value();
    element
        .attr("data-src")
        .or_else(|| element.attr("data-lazy-src"))
        .or_else(|| element.attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(ToString::to_string)
}

/// Resolve protocol-relative and root-relative URLs against the origin.
fn absolutize(origin: &str, url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else if url.starts_with('/') {
        format!("{origin}{url}")
    } else {
        url.to_string()
    }
}

/// First path segment after `/manga/`.
fn manga_slug(href: &str) -> Option<String> {
    let start = href.find("/manga/")? + "/manga/".len();
    let slug: String = href[start..].chars().take_while(|&c| c != '/').collect();
    (!slug.is_empty()).then_some(slug)
}

/// Path segment following the manga slug in a chapter URL.
fn chapter_slug(href: &str, remote_id: &str) -> Option<String> {
    let needle = format!("/manga/{remote_id}/");
    let start = href.find(&needle)? + needle.len();
    let slug: String = href[start..].chars().take_while(|&c| c != '/').collect();
    (!slug.is_empty()).then_some(slug)
}

fn parse_release_date(text: &str) -> Option<DateTime<Utc>> {
    for format in ["%B %d, %Y", "%B %e, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            let midnight = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&midnight));
        }
    }
    // Relative dates ("2 days ago") carry no usable timestamp.
    None
}

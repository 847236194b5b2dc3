//! JSON-API source with timestamped token headers, an encrypted response
//! envelope, and strip-scrambled page images.

mod api_types;
pub(crate) mod crypto;

use api_types::{Album, AlbumStub, ApiEnvelope, ChapterData, SearchPayload};

use super::{ChapterPage, ListingPage, MangaSource, SessionState, SourceMetadata};
use crate::descramble::ScrambleScheme;
use crate::fetch::FetchDescriptor;
use crate::guard::check_challenge;
use crate::identity::SourceId;
use crate::pagination::Extra;
use crate::status::StatusMap;
use crate::types::{
    CatalogEntry, ChapterContent, ChapterRef, FILTER_UNSET, FilterGroup, FilterOption,
    FilterSelection, ImageRef,
};
use crate::{Result, SourceError};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

const API_BASE: &str = "https://www.cdnhth.club";
const WEB_BASE: &str = "https://18-comicblade.art";
const IMG_BASE: &str = "https://cdn-msp.jmapiproxy1.cc";
const USER_AGENT: &str =
    "Mozilla/5.0 (Linux; Android 7.1.2; DT1901A Build/N2G47O; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/86.0.4240.198 Mobile Safari/537.36";

// Chapters older than the site-issued threshold are served unscrambled; this
// is the value the reader template falls back to when the marker is absent.
const DEFAULT_SCRAMBLE_ID: i64 = 220_980;

const SESSION_TS: &str = "ts";

static STATUS: Lazy<StatusMap> = Lazy::new(|| {
    use crate::types::MangaStatus::{Ended, Serial};
    StatusMap::new(&[
        ("连载中", Serial),
        ("連載中", Serial),
        ("未完结", Serial),
        ("未完結", Serial),
        ("已完结", Ended),
        ("已完結", Ended),
        ("完结", Ended),
        ("完結", Ended),
    ])
});

static SCRAMBLE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var scramble_id = (\d+)").expect("Invalid regex"));

pub struct JmComic {
    metadata: SourceMetadata,
    session: SessionState,
}

impl Default for JmComic {
    fn default() -> Self {
        Self::new()
    }
}

impl JmComic {
    pub fn new() -> Self {
        let metadata = SourceMetadata {
            id: SourceId::JmComic,
            name: "JMComic",
            short_name: "JM",
            description: "CJK comic site with a token-gated JSON API and scrambled page delivery.",
            origin_url: WEB_BASE,
            user_agent: USER_AGENT,
            default_headers: vec![("Accept-Encoding", "identity")],
            ranking: 75,
            disabled: false,
            challenge_title: Some("Just a moment"),
            discovery_filters: vec![
                FilterGroup::new(
                    "time",
                    vec![
                        FilterOption::new("Today", "t"),
                        FilterOption::new("This Week", "w"),
                        FilterOption::new("This Month", "m"),
                    ],
                ),
                FilterGroup::new(
                    "order",
                    vec![
                        FilterOption::new("Most Viewed", "mv"),
                        FilterOption::new("Most Pictures", "mp"),
                        FilterOption::new("Most Favorited", "tf"),
                    ],
                ),
            ],
            search_filters: vec![FilterGroup::new(
                "order",
                vec![
                    FilterOption::new("Most Viewed", "mv"),
                    FilterOption::new("Most Favorited", "tf"),
                ],
            )],
        };

        Self {
            metadata,
            session: SessionState::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &SessionState {
        &self.session
    }

    /// The descrambler identifier for a page image of this source.
    pub fn scramble_identifier(chapter_id: &str, image_name: &str) -> String {
        format!("{chapter_id}/{image_name}")
    }

    /// Stamp a fresh request timestamp into the session and build the token
    /// headers for it. The matching `handle*` reads the timestamp back to
    /// derive the envelope key.
    fn api_headers(&self) -> HashMap<String, String> {
        let ts = unix_timestamp();
        self.session.set(SESSION_TS, ts.to_string());

        let (token, tokenparam) = crypto::token_headers(ts);
        let mut headers = HashMap::new();
        headers.insert("token".to_string(), token);
        headers.insert("tokenparam".to_string(), tokenparam);
        headers.insert("version".to_string(), crypto::APP_VERSION.to_string());
        headers.insert("User-Agent".to_string(), self.metadata.user_agent.to_string());
        for (name, value) in &self.metadata.default_headers {
            headers.insert((*name).to_string(), (*value).to_string());
        }
        if let Some(cookie) = self.session_cookie() {
            headers.insert("Cookie".to_string(), cookie);
        }
        headers
    }

    fn web_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), self.metadata.user_agent.to_string());
        headers.insert("Referer".to_string(), format!("{WEB_BASE}/"));
        if let Some(cookie) = self.session_cookie() {
            headers.insert("Cookie".to_string(), cookie);
        }
        headers
    }

    fn session_cookie(&self) -> Option<String> {
        if let Some(cookie) = self.session.get("cookie") {
            return Some(cookie);
        }
        self.session.get("AVS").map(|avs| format!("AVS={avs}"))
    }

    fn request_timestamp(&self) -> Result<i64> {
        self.session
            .get(SESSION_TS)
            .and_then(|ts| ts.parse::<i64>().ok())
            .ok_or_else(|| {
                SourceError::MalformedResponse(
                    "no request timestamp in session; prepare must run first".to_string(),
                )
            })
    }

    /// Unwrap `{code, data}` and decrypt the envelope when it is a string.
    fn open_envelope(&self, payload: &str) -> Result<serde_json::Value> {
        let envelope: ApiEnvelope = serde_json::from_str(payload)
            .map_err(|e| SourceError::MalformedResponse(format!("api envelope: {e}")))?;

        if envelope.code != 200 {
            let msg = if envelope.error_msg.is_empty() {
                format!("api code {}", envelope.code)
            } else {
                envelope.error_msg.clone()
            };
            if envelope.error_msg.contains("登入") || envelope.error_msg.contains("登錄") {
                return Err(SourceError::AuthExpired(msg));
            }
            return Err(SourceError::MalformedResponse(msg));
        }

        match envelope.data {
            serde_json::Value::String(encrypted) => {
                let ts = self.request_timestamp()?;
                let decoded = crypto::decode_envelope(&encrypted, ts)?;
                serde_json::from_str(&decoded)
                    .map_err(|e| SourceError::MalformedResponse(format!("decoded envelope: {e}")))
            }
            // Some mirrors serve the payload in the clear.
            other => Ok(other),
        }
    }

    fn stub_to_entry(&self, stub: AlbumStub) -> Option<CatalogEntry> {
        if stub.id.is_empty() || stub.name.is_empty() {
            tracing::debug!("jmcomic: skipping album stub without id or name");
            return None;
        }

        let authors: Vec<String> = stub
            .author
            .split('&')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        Some(
            CatalogEntry::new(SourceId::JmComic, self.metadata.name, &stub.id, stub.name)
                .with_origin_url(format!("{WEB_BASE}/album/{}", stub.id))
                .with_cover(Some(cover_url(&stub.id)))
                .with_cover_thumb(Some(thumb_url(&stub.id)))
                .with_authors(authors),
        )
    }

    fn stubs_to_listing(&self, stubs: Vec<AlbumStub>) -> ListingPage {
        let entries: Vec<CatalogEntry> = stubs
            .into_iter()
            .filter_map(|stub| self.stub_to_entry(stub))
            .collect();

        let can_load_more = !entries.is_empty();
        ListingPage {
            entries,
            can_load_more,
            next_page: None,
            next_extra: None,
        }
    }
}

impl MangaSource for JmComic {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn prepare_discovery_fetch(
        &self,
        page: u32,
        filters: &FilterSelection,
        _extra: &Extra,
    ) -> Result<FetchDescriptor> {
        let mut url = format!("{API_BASE}/latest/?page={page}");
        let time = filters.get("time").map_or(FILTER_UNSET, String::as_str);
        if time != FILTER_UNSET {
            url.push_str(&format!("&t={}", urlencoding::encode(time)));
        }
        let order = filters.get("order").map_or(FILTER_UNSET, String::as_str);
        if order != FILTER_UNSET {
            url.push_str(&format!("&o={}", urlencoding::encode(order)));
        }

        Ok(FetchDescriptor::get(url).with_headers(&self.api_headers()))
    }

    fn handle_discovery(&self, payload: &str) -> Result<ListingPage> {
        let data = self.open_envelope(payload)?;
        let stubs: Vec<AlbumStub> = serde_json::from_value(data)
            .map_err(|e| SourceError::MalformedResponse(format!("latest list: {e}")))?;
        Ok(self.stubs_to_listing(stubs))
    }

    fn prepare_search_fetch(
        &self,
        keyword: &str,
        page: u32,
        filters: &FilterSelection,
        _extra: &Extra,
    ) -> Result<FetchDescriptor> {
        let mut url = format!(
            "{API_BASE}/search/?search_query={}&page={page}",
            urlencoding::encode(keyword)
        );
        let order = filters.get("order").map_or(FILTER_UNSET, String::as_str);
        if order != FILTER_UNSET {
            url.push_str(&format!("&o={}", urlencoding::encode(order)));
        }

        Ok(FetchDescriptor::get(url).with_headers(&self.api_headers()))
    }

    fn handle_search(&self, payload: &str) -> Result<ListingPage> {
        let data = self.open_envelope(payload)?;
        let search: SearchPayload = serde_json::from_value(data)
            .map_err(|e| SourceError::MalformedResponse(format!("search payload: {e}")))?;

        if let Some(total) = search.total {
            tracing::debug!(total, "jmcomic: search total");
        }
        Ok(self.stubs_to_listing(search.content))
    }

    fn prepare_manga_info_fetch(&self, remote_id: &str) -> Result<FetchDescriptor> {
        Ok(
            FetchDescriptor::get(format!("{API_BASE}/album/?id={remote_id}"))
                .with_headers(&self.api_headers()),
        )
    }

    fn handle_manga_info(&self, payload: &str, remote_id: &str) -> Result<CatalogEntry> {
        let data = self.open_envelope(payload)?;
        let album: Album = serde_json::from_value(data)
            .map_err(|e| SourceError::MalformedResponse(format!("album payload: {e}")))?;

        if album.name.is_empty() {
            return Err(SourceError::NotFound(format!("album {remote_id}")));
        }

        let status = album
            .tags
            .iter()
            .map(|tag| STATUS.resolve(tag))
            .find(|s| *s != crate::types::MangaStatus::Unknown)
            .unwrap_or_default();

        let chapters: Vec<ChapterRef> = if album.series.is_empty() {
            // Single-chapter albums have no series list; the album itself is
            // the only chapter.
            vec![ChapterRef::new(
                SourceId::JmComic,
                &album.id,
                &album.id,
                format!("{WEB_BASE}/photo/{}", album.id),
                album.name.clone(),
            )]
        } else {
            album
                .series
                .iter()
                .map(|entry| {
                    let title = if entry.name.is_empty() {
                        format!("Ch. {}", entry.sort)
                    } else {
                        entry.name.clone()
                    };
                    ChapterRef::new(
                        SourceId::JmComic,
                        &album.id,
                        &entry.id,
                        format!("{WEB_BASE}/photo/{}", entry.id),
                        title,
                    )
                })
                .collect()
        };

        let latest_label = album
            .series
            .last()
            .map(|entry| format!("Ch. {}", entry.sort));

        let last_update = album
            .addtime
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        let authors = album
            .author
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        Ok(
            CatalogEntry::new(SourceId::JmComic, self.metadata.name, &album.id, album.name.clone())
                .with_origin_url(format!("{WEB_BASE}/album/{}", album.id))
                .with_cover(Some(cover_url(&album.id)))
                .with_cover_thumb(Some(thumb_url(&album.id)))
                .with_tags(album.tags.clone())
                .with_status(status)
                .with_latest_label(latest_label)
                .with_last_update(last_update)
                .with_authors(authors)
                .with_chapters(chapters),
        )
    }

    /// Chapter content is a two-step listing: page 1 fetches the web reader
    /// template to learn the scramble threshold, page 2 fetches the API
    /// payload with the page images.
    fn prepare_chapter_fetch(
        &self,
        _remote_id: &str,
        chapter_id: &str,
        page: u32,
        extra: &Extra,
    ) -> Result<FetchDescriptor> {
        if page <= 1 {
            return Ok(
                FetchDescriptor::get(format!("{WEB_BASE}/photo/{chapter_id}"))
                    .with_headers(&self.web_headers()),
            );
        }

        // A lost bag is not fatal: fall back to the site's default threshold.
        let scramble_id = extra
            .get("scramble_id")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SCRAMBLE_ID.to_string());
        self.session.set(scramble_key(chapter_id), scramble_id);

        Ok(
            FetchDescriptor::get(format!("{API_BASE}/chapter/?id={chapter_id}"))
                .with_headers(&self.api_headers()),
        )
    }

    fn handle_chapter(
        &self,
        payload: &str,
        remote_id: &str,
        chapter_id: &str,
        page: u32,
    ) -> Result<ChapterPage> {
        if page <= 1 {
            check_challenge(payload, self.metadata.challenge_title)?;

            let scramble_id = SCRAMBLE_ID_RE
                .captures(payload)
                .and_then(|cap| cap.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| DEFAULT_SCRAMBLE_ID.to_string());

            let mut extra = Extra::new();
            extra.insert("scramble_id".to_string(), scramble_id);

            let content =
                ChapterContent::new(SourceId::JmComic, remote_id, chapter_id, chapter_id);
            return Ok(ChapterPage {
                content,
                can_load_more: true,
                next_page: Some(2),
                next_extra: Some(extra),
            });
        }

        let data = self.open_envelope(payload)?;
        let chapter: ChapterData = serde_json::from_value(data)
            .map_err(|e| SourceError::MalformedResponse(format!("chapter payload: {e}")))?;

        if chapter.images.is_empty() {
            return Err(SourceError::MalformedResponse(format!(
                "chapter {chapter_id} has no images"
            )));
        }

        let eps_id = chapter_id.parse::<i64>().map_err(|_| {
            SourceError::MalformedResponse(format!("chapter id is not numeric: {chapter_id}"))
        })?;

        let threshold = self
            .session
            .get(&scramble_key(chapter_id))
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_SCRAMBLE_ID);

        let images: Vec<ImageRef> = chapter
            .images
            .iter()
            .map(|name| {
                let uri = format!("{IMG_BASE}/media/photos/{chapter_id}/{name}");
                // Animated pages are delivered unscrambled.
                if eps_id >= threshold && name.ends_with(".webp") {
                    ImageRef::scrambled(uri, ScrambleScheme::Strips)
                } else {
                    ImageRef::plain(uri)
                }
            })
            .collect();

        let mut content = ChapterContent::new(
            SourceId::JmComic,
            remote_id,
            chapter_id,
            if chapter.name.is_empty() {
                chapter_id.to_string()
            } else {
                chapter.name.clone()
            },
        );
        content.display_name = (!chapter.name.is_empty()).then(|| chapter.name.clone());
        content.request_headers = self.web_headers();
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
            Ok(format!(
                "applied {} session field(s): {}",
                applied.len(),
                applied.join(", ")
            ))
        }
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn scramble_key(chapter_id: &str) -> String {
    format!("scramble:{chapter_id}")
}

fn cover_url(album_id: &str) -> String {
    format!("{IMG_BASE}/media/albums/{album_id}_3x4.jpg")
}

fn thumb_url(album_id: &str) -> String {
    format!("{IMG_BASE}/media/albums/{album_id}.jpg")
}

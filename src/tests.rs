//! Integration tests over fixture payloads. No network access: adapters are
//! driven with inline documents, and the manager with a scripted executor.

use crate::fetch::{FetchDescriptor, FetchExecutor, FetchPayload};
use crate::{Result, SourceError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Opt-in log output for test debugging: `RUST_LOG=hondana=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Executor that answers from a fixed route table (first URL substring
/// match wins) and counts the requests it served.
struct ScriptedExecutor {
    routes: Vec<(String, String)>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    fn new(routes: &[(&str, &str)]) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|(pattern, body)| ((*pattern).to_string(), (*body).to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchExecutor for ScriptedExecutor {
    async fn execute(&self, descriptor: &FetchDescriptor) -> Result<FetchPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.routes
            .iter()
            .find(|(pattern, _)| descriptor.url.contains(pattern.as_str()))
            .map(|(_, body)| FetchPayload {
                status: 200,
                body: body.clone(),
                final_url: descriptor.url.clone(),
            })
            .ok_or_else(|| SourceError::NotFound(descriptor.url.clone()))
    }
}

mod firescans_fixtures {
    pub const DISCOVERY_PAGE_1: &str = r#"<!DOCTYPE html>
<html><head><title>Fire Scans - Manga List</title></head><body>
<div class="page-listing">
  <div class="page-item-detail manga">
    <div class="item-thumb"><a href="https://firescans.xyz/manga/solo-leveling/">
      <img data-src="//cdn.firescans.xyz/covers/solo-leveling.jpg" src="data:image/gif;base64,R0lGOD"/>
    </a></div>
    <div class="post-title font-title"><h3><a href="https://firescans.xyz/manga/solo-leveling/">Solo Leveling</a></h3></div>
  </div>
  <div class="page-item-detail manga">
    <div class="item-thumb"><a href="https://firescans.xyz/manga/omniscient-reader/">
      <img src="/covers/omniscient-reader.jpg"/>
    </a></div>
    <div class="post-title font-title"><h3><a href="https://firescans.xyz/manga/omniscient-reader/">Omniscient Reader</a></h3></div>
  </div>
  <div class="page-item-detail manga">
    <div class="item-thumb"><img src="/covers/broken.jpg"/></div>
  </div>
</div>
</body></html>"#;

    pub const DISCOVERY_PAGE_2: &str = r#"<!DOCTYPE html>
<html><head><title>Fire Scans - Manga List</title></head><body>
<div class="page-listing">
  <div class="page-item-detail manga">
    <div class="post-title font-title"><h3><a href="https://firescans.xyz/manga/the-great-mage/">The Great Mage</a></h3></div>
  </div>
</div>
</body></html>"#;

    pub const DISCOVERY_EMPTY: &str = r#"<!DOCTYPE html>
<html><head><title>Fire Scans - Manga List</title></head><body>
<div class="page-listing"></div>
</body></html>"#;

    pub const SEARCH_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>You searched for solo - Fire Scans</title></head><body>
<div class="c-tabs-item">
  <div class="c-tabs-item__content">
    <div class="tab-thumb"><a href="https://firescans.xyz/manga/solo-leveling/"><img data-src="/covers/solo-leveling.jpg"/></a></div>
    <div class="post-title"><h3 class="h4"><a href="https://firescans.xyz/manga/solo-leveling/">Solo Leveling</a></h3></div>
  </div>
</div>
</body></html>"#;

    pub const DETAIL_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Solo Leveling - Fire Scans</title></head><body>
<div class="profile-manga">
  <div class="summary_image"><a href="https://firescans.xyz/manga/solo-leveling/">
    <img data-src="//cdn.firescans.xyz/covers/solo-leveling-full.jpg"/>
  </a></div>
  <div class="post-title"><h1>Solo Leveling</h1></div>
  <div class="summary-content">
    <div class="author-content"><a href="/manga-author/chugong/">Chugong</a></div>
    <div class="genres-content"><a rel="tag" href="/genre/action/">Action</a><a rel="tag" href="/genre/fantasy/">Fantasy</a></div>
  </div>
  <div class="post-status">
    <div class="post-content_item">
      <div class="summary-heading"><h5>Release</h5></div>
      <div class="summary-content">2018</div>
    </div>
    <div class="post-content_item">
      <div class="summary-heading"><h5>Status</h5></div>
      <div class="summary-content">OnGoing</div>
    </div>
  </div>
</div>
<ul class="main version-chap">
  <li class="wp-manga-chapter">
    <a href="https://firescans.xyz/manga/solo-leveling/chapter-179/">Chapter 179</a>
    <span class="chapter-release-date"><i>July 3, 2024</i></span>
  </li>
</ul>
</body></html>"#;

    pub const CHAPTER_LIST_AJAX: &str = r#"<ul class="main version-chap no-volumn">
  <li class="wp-manga-chapter">
    <a href="https://firescans.xyz/manga/solo-leveling/chapter-179/">Chapter 179</a>
    <span class="chapter-release-date"><i>July 3, 2024</i></span>
  </li>
  <li class="wp-manga-chapter">
    <a href="https://firescans.xyz/manga/solo-leveling/chapter-178/">Chapter 178</a>
    <span class="chapter-release-date"><i>June 26, 2024</i></span>
  </li>
  <li class="wp-manga-chapter">
    <a href="https://otherdomain.example/read/123/">Bad Link</a>
  </li>
</ul>"#;

    pub const CHAPTER_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Solo Leveling Chapter 179 - Fire Scans</title></head><body>
<div class="reading-content">
  <div class="page-break no-gaps"><img id="image-0" data-src="https://cdn.firescans.xyz/solo-leveling/179/01.jpg" src="data:image/gif;base64,R0lGOD"/></div>
  <div class="page-break no-gaps"><img id="image-1" data-src="//cdn.firescans.xyz/solo-leveling/179/02.jpg"/></div>
  <div class="page-break no-gaps"><img id="image-2" src="/local/179/03.jpg"/></div>
</div>
</body></html>"#;

    pub const CHALLENGE_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Just a moment...</title></head>
<body><form id="challenge-form" action="/cdn-cgi/l/chk_jschl"></form></body></html>"#;
}

mod firescans_tests {
    use super::firescans_fixtures as fx;
    use crate::source::MangaSource;
    use crate::source::firescans::FireScans;
    use crate::types::{FilterSelection, MangaStatus};
    use crate::{Extra, SourceError};

    #[test]
    fn discovery_descriptor_carries_defaults_and_filters() {
        let source = FireScans::new();
        let mut filters = FilterSelection::new();
        filters.insert("order".to_string(), "views".to_string());

        let descriptor = source
            .prepare_discovery_fetch(3, &filters, &Extra::new())
            .unwrap();
        assert_eq!(
            descriptor.url,
            "https://firescans.xyz/manga/page/3/?m_orderby=views"
        );
        assert!(descriptor.headers.contains_key("User-Agent"));
        assert_eq!(
            descriptor.headers.get("Referer").map(String::as_str),
            Some("https://firescans.xyz")
        );
    }

    #[test]
    fn discovery_parses_entries_and_skips_malformed_items() {
        let source = FireScans::new();
        let page = source.handle_discovery(fx::DISCOVERY_PAGE_1).unwrap();

        assert_eq!(page.entries.len(), 2);
        assert!(page.can_load_more);

        let first = &page.entries[0];
        assert_eq!(first.identity, "firescans&solo-leveling");
        assert_eq!(first.title, "Solo Leveling");
        // Protocol-relative covers are normalized as the final step.
        assert_eq!(
            first.cover_url.as_deref(),
            Some("https://cdn.firescans.xyz/covers/solo-leveling.jpg")
        );
        assert_eq!(first.status, MangaStatus::Unknown);
        assert!(first.chapters.is_empty());

        let second = &page.entries[1];
        assert_eq!(
            second.cover_url.as_deref(),
            Some("https://firescans.xyz/covers/omniscient-reader.jpg")
        );
    }

    #[test]
    fn discovery_detects_challenge_before_parsing() {
        let source = FireScans::new();
        let err = source.handle_discovery(fx::CHALLENGE_PAGE).unwrap_err();
        assert!(matches!(err, SourceError::ChallengeDetected { .. }));
    }

    #[test]
    fn search_parses_result_cards() {
        let source = FireScans::new();
        let page = source.handle_search(fx::SEARCH_PAGE).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].remote_id, "solo-leveling");
    }

    #[test]
    fn detail_maps_status_authors_and_dates() {
        let source = FireScans::new();
        let entry = source
            .handle_manga_info(fx::DETAIL_PAGE, "solo-leveling")
            .unwrap();

        assert_eq!(entry.title, "Solo Leveling");
        assert_eq!(entry.status, MangaStatus::Serial);
        assert_eq!(entry.authors, vec!["Chugong".to_string()]);
        assert_eq!(entry.tags, vec!["Action".to_string(), "Fantasy".to_string()]);
        assert_eq!(entry.latest_label.as_deref(), Some("Chapter 179"));
        assert_eq!(
            entry.cover_url.as_deref(),
            Some("https://cdn.firescans.xyz/covers/solo-leveling-full.jpg")
        );
        let updated = entry.last_update.expect("release date parsed");
        assert_eq!(updated.format("%Y-%m-%d").to_string(), "2024-07-03");
    }

    #[test]
    fn detail_without_title_is_malformed() {
        let source = FireScans::new();
        let err = source
            .handle_manga_info("<html><body><p>maintenance</p></body></html>", "x")
            .unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }

    #[test]
    fn chapter_list_uses_ajax_endpoint() {
        let source = FireScans::new();
        let descriptor = source
            .prepare_chapter_list_fetch("solo-leveling", 1)
            .unwrap()
            .expect("standalone endpoint");
        assert_eq!(
            descriptor.url,
            "https://firescans.xyz/manga/solo-leveling/ajax/chapters/"
        );
        assert_eq!(
            descriptor.headers.get("X-Requested-With").map(String::as_str),
            Some("XMLHttpRequest")
        );

        let page = source
            .handle_chapter_list(fx::CHAPTER_LIST_AJAX, "solo-leveling")
            .unwrap();
        // The foreign-domain link is skipped, not fatal.
        assert_eq!(page.refs.len(), 2);
        assert!(!page.can_load_more);
        assert_eq!(page.refs[0].identity, "firescans&solo-leveling&chapter-179");
        assert_eq!(page.refs[1].chapter_id, "chapter-178");
    }

    #[test]
    fn chapter_images_prefer_lazy_sources() {
        let source = FireScans::new();
        let page = source
            .handle_chapter(fx::CHAPTER_PAGE, "solo-leveling", "chapter-179", 1)
            .unwrap();

        assert!(!page.can_load_more);
        let uris: Vec<&str> = page.content.images.iter().map(|i| i.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec![
                "https://cdn.firescans.xyz/solo-leveling/179/01.jpg",
                "https://cdn.firescans.xyz/solo-leveling/179/02.jpg",
                "https://firescans.xyz/local/179/03.jpg",
            ]
        );
        assert!(page.content.images.iter().all(|i| !i.needs_descramble));
        assert_eq!(page.content.identity, "firescans&solo-leveling&chapter-179");
    }

    #[test]
    fn empty_reader_is_malformed() {
        let source = FireScans::new();
        let err = source
            .handle_chapter(
                "<html><head><title>ok</title></head><body></body></html>",
                "solo-leveling",
                "chapter-1",
                1,
            )
            .unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }

    #[test]
    fn synced_cookie_lands_in_descriptors() {
        let source = FireScans::new();
        let message = source
            .sync_extra_data(&serde_json::json!({
                "cookie": "cf_clearance=abc123",
                "ignored": 42
            }))
            .unwrap();
        assert!(message.contains("1 session field"));

        let descriptor = source
            .prepare_discovery_fetch(1, &FilterSelection::new(), &crate::Extra::new())
            .unwrap();
        assert_eq!(
            descriptor.headers.get("Cookie").map(String::as_str),
            Some("cf_clearance=abc123")
        );
    }
}

mod jmcomic_tests {
    use crate::source::MangaSource;
    use crate::source::jmcomic::{JmComic, crypto};
    use crate::types::{FilterSelection, MangaStatus};
    use crate::{Extra, ScrambleScheme, SourceError};

    fn envelope_for(source: &JmComic, plain: &str) -> String {
        let ts = source
            .session()
            .get("ts")
            .expect("prepare stamps a timestamp")
            .parse::<i64>()
            .unwrap();
        format!(
            r#"{{"code":200,"error_msg":"","data":"{}"}}"#,
            crypto::encode_envelope(plain, ts)
        )
    }

    #[test]
    fn discovery_descriptor_carries_token_headers() {
        let source = JmComic::new();
        let mut filters = FilterSelection::new();
        filters.insert("time".to_string(), "w".to_string());

        let descriptor = source
            .prepare_discovery_fetch(2, &filters, &Extra::new())
            .unwrap();
        assert_eq!(descriptor.url, "https://www.cdnhth.club/latest/?page=2&t=w");

        let token = descriptor.headers.get("token").expect("token header");
        assert_eq!(token.len(), 32);
        let tokenparam = descriptor.headers.get("tokenparam").expect("tokenparam");
        assert!(tokenparam.ends_with(",1.7.5"));
        assert!(descriptor.headers.contains_key("User-Agent"));
    }

    #[test]
    fn discovery_decrypts_envelope_and_maps_stubs() {
        let source = JmComic::new();
        source
            .prepare_discovery_fetch(1, &FilterSelection::new(), &Extra::new())
            .unwrap();

        let payload = envelope_for(
            &source,
            r#"[{"id":412397,"name":"海賊王的秘寶","author":"尾田"},{"id":"412398","name":"異世界日常","author":""},{"id":"","name":"broken"}]"#,
        );
        let page = source.handle_discovery(&payload).unwrap();

        assert_eq!(page.entries.len(), 2);
        assert!(page.can_load_more);
        assert_eq!(page.entries[0].identity, "jmcomic&412397");
        assert_eq!(page.entries[0].authors, vec!["尾田".to_string()]);
        assert!(
            page.entries[0]
                .cover_url
                .as_deref()
                .unwrap()
                .contains("412397_3x4")
        );
    }

    #[test]
    fn plaintext_mirror_payload_is_accepted() {
        let source = JmComic::new();
        let payload = r#"{"code":200,"error_msg":"","data":[{"id":1,"name":"A"}]}"#;
        let page = source.handle_discovery(payload).unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[test]
    fn login_demand_maps_to_auth_expired() {
        let source = JmComic::new();
        let payload = r#"{"code":401,"error_msg":"請先登入","data":""}"#;
        let err = source.handle_discovery(payload).unwrap_err();
        assert!(matches!(err, SourceError::AuthExpired(_)));
    }

    #[test]
    fn search_reads_content_list() {
        let source = JmComic::new();
        source
            .prepare_search_fetch("勇者", 1, &FilterSelection::new(), &Extra::new())
            .unwrap();

        let payload = envelope_for(
            &source,
            r#"{"search_query":"勇者","total":"2","content":[{"id":10,"name":"勇者一"},{"id":11,"name":"勇者二"}]}"#,
        );
        let page = source.handle_search(&payload).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[1].remote_id, "11");
    }

    #[test]
    fn album_maps_status_chapters_and_timestamps() {
        let source = JmComic::new();
        source.prepare_manga_info_fetch("412397").unwrap();

        let payload = envelope_for(
            &source,
            r#"{"id":412397,"name":"海賊王的秘寶","author":["尾田"],"tags":["冒險","完結"],"addtime":"1719955200",
               "series":[{"id":"412398","sort":"1","name":""},{"id":"412399","sort":"2","name":"最終話"}]}"#,
        );
        let entry = source.handle_manga_info(&payload, "412397").unwrap();

        assert_eq!(entry.status, MangaStatus::Ended);
        assert_eq!(entry.chapters.len(), 2);
        assert_eq!(entry.chapters[0].identity, "jmcomic&412397&412398");
        assert_eq!(entry.chapters[0].title, "Ch. 1");
        assert_eq!(entry.chapters[1].title, "最終話");
        assert_eq!(entry.latest_label.as_deref(), Some("Ch. 2"));
        assert!(entry.last_update.is_some());
    }

    #[test]
    fn album_without_series_is_single_chapter() {
        let source = JmComic::new();
        source.prepare_manga_info_fetch("9000").unwrap();

        let payload = envelope_for(
            &source,
            r#"{"id":9000,"name":"短篇","author":[],"tags":["连载中"],"series":[]}"#,
        );
        let entry = source.handle_manga_info(&payload, "9000").unwrap();
        assert_eq!(entry.status, MangaStatus::Serial);
        assert_eq!(entry.chapters.len(), 1);
        assert_eq!(entry.chapters[0].chapter_id, "9000");
    }

    #[test]
    fn chapter_step_one_extracts_scramble_threshold() {
        let source = JmComic::new();
        let descriptor = source
            .prepare_chapter_fetch("412397", "412398", 1, &Extra::new())
            .unwrap();
        assert!(descriptor.url.ends_with("/photo/412398"));

        let template = r#"<html><head><title>Reader</title></head>
            <body><script>var scramble_id = 220980;</script></body></html>"#;
        let page = source
            .handle_chapter(template, "412397", "412398", 1)
            .unwrap();

        assert!(page.can_load_more);
        assert_eq!(page.next_page, Some(2));
        let extra = page.next_extra.expect("threshold threaded via extra");
        assert_eq!(extra.get("scramble_id").map(String::as_str), Some("220980"));
        assert!(page.content.images.is_empty());
    }

    #[test]
    fn chapter_step_two_flags_scrambled_images() {
        let source = JmComic::new();

        let mut extra = Extra::new();
        extra.insert("scramble_id".to_string(), "220980".to_string());
        let descriptor = source
            .prepare_chapter_fetch("412397", "412398", 2, &extra)
            .unwrap();
        assert!(descriptor.url.contains("/chapter/?id=412398"));

        let payload = envelope_for(
            &source,
            r#"{"id":412398,"name":"第1話","images":["00001.webp","00002.webp","00003.gif"]}"#,
        );
        let page = source
            .handle_chapter(&payload, "412397", "412398", 2)
            .unwrap();

        assert!(!page.can_load_more);
        assert_eq!(page.content.images.len(), 3);
        assert_eq!(page.content.display_name.as_deref(), Some("第1話"));

        let first = &page.content.images[0];
        assert!(first.needs_descramble);
        assert_eq!(first.scramble_scheme, Some(ScrambleScheme::Strips));
        assert!(first.uri.ends_with("/media/photos/412398/00001.webp"));

        // Animated pages come through unscrambled.
        let gif = &page.content.images[2];
        assert!(!gif.needs_descramble);
        assert!(gif.scramble_scheme.is_none());
    }

    #[test]
    fn missing_extra_falls_back_to_default_threshold() {
        let source = JmComic::new();
        // No scramble_id in the bag: prepare derives the default instead of
        // failing.
        source
            .prepare_chapter_fetch("412397", "412398", 2, &Extra::new())
            .unwrap();

        let payload = envelope_for(
            &source,
            r#"{"id":412398,"images":["00001.webp"]}"#,
        );
        let page = source
            .handle_chapter(&payload, "412397", "412398", 2)
            .unwrap();
        assert!(page.content.images[0].needs_descramble);
    }

    #[test]
    fn old_chapters_below_threshold_stay_plain() {
        let source = JmComic::new();
        let mut extra = Extra::new();
        extra.insert("scramble_id".to_string(), "220980".to_string());
        source
            .prepare_chapter_fetch("100", "100", 2, &extra)
            .unwrap();

        let payload = envelope_for(&source, r#"{"id":100,"images":["00001.webp"]}"#);
        let page = source.handle_chapter(&payload, "100", "100", 2).unwrap();
        assert!(!page.content.images[0].needs_descramble);
    }

    #[test]
    fn sync_extra_data_merges_avs_cookie() {
        let source = JmComic::new();
        let message = source
            .sync_extra_data(&serde_json::json!({ "AVS": "deadbeef" }))
            .unwrap();
        assert!(message.contains("AVS"));

        let descriptor = source
            .prepare_discovery_fetch(1, &FilterSelection::new(), &Extra::new())
            .unwrap();
        assert_eq!(
            descriptor.headers.get("Cookie").map(String::as_str),
            Some("AVS=deadbeef")
        );
    }
}

mod manager_tests {
    use super::{ScriptedExecutor, firescans_fixtures as fx};
    use crate::identity::{Identity, SourceId};
    use crate::manager::{ListingKey, SourceManager};
    use crate::types::{FilterSelection, MangaStatus};
    use crate::{ScrambleScheme, create_default_registry};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn manager_with_routes(routes: &[(&str, &str)]) -> (SourceManager, Arc<ScriptedExecutor>) {
        super::init_tracing();
        let executor = Arc::new(ScriptedExecutor::new(routes));
        let manager = SourceManager::new(create_default_registry(), executor.clone());
        (manager, executor)
    }

    #[tokio::test]
    async fn discovery_pages_do_not_repeat_identities() {
        let (manager, executor) = manager_with_routes(&[
            ("/manga/page/1/", fx::DISCOVERY_PAGE_1),
            ("/manga/page/2/", fx::DISCOVERY_PAGE_2),
            ("/manga/page/3/", fx::DISCOVERY_EMPTY),
        ]);
        let filters = FilterSelection::new();

        let page1 = manager
            .discover(SourceId::FireScans, &filters)
            .await
            .unwrap();
        assert_eq!(page1.entries.len(), 2);

        let mut seen: HashSet<String> = HashSet::new();
        for entry in &page1.entries {
            assert!(seen.insert(entry.identity.clone()));
        }

        let page2 = manager
            .discover(SourceId::FireScans, &filters)
            .await
            .unwrap();
        assert_eq!(page2.entries.len(), 1);
        for entry in &page2.entries {
            // Cursor-threaded pagination must not bleed earlier identities.
            assert!(seen.insert(entry.identity.clone()));
        }

        // End-to-end identity shape: one or two separators, decodable, and a
        // status inside the enum domain.
        for identity in &seen {
            let separators = identity.matches('&').count();
            assert!(separators == 1 || separators == 2);
            let (source, _, _) = Identity::decode(identity).unwrap();
            assert_eq!(source, SourceId::FireScans);
        }
        for entry in page1.entries.iter().chain(page2.entries.iter()) {
            assert!(matches!(
                entry.status,
                MangaStatus::Unknown | MangaStatus::Serial | MangaStatus::Ended
            ));
        }

        // Page 3 is empty: the listing completes…
        let page3 = manager
            .discover(SourceId::FireScans, &filters)
            .await
            .unwrap();
        assert!(page3.entries.is_empty());
        assert!(!page3.can_load_more);
        let calls_after_completion = executor.calls();

        // …and stays terminal without further network traffic.
        let page4 = manager
            .discover(SourceId::FireScans, &filters)
            .await
            .unwrap();
        assert!(page4.entries.is_empty());
        assert!(!page4.can_load_more);
        assert_eq!(executor.calls(), calls_after_completion);

        // Reset restores page 1.
        manager.reset_listing(&ListingKey::Discovery {
            source: SourceId::FireScans,
        });
        let again = manager
            .discover(SourceId::FireScans, &filters)
            .await
            .unwrap();
        assert_eq!(again.entries.len(), 2);
    }

    #[tokio::test]
    async fn manga_info_attaches_ajax_chapters_and_caches() {
        let (manager, executor) = manager_with_routes(&[
            ("/ajax/chapters/", fx::CHAPTER_LIST_AJAX),
            ("/manga/solo-leveling/", fx::DETAIL_PAGE),
        ]);

        let entry = manager
            .manga_info(SourceId::FireScans, "solo-leveling")
            .await
            .unwrap();
        assert_eq!(entry.status, MangaStatus::Serial);
        assert_eq!(entry.chapters.len(), 2);
        let first_calls = executor.calls();
        assert_eq!(first_calls, 2);

        let cached = manager
            .manga_info(SourceId::FireScans, "solo-leveling")
            .await
            .unwrap();
        assert_eq!(cached.chapters.len(), 2);
        assert_eq!(executor.calls(), first_calls);
    }

    #[tokio::test]
    async fn chapter_list_answers_from_info_when_embedded() {
        // jmcomic embeds chapters in the album payload, so chapter_list must
        // route through manga_info. The scripted route serves a plaintext
        // mirror payload.
        let (manager, _executor) = manager_with_routes(&[(
            "/album/?id=9000",
            r#"{"code":200,"error_msg":"","data":{"id":9000,"name":"短篇","series":[{"id":"9001","sort":"1","name":""}]}}"#,
        )]);

        let page = manager
            .chapter_list(SourceId::JmComic, "9000")
            .await
            .unwrap();
        assert_eq!(page.refs.len(), 1);
        assert_eq!(page.refs[0].identity, "jmcomic&9000&9001");
        assert!(!page.can_load_more);
    }

    #[tokio::test]
    async fn challenge_does_not_advance_the_cursor() {
        let (manager, _executor) =
            manager_with_routes(&[("/manga/page/1/", fx::CHALLENGE_PAGE)]);
        let filters = FilterSelection::new();

        let err = manager
            .discover(SourceId::FireScans, &filters)
            .await
            .unwrap_err();
        assert!(err.needs_challenge_recovery());

        // The next attempt re-fetches page 1, not page 2.
        let err = manager
            .discover(SourceId::FireScans, &filters)
            .await
            .unwrap_err();
        assert!(err.needs_challenge_recovery());
    }

    #[tokio::test]
    async fn chapter_flow_threads_extra_between_steps() {
        let step_two = {
            // The scripted executor is stateless, so pre-compute nothing:
            // the jm adapter stamps its timestamp during prepare, and the
            // mirror route serves plaintext data that needs no key.
            r#"{"code":200,"error_msg":"","data":{"id":412398,"name":"第1話","images":["00001.webp","00002.gif"]}}"#
        };
        let step_one = r#"<html><head><title>Reader</title></head>
            <body><script>var scramble_id = 220980;</script></body></html>"#;

        let (manager, _executor) = manager_with_routes(&[
            ("/photo/412398", step_one),
            ("/chapter/?id=412398", step_two),
        ]);

        let first = manager
            .chapter(SourceId::JmComic, "412397", "412398")
            .await
            .unwrap();
        assert!(first.can_load_more);
        assert!(first.content.images.is_empty());

        let second = manager
            .chapter(SourceId::JmComic, "412397", "412398")
            .await
            .unwrap();
        assert!(!second.can_load_more);
        assert_eq!(second.content.images.len(), 2);
        assert!(second.content.images[0].needs_descramble);
        assert_eq!(
            second.content.images[0].scramble_scheme,
            Some(ScrambleScheme::Strips)
        );

        // Terminal afterwards.
        let third = manager
            .chapter(SourceId::JmComic, "412397", "412398")
            .await
            .unwrap();
        assert!(third.content.images.is_empty());
        assert!(!third.can_load_more);
    }

    #[tokio::test]
    async fn descramble_plans_are_cached_and_deterministic() {
        let (manager, _executor) = manager_with_routes(&[]);

        let first = manager
            .descramble_plan("412398/00001.webp", 720, 1037, ScrambleScheme::Strips)
            .await;
        let second = manager
            .descramble_plan("412398/00001.webp", 720, 1037, ScrambleScheme::Strips)
            .await;

        assert_eq!(*first, *second);
        assert!(Arc::ptr_eq(&first, &second));
    }
}

mod client_tests {
    use crate::client::FetchClient;
    use crate::fetch::{FetchDescriptor, FetchExecutor};
    use crate::SourceError;
    use httpmock::prelude::*;
    use std::time::Duration;

    #[tokio::test]
    async fn executes_get_with_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/manga/page/1/")
                    .header("x-session", "abc");
                then.status(200).body("<html>ok</html>");
            })
            .await;

        let client = FetchClient::new();
        let descriptor = FetchDescriptor::get(server.url("/manga/page/1/"))
            .with_header("X-Session", "abc");
        let payload = client.execute(&descriptor).await.unwrap();

        mock.assert_async().await;
        assert_eq!(payload.status, 200);
        assert_eq!(payload.body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn executes_post_with_form_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ajax/chapters/")
                    .header("x-requested-with", "XMLHttpRequest");
                then.status(200).body("<ul></ul>");
            })
            .await;

        let client = FetchClient::new();
        let descriptor = FetchDescriptor::post(server.url("/ajax/chapters/"))
            .with_header("X-Requested-With", "XMLHttpRequest")
            .with_form(vec![("action".to_string(), "manga_get_chapters".to_string())]);
        let payload = client.execute(&descriptor).await.unwrap();

        mock.assert_async().await;
        assert_eq!(payload.status, 200);
    }

    #[tokio::test]
    async fn maps_statuses_to_error_taxonomy() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/private");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/blocked");
                then.status(403).body("<title>Just a moment...</title>");
            })
            .await;

        let client = FetchClient::new();

        let err = client
            .execute(&FetchDescriptor::get(server.url("/missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));

        let err = client
            .execute(&FetchDescriptor::get(server.url("/private")))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::AuthRequired(_)));

        // 403 bodies reach the caller so the guard can inspect them.
        let payload = client
            .execute(&FetchDescriptor::get(server.url("/blocked")))
            .await
            .unwrap();
        assert_eq!(payload.status, 403);
        assert!(payload.body.contains("Just a moment"));
    }

    #[tokio::test]
    async fn slow_responses_map_to_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200).delay(Duration::from_millis(500)).body("late");
            })
            .await;

        let client = FetchClient::with_timeout(Duration::from_millis(50));
        let err = client
            .execute(&FetchDescriptor::get(server.url("/slow")))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)));
    }
}

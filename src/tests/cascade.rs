use super::{
    calls, cascade_config, cascade_with, new_log,
    mock::{MockTransport, Reply},
    StaticSource, PLACEHOLDER,
};
use crate::{
    config::{HtmlRetailerConfig, ImageStrategy},
    scrape::FetchError,
    sources::{retailer::HtmlRetailer, Capability, SourceDescriptor, SourceError},
    types::{AttemptOutcome, BookRequest, ResolutionStatus},
};
use std::sync::Arc;

fn book() -> BookRequest {
    BookRequest::new("Il nome della rosa", "Umberto Eco")
}

fn images(mock: &MockTransport, sized: &[(&str, u32, u32)]) {
    for (url, w, h) in sized {
        mock.on(url, Reply::image(*w, *h));
    }
}

// --- ordering ---

#[test]
fn test_purchase_link_source_goes_first() {
    let mock = Arc::new(MockTransport::new());
    images(&mock, &[("https://a.test/link.png", 500, 700), ("https://b.test/search.png", 500, 700)]);

    let log = new_log();
    let a = StaticSource::new("A", 20, &log)
        .link("a.test", &["https://a.test/link.png"])
        .urls(&["https://a.test/search.png"]);
    let b = StaticSource::new("B", 10, &log).urls(&["https://b.test/search.png"]);

    let cascade = cascade_with(vec![a.boxed(), b.boxed()], &mock, &cascade_config());
    let resolution = cascade.resolve(&book().with_link("https://www.a.test/product/1"));

    assert_eq!(calls(&log), vec!["A:link_extract"]);
    assert_eq!(resolution.result().url, "https://a.test/link.png");
    assert_eq!(resolution.result().source_name.as_deref(), Some("A"));
}

#[test]
fn test_empty_link_extract_falls_back_to_priority_order() {
    let mock = Arc::new(MockTransport::new());

    let log = new_log();
    let a = StaticSource::new("A", 20, &log).link("a.test", &[]);
    let b = StaticSource::new("B", 10, &log);

    let cascade = cascade_with(vec![a.boxed(), b.boxed()], &mock, &cascade_config());
    let resolution = cascade.resolve(&book().with_link("https://a.test/product/1"));

    assert_eq!(calls(&log), vec!["A:link_extract", "B:metadata_search", "A:metadata_search"]);
    assert_eq!(resolution.result().status, ResolutionStatus::Defaulted);
}

#[test]
fn test_link_source_search_skipped_after_link_candidates() {
    let mock = Arc::new(MockTransport::new());
    images(&mock, &[("https://a.test/small.png", 100, 100)]);

    let log = new_log();
    let a = StaticSource::new("A", 10, &log).link("a.test", &["https://a.test/small.png"]);
    let b = StaticSource::new("B", 20, &log);

    let cascade = cascade_with(vec![a.boxed(), b.boxed()], &mock, &cascade_config());
    let resolution = cascade.resolve(&book().with_link("https://a.test/p"));

    assert_eq!(calls(&log), vec!["A:link_extract", "B:metadata_search"]);
    assert!(matches!(
        resolution.report.attempts[1].outcome,
        AttemptOutcome::Skipped(_)
    ));
    assert_eq!(resolution.report.attempts[1].capability, Capability::MetadataSearch);
}

#[test]
fn test_unknown_link_domain_is_ignored() {
    let mock = Arc::new(MockTransport::new());
    let log = new_log();
    let a = StaticSource::new("A", 10, &log).link("a.test", &["https://a.test/x.png"]);

    let cascade = cascade_with(vec![a.boxed()], &mock, &cascade_config());
    cascade.resolve(&book().with_link("https://elsewhere.test/p"));

    assert_eq!(calls(&log), vec!["A:metadata_search"]);
}

// --- quality gate and fallback ---

#[test]
fn test_small_candidate_does_not_stop_cascade() {
    let mock = Arc::new(MockTransport::new());
    images(&mock, &[("https://one.test/200.png", 200, 200), ("https://two.test/500.png", 500, 500)]);

    let log = new_log();
    let one = StaticSource::new("One", 1, &log).urls(&["https://one.test/200.png"]);
    let two = StaticSource::new("Two", 2, &log).urls(&["https://two.test/500.png"]);

    let cascade = cascade_with(vec![one.boxed(), two.boxed()], &mock, &cascade_config());
    let resolution = cascade.resolve(&book());
    let result = resolution.result();

    assert_eq!(result.status, ResolutionStatus::Found);
    assert_eq!(result.url, "https://two.test/500.png");
    assert!(!result.sub_threshold);
    assert_eq!((result.width, result.height), (Some(500), Some(500)));
    assert!(resolution.asset.is_some());

    assert_eq!(
        resolution.report.attempts[0].outcome,
        AttemptOutcome::Rejected {
            url: "https://one.test/200.png".to_string(),
            width: 200,
            height: 200
        }
    );
}

#[test]
fn test_first_accepted_candidate_wins() {
    let mock = Arc::new(MockTransport::new());
    images(&mock, &[("https://one.test/400.png", 400, 400), ("https://two.test/900.png", 900, 900)]);

    let log = new_log();
    let one = StaticSource::new("One", 1, &log).urls(&["https://one.test/400.png"]);
    let two = StaticSource::new("Two", 2, &log).urls(&["https://two.test/900.png"]);

    let cascade = cascade_with(vec![one.boxed(), two.boxed()], &mock, &cascade_config());
    let resolution = cascade.resolve(&book());

    assert_eq!(resolution.result().url, "https://one.test/400.png");
    assert_eq!(calls(&log), vec!["One:metadata_search"]);
    assert_eq!(mock.calls("https://two.test/900.png"), 0);
}

#[test]
fn test_largest_rejected_candidate_beats_placeholder() {
    let mock = Arc::new(MockTransport::new());
    images(
        &mock,
        &[
            ("https://one.test/a.png", 200, 200),
            ("https://two.test/b.png", 280, 300),
            ("https://three.test/c.png", 100, 150),
        ],
    );

    let log = new_log();
    let sources = vec![
        StaticSource::new("One", 1, &log).urls(&["https://one.test/a.png"]).boxed(),
        StaticSource::new("Two", 2, &log).urls(&["https://two.test/b.png"]).boxed(),
        StaticSource::new("Three", 3, &log).urls(&["https://three.test/c.png"]).boxed(),
    ];

    let cascade = cascade_with(sources, &mock, &cascade_config());
    let resolution = cascade.resolve(&book());
    let result = resolution.result();

    assert_eq!(result.status, ResolutionStatus::Found);
    assert!(result.sub_threshold);
    assert_eq!(result.url, "https://two.test/b.png");
    assert_eq!(result.source_name.as_deref(), Some("Two"));
    assert!(resolution.asset.is_some());
}

#[test]
fn test_equal_area_fallback_keeps_first_seen() {
    let mock = Arc::new(MockTransport::new());
    images(&mock, &[("https://one.test/a.png", 200, 100), ("https://two.test/b.png", 100, 200)]);

    let log = new_log();
    let sources = vec![
        StaticSource::new("One", 1, &log).urls(&["https://one.test/a.png"]).boxed(),
        StaticSource::new("Two", 2, &log).urls(&["https://two.test/b.png"]).boxed(),
    ];

    let resolution = cascade_with(sources, &mock, &cascade_config()).resolve(&book());
    assert_eq!(resolution.result().url, "https://one.test/a.png");
}

#[test]
fn test_nothing_found_yields_placeholder() {
    let mock = Arc::new(MockTransport::new());
    let log = new_log();
    let sources = vec![
        StaticSource::new("One", 1, &log).boxed(),
        StaticSource::new("Two", 2, &log).boxed(),
    ];

    let resolution = cascade_with(sources, &mock, &cascade_config()).resolve(&book());
    let result = resolution.result();

    assert_eq!(result.status, ResolutionStatus::Defaulted);
    assert_eq!(result.url, PLACEHOLDER);
    assert_eq!(result.source_name, None);
    assert!(resolution.asset.is_none());
    assert!(resolution
        .report
        .attempts
        .iter()
        .all(|a| a.outcome == AttemptOutcome::NoCandidate));
}

#[test]
fn test_undecodable_candidates_still_beat_placeholder() {
    let mock = Arc::new(MockTransport::new());
    mock.on("https://one.test/login", Reply::html("<html>please log in</html>"));
    mock.on("https://one.test/gone.jpg", Reply::status(404));

    let log = new_log();
    let one = StaticSource::new("One", 1, &log)
        .urls(&["https://one.test/login", "https://one.test/gone.jpg"]);

    let resolution = cascade_with(vec![one.boxed()], &mock, &cascade_config()).resolve(&book());
    let result = resolution.result();

    assert_eq!(result.status, ResolutionStatus::Found);
    assert!(result.sub_threshold);
    assert_eq!(result.url, "https://one.test/login");
    assert_eq!((result.width, result.height), (None, None));
    assert!(resolution.asset.is_none());
    assert_eq!(resolution.report.attempts[0].probed, 2);
}

#[test]
fn test_sized_rejection_outranks_undecodable() {
    let mock = Arc::new(MockTransport::new());
    mock.on("https://one.test/login", Reply::html("<html>please log in</html>"));
    images(&mock, &[("https://two.test/small.png", 120, 160)]);

    let log = new_log();
    let sources = vec![
        StaticSource::new("One", 1, &log).urls(&["https://one.test/login"]).boxed(),
        StaticSource::new("Two", 2, &log).urls(&["https://two.test/small.png"]).boxed(),
    ];

    let resolution = cascade_with(sources, &mock, &cascade_config()).resolve(&book());

    assert_eq!(resolution.result().url, "https://two.test/small.png");
    assert_eq!(resolution.result().width, Some(120));
}

// --- failures ---

#[test]
fn test_source_errors_do_not_abort() {
    let mock = Arc::new(MockTransport::new());
    images(&mock, &[("https://two.test/ok.png", 600, 900)]);

    let log = new_log();
    let one = StaticSource::new("One", 1, &log)
        .search_with(|_| Err(SourceError::Fetch(FetchError::Transient("timeout".to_string()))));
    let parse = StaticSource::new("Parse", 2, &log)
        .search_with(|_| Err(SourceError::Parse("unexpected markup".to_string())));
    let two = StaticSource::new("Two", 3, &log).urls(&["https://two.test/ok.png"]);

    let cascade = cascade_with(vec![one.boxed(), parse.boxed(), two.boxed()], &mock, &cascade_config());
    let resolution = cascade.resolve(&book());

    assert_eq!(resolution.result().url, "https://two.test/ok.png");
    assert!(matches!(resolution.report.attempts[0].outcome, AttemptOutcome::Error(_)));
    assert!(matches!(resolution.report.attempts[1].outcome, AttemptOutcome::Error(_)));
}

// --- budgets ---

#[test]
fn test_probe_limit_per_source() {
    let mock = Arc::new(MockTransport::new());
    mock.on_prefix("https://one.test/", Reply::image(100, 100));

    let urls = (0..20)
        .map(|i| format!("https://one.test/{i}.png"))
        .collect::<Vec<_>>();
    let url_refs = urls.iter().map(String::as_str).collect::<Vec<_>>();

    let log = new_log();
    let one = StaticSource::new("One", 1, &log).urls(&url_refs);

    let resolution = cascade_with(vec![one.boxed()], &mock, &cascade_config()).resolve(&book());

    assert_eq!(resolution.report.attempts[0].probed, 15);
    assert_eq!(mock.total_calls(), 15);
    assert!(resolution.result().sub_threshold);
}

#[test]
fn test_duplicate_urls_probed_once() {
    let mock = Arc::new(MockTransport::new());
    images(&mock, &[("https://cdn.test/same.png", 100, 100)]);

    let log = new_log();
    let sources = vec![
        StaticSource::new("One", 1, &log).urls(&["https://cdn.test/same.png", ""]).boxed(),
        StaticSource::new("Two", 2, &log).urls(&["https://cdn.test/same.png"]).boxed(),
    ];

    let resolution = cascade_with(sources, &mock, &cascade_config()).resolve(&book());

    assert_eq!(mock.calls("https://cdn.test/same.png"), 1);
    assert_eq!(resolution.report.attempts[1].outcome, AttemptOutcome::NoCandidate);
}

#[test]
fn test_source_budget() {
    let mock = Arc::new(MockTransport::new());
    let log = new_log();
    let sources = vec![
        StaticSource::new("One", 1, &log).boxed(),
        StaticSource::new("Two", 2, &log).boxed(),
        StaticSource::new("Three", 3, &log).boxed(),
    ];

    let mut config = cascade_config();
    config.max_sources = Some(1);

    let resolution = cascade_with(sources, &mock, &config).resolve(&book());

    assert_eq!(calls(&log), vec!["One:metadata_search"]);
    assert_eq!(resolution.report.attempts.len(), 3);
    assert!(matches!(resolution.report.attempts[2].outcome, AttemptOutcome::Skipped(_)));
    assert_eq!(resolution.result().url, PLACEHOLDER);
}

#[test]
fn test_time_budget() {
    let mock = Arc::new(MockTransport::new());
    let log = new_log();
    let sources = vec![
        StaticSource::new("One", 1, &log).boxed(),
        StaticSource::new("Two", 2, &log).boxed(),
    ];

    let mut config = cascade_config();
    config.time_budget_secs = Some(0);

    let resolution = cascade_with(sources, &mock, &config).resolve(&book());

    assert!(calls(&log).is_empty());
    assert_eq!(resolution.result().status, ResolutionStatus::Defaulted);
}

// --- end to end with a scraped source ---

#[test]
fn test_retailer_fuzzy_match_boundary() {
    let mock = Arc::new(MockTransport::new());

    let retailer = HtmlRetailer::new(
        SourceDescriptor::new("Shop", 1, "https://shop.test", &[Capability::MetadataSearch]),
        HtmlRetailerConfig {
            search_url: "/search?q={query}".to_string(),
            item_selector: ".item".to_string(),
            title_selector: ".title".to_string(),
            author_selector: Some(".author".to_string()),
            link_selector: None,
            listing_image_selector: Some("img".to_string()),
            image_selectors: vec![],
            extraction: vec![ImageStrategy::JsonLd],
            markup_hints: vec![],
            follow_product_page: false,
            max_results: 5,
        },
    )
    .unwrap();

    let book = BookRequest::new("Great Escape, The: A Memoir", "Paul Brickhill");
    mock.on(
        &retailer.search_url(&book),
        Reply::html(
            r#"<div class="item"><span class="title">Unrelated Book</span><span class="author">Paul Brickhill</span><img src="https://cdn.test/unrelated.png"></div>
               <div class="item"><span class="title">The Great Escape</span><span class="author">Paul Brickhill</span><img src="https://cdn.test/escape.png"></div>"#,
        ),
    );
    images(&mock, &[("https://cdn.test/unrelated.png", 800, 800), ("https://cdn.test/escape.png", 400, 600)]);

    let cascade = cascade_with(vec![Box::new(retailer)], &mock, &cascade_config());
    let resolution = cascade.resolve(&book);

    assert_eq!(resolution.result().url, "https://cdn.test/escape.png");
    assert_eq!(mock.calls("https://cdn.test/unrelated.png"), 0);
}

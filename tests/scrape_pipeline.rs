//! End-to-end pipeline tests: mock catalog site -> walker -> store + history.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bookdex::catalog::HistoryLog;
use bookdex::config::ScraperConfig;
use bookdex::scrape::RunStatus;
use bookdex::{HttpFetcher, RunOptions, ScrapeService};

mod support;
use support::socket_guard::start_mock_server_or_skip;

// ---- HTML fixtures matching the catalog site's markup ----

fn pod(title: &str, price: &str, rating: &str) -> String {
    format!(
        r#"<article class="product_pod">
            <div class="image_container">
                <a href="book.html"><img src="media/{title}.jpg" alt="{title}"></a>
            </div>
            <p class="star-rating {rating}"></p>
            <h3><a href="book.html" title="{title}">{title}</a></h3>
            <div class="product_price">
                <p class="price_color">{price}</p>
                <p class="instock availability"><i class="icon-ok"></i> In stock</p>
            </div>
        </article>"#
    )
}

fn listing(pods: &[String], next: Option<&str>) -> String {
    let next_li = next
        .map(|href| format!(r#"<li class="next"><a href="{href}">next</a></li>"#))
        .unwrap_or_default();
    format!(
        "<html><body><section>{}</section><ul class=\"pager\">{next_li}</ul></body></html>",
        pods.join("\n")
    )
}

fn category_index(links: &[(&str, &str)]) -> String {
    let items: String = links
        .iter()
        .map(|(href, name)| format!(r#"<li><a href="{href}">{name}</a></li>"#))
        .collect();
    format!(
        r#"<html><body>
            <ul class="nav nav-list">
                <li><a href="catalogue/category/books_1/index.html">Books</a>
                    <ul>{items}</ul>
                </li>
            </ul>
        </body></html>"#
    )
}

fn test_config(server: &MockServer, dir: &tempfile::TempDir) -> ScraperConfig {
    ScraperConfig {
        base_url: format!("{}/index.html", server.uri()),
        page_delay_secs: 0.0,
        max_retries: 0,
        data_dir: dir.path().to_path_buf(),
        ..ScraperConfig::default()
    }
}

async fn mount_page(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// ---- Full walk: categories, pagination, store, history ----

#[tokio::test]
async fn test_full_walk_exports_store_and_history() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = tempfile::TempDir::new().unwrap();

    mount_page(
        &server,
        "/index.html",
        category_index(&[
            ("fiction/index.html", "Fiction"),
            ("travel/index.html", "Travel"),
        ]),
    )
    .await;
    mount_page(
        &server,
        "/fiction/index.html",
        listing(&[pod("Alpha", "£51.77", "Three")], Some("page-2.html")),
    )
    .await;
    mount_page(
        &server,
        "/fiction/page-2.html",
        listing(&[pod("Beta", "£12.00", "Five")], None),
    )
    .await;
    mount_page(
        &server,
        "/travel/index.html",
        listing(&[pod("Gamma", "£30.50", "One")], Some("page-2.html")),
    )
    .await;
    mount_page(
        &server,
        "/travel/page-2.html",
        listing(&[pod("Delta", "£7.25", "Four")], None),
    )
    .await;

    let config = test_config(&server, &dir);
    let store_path = config.store_path();
    let history_path = config.history_path();
    let service = ScrapeService::new(Arc::new(HttpFetcher::new()), config);

    let run = service.run_to_completion(RunOptions::default()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.books_scraped, 4);
    assert_eq!(run.categories_visited, 2);
    assert!(run.errors.is_empty());
    assert!(run.finished_at.is_some());

    let store = fs::read_to_string(&store_path).unwrap();
    let mut lines = store.lines();
    assert_eq!(
        lines.next(),
        Some("title,price,rating_text,rating_numeric,availability,category,image_url")
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].starts_with("Alpha,£51.77,Three,3,"));
    assert!(rows[0].contains(",Fiction,"));
    assert!(rows[3].starts_with("Delta,£7.25,Four,4,"));
    assert!(rows[3].contains(",Travel,"));

    let history = HistoryLog::new(history_path).read_all().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].run_id, run.id);
    assert_eq!(history[0].status, RunStatus::Completed);
    assert_eq!(history[0].books_scraped, 4);
    assert_eq!(history[0].categories_visited, 2);
    assert_eq!(history[0].error_count, 0);
}

// ---- A page that fails all retries is recorded, not fatal ----

#[tokio::test]
async fn test_failed_page_records_error_and_run_completes() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = tempfile::TempDir::new().unwrap();

    mount_page(
        &server,
        "/index.html",
        category_index(&[
            ("fiction/index.html", "Fiction"),
            ("travel/index.html", "Travel"),
        ]),
    )
    .await;
    mount_page(
        &server,
        "/fiction/index.html",
        listing(&[pod("Alpha", "£51.77", "Three")], None),
    )
    .await;
    // max_retries = 2 means exactly 3 attempts against the broken page.
    Mock::given(method("GET"))
        .and(path("/travel/index.html"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server, &dir);
    config.max_retries = 2;
    let store_path = config.store_path();
    let service = ScrapeService::new(Arc::new(HttpFetcher::new()), config);

    let run = service.run_to_completion(RunOptions::default()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.books_scraped, 1);
    assert_eq!(run.errors.len(), 1);
    assert!(run.errors[0].page.contains("/travel/index.html"));

    // The surviving category's record still made it to the store.
    let store = fs::read_to_string(&store_path).unwrap();
    assert!(store.contains("Alpha"));
    assert!(!store.contains("travel"));
}

// ---- A transient failure followed by success is retried through ----

#[tokio::test]
async fn test_transient_failure_is_retried_then_succeeds() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = tempfile::TempDir::new().unwrap();

    mount_page(
        &server,
        "/index.html",
        category_index(&[("fiction/index.html", "Fiction")]),
    )
    .await;
    // First hit fails with 503, every later hit serves the page.
    Mock::given(method("GET"))
        .and(path("/fiction/index.html"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/fiction/index.html",
        listing(&[pod("Alpha", "£51.77", "Three")], None),
    )
    .await;

    let mut config = test_config(&server, &dir);
    config.max_retries = 2;
    let service = ScrapeService::new(Arc::new(HttpFetcher::new()), config);

    let run = service.run_to_completion(RunOptions::default()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.books_scraped, 1);
    assert!(run.errors.is_empty());
}

// ---- 404 on a category page is fatal for the page, without retries ----

#[tokio::test]
async fn test_not_found_page_is_not_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = tempfile::TempDir::new().unwrap();

    mount_page(
        &server,
        "/index.html",
        category_index(&[("gone/index.html", "Gone")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/gone/index.html"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server, &dir);
    config.max_retries = 3;
    let service = ScrapeService::new(Arc::new(HttpFetcher::new()), config);

    let run = service.run_to_completion(RunOptions::default()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.books_scraped, 0);
    assert_eq!(run.errors.len(), 1);
}

// ---- Unreachable index fails the run before any category ----

#[tokio::test]
async fn test_index_failure_fails_the_run() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = tempfile::TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config(&server, &dir);
    let store_path = config.store_path();
    let history_path = config.history_path();
    let service = ScrapeService::new(Arc::new(HttpFetcher::new()), config);

    let run = service.run_to_completion(RunOptions::default()).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.errors.len(), 1);
    assert!(!store_path.exists(), "failed run must not touch the store");

    let history = HistoryLog::new(history_path).read_all().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RunStatus::Failed);
}

// ---- Cancellation discards partial records and never exports ----

#[tokio::test]
async fn test_cancelled_run_discards_partial_records() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = tempfile::TempDir::new().unwrap();

    // A slow index gives the cancel request time to land before the walker
    // reaches its first category.
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(category_index(&[("fiction/index.html", "Fiction")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/fiction/index.html",
        listing(&[pod("Alpha", "£51.77", "Three")], None),
    )
    .await;

    let config = test_config(&server, &dir);
    let store_path = config.store_path();
    let history_path = config.history_path();
    let service = ScrapeService::new(Arc::new(HttpFetcher::new()), config);

    let run_id = service.start_scrape(RunOptions::default()).unwrap();
    service.cancel(&run_id).unwrap();
    let run = service.wait(&run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(!store_path.exists(), "cancelled run must not touch the store");

    // The cancelled run is still part of the durable history.
    let history = HistoryLog::new(history_path).read_all().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].run_id, run_id);
    assert_eq!(history[0].status, RunStatus::Failed);
}

//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the archive and run the full
//! discover, resolve and merge cycle against a temporary database.

use paperhound::config::{Config, CrawlerConfig, OutputConfig, SourceConfig, UserAgentConfig};
use paperhound::crawler::Coordinator;
use paperhound::ingest::{IngestOutcome, SkipReason};
use paperhound::storage::{PaperStore, RunStatus, SqliteStorage};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock archive
fn create_test_config(base_url: &str, page_size: u32, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            page_size,
            request_delay_ms: 1, // Very short for testing
            max_attempts: 2,
            retry_delay_ms: 1,
            request_timeout_secs: 5,
            max_concurrent_details: 3,
        },
        source: SourceConfig {
            base_url: base_url.to_string(),
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        software: vec![],
    }
}

struct Harness {
    _dir: TempDir,
    storage: Arc<Mutex<SqliteStorage>>,
    coordinator: Coordinator<SqliteStorage>,
}

fn harness(server: &MockServer, page_size: u32) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("papers.db");
    let storage = Arc::new(Mutex::new(
        SqliteStorage::new(&db_path).expect("Failed to open database"),
    ));
    let config = create_test_config(&server.uri(), page_size, &db_path.to_string_lossy());
    let coordinator = Coordinator::new(config, "test-hash".to_string(), Arc::clone(&storage))
        .expect("Failed to create coordinator");

    Harness {
        _dir: dir,
        storage,
        coordinator,
    }
}

fn listing_page(ids: &[&str], total: u64) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<li class="arxiv-result">
                  <p class="list-title"><a href="https://arxiv.org/abs/{id}">arXiv:{id}</a></p>
                  <p class="title is-5">Paper {id}</p>
                </li>"#
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <h1 class="title">Showing 1&ndash;{} of {} results for all: software</h1>
        <ol class="breathe-horizontal">{}</ol>
        </body></html>"#,
        ids.len(),
        total,
        items
    )
}

fn detail_page(title: &str, authors: &[&str]) -> String {
    let authors: Vec<String> = authors
        .iter()
        .map(|name| format!(r##"<a href="#">{}</a>"##, name))
        .collect();

    format!(
        r#"<html><head>
        <meta property="og:title" content="{title}" />
        <meta property="og:description" content="Abstract of {title}." />
        </head><body>
        <div class="authors"><span class="descriptor">Authors:</span>{authors}</div>
        <a class="abs-button download-pdf" href="/pdf/2101.00001">View PDF</a>
        <div class="submission-history"><h2>Submission history</h2>
        <strong>[v1]</strong> Fri, 1 Jan 2021 09:15:00 UTC (1,024 KB)<br/>
        </div></body></html>"#,
        title = title,
        authors = authors.join(", ")
    )
}

async fn mount_detail(server: &MockServer, id: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/abs/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(server)
        .await;
}

fn software_names(storage: &Arc<Mutex<SqliteStorage>>, id: &str) -> Vec<String> {
    storage
        .lock()
        .unwrap()
        .find_by_identifier(id)
        .unwrap()
        .expect("paper should be stored")
        .software_names
}

#[tokio::test]
async fn test_single_page_of_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(query_param("query", "lammps"))
        .and(query_param("start", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&["2101.00001", "2101.00002"], 2)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_detail(&server, "2101.00001", detail_page("First", &["Ada Lovelace"]), 1).await;
    mount_detail(&server, "2101.00002", detail_page("Second", &["Alan Turing"]), 1).await;

    let h = harness(&server, 50);
    let report = h.coordinator.run_crawl("lammps").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.total_reported, 2);
    assert_eq!(report.tally.discovered, 2);
    assert_eq!(report.tally.inserted, 2);

    let storage = h.storage.lock().unwrap();
    let paper = storage.find_by_identifier("2101.00001").unwrap().unwrap();
    assert_eq!(paper.title, "First");
    assert_eq!(paper.authors, vec!["Ada Lovelace"]);
    assert_eq!(paper.abstract_text, "Abstract of First.");
    assert_eq!(paper.url, format!("{}/abs/2101.00001", server.uri()));
    assert_eq!(paper.software_names, vec!["lammps"]);
    assert_eq!(
        paper.published_at.map(|t| t.to_rfc3339()),
        Some("2021-01-01T09:15:00+00:00".to_string())
    );

    let run = storage.get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.tally.inserted, 2);
}

#[tokio::test]
async fn test_duplicate_ids_across_pages() {
    let server = MockServer::start().await;

    for start in ["0", "25"] {
        Mock::given(method("GET"))
            .and(path("/search/"))
            .and(query_param("start", start))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(listing_page(&["2101.00001", "2101.00002"], 30)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_detail(&server, "2101.00001", detail_page("First", &["A"]), 1).await;
    mount_detail(&server, "2101.00002", detail_page("Second", &["B"]), 1).await;

    let h = harness(&server, 25);
    let report = h.coordinator.run_crawl("gromacs").await.unwrap();

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.tally.discovered, 2);
    assert_eq!(report.tally.inserted, 2);
    assert_eq!(h.storage.lock().unwrap().count_papers().unwrap(), 2);
}

#[tokio::test]
async fn test_pagination_stops_before_total() {
    let server = MockServer::start().await;

    for (start, id) in [("0", "2101.00001"), ("25", "2101.00002"), ("50", "2101.00003")] {
        Mock::given(method("GET"))
            .and(path("/search/"))
            .and(query_param("start", start))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[id], 60)))
            .expect(1)
            .mount(&server)
            .await;
        mount_detail(&server, id, detail_page(id, &["Someone"]), 1).await;
    }
    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(query_param("start", "75"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[], 60)))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, 25);
    let report = h.coordinator.run_crawl("namd").await.unwrap();

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.tally.inserted, 3);
}

#[tokio::test]
async fn test_withdrawn_paper_uses_last_valid_revision() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["2101.00001"], 1)))
        .mount(&server)
        .await;

    let withdrawn = r#"<html><head>
        <meta property="og:title" content="Withdrawn" />
        </head><body>
        <td class="comments">This paper has been withdrawn by the authors</td>
        <div class="submission-history"><h2>Submission history</h2>
        <strong><a href="/abs/2101.00001v1">[v1]</a></strong> Fri, 1 Jan 2021 09:15:00 UTC (10 KB)<br/>
        <strong><a href="/abs/2101.00001v2">[v2]</a></strong> Tue, 2 Feb 2021 10:00:00 UTC (12 KB)<br/>
        <strong>[v3]</strong> Wed, 3 Mar 2021 11:30:00 UTC (1 KB)<br/>
        </div></body></html>"#;
    mount_detail(&server, "2101.00001", withdrawn.to_string(), 1).await;
    mount_detail(
        &server,
        "2101.00001v2",
        detail_page("Valid revision", &["Grace Hopper"]),
        1,
    )
    .await;

    let h = harness(&server, 50);
    let report = h.coordinator.run_crawl("lammps").await.unwrap();
    assert_eq!(report.tally.inserted, 1);

    let storage = h.storage.lock().unwrap();
    let paper = storage.find_by_identifier("2101.00001").unwrap().unwrap();
    assert_eq!(paper.title, "Valid revision");
    assert_eq!(paper.authors, vec!["Grace Hopper"]);
    // Submission time of v2 as listed on the withdrawn page
    assert_eq!(
        paper.published_at.map(|t| t.to_rfc3339()),
        Some("2021-02-02T10:00:00+00:00".to_string())
    );
}

#[tokio::test]
async fn test_merge_across_software_names() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&["2101.00001", "2101.00002"], 2)),
        )
        .expect(3)
        .mount(&server)
        .await;
    // Each paper is only fetched by the crawl that first discovers it
    mount_detail(&server, "2101.00001", detail_page("First", &["A"]), 1).await;
    mount_detail(&server, "2101.00002", detail_page("Second", &["B"]), 1).await;

    let h = harness(&server, 50);

    let first = h.coordinator.run_crawl("lammps").await.unwrap();
    assert_eq!(first.tally.inserted, 2);

    let second = h.coordinator.run_crawl("gromacs").await.unwrap();
    assert_eq!(second.tally.merged, 2);
    assert_eq!(second.tally.inserted, 0);

    let again = h.coordinator.run_crawl("lammps").await.unwrap();
    assert_eq!(again.tally.unchanged, 2);

    for id in ["2101.00001", "2101.00002"] {
        assert_eq!(software_names(&h.storage, id), vec!["lammps", "gromacs"]);
    }

    let storage = h.storage.lock().unwrap();
    assert_eq!(storage.latest_runs(10).unwrap().len(), 3);
    assert_eq!(
        storage.count_by_software().unwrap(),
        vec![("gromacs".to_string(), 2), ("lammps".to_string(), 2)]
    );
}

#[tokio::test]
async fn test_per_record_failures_are_isolated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &["2101.00001", "2101.00002", "2101.00003"],
            3,
        )))
        .mount(&server)
        .await;
    mount_detail(&server, "2101.00001", detail_page("Good", &["A"]), 1).await;
    mount_detail(
        &server,
        "2101.00002",
        "<html><body>No metadata here</body></html>".to_string(),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/abs/2101.00003"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, 50);
    let report = h.coordinator.run_crawl("lammps").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.tally.inserted, 1);
    assert_eq!(report.tally.skipped, 1);
    assert_eq!(report.tally.failed, 1);

    let storage = h.storage.lock().unwrap();
    assert_eq!(storage.count_papers().unwrap(), 1);
    assert!(storage.find_by_identifier("2101.00002").unwrap().is_none());
}

#[tokio::test]
async fn test_failed_second_page_keeps_partial_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["2101.00001"], 40)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(query_param("start", "25"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    mount_detail(&server, "2101.00001", detail_page("First", &["A"]), 1).await;

    let h = harness(&server, 25);
    let report = h.coordinator.run_crawl("lammps").await.unwrap();

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.tally.inserted, 1);

    let run = h.storage.lock().unwrap().get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert!(run.error_message.is_some());
}

#[tokio::test]
async fn test_ingest_single_paper() {
    let server = MockServer::start().await;
    mount_detail(&server, "2101.00001", detail_page("Direct", &["A"]), 1).await;

    let h = harness(&server, 50);

    let outcome = h
        .coordinator
        .ingest_one("arXiv:2101.00001v3", "lammps")
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Inserted);

    let outcome = h
        .coordinator
        .ingest_one("2101.00001", "lammps")
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Unchanged);
    assert_eq!(software_names(&h.storage, "2101.00001"), vec!["lammps"]);
}

#[tokio::test]
async fn test_ingest_single_paper_without_title() {
    let server = MockServer::start().await;
    mount_detail(
        &server,
        "2101.00001",
        "<html><body></body></html>".to_string(),
        1,
    )
    .await;

    let h = harness(&server, 50);
    let outcome = h
        .coordinator
        .ingest_one("2101.00001", "lammps")
        .await
        .unwrap();

    assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::EmptyTitle));
    assert_eq!(h.storage.lock().unwrap().count_papers().unwrap(), 0);
}

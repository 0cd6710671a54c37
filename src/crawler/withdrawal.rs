//! Withdrawal resolution
//!
//! A paper whose current revision carries the withdrawal notice is resolved
//! to the last revision in its submission history that still links to its
//! own page. That revision is fetched explicitly and its metadata replaces
//! the withdrawn page's.

use crate::crawler::detail::{extract_detail, parse_submission_time, PaperDetail, RevisionEntry};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::source::ArchiveSource;
use crate::ingest::{DetailOutcome, PaperMetadata, SkipReason};
use crate::HoundError;

/// Terminal state of resolving one paper
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Not withdrawn; the current revision is authoritative
    Direct(PaperDetail),
    /// Withdrawn; `detail` was taken from revision `version`
    Resolved {
        detail: PaperDetail,
        version: u32,
        /// Submission time of `version` as listed on the withdrawn page
        submitted: Option<String>,
    },
    Unresolvable { reason: String },
}

impl Resolution {
    /// Converts the resolution into what the merger consumes
    ///
    /// # Arguments
    ///
    /// * `canonical_url` - Unversioned detail page URL stored with the paper
    pub fn into_detail_outcome(self, canonical_url: &str) -> DetailOutcome {
        let (detail, submitted) = match self {
            Self::Direct(detail) => {
                let submitted = detail.latest_submission().map(str::to_string);
                (detail, submitted)
            }
            Self::Resolved {
                detail, submitted, ..
            } => (detail, submitted),
            Self::Unresolvable { reason } => {
                return DetailOutcome::Skip(SkipReason::Unresolvable(reason));
            }
        };

        DetailOutcome::Found(PaperMetadata {
            title: detail.title,
            authors: detail.authors,
            abstract_text: detail.abstract_text,
            url: canonical_url.to_string(),
            pdf_url: detail.pdf_url,
            published_at: submitted.as_deref().and_then(parse_submission_time),
        })
    }
}

/// Picks the last revision that still links to its own page and carries a
/// submission time
///
/// Returns `None` for an empty or malformed history.
pub fn last_valid_revision(revisions: &[RevisionEntry]) -> Option<&RevisionEntry> {
    revisions
        .iter()
        .rev()
        .find(|revision| revision.linked && revision.submitted.is_some())
}

/// Fetches a paper's current page and resolves withdrawals
///
/// A failure fetching the current page is returned as an error. A failure
/// fetching the earlier revision makes the paper [`Resolution::Unresolvable`].
pub async fn resolve_paper(
    fetcher: &Fetcher,
    source: &ArchiveSource,
    identifier: &str,
) -> Result<Resolution, HoundError> {
    let url = source.detail_url(identifier)?;
    let body = fetcher.fetch(url.as_str()).await?;
    let current = extract_detail(&body, &url);

    if !current.is_withdrawn {
        return Ok(Resolution::Direct(current));
    }

    let Some(revision) = last_valid_revision(&current.revisions) else {
        return Ok(Resolution::Unresolvable {
            reason: format!(
                "withdrawn with no usable revision ({} history entries)",
                current.revisions.len()
            ),
        });
    };
    let version = revision.version;
    let submitted = revision.submitted.clone();

    tracing::debug!("{} is withdrawn, resolving to v{}", identifier, version);

    let revision_url = source.revision_url(identifier, version)?;
    let body = match fetcher.fetch(revision_url.as_str()).await {
        Ok(body) => body,
        Err(e) => {
            return Ok(Resolution::Unresolvable {
                reason: format!("revision v{} unavailable: {}", version, e),
            });
        }
    };

    Ok(Resolution::Resolved {
        detail: extract_detail(&body, &revision_url),
        version,
        submitted,
    })
}

/// Resolves `identifier` into metadata ready for ingestion
pub async fn fetch_paper(
    fetcher: &Fetcher,
    source: &ArchiveSource,
    identifier: &str,
) -> Result<DetailOutcome, HoundError> {
    let canonical = source.detail_url(identifier)?;
    let resolution = resolve_paper(fetcher, source, identifier).await?;
    Ok(resolution.into_detail_outcome(canonical.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::crawler::fetcher::{build_http_client, FetchPolicy};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher() -> Fetcher {
        let user_agent = UserAgentConfig {
            crawler_name: "TestHound".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        let client = build_http_client(&user_agent, Duration::from_secs(5)).unwrap();
        Fetcher::new(
            client,
            FetchPolicy {
                max_attempts: 2,
                retry_delay: Duration::from_millis(5),
                min_interval: Duration::from_millis(1),
            },
        )
    }

    fn entry(version: u32, linked: bool, submitted: Option<&str>) -> RevisionEntry {
        RevisionEntry {
            version,
            linked,
            submitted: submitted.map(str::to_string),
        }
    }

    const WITHDRAWN_PAGE: &str = r##"<html><head>
        <meta property="og:title" content="Retracted title" />
        <meta property="og:description" content="This paper has been withdrawn by the authors." />
        </head><body>
        <div class="authors"><span class="descriptor">Authors:</span><a href="#">Jane Smith</a></div>
        <td class="tablecell comments">This paper has been withdrawn by the authors</td>
        <div class="submission-history"><h2>Submission history</h2> From: Jane Smith
        <br/><strong><a href="/abs/2101.00001v1">[v1]</a></strong> Fri, 1 Jan 2021 09:15:00 UTC (1,024 KB)<br/>
        <strong>[v2]</strong> Mon, 4 Jan 2021 17:02:33 UTC (1 KB) <i>(withdrawn)</i><br/>
        </div></body></html>"##;

    const REVISION_PAGE: &str = r##"<html><head>
        <meta property="og:title" content="Original title" />
        <meta property="og:description" content="Original abstract." />
        </head><body>
        <div class="authors"><span class="descriptor">Authors:</span><a href="#">Jane Smith</a>, <a href="#">John Doe</a></div>
        <a class="abs-button download-pdf" href="/pdf/2101.00001v1">View PDF</a>
        <div class="submission-history"><h2>Submission history</h2>
        <strong>[v1]</strong> Fri, 1 Jan 2021 09:15:00 UTC (1,024 KB)<br/>
        <strong><a href="/abs/2101.00001v2">[v2]</a></strong> Mon, 4 Jan 2021 17:02:33 UTC (1 KB)<br/>
        </div></body></html>"##;

    #[test]
    fn test_last_valid_revision() {
        let revisions = vec![
            entry(1, true, Some("Fri, 1 Jan 2021 09:15:00 UTC")),
            entry(2, true, Some("Sat, 2 Jan 2021 09:15:00 UTC")),
            entry(3, false, Some("Sun, 3 Jan 2021 09:15:00 UTC")),
        ];
        assert_eq!(last_valid_revision(&revisions).map(|r| r.version), Some(2));
    }

    #[test]
    fn test_last_valid_revision_requires_timestamp() {
        let revisions = vec![
            entry(1, true, Some("Fri, 1 Jan 2021 09:15:00 UTC")),
            entry(2, true, None),
        ];
        assert_eq!(last_valid_revision(&revisions).map(|r| r.version), Some(1));
    }

    #[test]
    fn test_last_valid_revision_empty_history() {
        assert!(last_valid_revision(&[]).is_none());
        assert!(last_valid_revision(&[entry(1, false, Some("x UTC"))]).is_none());
    }

    #[test]
    fn test_unresolvable_becomes_skip() {
        let outcome = Resolution::Unresolvable {
            reason: "gone".to_string(),
        }
        .into_detail_outcome("https://arxiv.org/abs/2101.00001");
        assert_eq!(
            outcome,
            DetailOutcome::Skip(SkipReason::Unresolvable("gone".to_string()))
        );
    }

    #[tokio::test]
    async fn test_direct_paper() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abs/2101.00001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REVISION_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let source = ArchiveSource::new(&server.uri()).unwrap();
        let outcome = fetch_paper(&test_fetcher(), &source, "2101.00001")
            .await
            .unwrap();

        let DetailOutcome::Found(metadata) = outcome else {
            panic!("expected metadata, got {:?}", outcome);
        };
        assert_eq!(metadata.title, "Original title");
        assert_eq!(metadata.url, format!("{}/abs/2101.00001", server.uri()));
        assert_eq!(
            metadata.published_at.map(|t| t.to_rfc3339()),
            Some("2021-01-04T17:02:33+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_withdrawn_paper_fetches_revision() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abs/2101.00001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WITHDRAWN_PAGE))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/abs/2101.00001v1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REVISION_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let source = ArchiveSource::new(&server.uri()).unwrap();
        let resolution = resolve_paper(&test_fetcher(), &source, "2101.00001")
            .await
            .unwrap();

        match &resolution {
            Resolution::Resolved {
                detail,
                version,
                submitted,
            } => {
                assert_eq!(*version, 1);
                assert_eq!(detail.title, "Original title");
                assert_eq!(detail.authors, vec!["Jane Smith", "John Doe"]);
                assert_eq!(submitted.as_deref(), Some("Fri, 1 Jan 2021 09:15:00 UTC"));
            }
            other => panic!("expected resolved paper, got {:?}", other),
        }

        let DetailOutcome::Found(metadata) =
            resolution.into_detail_outcome("https://arxiv.org/abs/2101.00001")
        else {
            panic!("expected metadata");
        };
        // Timestamp of the resolved revision, not the withdrawn one
        assert_eq!(
            metadata.published_at.map(|t| t.to_rfc3339()),
            Some("2021-01-01T09:15:00+00:00".to_string())
        );
        assert_eq!(
            metadata.pdf_url,
            format!("{}/pdf/2101.00001v1", server.uri())
        );
    }

    #[tokio::test]
    async fn test_withdrawn_without_history_is_unresolvable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abs/2101.00001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body>This paper has been withdrawn by arXiv administrators</body></html>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let source = ArchiveSource::new(&server.uri()).unwrap();
        let resolution = resolve_paper(&test_fetcher(), &source, "2101.00001")
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Unresolvable { .. }));
    }

    #[tokio::test]
    async fn test_failed_revision_fetch_is_unresolvable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abs/2101.00001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WITHDRAWN_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/abs/2101.00001v1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let source = ArchiveSource::new(&server.uri()).unwrap();
        let resolution = resolve_paper(&test_fetcher(), &source, "2101.00001")
            .await
            .unwrap();

        match resolution {
            Resolution::Unresolvable { reason } => assert!(reason.contains("v1")),
            other => panic!("expected unresolvable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_current_page_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abs/2101.00001"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = ArchiveSource::new(&server.uri()).unwrap();
        let result = resolve_paper(&test_fetcher(), &source, "2101.00001").await;

        assert!(matches!(result, Err(HoundError::FetchExhausted { .. })));
    }
}

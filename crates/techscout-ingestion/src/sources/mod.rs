//! Acquisition source adapters.
//!
//! Each adapter issues one query built from the entity name, parses its
//! source's response shape, and normalizes every record independently:
//! a malformed record is skipped and counted, the rest of the batch survives.

pub mod google_patents;
pub mod arxiv;
pub mod semantic_scholar;
pub mod dblp;
pub mod crossref;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use techscout_common::{NormalizedDocument, Result, SourceKind};

use crate::fetcher::RateLimitedFetcher;

/// Abstracts are cut to this many characters.
pub const ABSTRACT_MAX_CHARS: usize = 1000;
/// Author lists are cut to this many names where a source is capped.
pub const MAX_AUTHORS: usize = 10;

/// What to search for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub entity_name: String,
    /// Website of the entity, passed through for adapters that can use it.
    pub website: Option<String>,
    pub max_results: usize,
}

/// Normalized output of one adapter call.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub documents: Vec<NormalizedDocument>,
    /// Records dropped because they failed to parse.
    pub skipped: usize,
}

impl SourceBatch {
    /// Keep successful records, log and count the failures.
    pub fn from_records(source: SourceKind, records: Vec<Result<NormalizedDocument>>) -> Self {
        let mut batch = SourceBatch::default();
        for record in records {
            match record {
                Ok(doc) => batch.documents.push(doc),
                Err(e) => {
                    debug!(source = source.as_str(), error = %e, "Skipping malformed record");
                    batch.skipped += 1;
                }
            }
        }
        if batch.skipped > 0 {
            warn!(source = source.as_str(), skipped = batch.skipped, kept = batch.documents.len(), "Records skipped");
        }
        batch
    }
}

/// Common interface for all acquisition sources.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Run the source query. Transport failures surface as `Err`; a response
    /// missing its top-level keys is an empty batch.
    async fn search(
        &self,
        fetcher: &RateLimitedFetcher,
        query: &SearchQuery,
    ) -> anyhow::Result<SourceBatch>;
}

/// Base URL for each source. Overridable so tests can target a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpoints {
    #[serde(default = "default_google_patents")]
    pub google_patents: String,
    #[serde(default = "default_arxiv")]
    pub arxiv: String,
    #[serde(default = "default_semantic_scholar")]
    pub semantic_scholar: String,
    #[serde(default = "default_dblp")]
    pub dblp: String,
    #[serde(default = "default_crossref")]
    pub crossref: String,
}

fn default_google_patents()   -> String { "https://patents.google.com".to_string() }
fn default_arxiv()            -> String { "http://export.arxiv.org".to_string() }
fn default_semantic_scholar() -> String { "https://api.semanticscholar.org".to_string() }
fn default_dblp()             -> String { "https://dblp.org".to_string() }
fn default_crossref()         -> String { "https://api.crossref.org".to_string() }

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            google_patents: default_google_patents(),
            arxiv: default_arxiv(),
            semantic_scholar: default_semantic_scholar(),
            dblp: default_dblp(),
            crossref: default_crossref(),
        }
    }
}

impl SourceEndpoints {
    /// Every source pointed at one base URL.
    pub fn all(base: &str) -> Self {
        Self {
            google_patents: base.to_string(),
            arxiv: base.to_string(),
            semantic_scholar: base.to_string(),
            dblp: base.to_string(),
            crossref: base.to_string(),
        }
    }
}

/// The five built-in adapters in merge order.
pub fn default_adapters(endpoints: &SourceEndpoints) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(google_patents::GooglePatentsAdapter::new(&endpoints.google_patents)),
        Arc::new(arxiv::ArxivAdapter::new(&endpoints.arxiv)),
        Arc::new(semantic_scholar::SemanticScholarAdapter::new(&endpoints.semantic_scholar)),
        Arc::new(dblp::DblpAdapter::new(&endpoints.dblp)),
        Arc::new(crossref::CrossRefAdapter::new(&endpoints.crossref)),
    ]
}

// ── Shared normalization helpers ───────────────────────────────────────────

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// January 1st of `year`, if that is a representable date.
pub(crate) fn year_start(year: i64) -> Option<DateTime<Utc>> {
    let year = i32::try_from(year).ok()?;
    date_at_midnight(year, 1, 1)
}

pub(crate) fn date_at_midnight(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

pub(crate) fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

pub(crate) fn build_url(base: &str, path: &str, params: &[(&str, String)]) -> Result<String> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    let url = url::Url::parse_with_params(&raw, params)
        .map_err(|e| techscout_common::ScoutError::InvalidUrl(format!("{raw}: {e}")))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use techscout_common::ScoutError;

    #[test]
    fn test_truncate_chars_is_char_safe() {
        let s = "é".repeat(1200);
        let t = truncate_chars(&s, ABSTRACT_MAX_CHARS);
        assert_eq!(t.chars().count(), 1000);
    }

    #[test]
    fn test_year_start() {
        let d = year_start(2021).unwrap();
        assert_eq!(d.to_rfc3339(), "2021-01-01T00:00:00+00:00");
        assert!(year_start(i64::MAX).is_none());
    }

    #[test]
    fn test_build_url_escapes_entity_name() {
        let url = build_url("https://dblp.org/", "/search/publ/api", &[("q", "Acme & Labs".to_string())]).unwrap();
        assert_eq!(url, "https://dblp.org/search/publ/api?q=Acme+%26+Labs");
    }

    #[test]
    fn test_batch_counts_skipped_records() {
        let records = vec![
            Ok(NormalizedDocument::paper(SourceKind::Dblp, "A", Utc::now())),
            Err(ScoutError::MalformedRecord("bad".into())),
            Ok(NormalizedDocument::paper(SourceKind::Dblp, "B", Utc::now())),
        ];
        let batch = SourceBatch::from_records(SourceKind::Dblp, records);
        assert_eq!(batch.documents.len(), 2);
        assert_eq!(batch.skipped, 1);
    }

    #[test]
    fn test_default_adapters_order() {
        let kinds: Vec<SourceKind> = default_adapters(&SourceEndpoints::default())
            .iter()
            .map(|a| a.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                SourceKind::GooglePatents,
                SourceKind::Arxiv,
                SourceKind::SemanticScholar,
                SourceKind::Dblp,
                SourceKind::CrossRef,
            ]
        );
    }
}

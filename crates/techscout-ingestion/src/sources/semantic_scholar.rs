//! Semantic Scholar Graph API client.
//!
//! Endpoint: https://api.semanticscholar.org/graph/v1/paper/search
//! The unauthenticated tier is enough for single keyword searches.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument};

use techscout_common::{NormalizedDocument, Result, ScoutError, SourceKind};

use super::{build_url, non_empty, truncate_chars, year_start, SearchQuery, SourceAdapter, SourceBatch, ABSTRACT_MAX_CHARS};
use crate::fetcher::RateLimitedFetcher;

const FIELDS: &str = "title,abstract,authors,year,venue,citationCount,externalIds";
const PAPER_URL_BASE: &str = "https://www.semanticscholar.org/paper";

pub struct SemanticScholarAdapter {
    base_url: String,
}

impl SemanticScholarAdapter {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::SemanticScholar
    }

    #[instrument(skip(self, fetcher))]
    async fn search(&self, fetcher: &RateLimitedFetcher, query: &SearchQuery) -> anyhow::Result<SourceBatch> {
        let url = build_url(
            &self.base_url,
            "/graph/v1/paper/search",
            &[
                ("query", query.entity_name.clone()),
                ("limit", query.max_results.to_string()),
                ("fields", FIELDS.to_string()),
            ],
        )?;

        let body = fetcher.fetch_json(&url).await?;
        let mut records = parse_search(&body);
        records.truncate(query.max_results);
        let batch = SourceBatch::from_records(SourceKind::SemanticScholar, records);
        info!(n = batch.documents.len(), "Semantic Scholar results");
        Ok(batch)
    }
}

/// Parse a `/paper/search` response. No `data` array means no records.
pub fn parse_search(body: &Value) -> Vec<Result<NormalizedDocument>> {
    let Some(items) = body["data"].as_array() else {
        debug!("Semantic Scholar response has no data array");
        return Vec::new();
    };
    items.iter().map(paper_to_document).collect()
}

fn paper_to_document(paper: &Value) -> Result<NormalizedDocument> {
    if !paper.is_object() {
        return Err(ScoutError::MalformedRecord(format!("expected paper object, got {paper}")));
    }

    let title = match &paper["title"] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => return Err(ScoutError::MalformedRecord(format!("non-string title {other}"))),
    };

    let publication_date = paper["year"]
        .as_i64()
        .and_then(year_start)
        .unwrap_or_else(Utc::now);

    let authors: Vec<String> = paper["authors"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| non_empty(a["name"].as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut doc = NormalizedDocument::paper(SourceKind::SemanticScholar, &title, publication_date);
    doc.abstract_text = paper["abstract"]
        .as_str()
        .map(|a| truncate_chars(a, ABSTRACT_MAX_CHARS))
        .unwrap_or_default();
    doc.authors = authors;
    doc.venue = non_empty(paper["venue"].as_str());
    doc.citation_count = paper["citationCount"].as_u64().unwrap_or(0);
    doc.external_id = non_empty(paper["externalIds"]["DOI"].as_str());
    doc.source_url = paper["paperId"]
        .as_str()
        .map(|id| format!("{PAPER_URL_BASE}/{id}"));
    Ok(doc)
}

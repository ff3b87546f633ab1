//! DBLP publication search client.
//!
//! Endpoint: https://dblp.org/search/publ/api?format=json
//! DBLP carries no abstracts or citation counts. Its `authors.author` field
//! is a bare object when a paper has one author and a list otherwise, and
//! each author is either a plain string or an object with a `text` key.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use techscout_common::{NormalizedDocument, Result, ScoutError, SourceKind};

use super::{build_url, non_empty, year_start, SearchQuery, SourceAdapter, SourceBatch, MAX_AUTHORS};
use crate::fetcher::RateLimitedFetcher;

pub struct DblpAdapter {
    base_url: String,
}

impl DblpAdapter {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl SourceAdapter for DblpAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Dblp
    }

    #[instrument(skip(self, fetcher))]
    async fn search(&self, fetcher: &RateLimitedFetcher, query: &SearchQuery) -> anyhow::Result<SourceBatch> {
        let url = build_url(
            &self.base_url,
            "/search/publ/api",
            &[
                ("q", query.entity_name.clone()),
                ("format", "json".to_string()),
                ("h", query.max_results.to_string()),
            ],
        )?;

        let body = fetcher.fetch_json(&url).await?;
        let mut records = parse_hits(&body);
        records.truncate(query.max_results);
        let batch = SourceBatch::from_records(SourceKind::Dblp, records);
        info!(n = batch.documents.len(), "DBLP results");
        Ok(batch)
    }
}

// ── Wire types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DblpInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Option<DblpAuthorsField>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    venue: Option<DblpVenue>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DblpAuthorsField {
    #[serde(default)]
    author: Option<DblpAuthors>,
}

/// One author or many.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DblpAuthors {
    Many(Vec<DblpAuthor>),
    One(DblpAuthor),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DblpAuthor {
    Name(String),
    Detailed {
        #[serde(default)]
        text: String,
    },
}

/// Journal papers carry one venue, some conference papers several.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DblpVenue {
    One(String),
    Many(Vec<String>),
}

impl DblpAuthors {
    /// Flatten into display names, empties dropped, capped at [`MAX_AUTHORS`].
    fn into_names(self) -> Vec<String> {
        let list = match self {
            DblpAuthors::Many(list) => list,
            DblpAuthors::One(author) => vec![author],
        };
        list.into_iter()
            .map(|a| match a {
                DblpAuthor::Name(name) => name,
                DblpAuthor::Detailed { text } => text,
            })
            .filter_map(|name| non_empty(Some(&name)))
            .take(MAX_AUTHORS)
            .collect()
    }
}

impl DblpVenue {
    fn into_first(self) -> Option<String> {
        match self {
            DblpVenue::One(v) => non_empty(Some(&v)),
            DblpVenue::Many(vs) => vs.into_iter().find_map(|v| non_empty(Some(&v))),
        }
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

/// Parse a search response. No `result.hits.hit` array means no records.
pub fn parse_hits(body: &Value) -> Vec<Result<NormalizedDocument>> {
    let Some(hits) = body["result"]["hits"]["hit"].as_array() else {
        debug!("DBLP response has no hit array");
        return Vec::new();
    };
    hits.iter().map(hit_to_document).collect()
}

fn hit_to_document(hit: &Value) -> Result<NormalizedDocument> {
    let info: DblpInfo = serde_json::from_value(hit["info"].clone())
        .map_err(|e| ScoutError::MalformedRecord(format!("DBLP info: {e}")))?;

    let publication_date = info
        .year
        .as_deref()
        .map(str::trim)
        .filter(|y| !y.is_empty() && y.chars().all(|c| c.is_ascii_digit()))
        .and_then(|y| y.parse::<i64>().ok())
        .and_then(year_start)
        .unwrap_or_else(Utc::now);

    let mut doc = NormalizedDocument::paper(SourceKind::Dblp, &info.title, publication_date);
    doc.authors = info
        .authors
        .and_then(|a| a.author)
        .map(DblpAuthors::into_names)
        .unwrap_or_default();
    doc.venue = info.venue.and_then(DblpVenue::into_first);
    doc.external_id = non_empty(info.doi.as_deref());
    doc.source_url = non_empty(info.url.as_deref());
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    fn body(hits: Value) -> Value {
        json!({"result": {"query": "Acme*", "hits": {"@total": "3", "hit": hits}}})
    }

    #[test]
    fn test_author_list_of_objects() {
        let records = parse_hits(&body(json!([{
            "info": {
                "authors": {"author": [{"@pid": "1", "text": "Jane Doe"}, {"@pid": "2", "text": "Bob Lee"}]},
                "title": "Fast Systems.",
                "venue": "SOSP",
                "year": "2021",
                "doi": "10.1145/123",
                "url": "https://dblp.org/rec/conf/sosp/Doe21"
            }
        }])));
        let doc = records[0].as_ref().unwrap();
        assert_eq!(doc.authors, vec!["Jane Doe", "Bob Lee"]);
        assert_eq!(doc.publication_date.year(), 2021);
        assert_eq!(doc.venue.as_deref(), Some("SOSP"));
        assert_eq!(doc.external_id.as_deref(), Some("10.1145/123"));
        assert_eq!(doc.source_url.as_deref(), Some("https://dblp.org/rec/conf/sosp/Doe21"));
        assert!(doc.abstract_text.is_empty());
        assert_eq!(doc.citation_count, 0);
    }

    #[test]
    fn test_single_author_shapes() {
        let records = parse_hits(&body(json!([
            {"info": {"title": "Bare string", "authors": {"author": "Jane Doe"}}},
            {"info": {"title": "Bare object", "authors": {"author": {"@pid": "9", "text": "Bob Lee"}}}},
            {"info": {"title": "Mixed list", "authors": {"author": ["Ann Roe", {"text": "Cy Poe"}, {"text": ""}]}}}
        ])));
        assert_eq!(records[0].as_ref().unwrap().authors, vec!["Jane Doe"]);
        assert_eq!(records[1].as_ref().unwrap().authors, vec!["Bob Lee"]);
        assert_eq!(records[2].as_ref().unwrap().authors, vec!["Ann Roe", "Cy Poe"]);
    }

    #[test]
    fn test_authors_capped() {
        let many: Vec<String> = (0..15).map(|i| format!("Author {i}")).collect();
        let records = parse_hits(&body(json!([{"info": {"title": "Big team", "authors": {"author": many}}}])));
        let doc = records[0].as_ref().unwrap();
        assert_eq!(doc.authors.len(), MAX_AUTHORS);
        assert_eq!(doc.authors[0], "Author 0");
    }

    #[test]
    fn test_non_numeric_year_falls_back_to_now() {
        let before = Utc::now();
        let records = parse_hits(&body(json!([{"info": {"title": "T", "year": "circa 2020"}}])));
        assert!(records[0].as_ref().unwrap().publication_date >= before);
    }

    #[test]
    fn test_empty_doi_is_absent() {
        let records = parse_hits(&body(json!([{"info": {"title": "T", "doi": ""}}])));
        assert!(records[0].as_ref().unwrap().external_id.is_none());
    }

    #[test]
    fn test_venue_list_takes_first() {
        let records = parse_hits(&body(json!([{"info": {"title": "T", "venue": ["ICSE", "FSE"]}}])));
        assert_eq!(records[0].as_ref().unwrap().venue.as_deref(), Some("ICSE"));
    }

    #[test]
    fn test_malformed_hit_skipped() {
        let records = parse_hits(&body(json!([
            {"info": {"title": 17}},
            {"info": {"title": "Fine"}}
        ])));
        assert!(records[0].is_err());
        assert_eq!(records[1].as_ref().unwrap().title, "Fine");
    }

    #[test]
    fn test_missing_result_is_empty() {
        assert!(parse_hits(&json!({"status": "error"})).is_empty());
        assert!(parse_hits(&json!({"result": {"hits": {"@total": "0"}}})).is_empty());
    }
}

//! CrossRef works search client.
//!
//! API: https://api.crossref.org/works?query=...
//! Abstracts arrive as JATS XML snippets and are reduced to plain text.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use techscout_common::{NormalizedDocument, Result, ScoutError, SourceKind};

use super::{
    build_url, date_at_midnight, non_empty, truncate_chars, SearchQuery, SourceAdapter, SourceBatch,
    ABSTRACT_MAX_CHARS, MAX_AUTHORS,
};
use crate::fetcher::RateLimitedFetcher;

/// Year used when a work carries neither a print nor a created date.
const FALLBACK_YEAR: i64 = 2024;

pub struct CrossRefAdapter {
    base_url: String,
}

impl CrossRefAdapter {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl SourceAdapter for CrossRefAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::CrossRef
    }

    #[instrument(skip(self, fetcher))]
    async fn search(&self, fetcher: &RateLimitedFetcher, query: &SearchQuery) -> anyhow::Result<SourceBatch> {
        let url = build_url(
            &self.base_url,
            "/works",
            &[
                ("query", query.entity_name.clone()),
                ("rows", query.max_results.to_string()),
                ("sort", "relevance".to_string()),
            ],
        )?;

        let body = fetcher.fetch_json(&url).await?;
        let mut records = parse_works(&body);
        records.truncate(query.max_results);
        let batch = SourceBatch::from_records(SourceKind::CrossRef, records);
        info!(n = batch.documents.len(), "CrossRef results");
        Ok(batch)
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

/// Parse a `/works` response. No `message.items` array means no records.
pub fn parse_works(body: &Value) -> Vec<Result<NormalizedDocument>> {
    let Some(items) = body["message"]["items"].as_array() else {
        debug!("CrossRef response has no items array");
        return Vec::new();
    };
    items.iter().map(work_to_paper).collect()
}

fn work_to_paper(work: &Value) -> Result<NormalizedDocument> {
    if !work.is_object() {
        return Err(ScoutError::MalformedRecord(format!("expected work object, got {work}")));
    }

    let title = first_string(&work["title"]).unwrap_or_default();
    let publication_date = work_date(work)?;

    let authors: Vec<String> = work["author"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| {
                    let given = a["given"].as_str().unwrap_or("");
                    let family = a["family"].as_str().unwrap_or("");
                    non_empty(Some(&format!("{given} {family}")))
                })
                .take(MAX_AUTHORS)
                .collect()
        })
        .unwrap_or_default();

    let mut doc = NormalizedDocument::paper(SourceKind::CrossRef, &title, publication_date);
    doc.abstract_text = work["abstract"]
        .as_str()
        .map(|a| truncate_chars(&strip_jats(a), ABSTRACT_MAX_CHARS))
        .unwrap_or_default();
    doc.authors = authors;
    doc.venue = first_string(&work["container-title"]);
    doc.external_id = non_empty(work["DOI"].as_str());
    doc.citation_count = work["is-referenced-by-count"].as_u64().unwrap_or(0);
    doc.source_url = non_empty(work["URL"].as_str());
    Ok(doc)
}

fn first_string(v: &Value) -> Option<String> {
    non_empty(v.as_array().and_then(|a| a.first()).and_then(Value::as_str))
}

/// `published-print` date-parts if non-empty, else `created`, else Jan 1
/// of the fallback year. Missing month or day count as 1. A date that does
/// not exist on the calendar fails the record.
fn work_date(work: &Value) -> Result<chrono::DateTime<chrono::Utc>> {
    let parts = date_parts(&work["published-print"])
        .or_else(|| date_parts(&work["created"]))
        .unwrap_or_else(|| vec![FALLBACK_YEAR]);

    let year = parts[0];
    let month = parts.get(1).copied().unwrap_or(1);
    let day = parts.get(2).copied().unwrap_or(1);

    let ymd = (i32::try_from(year), u32::try_from(month), u32::try_from(day));
    let date = match ymd {
        (Ok(y), Ok(m), Ok(d)) => date_at_midnight(y, m, d),
        _ => None,
    };
    date.ok_or_else(|| ScoutError::MalformedRecord(format!("invalid date parts {parts:?}")))
}

/// First `date-parts` row as integers, or `None` when absent or empty.
fn date_parts(field: &Value) -> Option<Vec<i64>> {
    let row = field["date-parts"].as_array()?.first()?.as_array()?;
    let parts: Vec<i64> = row.iter().map_while(Value::as_i64).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Drop JATS markup (`<jats:p>`, `<jats:italic>`, ...) and collapse whitespace.
/// Block tags become word breaks, inline tags vanish.
pub fn strip_jats(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut tag: Option<String> = None;
    for c in raw.chars() {
        if let Some(name) = tag.as_mut() {
            if c == '>' {
                if is_block_tag(name) {
                    out.push(' ');
                }
                tag = None;
            } else {
                name.push(c);
            }
        } else if c == '<' {
            tag = Some(String::new());
        } else {
            out.push(c);
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_block_tag(tag: &str) -> bool {
    let name = tag.trim_start_matches('/').split_whitespace().next().unwrap_or("");
    let local = name.rsplit(':').next().unwrap_or(name);
    matches!(local, "p" | "sec" | "title" | "list-item")
}

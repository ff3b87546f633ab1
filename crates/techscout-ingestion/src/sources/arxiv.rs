//! arXiv Atom API client.
//!
//! Endpoint: http://export.arxiv.org/api/query
//! Results sorted by submission date, newest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{info, instrument, warn};

use techscout_common::{NormalizedDocument, Result, ScoutError, SourceKind};

use super::{build_url, truncate_chars, SearchQuery, SourceAdapter, SourceBatch, ABSTRACT_MAX_CHARS};
use crate::fetcher::RateLimitedFetcher;

const VENUE: &str = "arXiv";

pub struct ArxivAdapter {
    base_url: String,
}

impl ArxivAdapter {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    #[instrument(skip(self, fetcher))]
    async fn search(&self, fetcher: &RateLimitedFetcher, query: &SearchQuery) -> anyhow::Result<SourceBatch> {
        let url = build_url(
            &self.base_url,
            "/api/query",
            &[
                ("search_query", format!("all:{}", query.entity_name)),
                ("start", "0".to_string()),
                ("max_results", query.max_results.to_string()),
                ("sortBy", "submittedDate".to_string()),
                ("sortOrder", "descending".to_string()),
            ],
        )?;

        let xml = fetcher.fetch_text(&url).await?;
        let mut records = parse_feed(&xml);
        records.truncate(query.max_results);
        let batch = SourceBatch::from_records(SourceKind::Arxiv, records);
        info!(n = batch.documents.len(), "arXiv results");
        Ok(batch)
    }
}

/// Raw fields of one `<entry>` before normalization.
#[derive(Debug, Default)]
struct RawEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

/// Parse an Atom feed into paper records, one per `<entry>`.
/// Feed-level `<title>`/`<id>` elements are ignored.
pub fn parse_feed(xml: &str) -> Vec<Result<NormalizedDocument>> {
    let mut records = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<RawEntry> = None;
    let mut field = Field::None;
    let mut in_author = false;
    let mut author_name = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                match e.local_name().as_ref() {
                    b"entry" => current = Some(RawEntry::default()),
                    b"author" => { in_author = true; author_name.clear(); }
                    b"name" if in_author => field = Field::AuthorName,
                    b"id" => field = Field::Id,
                    b"title" => field = Field::Title,
                    b"summary" => field = Field::Summary,
                    b"published" => field = Field::Published,
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(ref mut entry) = current {
                    let target = match field {
                        Field::Id         => Some(&mut entry.id),
                        Field::Title      => Some(&mut entry.title),
                        Field::Summary    => Some(&mut entry.summary),
                        Field::Published  => Some(&mut entry.published),
                        Field::AuthorName => Some(&mut author_name),
                        Field::None       => None,
                    };
                    if let Some(target) = target {
                        target.push_str(&e.unescape().unwrap_or_default());
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                match e.local_name().as_ref() {
                    b"author" => {
                        if let Some(ref mut entry) = current {
                            let name = author_name.trim();
                            if !name.is_empty() {
                                entry.authors.push(name.to_string());
                            }
                        }
                        in_author = false;
                    }
                    b"entry" => {
                        if let Some(entry) = current.take() {
                            records.push(entry_to_paper(entry));
                        }
                    }
                    _ => {}
                }
                field = Field::None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("arXiv XML parse error: {}", e);
                records.push(Err(ScoutError::Xml(e.to_string())));
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    records
}

fn entry_to_paper(entry: RawEntry) -> Result<NormalizedDocument> {
    let published = entry.published.trim();
    let publication_date = if published.is_empty() {
        Utc::now()
    } else {
        DateTime::parse_from_rfc3339(published)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ScoutError::MalformedRecord(format!("bad published timestamp {published:?}: {e}")))?
    };

    let id = entry.id.trim().to_string();
    let mut doc = NormalizedDocument::paper(SourceKind::Arxiv, collapse_ws(&entry.title).as_str(), publication_date);
    doc.abstract_text = truncate_chars(&collapse_ws(&entry.summary), ABSTRACT_MAX_CHARS);
    doc.authors = entry.authors;
    doc.venue = Some(VENUE.to_string());
    if !id.is_empty() {
        doc.external_id = Some(id.clone());
        doc.source_url = Some(id);
    }
    Ok(doc)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:Acme</title>
  <id>http://arxiv.org/api/feedid</id>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <published>2024-01-02T18:00:00Z</published>
    <title>Scalable Qubit
      Arrays</title>
    <summary>We demonstrate superposition &amp; entanglement.</summary>
    <author><name>Jane Doe</name></author>
    <author><name>Bob Lee</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00002v1</id>
    <published>not-a-date</published>
    <title>Broken entry</title>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00003v2</id>
    <title>No date entry</title>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_entries() {
        let records = parse_feed(FEED);
        assert_eq!(records.len(), 3);

        let first = records[0].as_ref().unwrap();
        assert_eq!(first.title, "Scalable Qubit Arrays");
        assert_eq!(first.abstract_text, "We demonstrate superposition & entanglement.");
        assert_eq!(first.authors, vec!["Jane Doe", "Bob Lee"]);
        assert_eq!(first.external_id.as_deref(), Some("http://arxiv.org/abs/2401.00001v1"));
        assert_eq!(first.venue.as_deref(), Some("arXiv"));
        assert_eq!(first.publication_date.year(), 2024);
        assert_eq!(first.publication_date.day(), 2);
    }

    #[test]
    fn test_bad_timestamp_skips_only_that_entry() {
        let records = parse_feed(FEED);
        assert!(records[1].is_err());
        assert!(records[2].is_ok());
    }

    #[test]
    fn test_missing_published_falls_back_to_now() {
        let before = Utc::now();
        let records = parse_feed(FEED);
        let third = records[2].as_ref().unwrap();
        assert!(third.publication_date >= before);
    }

    #[test]
    fn test_feed_metadata_not_treated_as_entry() {
        let records = parse_feed(FEED);
        assert!(records.iter().flatten().all(|d| !d.title.starts_with("ArXiv Query")));
    }

    #[test]
    fn test_empty_feed() {
        assert!(parse_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#).is_empty());
        assert!(parse_feed("").is_empty());
    }

    #[test]
    fn test_long_summary_truncated() {
        let xml = format!(
            "<feed><entry><id>x</id><title>T</title><summary>{}</summary></entry></feed>",
            "a".repeat(1500)
        );
        let records = parse_feed(&xml);
        assert_eq!(records[0].as_ref().unwrap().abstract_text.len(), ABSTRACT_MAX_CHARS);
    }

    #[test]
    fn test_broken_feed_keeps_earlier_entries() {
        let xml = "<feed><entry><id>a</id><title>First</title></entry><entry><title>Second</oops></entry></feed>";
        let records = parse_feed(xml);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap().title, "First");
        assert!(matches!(records[1], Err(ScoutError::Xml(_))));
    }
}

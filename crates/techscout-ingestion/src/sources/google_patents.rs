//! Google Patents search-page scraper.
//!
//! Fetches the public results page for a free-text query and reads the
//! result items out of the HTML. Two item layouts are tried in order.
//! Only titles and patent numbers are extracted; inventors and abstracts
//! are not on the results page.

use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use techscout_common::{NormalizedDocument, Result, ScoutError, SourceKind};

use super::{build_url, SearchQuery, SourceAdapter, SourceBatch};
use crate::fetcher::RateLimitedFetcher;

const RESULT_SELECTORS: [&str; 2] = ["search-result-item", "article.result"];
const TITLE_SELECTOR: &str = "h3.result-title, h3.title, span.result-title, span.title";
const NUMBER_SELECTOR: &str = "span.patent-number, a.patent-number, span.style-scope, a.style-scope";
const UNKNOWN_TITLE: &str = "Unknown Patent";

pub struct GooglePatentsAdapter {
    base_url: String,
}

impl GooglePatentsAdapter {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl SourceAdapter for GooglePatentsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::GooglePatents
    }

    #[instrument(skip(self, fetcher))]
    async fn search(&self, fetcher: &RateLimitedFetcher, query: &SearchQuery) -> anyhow::Result<SourceBatch> {
        let url = build_url(
            &self.base_url,
            "/",
            &[("q", query.entity_name.clone()), ("num", query.max_results.to_string())],
        )?;

        let html = fetcher.fetch_text(&url).await?;
        let records = parse_results(&html, &url, query.max_results)?;
        let batch = SourceBatch::from_records(SourceKind::GooglePatents, records);
        info!(n = batch.documents.len(), "Google Patents results");
        Ok(batch)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScoutError::Pipeline(format!("invalid selector {css:?}: {e}")))
}

/// Parse a results page into patent records.
pub fn parse_results(html: &str, source_url: &str, max_results: usize) -> Result<Vec<Result<NormalizedDocument>>> {
    let document = Html::parse_document(html);
    let title_sel = selector(TITLE_SELECTOR)?;
    let number_sel = selector(NUMBER_SELECTOR)?;

    let mut items: Vec<ElementRef> = Vec::new();
    for css in RESULT_SELECTORS {
        items = document.select(&selector(css)?).take(max_results).collect();
        if !items.is_empty() {
            break;
        }
        debug!(selector = css, "No patent results for selector, trying next");
    }

    Ok(items
        .into_iter()
        .map(|item| Ok(item_to_patent(item, &title_sel, &number_sel, source_url)))
        .collect())
}

fn item_to_patent(item: ElementRef, title_sel: &Selector, number_sel: &Selector, source_url: &str) -> NormalizedDocument {
    let title = item
        .select(title_sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let number = item
        .select(number_sel)
        .next()
        .map(element_text)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| placeholder_number(&title));

    let mut doc = NormalizedDocument::patent(SourceKind::GooglePatents, &title, Utc::now());
    doc.external_id = Some(number);
    doc.source_url = Some(source_url.to_string());
    doc
}

fn element_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable stand-in number derived from the title: `PAT` + 0..100000.
pub fn placeholder_number(title: &str) -> String {
    let digest = Sha256::digest(title.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    format!("PAT{}", u64::from_be_bytes(head) % 100_000)
}

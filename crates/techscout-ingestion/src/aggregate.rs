//! Cross-source aggregation.
//!
//! All adapters run concurrently as separate tasks; their outputs are
//! collected in full before merging, and the merge walks them in declared
//! adapter order. Completion order therefore never changes which duplicate
//! survives.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use techscout_common::{
    classify_text, DocumentKind, NormalizedDocument, PersonAppearance, SourceKind, Technology,
};

use crate::fetcher::RateLimitedFetcher;
use crate::sources::{
    default_adapters, SearchQuery, SourceAdapter, SourceBatch, SourceEndpoints, MAX_AUTHORS,
};

/// Entity-level tags attached to each document.
pub const DOCUMENT_TAG_LIMIT: usize = 5;
/// Entity-level tags attached to each person as expertise.
pub const EXPERTISE_TAG_LIMIT: usize = 3;

/// What one adapter contributed to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceKind,
    pub documents: usize,
    pub skipped: usize,
    /// Set when the whole adapter call failed.
    pub error: Option<String>,
}

/// Output of one adapter task: its batch, or why it produced nothing.
pub type AdapterOutput = (SourceKind, std::result::Result<SourceBatch, String>);

/// Merged, deduplicated record set for one entity.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub patents: Vec<NormalizedDocument>,
    pub papers: Vec<NormalizedDocument>,
    pub personnel: Vec<PersonAppearance>,
    /// Corpus-level tags in taxonomy order.
    pub technologies: Vec<Technology>,
    pub reports: Vec<SourceReport>,
    /// Papers dropped by title-key dedup.
    pub duplicates_merged: usize,
}

impl AggregateResult {
    pub fn is_empty(&self) -> bool {
        self.patents.is_empty() && self.papers.is_empty()
    }
}

/// Fans a query out to every adapter and merges the results.
pub struct Aggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl Aggregator {
    /// Adapters are merged in the order given here.
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn with_endpoints(endpoints: &SourceEndpoints) -> Self {
        Self::new(default_adapters(endpoints))
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Run every adapter concurrently and merge once all have finished.
    /// A failed or panicked adapter contributes an empty batch and a report
    /// carrying its error; siblings are never cancelled.
    #[instrument(skip(self, fetcher, query), fields(entity = %query.entity_name))]
    pub async fn collect(&self, fetcher: Arc<RateLimitedFetcher>, query: &SearchQuery) -> AggregateResult {
        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let fetcher = Arc::clone(&fetcher);
                let query = query.clone();
                tokio::spawn(async move { adapter.search(&fetcher, &query).await })
            })
            .collect();

        let joined = join_all(handles).await;

        let outputs: Vec<AdapterOutput> = self
            .adapters
            .iter()
            .zip(joined)
            .map(|(adapter, joined)| {
                let source = adapter.kind();
                let result = match joined {
                    Ok(Ok(batch)) => Ok(batch),
                    Ok(Err(e)) => {
                        warn!(source = source.as_str(), error = %e, "Source failed, continuing without it");
                        Err(e.to_string())
                    }
                    Err(e) => {
                        warn!(source = source.as_str(), error = %e, "Source task aborted");
                        Err(format!("task aborted: {e}"))
                    }
                };
                (source, result)
            })
            .collect();

        let result = merge(outputs);
        info!(
            patents = result.patents.len(),
            papers = result.papers.len(),
            personnel = result.personnel.len(),
            technologies = result.technologies.len(),
            "Aggregation complete"
        );
        result
    }
}

/// Merge adapter outputs in the order given.
///
/// - every patent is kept as-is
/// - papers are deduplicated by title key, first occurrence wins, and a
///   dropped duplicate donates any authors the kept record lacks
/// - each author appearance on a kept paper adds one to that person's count
/// - the corpus is classified once and its tags are attached to every
///   document and person
pub fn merge(outputs: Vec<AdapterOutput>) -> AggregateResult {
    let mut result = AggregateResult::default();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (source, output) in outputs {
        let batch = match output {
            Ok(batch) => batch,
            Err(error) => {
                result.reports.push(SourceReport { source, documents: 0, skipped: 0, error: Some(error) });
                continue;
            }
        };
        result.reports.push(SourceReport {
            source,
            documents: batch.documents.len(),
            skipped: batch.skipped,
            error: None,
        });

        for doc in batch.documents {
            match doc.kind {
                DocumentKind::Patent => result.patents.push(doc),
                DocumentKind::Paper => {
                    let key = doc.title_key();
                    if key.is_empty() {
                        debug!(source = source.as_str(), "Dropping paper with empty title");
                        continue;
                    }
                    match seen.get(&key) {
                        Some(&idx) => {
                            let kept = &mut result.papers[idx];
                            for author in doc.authors {
                                if kept.authors.len() >= MAX_AUTHORS {
                                    break;
                                }
                                if !kept.authors.contains(&author) {
                                    kept.authors.push(author);
                                }
                            }
                            result.duplicates_merged += 1;
                        }
                        None => {
                            seen.insert(key, result.papers.len());
                            result.papers.push(doc);
                        }
                    }
                }
            }
        }
    }

    result.personnel = personnel_index(&result.papers);

    let corpus = result
        .patents
        .iter()
        .chain(&result.papers)
        .map(NormalizedDocument::classification_text)
        .collect::<Vec<_>>()
        .join("\n");
    result.technologies = classify_text(&corpus);

    let doc_tags: Vec<Technology> = result.technologies.iter().copied().take(DOCUMENT_TAG_LIMIT).collect();
    let expertise: Vec<Technology> = result.technologies.iter().copied().take(EXPERTISE_TAG_LIMIT).collect();
    for doc in result.patents.iter_mut().chain(result.papers.iter_mut()) {
        doc.technologies = doc_tags.clone();
    }
    for person in &mut result.personnel {
        person.expertise = expertise.clone();
    }

    result
}

/// One entry per distinct author name, in first-appearance order.
fn personnel_index(papers: &[NormalizedDocument]) -> Vec<PersonAppearance> {
    let mut people: Vec<PersonAppearance> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for author in papers.iter().flat_map(|p| &p.authors) {
        let idx = *index.entry(author.as_str()).or_insert_with(|| {
            people.push(PersonAppearance::researcher(author));
            people.len() - 1
        });
        people[idx].publication_count += 1;
    }
    people
}

//! techscout-ingestion: acquisition and aggregation pipeline.
//! Covers:
//! - Rate-limited HTTP fetching (per-run, per-domain spacing)
//! - Source adapters (Google Patents, arXiv, Semantic Scholar, DBLP, CrossRef)
//! - Cross-source merge, title-key deduplication, personnel index
//! - Staged orchestration with resumable progress and failure state

pub mod fetcher;
pub mod sources;
pub mod aggregate;
pub mod repository;
pub mod memory_store;
pub mod pipeline;

pub use aggregate::{AggregateResult, Aggregator, SourceReport};
pub use fetcher::{FetcherConfig, RateLimitedFetcher};
pub use memory_store::InMemoryStore;
pub use pipeline::{Orchestrator, PipelineConfig, RunOutcome, RunSummary, Stage};
pub use repository::{EntityCounts, EntityStore, ScoutRepository, UpsertResult};
pub use sources::{SearchQuery, SourceAdapter, SourceEndpoints};

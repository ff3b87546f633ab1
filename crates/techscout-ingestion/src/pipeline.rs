//! Staged analysis pipeline for one entity.
//!
//! Orchestrates a run:
//!   1. Mark the entity `Analyzing` (5%)
//!   2. Acquire from every source through a fresh rate-limited fetcher (50%)
//!   3. Persist patents (65%)
//!   4. Persist papers (80%)
//!   5. Persist personnel (90%)
//!   6. Write counts and focus areas, mark `Complete` (100%)
//!
//! Acquisition problems never stop a run: they degrade to an empty result.
//! Any failure after acquisition marks the entity `Error` with progress 0.
//! `run` never returns an error; every path ends in an outcome.
//!
//! Runs for different entities may execute concurrently, each with its own
//! fetcher. Two concurrent runs for the *same* entity are not coordinated
//! here and may interleave their writes; callers must serialize those.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use techscout_common::{
    technology_profile, Entity, EntityStatus, ScoutError, Technology, TechnologyIntensity,
};

use crate::aggregate::{AggregateResult, Aggregator, SourceReport};
use crate::fetcher::{FetcherConfig, RateLimitedFetcher};
use crate::repository::{EntityCounts, ScoutRepository};
use crate::sources::{SearchQuery, SourceEndpoints};

// ── Config ────────────────────────────────────────────────────────────────────

/// Settings for every run an orchestrator performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Result bound passed to each source.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub endpoints: SourceEndpoints,
}

fn default_max_results() -> usize { 20 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            fetcher: FetcherConfig::default(),
            endpoints: SourceEndpoints::default(),
        }
    }
}

// ── Stages ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Started,
    Acquired,
    PatentsPersisted,
    PapersPersisted,
    PersonnelPersisted,
    Finalized,
}

impl Stage {
    /// Progress percentage written when the stage is reached.
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Started            => 5,
            Stage::Acquired           => 50,
            Stage::PatentsPersisted   => 65,
            Stage::PapersPersisted    => 80,
            Stage::PersonnelPersisted => 90,
            Stage::Finalized          => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Started            => "started",
            Stage::Acquired           => "acquired",
            Stage::PatentsPersisted   => "patents_persisted",
            Stage::PapersPersisted    => "papers_persisted",
            Stage::PersonnelPersisted => "personnel_persisted",
            Stage::Finalized          => "finalized",
        }
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub entity_id: Uuid,
    pub entity_name: String,
    pub patents_inserted: usize,
    pub patents_duplicate: usize,
    pub papers_inserted: usize,
    /// Already stored, or merged away during aggregation.
    pub papers_duplicate: usize,
    pub personnel_inserted: usize,
    pub personnel_existing: usize,
    pub focus_areas: Vec<Technology>,
    pub sources: Vec<SourceReport>,
    pub technology_profile: Vec<TechnologyIntensity>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunSummary),
    /// The entity was moved to `Error`. `stage` is the last stage reached.
    Failed { stage: Stage, error: String },
    /// Nothing was written.
    EntityNotFound,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Working state of one run. Dropped when the run ends.
struct PipelineRun {
    entity: Entity,
    stage: Stage,
    started: Instant,
    acquired: AggregateResult,
    summary: RunSummary,
}

impl PipelineRun {
    fn new(entity: Entity) -> Self {
        let summary = RunSummary {
            entity_id: entity.id,
            entity_name: entity.name.clone(),
            patents_inserted: 0,
            patents_duplicate: 0,
            papers_inserted: 0,
            papers_duplicate: 0,
            personnel_inserted: 0,
            personnel_existing: 0,
            focus_areas: Vec::new(),
            sources: Vec::new(),
            technology_profile: Vec::new(),
            duration_ms: 0,
        };
        Self {
            entity,
            stage: Stage::Started,
            started: Instant::now(),
            acquired: AggregateResult::default(),
            summary,
        }
    }

    fn counts(&self) -> EntityCounts {
        EntityCounts {
            patents: self.summary.patents_inserted,
            papers: self.summary.papers_inserted,
            personnel: self.summary.personnel_inserted,
        }
    }

    fn into_summary(mut self) -> RunSummary {
        self.summary.duration_ms = self.started.elapsed().as_millis() as u64;
        self.summary
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Orchestrator {
    repo: ScoutRepository,
    aggregator: Aggregator,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Orchestrator using the five built-in sources at `config.endpoints`.
    pub fn new(repo: ScoutRepository, config: PipelineConfig) -> Self {
        let aggregator = Aggregator::with_endpoints(&config.endpoints);
        Self { repo, aggregator, config }
    }

    /// Orchestrator with a caller-supplied adapter set.
    pub fn with_aggregator(repo: ScoutRepository, aggregator: Aggregator, config: PipelineConfig) -> Self {
        Self { repo, aggregator, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for one entity.
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn run(&self, entity_id: Uuid) -> RunOutcome {
        let entity = match self.repo.get_entity(entity_id).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                warn!("Entity not found, run skipped");
                return RunOutcome::EntityNotFound;
            }
            Err(e) => return self.fail(entity_id, Stage::Started, e).await,
        };

        info!(entity = %entity.name, "Starting analysis run");
        let mut run = PipelineRun::new(entity);
        match self.execute(&mut run).await {
            Ok(()) => {
                let summary = run.into_summary();
                info!(
                    patents = summary.patents_inserted,
                    papers = summary.papers_inserted,
                    personnel = summary.personnel_inserted,
                    duration_ms = summary.duration_ms,
                    "Analysis complete"
                );
                RunOutcome::Completed(summary)
            }
            Err(e) => self.fail(entity_id, run.stage, e).await,
        }
    }

    /// Reset the entity to `Pending` with progress 0, then run again.
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn reanalyze(&self, entity_id: Uuid) -> RunOutcome {
        match self.repo.get_entity(entity_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Entity not found, re-analysis skipped");
                return RunOutcome::EntityNotFound;
            }
            Err(e) => return self.fail(entity_id, Stage::Started, e).await,
        }
        if let Err(e) = self.repo.set_progress(entity_id, 0, Some(EntityStatus::Pending)).await {
            return self.fail(entity_id, Stage::Started, e).await;
        }
        self.run(entity_id).await
    }

    async fn execute(&self, run: &mut PipelineRun) -> anyhow::Result<()> {
        let id = run.entity.id;
        self.repo
            .set_progress(id, Stage::Started.progress(), Some(EntityStatus::Analyzing))
            .await?;

        run.acquired = self.acquire(&run.entity).await;
        run.summary.sources = run.acquired.reports.clone();
        run.summary.papers_duplicate = run.acquired.duplicates_merged;
        self.advance(run, Stage::Acquired).await?;

        for patent in &run.acquired.patents {
            if self.repo.persist_patent(id, patent).await?.was_new {
                run.summary.patents_inserted += 1;
            } else {
                run.summary.patents_duplicate += 1;
            }
        }
        info!(inserted = run.summary.patents_inserted, skipped = run.summary.patents_duplicate, "Patents persisted");
        self.advance(run, Stage::PatentsPersisted).await?;

        for paper in &run.acquired.papers {
            if self.repo.persist_paper(id, paper).await?.was_new {
                run.summary.papers_inserted += 1;
            } else {
                run.summary.papers_duplicate += 1;
            }
        }
        info!(inserted = run.summary.papers_inserted, skipped = run.summary.papers_duplicate, "Papers persisted");
        self.advance(run, Stage::PapersPersisted).await?;

        for person in run.acquired.personnel.iter().filter(|p| !p.name.trim().is_empty()) {
            if self.repo.upsert_person(id, person).await?.was_new {
                run.summary.personnel_inserted += 1;
            } else {
                run.summary.personnel_existing += 1;
            }
        }
        info!(inserted = run.summary.personnel_inserted, "Personnel persisted");
        self.advance(run, Stage::PersonnelPersisted).await?;

        let focus_areas = run.acquired.technologies.clone();
        self.repo.finalize(id, run.counts(), &focus_areas).await?;
        run.summary.technology_profile =
            technology_profile(&focus_areas, &run.acquired.patents, &run.acquired.papers);
        run.summary.focus_areas = focus_areas;

        run.stage = Stage::Finalized;
        self.repo
            .set_progress(id, Stage::Finalized.progress(), Some(EntityStatus::Complete))
            .await?;
        Ok(())
    }

    /// Fetch and merge. Failures here only shrink the result.
    async fn acquire(&self, entity: &Entity) -> AggregateResult {
        let fetcher = match RateLimitedFetcher::new(&self.config.fetcher) {
            Ok(fetcher) => Arc::new(fetcher),
            Err(e) => {
                error!(error = %e, "Could not build fetcher, continuing with no acquired data");
                return AggregateResult::default();
            }
        };
        let query = SearchQuery {
            entity_name: entity.name.clone(),
            website: entity.website.clone(),
            max_results: self.config.max_results,
        };
        self.aggregator.collect(fetcher, &query).await
    }

    async fn advance(&self, run: &mut PipelineRun, stage: Stage) -> anyhow::Result<()> {
        self.repo.set_progress(run.entity.id, stage.progress(), None).await?;
        run.stage = stage;
        Ok(())
    }

    /// Move the entity to `Error` with progress 0 and report the failure.
    async fn fail(&self, entity_id: Uuid, stage: Stage, err: anyhow::Error) -> RunOutcome {
        let error = ScoutError::Pipeline(format!("{}: {err:#}", stage.as_str())).to_string();
        error!(stage = stage.as_str(), error = %err, "Analysis run failed");
        if let Err(e) = self.repo.set_progress(entity_id, 0, Some(EntityStatus::Error)).await {
            error!(error = %e, "Could not record error state");
        }
        RunOutcome::Failed { stage, error }
    }
}

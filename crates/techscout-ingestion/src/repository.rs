//! Persistence boundary for the pipeline.
//!
//! `EntityStore` is the storage collaborator: plain lookups and inserts.
//! `ScoutRepository` layers the check-before-insert rules on top so that
//! persisting the same batch twice never creates duplicates:
//! - patents are unique by number
//! - papers are unique by DOI, then by title key
//! - persons are unique by exact name and keep their highest count

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use techscout_common::{Entity, EntityStatus, NormalizedDocument, PersonAppearance, Technology};

/// Final tallies written to the entity when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub patents: usize,
    pub papers: usize,
    pub personnel: usize,
}

/// Storage operations the pipeline needs. Implementations timestamp every
/// entity mutation.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>>;

    /// Set progress, and status when given.
    async fn update_progress(&self, id: Uuid, progress: u8, status: Option<EntityStatus>) -> Result<()>;

    async fn find_patent_by_number(&self, entity_id: Uuid, number: &str) -> Result<Option<Uuid>>;
    async fn insert_patent(&self, entity_id: Uuid, patent: &NormalizedDocument) -> Result<Uuid>;

    async fn find_paper_by_doi(&self, entity_id: Uuid, doi: &str) -> Result<Option<Uuid>>;
    async fn find_paper_by_title_key(&self, entity_id: Uuid, key: &str) -> Result<Option<Uuid>>;
    async fn insert_paper(&self, entity_id: Uuid, paper: &NormalizedDocument) -> Result<Uuid>;

    async fn find_person(&self, entity_id: Uuid, name: &str) -> Result<Option<PersonAppearance>>;
    async fn insert_person(&self, entity_id: Uuid, person: &PersonAppearance) -> Result<()>;
    async fn set_person_publication_count(&self, entity_id: Uuid, name: &str, count: u32) -> Result<()>;

    /// Write final counts and focus areas.
    async fn finalize_entity(&self, id: Uuid, counts: EntityCounts, focus_areas: &[Technology]) -> Result<()>;
}

/// Result of an idempotent persist call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertResult {
    pub was_new: bool,
}

impl UpsertResult {
    fn inserted() -> Self {
        Self { was_new: true }
    }

    fn existing() -> Self {
        Self { was_new: false }
    }
}

/// Idempotent persistence over an [`EntityStore`].
#[derive(Clone)]
pub struct ScoutRepository {
    store: Arc<dyn EntityStore>,
}

impl ScoutRepository {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        self.store.get_entity(id).await
    }

    pub async fn set_progress(&self, id: Uuid, progress: u8, status: Option<EntityStatus>) -> Result<()> {
        self.store.update_progress(id, progress, status).await
    }

    pub async fn finalize(&self, id: Uuid, counts: EntityCounts, focus_areas: &[Technology]) -> Result<()> {
        self.store.finalize_entity(id, counts, focus_areas).await
    }

    /// Insert a patent unless one with the same number is already stored.
    /// A patent with no number is given a generated `GEN-` number first.
    pub async fn persist_patent(&self, entity_id: Uuid, patent: &NormalizedDocument) -> Result<UpsertResult> {
        let number = match patent.external_id.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => generated_patent_number(&patent.title),
        };

        if let Some(existing) = self.store.find_patent_by_number(entity_id, &number).await? {
            tracing::debug!(%entity_id, patent_id = %existing, number = %number, "Patent already stored, skipping");
            return Ok(UpsertResult::existing());
        }

        let mut record = patent.clone();
        record.external_id = Some(number);
        let id = self.store.insert_patent(entity_id, &record).await?;
        tracing::debug!(%entity_id, patent_id = %id, "Inserted patent");
        Ok(UpsertResult::inserted())
    }

    /// Insert a paper unless its DOI or title key is already stored.
    pub async fn persist_paper(&self, entity_id: Uuid, paper: &NormalizedDocument) -> Result<UpsertResult> {
        if let Some(doi) = paper.external_id.as_deref().filter(|d| !d.is_empty()) {
            if let Some(existing) = self.store.find_paper_by_doi(entity_id, doi).await? {
                tracing::debug!(%entity_id, paper_id = %existing, doi, "Paper already stored by DOI, skipping");
                return Ok(UpsertResult::existing());
            }
        }

        let key = paper.title_key();
        if !key.is_empty() {
            if let Some(existing) = self.store.find_paper_by_title_key(entity_id, &key).await? {
                tracing::debug!(%entity_id, paper_id = %existing, "Paper already stored by title, skipping");
                return Ok(UpsertResult::existing());
            }
        }

        let id = self.store.insert_paper(entity_id, paper).await?;
        tracing::debug!(%entity_id, paper_id = %id, "Inserted paper");
        Ok(UpsertResult::inserted())
    }

    /// Insert a person, or raise the stored count when the new one is higher.
    pub async fn upsert_person(&self, entity_id: Uuid, person: &PersonAppearance) -> Result<UpsertResult> {
        match self.store.find_person(entity_id, &person.name).await? {
            Some(existing) => {
                if person.publication_count > existing.publication_count {
                    self.store
                        .set_person_publication_count(entity_id, &person.name, person.publication_count)
                        .await?;
                }
                Ok(UpsertResult::existing())
            }
            None => {
                self.store.insert_person(entity_id, person).await?;
                Ok(UpsertResult::inserted())
            }
        }
    }
}

/// `GEN-` followed by eight hex digits of the title hash.
pub fn generated_patent_number(title: &str) -> String {
    let digest = Sha256::digest(title.as_bytes());
    let hex: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("GEN-{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use techscout_common::SourceKind;

    use crate::memory_store::InMemoryStore;

    fn setup() -> (Arc<InMemoryStore>, ScoutRepository, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let entity = store.add_entity(Entity::new("Acme Labs", None));
        let repo = ScoutRepository::new(store.clone());
        (store, repo, entity)
    }

    #[test]
    fn test_generated_number_shape() {
        let n = generated_patent_number("Widget");
        assert_eq!(n.len(), 12);
        assert!(n.starts_with("GEN-"));
        assert_eq!(n, generated_patent_number("Widget"));
    }

    #[tokio::test]
    async fn test_patent_dedup_by_number() {
        let (store, repo, id) = setup();
        let mut p = NormalizedDocument::patent(SourceKind::GooglePatents, "Widget", Utc::now());
        p.external_id = Some("US1".to_string());

        assert!(repo.persist_patent(id, &p).await.unwrap().was_new);
        assert!(!repo.persist_patent(id, &p).await.unwrap().was_new);
        assert_eq!(store.patents(id).len(), 1);
    }

    #[tokio::test]
    async fn test_numberless_patent_gets_generated_number() {
        let (store, repo, id) = setup();
        let p = NormalizedDocument::patent(SourceKind::GooglePatents, "Gadget", Utc::now());

        assert!(repo.persist_patent(id, &p).await.unwrap().was_new);
        assert!(!repo.persist_patent(id, &p).await.unwrap().was_new);
        let stored = store.patents(id);
        assert_eq!(stored[0].external_id.as_deref(), Some(generated_patent_number("Gadget").as_str()));
    }

    #[tokio::test]
    async fn test_paper_dedup_by_doi_then_title() {
        let (store, repo, id) = setup();
        let mut a = NormalizedDocument::paper(SourceKind::CrossRef, "Fast Systems", Utc::now());
        a.external_id = Some("10.1/a".to_string());
        let mut same_doi = NormalizedDocument::paper(SourceKind::CrossRef, "Renamed", Utc::now());
        same_doi.external_id = Some("10.1/a".to_string());
        let same_title = NormalizedDocument::paper(SourceKind::Dblp, "FAST SYSTEMS.", Utc::now());

        assert!(repo.persist_paper(id, &a).await.unwrap().was_new);
        assert!(!repo.persist_paper(id, &same_doi).await.unwrap().was_new);
        assert!(!repo.persist_paper(id, &same_title).await.unwrap().was_new);
        assert_eq!(store.papers(id).len(), 1);
    }

    #[tokio::test]
    async fn test_person_keeps_max_count() {
        let (store, repo, id) = setup();
        let mut p = PersonAppearance::researcher("Jane Doe");
        p.publication_count = 3;
        assert!(repo.upsert_person(id, &p).await.unwrap().was_new);

        p.publication_count = 1;
        assert!(!repo.upsert_person(id, &p).await.unwrap().was_new);
        assert_eq!(store.personnel(id)[0].publication_count, 3);

        p.publication_count = 5;
        tokio_test::assert_ok!(repo.upsert_person(id, &p).await);
        assert_eq!(store.personnel(id)[0].publication_count, 5);
    }
}

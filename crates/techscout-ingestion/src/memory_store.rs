//! In-process [`EntityStore`] used by the CLI and tests.
//!
//! Keeps every record in memory behind one mutex and remembers each
//! progress update, so a run's checkpoint sequence can be inspected after
//! the fact.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use techscout_common::{
    title_key, Entity, EntityStatus, NormalizedDocument, PersonAppearance, ScoutError, Technology,
};

use crate::repository::{EntityCounts, EntityStore};

#[derive(Debug, Clone)]
struct StoredDocument {
    id: Uuid,
    doc: NormalizedDocument,
}

#[derive(Debug, Default)]
struct EntityRecords {
    patents: Vec<StoredDocument>,
    papers: Vec<StoredDocument>,
    personnel: Vec<PersonAppearance>,
    /// Every (progress, status) pair written, in order.
    progress_log: Vec<(u8, EntityStatus)>,
}

#[derive(Debug, Default)]
struct State {
    entities: HashMap<Uuid, Entity>,
    records: HashMap<Uuid, EntityRecords>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an entity and return its id.
    pub fn add_entity(&self, entity: Entity) -> Uuid {
        let id = entity.id;
        let mut state = self.lock();
        state.entities.insert(id, entity);
        state.records.entry(id).or_default();
        id
    }

    pub fn entity(&self, id: Uuid) -> Option<Entity> {
        self.lock().entities.get(&id).cloned()
    }

    pub fn patents(&self, entity_id: Uuid) -> Vec<NormalizedDocument> {
        self.with_records(entity_id, |r| r.patents.iter().map(|s| s.doc.clone()).collect())
    }

    pub fn papers(&self, entity_id: Uuid) -> Vec<NormalizedDocument> {
        self.with_records(entity_id, |r| r.papers.iter().map(|s| s.doc.clone()).collect())
    }

    pub fn personnel(&self, entity_id: Uuid) -> Vec<PersonAppearance> {
        self.with_records(entity_id, |r| r.personnel.clone())
    }

    /// Progress values written for the entity, oldest first.
    pub fn progress_history(&self, entity_id: Uuid) -> Vec<u8> {
        self.with_records(entity_id, |r| r.progress_log.iter().map(|(p, _)| *p).collect())
    }

    pub fn status_history(&self, entity_id: Uuid) -> Vec<EntityStatus> {
        self.with_records(entity_id, |r| r.progress_log.iter().map(|(_, s)| *s).collect())
    }

    fn with_records<T: Default>(&self, entity_id: Uuid, f: impl FnOnce(&EntityRecords) -> T) -> T {
        self.lock().records.get(&entity_id).map(f).unwrap_or_default()
    }
}

fn records_mut(state: &mut State, entity_id: Uuid) -> Result<&mut EntityRecords> {
    state
        .records
        .get_mut(&entity_id)
        .ok_or_else(|| ScoutError::EntityNotFound(entity_id.to_string()).into())
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        Ok(self.entity(id))
    }

    async fn update_progress(&self, id: Uuid, progress: u8, status: Option<EntityStatus>) -> Result<()> {
        let mut state = self.lock();
        let entity = state
            .entities
            .get_mut(&id)
            .ok_or_else(|| ScoutError::EntityNotFound(id.to_string()))?;
        entity.progress = progress;
        if let Some(status) = status {
            entity.status = status;
        }
        entity.updated_at = Utc::now();
        let status = entity.status;
        records_mut(&mut state, id)?.progress_log.push((progress, status));
        Ok(())
    }

    async fn find_patent_by_number(&self, entity_id: Uuid, number: &str) -> Result<Option<Uuid>> {
        Ok(self.with_records(entity_id, |r| {
            r.patents
                .iter()
                .find(|s| s.doc.external_id.as_deref() == Some(number))
                .map(|s| s.id)
        }))
    }

    async fn insert_patent(&self, entity_id: Uuid, patent: &NormalizedDocument) -> Result<Uuid> {
        let id = Uuid::new_v4();
        records_mut(&mut self.lock(), entity_id)?
            .patents
            .push(StoredDocument { id, doc: patent.clone() });
        Ok(id)
    }

    async fn find_paper_by_doi(&self, entity_id: Uuid, doi: &str) -> Result<Option<Uuid>> {
        Ok(self.with_records(entity_id, |r| {
            r.papers
                .iter()
                .find(|s| s.doc.external_id.as_deref() == Some(doi))
                .map(|s| s.id)
        }))
    }

    async fn find_paper_by_title_key(&self, entity_id: Uuid, key: &str) -> Result<Option<Uuid>> {
        Ok(self.with_records(entity_id, |r| {
            r.papers
                .iter()
                .find(|s| title_key(&s.doc.title) == key)
                .map(|s| s.id)
        }))
    }

    async fn insert_paper(&self, entity_id: Uuid, paper: &NormalizedDocument) -> Result<Uuid> {
        let id = Uuid::new_v4();
        records_mut(&mut self.lock(), entity_id)?
            .papers
            .push(StoredDocument { id, doc: paper.clone() });
        Ok(id)
    }

    async fn find_person(&self, entity_id: Uuid, name: &str) -> Result<Option<PersonAppearance>> {
        Ok(self.with_records(entity_id, |r| r.personnel.iter().find(|p| p.name == name).cloned()))
    }

    async fn insert_person(&self, entity_id: Uuid, person: &PersonAppearance) -> Result<()> {
        records_mut(&mut self.lock(), entity_id)?.personnel.push(person.clone());
        Ok(())
    }

    async fn set_person_publication_count(&self, entity_id: Uuid, name: &str, count: u32) -> Result<()> {
        let mut state = self.lock();
        let person = records_mut(&mut state, entity_id)?
            .personnel
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ScoutError::Store(format!("no person named {name:?}")))?;
        person.publication_count = count;
        Ok(())
    }

    async fn finalize_entity(&self, id: Uuid, counts: EntityCounts, focus_areas: &[Technology]) -> Result<()> {
        let mut state = self.lock();
        let entity = state
            .entities
            .get_mut(&id)
            .ok_or_else(|| ScoutError::EntityNotFound(id.to_string()))?;
        entity.patent_count = counts.patents;
        entity.paper_count = counts.papers;
        entity.personnel_count = counts.personnel;
        entity.focus_areas = focus_areas.to_vec();
        entity.updated_at = Utc::now();
        Ok(())
    }
}

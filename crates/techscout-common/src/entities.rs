/// Core entity types shared between the pipeline and the persistence boundary.
/// These are Rust representations of the entity, document and personnel records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::technology::Technology;

/// Number of title characters that make up a paper's dedup key.
pub const TITLE_KEY_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Lifecycle status of an entity's analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Pending,
    Analyzing,
    Complete,
    Error,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Pending   => "pending",
            EntityStatus::Analyzing => "analyzing",
            EntityStatus::Complete  => "complete",
            EntityStatus::Error     => "error",
        }
    }

    /// `Complete` and `Error` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntityStatus::Complete | EntityStatus::Error)
    }
}

/// The organization being researched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub status: EntityStatus,
    /// 0–100, non-decreasing within one run.
    pub progress: u8,
    pub patent_count: usize,
    pub paper_count: usize,
    pub personnel_count: usize,
    pub focus_areas: Vec<Technology>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(name: &str, website: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            website: website.map(String::from),
            status: EntityStatus::Pending,
            progress: 0,
            patent_count: 0,
            paper_count: 0,
            personnel_count: 0,
            focus_areas: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Which acquisition source produced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GooglePatents,
    Arxiv,
    SemanticScholar,
    Dblp,
    CrossRef,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::GooglePatents   => "google_patents",
            SourceKind::Arxiv           => "arxiv",
            SourceKind::SemanticScholar => "semanticscholar",
            SourceKind::Dblp            => "dblp",
            SourceKind::CrossRef        => "crossref",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Patent,
    Paper,
}

/// A patent or paper normalized from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub kind: DocumentKind,
    pub source: SourceKind,
    /// Patent number, DOI, or source-specific id.
    pub external_id: Option<String>,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    /// Never absent: each source substitutes its own fallback.
    pub publication_date: DateTime<Utc>,
    pub venue: Option<String>,
    pub citation_count: u64,
    pub source_url: Option<String>,
    pub technologies: Vec<Technology>,
}

impl NormalizedDocument {
    pub fn patent(source: SourceKind, title: &str, publication_date: DateTime<Utc>) -> Self {
        Self::empty(DocumentKind::Patent, source, title, publication_date)
    }

    pub fn paper(source: SourceKind, title: &str, publication_date: DateTime<Utc>) -> Self {
        Self::empty(DocumentKind::Paper, source, title, publication_date)
    }

    fn empty(kind: DocumentKind, source: SourceKind, title: &str, publication_date: DateTime<Utc>) -> Self {
        Self {
            kind,
            source,
            external_id: None,
            title: title.to_string(),
            abstract_text: String::new(),
            authors: Vec::new(),
            publication_date,
            venue: None,
            citation_count: 0,
            source_url: None,
            technologies: Vec::new(),
        }
    }

    /// Dedup key: lowercase first 50 title characters, punctuation dropped,
    /// whitespace collapsed. Empty when the title has no alphanumerics.
    pub fn title_key(&self) -> String {
        title_key(&self.title)
    }

    /// Text used for corpus-level classification: abstract, else title.
    pub fn classification_text(&self) -> &str {
        if self.abstract_text.trim().is_empty() {
            &self.title
        } else {
            &self.abstract_text
        }
    }
}

/// See [`NormalizedDocument::title_key`].
pub fn title_key(title: &str) -> String {
    let prefix: String = title.chars().take(TITLE_KEY_CHARS).collect::<String>().to_lowercase();
    prefix
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Personnel
// ---------------------------------------------------------------------------

/// An author derived from paper appearances. Keyed by exact display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonAppearance {
    pub name: String,
    pub role: String,
    pub publication_count: u32,
    pub expertise: Vec<Technology>,
}

impl PersonAppearance {
    pub fn researcher(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: "Researcher".to_string(),
            publication_count: 0,
            expertise: Vec::new(),
        }
    }
}

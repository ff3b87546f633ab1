//! techscout-common: shared types, errors, and the technology taxonomy used across all TechScout crates.

pub mod error;
pub mod entities;
pub mod technology;

// Re-export commonly used types
pub use error::{Result, ScoutError};
pub use entities::{
    title_key, DocumentKind, Entity, EntityStatus, NormalizedDocument, PersonAppearance, SourceKind,
    TITLE_KEY_CHARS,
};
pub use technology::{classify_text, intensity, technology_profile, Technology, TechnologyIntensity};

//! Technology-domain taxonomy and keyword classifier.
//!
//! Classification is deterministic substring matching over lowercased text:
//! a domain is present when any of its keywords occurs anywhere in the text.
//! Results are always reported in taxonomy order.

use serde::{Deserialize, Serialize};

use crate::entities::{DocumentKind, NormalizedDocument};

/// One label from the fixed technology taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Technology {
    #[serde(rename = "Quantum Computing")]
    QuantumComputing,
    #[serde(rename = "Machine Learning")]
    MachineLearning,
    #[serde(rename = "Cryptography")]
    Cryptography,
    #[serde(rename = "Robotics")]
    Robotics,
    #[serde(rename = "Materials Science")]
    MaterialsScience,
    #[serde(rename = "Aerospace")]
    Aerospace,
    #[serde(rename = "Biotechnology")]
    Biotechnology,
    #[serde(rename = "Computer Vision")]
    ComputerVision,
    #[serde(rename = "Natural Language Processing")]
    NaturalLanguageProcessing,
    #[serde(rename = "Cybersecurity")]
    Cybersecurity,
    #[serde(rename = "Internet of Things")]
    InternetOfThings,
    #[serde(rename = "5G/6G Communications")]
    Communications5g6g,
}

impl Technology {
    /// Taxonomy definition order.
    pub const ALL: [Technology; 12] = [
        Technology::QuantumComputing,
        Technology::MachineLearning,
        Technology::Cryptography,
        Technology::Robotics,
        Technology::MaterialsScience,
        Technology::Aerospace,
        Technology::Biotechnology,
        Technology::ComputerVision,
        Technology::NaturalLanguageProcessing,
        Technology::Cybersecurity,
        Technology::InternetOfThings,
        Technology::Communications5g6g,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Technology::QuantumComputing          => "Quantum Computing",
            Technology::MachineLearning           => "Machine Learning",
            Technology::Cryptography              => "Cryptography",
            Technology::Robotics                  => "Robotics",
            Technology::MaterialsScience          => "Materials Science",
            Technology::Aerospace                 => "Aerospace",
            Technology::Biotechnology             => "Biotechnology",
            Technology::ComputerVision            => "Computer Vision",
            Technology::NaturalLanguageProcessing => "Natural Language Processing",
            Technology::Cybersecurity             => "Cybersecurity",
            Technology::InternetOfThings          => "Internet of Things",
            Technology::Communications5g6g        => "5G/6G Communications",
        }
    }

    /// Broad category the domain is reported under.
    pub fn category(&self) -> &'static str {
        match self {
            Technology::QuantumComputing          => "Computing",
            Technology::MachineLearning           => "AI",
            Technology::Cryptography              => "Security",
            Technology::Robotics                  => "Automation",
            Technology::MaterialsScience          => "Engineering",
            Technology::Aerospace                 => "Defense",
            Technology::Biotechnology             => "Life Sciences",
            Technology::ComputerVision            => "AI",
            Technology::NaturalLanguageProcessing => "AI",
            Technology::Cybersecurity             => "Security",
            Technology::InternetOfThings          => "Computing",
            Technology::Communications5g6g        => "Telecom",
        }
    }

    /// Keyword substrings, already lowercase.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Technology::QuantumComputing => &["quantum", "qubit", "superposition", "entanglement", "quantum computer"],
            Technology::MachineLearning => &[
                "machine learning", "deep learning", "neural network", "ai",
                "artificial intelligence", "transformer", "llm",
            ],
            Technology::Cryptography => &["cryptograph", "encryption", "blockchain", "security", "cipher"],
            Technology::Robotics => &["robot", "autonomous", "drone", "uav", "unmanned"],
            Technology::MaterialsScience => &["material", "composite", "alloy", "metamaterial", "graphene", "nano"],
            Technology::Aerospace => &["aerospace", "hypersonic", "satellite", "rocket", "spacecraft"],
            Technology::Biotechnology => &["biotech", "genetic", "crispr", "pharma", "genomic", "protein"],
            Technology::ComputerVision => &["computer vision", "image recognition", "object detection", "cnn"],
            Technology::NaturalLanguageProcessing => &["nlp", "language model", "text processing", "sentiment"],
            Technology::Cybersecurity => &["cybersecurity", "malware", "intrusion", "firewall", "vulnerability"],
            Technology::InternetOfThings => &["iot", "sensor network", "smart device", "embedded"],
            Technology::Communications5g6g => &["5g", "6g", "wireless", "spectrum", "millimeter wave"],
        }
    }

    /// Look a domain up by its display name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domains whose keywords occur in `text`, in taxonomy order.
pub fn classify_text(text: &str) -> Vec<Technology> {
    let lower = text.to_lowercase();
    Technology::ALL
        .iter()
        .copied()
        .filter(|tech| tech.keywords().iter().any(|kw| lower.contains(kw)))
        .collect()
}

/// Per-domain document counts and intensity over one document set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyIntensity {
    pub technology: Technology,
    pub category: String,
    pub patent_count: usize,
    pub paper_count: usize,
    pub intensity: f64,
}

/// (patents tagged + papers tagged) / (patents + papers); 0 for an empty set.
pub fn intensity(
    technology: Technology,
    patents: &[NormalizedDocument],
    papers: &[NormalizedDocument],
) -> f64 {
    let total = patents.len() + papers.len();
    if total == 0 {
        return 0.0;
    }
    let tagged = patents.iter().chain(papers)
        .filter(|d| d.technologies.contains(&technology))
        .count();
    tagged as f64 / total as f64
}

/// Intensity breakdown for each of `technologies`, in taxonomy order.
pub fn technology_profile(
    technologies: &[Technology],
    patents: &[NormalizedDocument],
    papers: &[NormalizedDocument],
) -> Vec<TechnologyIntensity> {
    let count = |docs: &[NormalizedDocument], kind: DocumentKind, tech: Technology| {
        docs.iter()
            .filter(|d| d.kind == kind && d.technologies.contains(&tech))
            .count()
    };

    Technology::ALL
        .iter()
        .copied()
        .filter(|t| technologies.contains(t))
        .map(|tech| TechnologyIntensity {
            technology: tech,
            category: tech.category().to_string(),
            patent_count: count(patents, DocumentKind::Patent, tech),
            paper_count: count(papers, DocumentKind::Paper, tech),
            intensity: intensity(tech, patents, papers),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::SourceKind;
    use chrono::Utc;

    fn tagged(kind: DocumentKind, techs: &[Technology]) -> NormalizedDocument {
        let mut d = match kind {
            DocumentKind::Patent => NormalizedDocument::patent(SourceKind::GooglePatents, "p", Utc::now()),
            DocumentKind::Paper  => NormalizedDocument::paper(SourceKind::CrossRef, "p", Utc::now()),
        };
        d.technologies = techs.to_vec();
        d
    }

    #[test]
    fn test_quantum_sentence() {
        let techs = classify_text("We built a quantum computer using superposition");
        assert!(techs.contains(&Technology::QuantumComputing));
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        assert_eq!(classify_text("GRAPHENE"), vec![Technology::MaterialsScience]);
        assert_eq!(classify_text("CRISPR screens"), vec![Technology::Biotechnology]);
    }

    #[test]
    fn test_results_follow_taxonomy_order() {
        // Keywords appear in reverse taxonomy order in the text.
        let techs = classify_text("5G wireless drones running deep learning on qubits");
        assert_eq!(
            techs,
            vec![
                Technology::QuantumComputing,
                Technology::MachineLearning,
                Technology::Robotics,
                Technology::Communications5g6g,
            ]
        );
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(classify_text("").is_empty());
        assert!(classify_text("pottery glazing").is_empty());
    }

    #[test]
    fn test_from_name_round_trips_display() {
        for tech in Technology::ALL {
            assert_eq!(Technology::from_name(tech.as_str()), Some(tech));
        }
        assert_eq!(Technology::from_name("Alchemy"), None);
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&Technology::Communications5g6g).unwrap();
        assert_eq!(json, "\"5G/6G Communications\"");
    }

    #[test]
    fn test_intensity_empty_set_is_zero() {
        assert_eq!(intensity(Technology::Robotics, &[], &[]), 0.0);
    }

    #[test]
    fn test_intensity_fraction() {
        let patents = vec![tagged(DocumentKind::Patent, &[Technology::Robotics])];
        let papers = vec![
            tagged(DocumentKind::Paper, &[Technology::Robotics, Technology::Aerospace]),
            tagged(DocumentKind::Paper, &[]),
            tagged(DocumentKind::Paper, &[Technology::Aerospace]),
        ];
        assert!((intensity(Technology::Robotics, &patents, &papers) - 0.5).abs() < 1e-9);
        assert!((intensity(Technology::Aerospace, &patents, &papers) - 0.5).abs() < 1e-9);
        assert_eq!(intensity(Technology::Cybersecurity, &patents, &papers), 0.0);
    }

    #[test]
    fn test_profile_counts_by_kind() {
        let patents = vec![tagged(DocumentKind::Patent, &[Technology::Robotics])];
        let papers = vec![tagged(DocumentKind::Paper, &[Technology::Robotics])];
        let profile = technology_profile(&[Technology::Robotics], &patents, &papers);
        assert_eq!(profile.len(), 1);
        assert_eq!(profile[0].patent_count, 1);
        assert_eq!(profile[0].paper_count, 1);
        assert_eq!(profile[0].category, "Automation");
        assert!((profile[0].intensity - 1.0).abs() < 1e-9);
    }
}

//! Misconception catalogue used when writing up results.
//!
//! The catalogue maps misconception tags to human-readable names,
//! prerequisite skills and remediation interventions. The engine only reads
//! it through [`RemediationCatalog`], so deployments can swap in their own.

mod builtins;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Curriculum strand a misconception belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisconceptionCategory {
    NumberOperations,
    Fractions,
    Decimals,
    Algebra,
    Geometry,
    Measurement,
    Data,
}

/// Catalogue entry for one misconception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisconceptionEntry {
    /// Tag used by distractors and probes.
    pub tag: String,
    /// Stable taxonomy identifier (e.g. `misc_001`).
    pub taxonomy_id: String,
    pub name: String,
    pub category: MisconceptionCategory,
    pub description: String,
    pub prerequisite_skills: Vec<String>,
    pub remediation_strategy: String,
    pub intervention_ids: Vec<String>,
}

/// Read-only lookup of misconception metadata.
pub trait RemediationCatalog: Send + Sync {
    /// Entry for `tag`, if the catalogue knows it.
    fn entry(&self, tag: &str) -> Option<&MisconceptionEntry>;

    /// Interventions for `tag`, falling back to a generic id for unknown tags.
    fn interventions(&self, tag: &str) -> Vec<String> {
        match self.entry(tag) {
            Some(entry) if !entry.intervention_ids.is_empty() => entry.intervention_ids.clone(),
            _ => vec![format!("INTERVENTION-{}", tag)],
        }
    }

    /// Display name for `tag`, the tag itself when unknown.
    fn display_name(&self, tag: &str) -> String {
        self.entry(tag)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| tag.to_string())
    }

    /// Prerequisite skills affected by `tag`.
    fn prerequisite_skills(&self, tag: &str) -> Vec<String> {
        self.entry(tag)
            .map(|e| e.prerequisite_skills.clone())
            .unwrap_or_default()
    }
}

/// In-memory catalogue keyed by tag and taxonomy id.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<String, MisconceptionEntry>,
    taxonomy_index: HashMap<String, String>,
}

impl StaticCatalog {
    /// Create an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalogue preloaded with the built-in taxonomy.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for entry in builtins::taxonomy() {
            catalog.register(entry);
        }
        catalog
    }

    /// Add or replace an entry.
    pub fn register(&mut self, entry: MisconceptionEntry) {
        self.taxonomy_index
            .insert(entry.taxonomy_id.clone(), entry.tag.clone());
        self.entries.insert(entry.tag.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in a category, sorted by taxonomy id.
    pub fn by_category(&self, category: MisconceptionCategory) -> Vec<&MisconceptionEntry> {
        let mut entries: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.category == category)
            .collect();
        entries.sort_by(|a, b| a.taxonomy_id.cmp(&b.taxonomy_id));
        entries
    }
}

impl RemediationCatalog for StaticCatalog {
    fn entry(&self, tag: &str) -> Option<&MisconceptionEntry> {
        self.entries.get(tag).or_else(|| {
            self.taxonomy_index
                .get(tag)
                .and_then(|canonical| self.entries.get(canonical))
        })
    }
}

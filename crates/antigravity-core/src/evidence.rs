//! Evidence registry for one pipeline run.
//!
//! Every piece of source text gets a stable identifier of the form
//! `EVD-<YYYYMMDDHHMMSS>-<SOURCE-TAG>`. Claims emitted by the pipeline may
//! only cite identifiers issued here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::types::{EvidenceItem, EvidenceSource};

/// Prefix shared by every evidence identifier.
pub const EVIDENCE_ID_PREFIX: &str = "EVD";

/// Errors from the evidence registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Evidence registry is sealed; cannot register {source} evidence after retrieval")]
    Sealed { r#source: EvidenceSource },
}

/// Summary of what evidence a run holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvidenceState {
    /// Whether anything was registered at all
    pub provided: bool,

    /// Items that came from retrieval or external collaborators
    pub retrieved_count: usize,

    /// Whether at least one item has non-whitespace text
    pub usable: bool,
}

/// Owns every [`EvidenceItem`] of a single run.
#[derive(Debug, Clone)]
pub struct EvidenceRegistry {
    run_started: DateTime<Utc>,
    items: Vec<EvidenceItem>,
    by_content: HashMap<(EvidenceSource, String), usize>,
    by_id: HashMap<String, usize>,
    per_source: BTreeMap<EvidenceSource, u32>,
    sealed: bool,
}

impl EvidenceRegistry {
    /// Create a registry whose identifiers derive from the current time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a registry whose identifiers derive from `run_started`.
    pub fn starting_at(run_started: DateTime<Utc>) -> Self {
        Self {
            run_started,
            items: Vec::new(),
            by_content: HashMap::new(),
            by_id: HashMap::new(),
            per_source: BTreeMap::new(),
            sealed: false,
        }
    }

    /// Register a piece of source text.
    ///
    /// Registering the same `(source, text)` twice returns the original item.
    pub fn register(
        &mut self,
        source: EvidenceSource,
        text: impl Into<String>,
    ) -> Result<&EvidenceItem, RegistryError> {
        let text = text.into();
        let key = (source, text);

        if let Some(&index) = self.by_content.get(&key) {
            return Ok(&self.items[index]);
        }

        if self.sealed {
            return Err(RegistryError::Sealed { source });
        }

        let ordinal = self.per_source.entry(source).or_insert(0);
        *ordinal += 1;
        let tag = if *ordinal == 1 {
            source.tag().to_string()
        } else {
            format!("{}-{}", source.tag(), ordinal)
        };

        let id = format!(
            "{}-{}-{}",
            EVIDENCE_ID_PREFIX,
            self.run_started.format("%Y%m%d%H%M%S"),
            tag
        );

        let (source, text) = key;
        let item = EvidenceItem::new(id.clone(), source, text.clone(), Utc::now());
        tracing::debug!(evidence_id = %id, source = %source, chars = text.len(), "Evidence registered");

        let index = self.items.len();
        self.items.push(item);
        self.by_content.insert((source, text), index);
        self.by_id.insert(id, index);

        Ok(&self.items[index])
    }

    /// Refuse further registrations. Called once retrieval has finished.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Current evidence state.
    pub fn state(&self) -> EvidenceState {
        EvidenceState {
            provided: !self.items.is_empty(),
            retrieved_count: self
                .items
                .iter()
                .filter(|i| i.source() != EvidenceSource::UserInput)
                .count(),
            usable: self.items.iter().any(EvidenceItem::is_usable),
        }
    }

    /// Look up an item by identifier.
    pub fn resolve(&self, id: &str) -> Option<&EvidenceItem> {
        self.by_id.get(id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Items in registration order.
    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Non-whitespace characters across all items.
    pub fn usable_chars(&self) -> usize {
        self.items
            .iter()
            .map(|i| i.text().chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }

    pub fn run_started(&self) -> DateTime<Utc> {
        self.run_started
    }
}

impl Default for EvidenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_registry() -> EvidenceRegistry {
        EvidenceRegistry::starting_at(Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap())
    }

    #[test]
    fn test_identifier_format() {
        let mut registry = fixed_registry();
        let item = registry
            .register(EvidenceSource::UserInput, "A graphene anode.")
            .unwrap();
        assert_eq!(item.id(), "EVD-20250314092653-INPUT");
    }

    #[test]
    fn test_same_source_gets_ordinal_suffix() {
        let mut registry = fixed_registry();
        let first = registry
            .register(EvidenceSource::Retrieved, "Paper one")
            .unwrap()
            .id()
            .to_string();
        let second = registry
            .register(EvidenceSource::Retrieved, "Paper two")
            .unwrap()
            .id()
            .to_string();

        assert_eq!(first, "EVD-20250314092653-RETRIEVED");
        assert_eq!(second, "EVD-20250314092653-RETRIEVED-2");
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = fixed_registry();
        let first = registry
            .register(EvidenceSource::External, "Same text")
            .unwrap()
            .clone();
        let again = registry
            .register(EvidenceSource::External, "Same text")
            .unwrap()
            .clone();

        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_state_counts() {
        let mut registry = fixed_registry();
        assert_eq!(registry.state(), EvidenceState::default());

        registry.register(EvidenceSource::UserInput, "idea").unwrap();
        registry.register(EvidenceSource::Retrieved, "paper").unwrap();
        registry.register(EvidenceSource::External, "patent").unwrap();

        let state = registry.state();
        assert!(state.provided);
        assert!(state.usable);
        assert_eq!(state.retrieved_count, 2);
    }

    #[test]
    fn test_whitespace_only_is_not_usable() {
        let mut registry = fixed_registry();
        registry.register(EvidenceSource::UserInput, "   \n\t").unwrap();
        registry.register(EvidenceSource::Retrieved, "").unwrap();

        let state = registry.state();
        assert!(state.provided);
        assert!(!state.usable);
        assert_eq!(registry.usable_chars(), 0);
    }

    #[test]
    fn test_sealed_registry_rejects_new_items() {
        let mut registry = fixed_registry();
        registry.register(EvidenceSource::UserInput, "idea").unwrap();
        registry.seal();

        // Re-registering existing content still resolves
        assert!(registry.register(EvidenceSource::UserInput, "idea").is_ok());
        assert!(matches!(
            registry.register(EvidenceSource::Retrieved, "late"),
            Err(RegistryError::Sealed { .. })
        ));
    }

    #[test]
    fn test_resolve() {
        let mut registry = fixed_registry();
        let id = registry
            .register(EvidenceSource::UserInput, "idea")
            .unwrap()
            .id()
            .to_string();

        assert_eq!(registry.resolve(&id).unwrap().text(), "idea");
        assert!(registry.resolve("EVD-19700101000000-INPUT").is_none());
    }
}

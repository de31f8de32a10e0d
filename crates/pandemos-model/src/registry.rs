//! The static compound registry consulted during action scoring.
//!
//! Compounds are the named components a mix is built from. Each carries a
//! base power and a tag weight vector; scoring multiplies those weights
//! against the target region's `(1 - resistance)` per tag. Unknown
//! components are rejected at the validation boundary, never at scoring
//! time.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use pandemos_types::CompoundId;

/// Errors raised while building the compound registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry contains no compounds.
    #[error("compound registry is empty")]
    Empty,

    /// The same compound id appears twice.
    #[error("duplicate compound in registry: {0}")]
    DuplicateCompound(CompoundId),

    /// A compound carries no tags, so it could never score.
    #[error("compound {0} has no tags")]
    NoTags(CompoundId),

    /// A tag weight or base power falls outside `[0, 1]`.
    #[error("compound {compound} has out-of-range weight for tag {tag}")]
    WeightOutOfRange {
        /// The offending compound.
        compound: CompoundId,
        /// The tag whose weight is invalid, or `base_power`.
        tag: String,
    },
}

/// A registered compound definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Compound {
    /// The compound's unique id.
    pub compound_id: CompoundId,
    /// Tag weights in `[0, 1]`: how strongly the compound acts on each tag.
    pub tags: BTreeMap<String, Decimal>,
    /// Base effectiveness multiplier in `[0, 1]`.
    pub base_power: Decimal,
}

/// The immutable registry of all known compounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundRegistry {
    compounds: BTreeMap<CompoundId, Compound>,
    /// Every tag any compound references, sorted. Regions track a
    /// resistance value per entry in this list.
    tags: Vec<String>,
}

impl CompoundRegistry {
    /// Build and validate the registry from compound definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on an empty list, duplicate ids, tagless
    /// compounds, or weights outside `[0, 1]`.
    pub fn from_compounds(definitions: Vec<Compound>) -> Result<Self, RegistryError> {
        if definitions.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut compounds = BTreeMap::new();
        let mut tags: Vec<String> = Vec::new();

        for def in definitions {
            if def.tags.is_empty() {
                return Err(RegistryError::NoTags(def.compound_id));
            }
            if def.base_power < Decimal::ZERO || def.base_power > Decimal::ONE {
                return Err(RegistryError::WeightOutOfRange {
                    compound: def.compound_id,
                    tag: "base_power".to_owned(),
                });
            }
            for (tag, weight) in &def.tags {
                if *weight < Decimal::ZERO || *weight > Decimal::ONE {
                    return Err(RegistryError::WeightOutOfRange {
                        compound: def.compound_id.clone(),
                        tag: tag.clone(),
                    });
                }
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
            let id = def.compound_id.clone();
            if compounds.insert(id.clone(), def).is_some() {
                return Err(RegistryError::DuplicateCompound(id));
            }
        }

        tags.sort();
        Ok(Self { compounds, tags })
    }

    /// Look up a compound by id.
    pub fn get(&self, compound_id: &CompoundId) -> Option<&Compound> {
        self.compounds.get(compound_id)
    }

    /// Whether the compound is registered.
    pub fn contains(&self, compound_id: &CompoundId) -> bool {
        self.compounds.contains_key(compound_id)
    }

    /// Every tag any compound references, sorted.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Number of registered compounds.
    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    /// Whether the registry is empty (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn compound(id: &str, tags: &[(&str, &str)], base_power: &str) -> Compound {
        Compound {
            compound_id: CompoundId::from(id),
            tags: tags
                .iter()
                .map(|(t, w)| {
                    (
                        (*t).to_owned(),
                        w.parse::<Decimal>().unwrap(),
                    )
                })
                .collect(),
            base_power: base_power.parse().unwrap(),
        }
    }

    #[test]
    fn builds_registry_and_collects_tags() {
        let registry = CompoundRegistry::from_compounds(vec![
            compound("antiviral", &[("viral", "0.9")], "0.8"),
            compound("broadband", &[("viral", "0.4"), ("bacterial", "0.5")], "0.6"),
        ])
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tags(), &["bacterial".to_owned(), "viral".to_owned()]);
        assert!(registry.contains(&CompoundId::from("antiviral")));
    }

    #[test]
    fn rejects_empty_registry() {
        assert!(matches!(
            CompoundRegistry::from_compounds(vec![]),
            Err(RegistryError::Empty)
        ));
    }

    #[test]
    fn rejects_duplicate_compound() {
        let result = CompoundRegistry::from_compounds(vec![
            compound("x", &[("viral", "0.5")], "0.5"),
            compound("x", &[("viral", "0.5")], "0.5"),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateCompound(_))));
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let result =
            CompoundRegistry::from_compounds(vec![compound("x", &[("viral", "1.5")], "0.5")]);
        assert!(matches!(result, Err(RegistryError::WeightOutOfRange { .. })));
    }

    #[test]
    fn rejects_tagless_compound() {
        let result = CompoundRegistry::from_compounds(vec![compound("x", &[], "0.5")]);
        assert!(matches!(result, Err(RegistryError::NoTags(_))));
    }
}

//! The static region topology: regions and their neighbor sets.
//!
//! The topology is loaded once from the catalog at process start and is
//! immutable for the process lifetime. Refreshing it requires a restart.
//! The graph is validated at construction so every later lookup can trust
//! that neighbor references resolve.

use std::collections::BTreeMap;

use serde::Deserialize;

use pandemos_types::RegionId;

/// Errors raised while building the region graph from the catalog.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// The catalog contains no regions.
    #[error("topology catalog is empty")]
    Empty,

    /// The same region id appears twice in the catalog.
    #[error("duplicate region in catalog: {0}")]
    DuplicateRegion(RegionId),

    /// A region lists a neighbor that is not itself a catalog entry.
    #[error("region {region} lists unknown neighbor {neighbor}")]
    UnknownNeighbor {
        /// The region whose neighbor list is invalid.
        region: RegionId,
        /// The neighbor id that does not exist in the catalog.
        neighbor: RegionId,
    },

    /// A region lists itself as a neighbor.
    #[error("region {0} lists itself as a neighbor")]
    SelfNeighbor(RegionId),
}

/// One entry of the topology catalog as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionCatalogEntry {
    /// The region's unique id.
    pub region_id: RegionId,
    /// Ids of adjacent regions.
    #[serde(default)]
    pub neighbors: Vec<RegionId>,
    /// Bootstrap infection level in basis points. Defaults to zero.
    #[serde(default)]
    pub initial_infection_bps: u16,
}

/// The immutable neighbor graph over all regions.
///
/// Constructed once at startup and shared read-only with the scheduler and
/// the evaluator; there are no ambient globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionGraph {
    /// Neighbor lists keyed by region, each sorted and deduplicated.
    neighbors: BTreeMap<RegionId, Vec<RegionId>>,
}

impl RegionGraph {
    /// Build and validate the graph from catalog entries.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError`] if the catalog is empty, contains a
    /// duplicate region, a self-neighbor, or an unresolved neighbor id.
    pub fn from_catalog(entries: &[RegionCatalogEntry]) -> Result<Self, TopologyError> {
        if entries.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut neighbors: BTreeMap<RegionId, Vec<RegionId>> = BTreeMap::new();
        for entry in entries {
            let mut list = entry.neighbors.clone();
            list.sort();
            list.dedup();
            if neighbors.insert(entry.region_id.clone(), list).is_some() {
                return Err(TopologyError::DuplicateRegion(entry.region_id.clone()));
            }
        }

        for (region, list) in &neighbors {
            for neighbor in list {
                if neighbor == region {
                    return Err(TopologyError::SelfNeighbor(region.clone()));
                }
                if !neighbors.contains_key(neighbor) {
                    return Err(TopologyError::UnknownNeighbor {
                        region: region.clone(),
                        neighbor: neighbor.clone(),
                    });
                }
            }
        }

        Ok(Self { neighbors })
    }

    /// Whether the region exists in the topology.
    pub fn contains(&self, region_id: &RegionId) -> bool {
        self.neighbors.contains_key(region_id)
    }

    /// The region's neighbor list, empty if the region is unknown.
    pub fn neighbors(&self, region_id: &RegionId) -> &[RegionId] {
        self.neighbors.get(region_id).map_or(&[], Vec::as_slice)
    }

    /// Iterate over all region ids in sorted order.
    pub fn region_ids(&self) -> impl Iterator<Item = &RegionId> {
        self.neighbors.keys()
    }

    /// Number of regions in the topology.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether the topology has no regions (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(id: &str, neighbors: &[&str]) -> RegionCatalogEntry {
        RegionCatalogEntry {
            region_id: RegionId::from(id),
            neighbors: neighbors.iter().map(|n| RegionId::from(*n)).collect(),
            initial_infection_bps: 0,
        }
    }

    #[test]
    fn builds_valid_graph() {
        let graph = RegionGraph::from_catalog(&[
            entry("a", &["b"]),
            entry("b", &["a", "c"]),
            entry("c", &["b"]),
        ])
        .unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.neighbors(&RegionId::from("b")).len(), 2);
        assert!(graph.contains(&RegionId::from("a")));
    }

    #[test]
    fn rejects_empty_catalog() {
        assert!(matches!(
            RegionGraph::from_catalog(&[]),
            Err(TopologyError::Empty)
        ));
    }

    #[test]
    fn rejects_duplicate_region() {
        let result = RegionGraph::from_catalog(&[entry("a", &[]), entry("a", &[])]);
        assert!(matches!(result, Err(TopologyError::DuplicateRegion(_))));
    }

    #[test]
    fn rejects_unknown_neighbor() {
        let result = RegionGraph::from_catalog(&[entry("a", &["ghost"])]);
        assert!(matches!(
            result,
            Err(TopologyError::UnknownNeighbor { .. })
        ));
    }

    #[test]
    fn rejects_self_neighbor() {
        let result = RegionGraph::from_catalog(&[entry("a", &["a"])]);
        assert!(matches!(result, Err(TopologyError::SelfNeighbor(_))));
    }

    #[test]
    fn neighbor_lists_are_deduplicated() {
        let graph =
            RegionGraph::from_catalog(&[entry("a", &["b", "b"]), entry("b", &[])]).unwrap();
        assert_eq!(graph.neighbors(&RegionId::from("a")).len(), 1);
    }

    #[test]
    fn unknown_region_has_no_neighbors() {
        let graph = RegionGraph::from_catalog(&[entry("a", &[])]).unwrap();
        assert!(graph.neighbors(&RegionId::from("zz")).is_empty());
    }
}

//! OpenAlex entity kinds and their processing order

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One dataset of the OpenAlex snapshot.
///
/// Variants are declared in pipeline order: the topic taxonomy first, then
/// organisations, then authors, and works last because they reference
/// everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Domains,
    Fields,
    Subfields,
    Topics,
    Publishers,
    Institutions,
    Sources,
    Authors,
    Works,
}

impl EntityKind {
    /// Every entity kind, in processing order
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Domains,
        EntityKind::Fields,
        EntityKind::Subfields,
        EntityKind::Topics,
        EntityKind::Publishers,
        EntityKind::Institutions,
        EntityKind::Sources,
        EntityKind::Authors,
        EntityKind::Works,
    ];

    /// Directory name under the snapshot's `data/` prefix
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Domains => "domains",
            EntityKind::Fields => "fields",
            EntityKind::Subfields => "subfields",
            EntityKind::Topics => "topics",
            EntityKind::Publishers => "publishers",
            EntityKind::Institutions => "institutions",
            EntityKind::Sources => "sources",
            EntityKind::Authors => "authors",
            EntityKind::Works => "works",
        }
    }

    /// Key of this entity's counter in the checkpoint's `total_processed`
    pub fn count_key(self) -> String {
        format!("{}_count", self.as_str())
    }

    /// Sort a selection of kinds into pipeline order and drop duplicates
    pub fn in_pipeline_order(kinds: &[EntityKind]) -> Vec<EntityKind> {
        let mut ordered = kinds.to_vec();
        ordered.sort();
        ordered.dedup();
        ordered
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| IngestError::UnknownEntity(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_works_come_last() {
        assert_eq!(EntityKind::ALL.last(), Some(&EntityKind::Works));
        assert!(EntityKind::Institutions < EntityKind::Works);
        assert!(EntityKind::Domains < EntityKind::Topics);
    }

    #[test]
    fn test_parse_and_display_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!(" Authors ".parse::<EntityKind>().unwrap(), EntityKind::Authors);
        assert!("venues".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_count_key() {
        assert_eq!(EntityKind::Authors.count_key(), "authors_count");
    }

    #[test]
    fn test_pipeline_order_sorts_and_dedups() {
        let picked = [EntityKind::Works, EntityKind::Authors, EntityKind::Works];
        assert_eq!(
            EntityKind::in_pipeline_order(&picked),
            vec![EntityKind::Authors, EntityKind::Works]
        );
    }
}

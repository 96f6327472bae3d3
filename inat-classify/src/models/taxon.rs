//! Taxon candidates and the subfamily/tribe/genus hierarchy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rendering of an absent hierarchy level in human-readable output
pub const ABSENT_MARKER: &str = "N/A";

/// Joins scientific and common name in a hierarchy level
pub const NAME_SEPARATOR: &str = "-";

/// One candidate returned by the scoring endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonCandidate {
    pub taxon_id: u64,
    pub name: String,
    pub common_name: Option<String>,
    /// Confidence in [0, 1]
    pub score: f64,
}

impl TaxonCandidate {
    /// Highest score wins; on equal scores the first-seen candidate is kept.
    ///
    /// Input order is the service's order and is not assumed to be sorted.
    pub fn select_best<I>(candidates: I) -> Option<TaxonCandidate>
    where
        I: IntoIterator<Item = TaxonCandidate>,
    {
        candidates.into_iter().fold(None, |best, candidate| match best {
            Some(current) if candidate.score > current.score => Some(candidate),
            Some(current) => Some(current),
            None => Some(candidate),
        })
    }
}

/// Ranks extracted into a [`Hierarchy`], in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Subfamily,
    Tribe,
    Genus,
}

impl Rank {
    pub const ALL: [Rank; 3] = [Rank::Subfamily, Rank::Tribe, Rank::Genus];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Subfamily => "subfamily",
            Rank::Tribe => "tribe",
            Rank::Genus => "genus",
        }
    }

    /// Match a rank name from the taxonomy service (case-insensitive)
    pub fn parse(rank: &str) -> Option<Rank> {
        let rank = rank.trim();
        Rank::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(rank))
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subfamily, tribe and genus of a taxon
///
/// Always carries all three keys. An absent level is `None` and serializes
/// as JSON `null`, never as an empty string or a missing key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub subfamily: Option<String>,
    pub tribe: Option<String>,
    pub genus: Option<String>,
}

impl Hierarchy {
    /// All levels absent
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, rank: Rank) -> Option<&str> {
        match rank {
            Rank::Subfamily => self.subfamily.as_deref(),
            Rank::Tribe => self.tribe.as_deref(),
            Rank::Genus => self.genus.as_deref(),
        }
    }

    pub fn set(&mut self, rank: Rank, value: String) {
        let slot = match rank {
            Rank::Subfamily => &mut self.subfamily,
            Rank::Tribe => &mut self.tribe,
            Rank::Genus => &mut self.genus,
        };
        *slot = Some(value);
    }

    /// Level value, or [`ABSENT_MARKER`]
    pub fn display(&self, rank: Rank) -> &str {
        self.get(rank).unwrap_or(ABSENT_MARKER)
    }

    pub fn missing_ranks(&self) -> Vec<Rank> {
        Rank::ALL
            .into_iter()
            .filter(|rank| self.get(*rank).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_ranks().is_empty()
    }

    /// `"{scientific}-{common}"`, or just the scientific name when the common
    /// name is missing or blank
    pub fn format_level(scientific_name: &str, common_name: Option<&str>) -> String {
        match common_name.map(str::trim).filter(|c| !c.is_empty()) {
            Some(common) => format!("{}{}{}", scientific_name, NAME_SEPARATOR, common),
            None => scientific_name.to_string(),
        }
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subfamily={} tribe={} genus={}",
            self.display(Rank::Subfamily),
            self.display(Rank::Tribe),
            self.display(Rank::Genus)
        )
    }
}

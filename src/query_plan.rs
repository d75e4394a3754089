//! The structured plan produced by the Query Parser and consumed by the
//! Search Engine.

use serde::{Deserialize, Serialize};

/// An inclusive-exclusive time window on `taken_at`. Either bound may be
/// absent; an absent bound is unconstrained on that side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl TimeRange {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Geocoded coordinates plus a match radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
}

/// The location facet of a plan: the set of name aliases the parser
/// extracted plus, if geocoding succeeded, resolved coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationPlan {
    pub names: Vec<String>,
    pub coords: Option<Coords>,
}

/// Structured interpretation of a free-text search utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub location: Option<LocationPlan>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl QueryPlan {
    /// Whether `location.names` is non-empty.
    pub fn has_location(&self) -> bool {
        self.location
            .as_ref()
            .map(|l| !l.names.is_empty())
            .unwrap_or(false)
    }
}

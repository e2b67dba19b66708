//! Query and related data models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Submission order of a query.
///
/// Generations are handed out by the [`Sequencer`](super::Sequencer) and are
/// the only thing two queries are compared by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Optional spatial restriction attached to a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// A single location
    Point { lat: f64, lon: f64 },
    /// An axis-aligned box
    BoundingBox {
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    },
    /// A closed ring of (lat, lon) vertices
    Polygon { vertices: Vec<(f64, f64)> },
}

impl Geometry {
    /// Create a point geometry
    pub fn point(lat: f64, lon: f64) -> Self {
        Self::Point { lat, lon }
    }

    /// Create a bounding box, normalizing swapped corners
    pub fn bbox(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> Self {
        Self::BoundingBox {
            min_lat: lat_a.min(lat_b),
            min_lon: lon_a.min(lon_b),
            max_lat: lat_a.max(lat_b),
            max_lon: lon_a.max(lon_b),
        }
    }
}

/// A submitted query.
///
/// Immutable once stamped; a newer submission supersedes it but never
/// changes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    text: String,
    geometry: Option<Geometry>,
    generation: Generation,
}

impl Query {
    pub(crate) fn new(text: String, geometry: Option<Geometry>, generation: Generation) -> Self {
        Self {
            text,
            geometry,
            generation,
        }
    }

    /// The raw query text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Spatial restriction, if any
    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    /// Submission order of this query
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Check if the query text is blank
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

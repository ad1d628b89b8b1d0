//! Common geographic types used across the platform

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{PipelineError, PipelineResult};

/// Half-width of the area of interest around a coordinate, in degrees
pub const DEFAULT_AREA_MARGIN_DEGREES: f64 = 0.1;

/// A WGS84 point; immutable once created
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Validate)]
pub struct Coordinate {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values
    pub fn new(latitude: f64, longitude: f64) -> PipelineResult<Self> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(PipelineError::InvalidInput(
                "Coordinates must be finite numbers".to_string(),
            ));
        }
        coordinate
            .validate()
            .map_err(|e| PipelineError::InvalidInput(format!("Invalid coordinate: {}", e)))?;
        Ok(coordinate)
    }

    /// Area of interest with the default 0.1 degree margin
    pub fn area_of_interest(&self) -> AreaOfInterest {
        AreaOfInterest::around(*self, DEFAULT_AREA_MARGIN_DEGREES)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Rectangular bounding polygon around a coordinate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AreaOfInterest {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl AreaOfInterest {
    /// Build the box `[lon - margin, lat - margin, lon + margin, lat + margin]`,
    /// clipped to valid WGS84 bounds
    pub fn around(center: Coordinate, margin_degrees: f64) -> Self {
        Self {
            west: (center.longitude - margin_degrees).max(-180.0),
            south: (center.latitude - margin_degrees).max(-90.0),
            east: (center.longitude + margin_degrees).min(180.0),
            north: (center.latitude + margin_degrees).min(90.0),
        }
    }

    /// `[west, south, east, north]`, the STAC / GeoJSON bbox order
    pub fn bbox(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    /// Closed exterior ring as `[lon, lat]` pairs, counter-clockwise
    pub fn polygon_ring(&self) -> Vec<[f64; 2]> {
        vec![
            [self.west, self.north],
            [self.west, self.south],
            [self.east, self.south],
            [self.east, self.north],
            [self.west, self.north],
        ]
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        point.longitude >= self.west
            && point.longitude <= self.east
            && point.latitude >= self.south
            && point.latitude <= self.north
    }
}

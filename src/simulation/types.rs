//! Core types for the routing and charging core
//!
//! Identifiers, planar geometry and the geographic projection shared by
//! every other module.

use serde::{Deserialize, Serialize};

/// A wrapper type for road segment IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub usize);

/// A wrapper type for charging station IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationId(pub usize);

/// A wrapper type for vehicle IDs
///
/// Ordering matters: per-tick updates walk the fleet in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub usize);

/// A 2D position in the projected plane, in metres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Project this point onto the line segment `start -> end`.
    ///
    /// Returns the closest point and its parameter `t` in `[0, 1]`.
    pub fn project_onto(&self, start: &Position, end: &Position) -> (Position, f64) {
        let seg_x = end.x - start.x;
        let seg_y = end.y - start.y;
        let length_sq = seg_x * seg_x + seg_y * seg_y;

        if length_sq < 1e-9 {
            return (*start, 0.0);
        }

        let t = (((self.x - start.x) * seg_x + (self.y - start.y) * seg_y) / length_sq)
            .clamp(0.0, 1.0);

        (start.lerp(end, t), t)
    }
}

/// Mean Earth radius used by the equirectangular projection
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Equirectangular projection between WGS84 coordinates and the planar
/// metre space the road graph lives in.
///
/// Accurate to well under a metre across a city-sized extent, which is all
/// the snapping queries need.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoProjection {
    pub origin_lat: f64,
    pub origin_lon: f64,
}

impl GeoProjection {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
        }
    }

    pub fn to_local(&self, lat: f64, lon: f64) -> Position {
        let cos_lat = self.origin_lat.to_radians().cos();
        Position {
            x: (lon - self.origin_lon).to_radians() * EARTH_RADIUS_M * cos_lat,
            y: (lat - self.origin_lat).to_radians() * EARTH_RADIUS_M,
        }
    }

    /// Inverse of [`GeoProjection::to_local`], returns `(lat, lon)`
    pub fn to_geo(&self, position: &Position) -> (f64, f64) {
        let cos_lat = self.origin_lat.to_radians().cos();
        let lat = self.origin_lat + (position.y / EARTH_RADIUS_M).to_degrees();
        let lon = if cos_lat.abs() < 1e-12 {
            self.origin_lon
        } else {
            self.origin_lon + (position.x / (EARTH_RADIUS_M * cos_lat)).to_degrees()
        };
        (lat, lon)
    }
}

/// Convert km/h to m/s
pub fn kmh_to_mps(kmh: f64) -> f64 {
    kmh / 3.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_onto_segment_clamps() {
        let start = Position::new(0.0, 0.0);
        let end = Position::new(10.0, 0.0);

        let (point, t) = Position::new(5.0, 3.0).project_onto(&start, &end);
        assert_eq!(point, Position::new(5.0, 0.0));
        assert!((t - 0.5).abs() < 1e-12);

        let (point, t) = Position::new(-4.0, 1.0).project_onto(&start, &end);
        assert_eq!(point, start);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn test_geo_projection_inverts() {
        let projection = GeoProjection::new(40.7580, -73.9855);
        let local = projection.to_local(40.7505, -73.9934);
        let (lat, lon) = projection.to_geo(&local);
        assert!((lat - 40.7505).abs() < 1e-9);
        assert!((lon + 73.9934).abs() < 1e-9);

        // Penn Station sits roughly 1 km south-west of Times Square
        let distance = local.distance(&Position::default());
        assert!(distance > 900.0 && distance < 1200.0, "{distance}");
    }
}

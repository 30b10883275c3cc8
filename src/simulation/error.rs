//! Error types for graph construction, routing and charging operations.

use thiserror::Error;

use super::types::{SegmentId, StationId, VehicleId};

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors surfaced by the routing and charging core
///
/// Only `MalformedGraph` (and the duplicate-id/invalid-spec variants raised
/// while building) are fatal. Everything else is local to one vehicle or
/// station and leaves fleet state untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    /// A successor list references a segment that was never defined
    #[error("malformed graph: segment {segment:?} lists unknown successor {successor:?}")]
    MalformedGraph {
        segment: SegmentId,
        successor: SegmentId,
    },

    /// The same segment id was supplied twice
    #[error("duplicate segment {0:?}")]
    DuplicateSegment(SegmentId),

    /// No drivable segment lies within the search radius
    #[error("no segment within {radius_m:.1}m of ({lat:.6}, {lon:.6})")]
    NoSegmentInRadius { lat: f64, lon: f64, radius_m: f64 },

    /// The path search exhausted without reaching the target
    #[error("no path from {from:?} to {to:?}")]
    Unreachable { from: SegmentId, to: SegmentId },

    /// A vehicle's destination cannot be reached from its start
    #[error("destination {destination:?} unreachable from {start:?}")]
    UnreachableDestination {
        start: SegmentId,
        destination: SegmentId,
    },

    /// The station has no free slot left
    #[error("station {0:?} has no available slot")]
    StationFull(StationId),

    #[error("unknown segment {0:?}")]
    UnknownSegment(SegmentId),

    #[error("unknown vehicle {0:?}")]
    UnknownVehicle(VehicleId),

    #[error("unknown station {0:?}")]
    UnknownStation(StationId),

    #[error("vehicle {0:?} is already registered")]
    DuplicateVehicle(VehicleId),

    #[error("station {0:?} is already registered")]
    DuplicateStation(StationId),

    /// A vehicle spec or station definition with nonsensical values
    #[error("invalid specification: {0}")]
    InvalidSpec(String),

    /// A position report with an offset that is not a finite number
    #[error("vehicle {vehicle:?} reported non-finite offset {offset_m} on {segment:?}")]
    InvalidOffset {
        vehicle: VehicleId,
        segment: SegmentId,
        offset_m: f64,
    },

    /// Operation not valid for the vehicle's current lifecycle state
    #[error("vehicle {vehicle:?} is {state}, expected {expected}")]
    InvalidState {
        vehicle: VehicleId,
        state: &'static str,
        expected: &'static str,
    },
}

impl RoutingError {
    /// Whether the error must abort construction rather than be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RoutingError::MalformedGraph { .. }
                | RoutingError::DuplicateSegment(_)
                | RoutingError::DuplicateStation(_)
        )
    }
}

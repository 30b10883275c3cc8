//! Fleet routing and charging core
//!
//! Everything needed to route a mixed fleet over a road graph and send
//! electric vehicles to chargers as their batteries run down. Vehicles are
//! moved by the host; this module only keeps their state and decides where
//! they should go.

mod charging;
mod config;
mod error;
mod fleet;
mod pathfinder;
mod road_network;
mod router;
pub mod scenario;
mod spatial_index;
mod telemetry;
mod types;
mod vehicle;
mod vehicle_spec;

// Re-export public types for external use
pub use charging::{
    ChargingNetwork, ChargingStation, ReleaseOutcome, StationCandidate, StationDefinition,
    StationLocation,
};
pub use config::{
    FleetMix, RouterConfig, DEFAULT_FREE_FLOW_SPEED_MPS, DEFAULT_MIN_SPEED_MPS,
    DEFAULT_SAFETY_RANGE_FRACTION, DEFAULT_SPATIAL_CELL_SIZE_M, DEFAULT_STATION_SNAP_RADIUS_M,
    DEFAULT_STRANDED_AFTER_TICKS,
};
pub use error::{RoutingError, RoutingResult};
pub use fleet::{VehicleEvent, VehicleFleet, VehicleUpdate};
pub use pathfinder::{PathFinder, Route};
pub use road_network::{link_by_shared_endpoints, GraphOptions, RoadGraph, Segment, SegmentSpec};
pub use router::RouterService;
pub use spatial_index::SpatialIndex;
pub use telemetry::{FleetStats, StationSnapshot, VehicleSnapshot};
pub use types::{kmh_to_mps, GeoProjection, Position, SegmentId, StationId, VehicleId, EARTH_RADIUS_M};
pub use vehicle::{Movement, Vehicle, VehicleState};
pub use vehicle_spec::{BatterySpec, Powertrain, VehicleModel, VehicleSpec};

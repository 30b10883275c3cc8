//! Read-only snapshots handed to telemetry and visualisation hosts

use serde::Serialize;

use super::charging::ChargingStation;
use super::types::{SegmentId, StationId, VehicleId};
use super::vehicle::{Vehicle, VehicleState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub vehicle_type: String,
    pub is_electric: bool,
    /// `None` for combustion vehicles
    pub battery_percent: Option<f64>,
    pub state: VehicleState,
    pub current_segment: SegmentId,
    pub destination: SegmentId,
    pub route: Vec<SegmentId>,
    pub assigned_station: Option<StationId>,
    pub distance_traveled_m: f64,
    pub ticks_since_assignment: u32,
}

impl From<&Vehicle> for VehicleSnapshot {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: vehicle.id,
            vehicle_type: vehicle.spec.name.clone(),
            is_electric: vehicle.is_electric(),
            battery_percent: vehicle.battery_percent(),
            state: vehicle.state,
            current_segment: vehicle.current_segment,
            destination: vehicle.destination,
            route: vehicle.route.clone(),
            assigned_station: vehicle.assigned_station,
            distance_traveled_m: vehicle.distance_traveled_m,
            ticks_since_assignment: vehicle.ticks_since_assignment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSnapshot {
    pub id: StationId,
    pub name: String,
    pub segment: SegmentId,
    pub available: u32,
    pub capacity: u32,
    pub power_kw: f64,
    /// Reserved slots whose vehicle is still on its way
    pub queue_length: usize,
    pub queue: Vec<VehicleId>,
    pub charging: Vec<VehicleId>,
    pub current_load_kw: f64,
}

impl From<&ChargingStation> for StationSnapshot {
    fn from(station: &ChargingStation) -> Self {
        Self {
            id: station.id,
            name: station.name.clone(),
            segment: station.segment,
            available: station.available(),
            capacity: station.capacity,
            power_kw: station.power_kw,
            queue_length: station.queue_len(),
            queue: station.queue().collect(),
            charging: station.charging().collect(),
            current_load_kw: station.current_load_kw(),
        }
    }
}

/// Running totals for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetStats {
    pub vehicles_created: u64,
    pub vehicles_arrived: u64,
    pub vehicles_removed: u64,
    pub charger_assignments: u64,
    pub charging_sessions_started: u64,
    pub charging_sessions_completed: u64,
    pub energy_delivered_kwh: f64,
    pub energy_consumed_kwh: f64,
    pub strand_events: u64,
    pub route_replans: u64,
}

impl FleetStats {
    /// Arrived vehicles as a share of those created, in percent
    pub fn completion_rate(&self) -> f64 {
        if self.vehicles_created == 0 {
            0.0
        } else {
            self.vehicles_arrived as f64 / self.vehicles_created as f64 * 100.0
        }
    }
}

//! Vehicle record and its battery/movement bookkeeping
//!
//! Vehicles do not move themselves. The host reports where they are and
//! [`Vehicle::advance_to`] turns that into driven distance, which in turn
//! drains the battery.

use log::debug;
use serde::{Deserialize, Serialize};

use super::road_network::RoadGraph;
use super::types::{SegmentId, StationId, VehicleId};
use super::vehicle_spec::VehicleSpec;

/// Lifecycle state of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleState {
    Traveling,
    SeekingCharger,
    Charging,
    Arrived,
}

impl VehicleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleState::Traveling => "Traveling",
            VehicleState::SeekingCharger => "SeekingCharger",
            VehicleState::Charging => "Charging",
            VehicleState::Arrived => "Arrived",
        }
    }
}

/// Distance covered by one position report
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Movement {
    pub distance_m: f64,
    /// The reported segment is not on the planned route
    pub off_route: bool,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub spec: VehicleSpec,
    pub current_segment: SegmentId,
    /// Highest offset seen on `current_segment`
    pub offset_m: f64,
    /// Always 0 for combustion vehicles
    pub battery_kwh: f64,
    pub destination: SegmentId,
    /// Remaining route; `route[0]` is the current segment
    pub route: Vec<SegmentId>,
    /// Travel time of the leg as planned
    pub leg_cost_secs: f64,
    pub state: VehicleState,
    pub assigned_station: Option<StationId>,
    pub distance_traveled_m: f64,
    pub charge_started_at: Option<f64>,
    /// Energy added during the current charging session
    pub session_energy_kwh: f64,
    /// Ticks spent seeking a charger without one assigned
    pub ticks_since_assignment: u32,
    pub stranded_reported: bool,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        spec: VehicleSpec,
        start: SegmentId,
        destination: SegmentId,
        route: Vec<SegmentId>,
        leg_cost_secs: f64,
        battery_percent: f64,
    ) -> Self {
        let battery_kwh = spec
            .battery()
            .map(|b| b.capacity_kwh * battery_percent.clamp(0.0, 100.0) / 100.0)
            .unwrap_or(0.0);

        Self {
            id,
            spec,
            current_segment: start,
            offset_m: 0.0,
            battery_kwh,
            destination,
            route,
            leg_cost_secs,
            state: VehicleState::Traveling,
            assigned_station: None,
            distance_traveled_m: 0.0,
            charge_started_at: None,
            session_energy_kwh: 0.0,
            ticks_since_assignment: 0,
            stranded_reported: false,
        }
    }

    pub fn is_electric(&self) -> bool {
        self.spec.is_electric()
    }

    /// State of charge in percent; `None` for combustion vehicles
    pub fn battery_percent(&self) -> Option<f64> {
        let battery = self.spec.battery()?;
        Some(self.battery_kwh / battery.capacity_kwh * 100.0)
    }

    /// Low battery and nothing assigned yet
    pub fn needs_charger(&self) -> bool {
        if self.assigned_station.is_some() {
            return false;
        }
        match (self.spec.battery(), self.battery_percent()) {
            (Some(battery), Some(percent)) => percent < battery.min_battery_percent,
            _ => false,
        }
    }

    pub fn reached_target_charge(&self) -> bool {
        match (self.spec.battery(), self.battery_percent()) {
            (Some(battery), Some(percent)) => percent >= battery.target_charge_percent,
            _ => true,
        }
    }

    /// Drain the battery for `distance_m` of driving, never below zero
    pub fn consume(&mut self, distance_m: f64) -> f64 {
        let Some(battery) = self.spec.battery() else {
            return 0.0;
        };
        let used = (distance_m / 1000.0 * battery.consumption_kwh_per_km).min(self.battery_kwh);
        self.battery_kwh -= used;
        used
    }

    /// Add energy from a charger of `power_kw` over `dt_secs`, capped at
    /// capacity. Returns the energy actually stored.
    pub fn charge(&mut self, power_kw: f64, dt_secs: f64) -> f64 {
        let Some(battery) = self.spec.battery() else {
            return 0.0;
        };
        let headroom = (battery.capacity_kwh - self.battery_kwh).max(0.0);
        let added = (power_kw * dt_secs.max(0.0) / 3600.0).min(headroom);
        self.battery_kwh += added;
        self.session_energy_kwh += added;
        added
    }

    /// Apply a position report.
    ///
    /// Reporting the same segment and offset twice yields zero distance the
    /// second time. Moving back along the same segment is not counted.
    pub fn advance_to(&mut self, graph: &RoadGraph, segment: SegmentId, offset_m: f64) -> Movement {
        let segment_length = |id: SegmentId| graph.segment(id).map(|s| s.length_m).unwrap_or(0.0);
        let offset_m = offset_m.clamp(0.0, segment_length(segment));

        if segment == self.current_segment {
            let distance_m = (offset_m - self.offset_m).max(0.0);
            self.offset_m = self.offset_m.max(offset_m);
            self.distance_traveled_m += distance_m;
            return Movement {
                distance_m,
                off_route: false,
            };
        }

        let remaining_on_current = (segment_length(self.current_segment) - self.offset_m).max(0.0);

        let movement = match self.route.iter().position(|id| *id == segment) {
            Some(index) => {
                let skipped: f64 = self.route[1..index].iter().map(|id| segment_length(*id)).sum();
                self.route.drain(..index);
                Movement {
                    distance_m: remaining_on_current + skipped + offset_m,
                    off_route: false,
                }
            }
            None => {
                let adjacent = graph
                    .segment(self.current_segment)
                    .is_some_and(|s| s.successors.contains(&segment));
                debug!(
                    "Vehicle {:?} left its route: {:?} -> {:?} (adjacent: {})",
                    self.id, self.current_segment, segment, adjacent
                );
                self.route = vec![segment];
                Movement {
                    // Only a direct turn has a known length
                    distance_m: if adjacent {
                        remaining_on_current + offset_m
                    } else {
                        offset_m
                    },
                    off_route: true,
                }
            }
        };

        self.current_segment = segment;
        self.offset_m = offset_m;
        self.distance_traveled_m += movement.distance_m;
        movement
    }

    /// Segment the current leg should end on
    pub fn leg_target(&self, station_segment: Option<SegmentId>) -> SegmentId {
        station_segment.unwrap_or(self.destination)
    }
}

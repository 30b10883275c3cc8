//! Vehicle fleet and the charging lifecycle state machine
//!
//! The fleet owns every vehicle record. Transitions happen in two places:
//! after a position report (battery drain, arrival, low-battery trigger)
//! and during a tick (charging, retrying stranded vehicles, replanning legs
//! that failed earlier). Ticks visit vehicles in ascending id order so that
//! slot contention between vehicles resolves the same way every run.

use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};

use super::charging::{ChargingNetwork, ReleaseOutcome};
use super::error::{RoutingError, RoutingResult};
use super::pathfinder::{PathFinder, Route};
use super::telemetry::FleetStats;
use super::types::{SegmentId, StationId, VehicleId};
use super::vehicle::{Vehicle, VehicleState};

/// Something that happened to a vehicle during one operation
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleEvent {
    AssignedStation(StationId),
    ChargingStarted(StationId),
    ChargingFinished { station: StationId, energy_kwh: f64 },
    Arrived,
    Stranded,
    Replanned,
}

/// Outcome of a report or tick for one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleUpdate {
    pub vehicle: VehicleId,
    pub events: Vec<VehicleEvent>,
    /// Set when the route was replaced rather than just advanced
    pub new_route: Option<Vec<SegmentId>>,
}

impl VehicleUpdate {
    fn new(vehicle: VehicleId) -> Self {
        Self {
            vehicle,
            events: Vec::new(),
            new_route: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.new_route.is_none()
    }

    fn route_changed(&mut self, route: &[SegmentId]) {
        self.new_route = Some(route.to_vec());
    }
}

#[derive(Debug, Clone, Default)]
pub struct VehicleFleet {
    vehicles: BTreeMap<VehicleId, Vehicle>,
    stats: FleetStats,
    /// 0 disables the stranded report
    stranded_after_ticks: u32,
}

impl VehicleFleet {
    pub fn new(stranded_after_ticks: u32) -> Self {
        Self {
            vehicles: BTreeMap::new(),
            stats: FleetStats::default(),
            stranded_after_ticks,
        }
    }

    pub fn get(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&vehicle_id)
    }

    pub fn contains(&self, vehicle_id: VehicleId) -> bool {
        self.vehicles.contains_key(&vehicle_id)
    }

    /// Iterate vehicles in ascending id order
    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn stats(&self) -> &FleetStats {
        &self.stats
    }

    /// Vehicles the watchdog has reported as stranded and that still have
    /// no charger
    pub fn stranded(&self) -> Vec<VehicleId> {
        self.vehicles
            .values()
            .filter(|v| {
                v.stranded_reported
                    && v.state == VehicleState::SeekingCharger
                    && v.assigned_station.is_none()
            })
            .map(|v| v.id)
            .collect()
    }

    /// Add a freshly planned vehicle and run its first lifecycle check
    pub fn register(
        &mut self,
        mut vehicle: Vehicle,
        finder: &PathFinder,
        network: &mut ChargingNetwork,
        now: f64,
    ) -> RoutingResult<VehicleUpdate> {
        if self.vehicles.contains_key(&vehicle.id) {
            return Err(RoutingError::DuplicateVehicle(vehicle.id));
        }

        let mut update = VehicleUpdate::new(vehicle.id);
        self.stats.vehicles_created += 1;
        settle(&mut vehicle, finder, network, &mut self.stats, now, &mut update);

        debug!(
            "Registered vehicle {:?} ({}) in state {}",
            vehicle.id,
            vehicle.spec.name,
            vehicle.state.as_str()
        );
        self.vehicles.insert(vehicle.id, vehicle);
        Ok(update)
    }

    /// Apply a position report from the stepper
    pub fn report_position(
        &mut self,
        vehicle_id: VehicleId,
        segment: SegmentId,
        offset_m: f64,
        finder: &PathFinder,
        network: &mut ChargingNetwork,
        now: f64,
    ) -> RoutingResult<VehicleUpdate> {
        if !finder.graph().contains(segment) {
            return Err(RoutingError::UnknownSegment(segment));
        }
        let vehicle = self
            .vehicles
            .get_mut(&vehicle_id)
            .ok_or(RoutingError::UnknownVehicle(vehicle_id))?;
        if !offset_m.is_finite() {
            return Err(RoutingError::InvalidOffset {
                vehicle: vehicle_id,
                segment,
                offset_m,
            });
        }

        let mut update = VehicleUpdate::new(vehicle_id);

        if matches!(vehicle.state, VehicleState::Charging | VehicleState::Arrived) {
            debug!(
                "Ignoring position of {:?} while {}",
                vehicle_id,
                vehicle.state.as_str()
            );
            return Ok(update);
        }

        let movement = vehicle.advance_to(finder.graph(), segment, offset_m);
        self.stats.energy_consumed_kwh += vehicle.consume(movement.distance_m);

        if movement.off_route {
            replan_leg(vehicle, finder, network, &mut self.stats, &mut update);
        }

        settle(vehicle, finder, network, &mut self.stats, now, &mut update);
        Ok(update)
    }

    /// Advance charging, retry seeking vehicles and repair failed legs.
    ///
    /// Returns updates only for vehicles where something happened.
    pub fn tick(
        &mut self,
        dt_secs: f64,
        finder: &PathFinder,
        network: &mut ChargingNetwork,
        now: f64,
    ) -> Vec<VehicleUpdate> {
        let stranded_after_ticks = self.stranded_after_ticks;
        let mut updates = Vec::new();

        for vehicle in self.vehicles.values_mut() {
            let mut update = VehicleUpdate::new(vehicle.id);

            match vehicle.state {
                VehicleState::Arrived => {}
                VehicleState::Charging => {
                    charge_step(vehicle, dt_secs, finder, network, &mut self.stats, now, &mut update);
                }
                VehicleState::Traveling | VehicleState::SeekingCharger => {
                    let target = vehicle.leg_target(station_segment(vehicle, network));
                    if vehicle.route.last().copied() != Some(target) {
                        replan_leg(vehicle, finder, network, &mut self.stats, &mut update);
                    }

                    let unassigned = vehicle.state == VehicleState::SeekingCharger
                        && vehicle.assigned_station.is_none();
                    if unassigned {
                        vehicle.ticks_since_assignment += 1;
                    }

                    settle(vehicle, finder, network, &mut self.stats, now, &mut update);

                    let still_stranded = unassigned
                        && vehicle.state == VehicleState::SeekingCharger
                        && vehicle.assigned_station.is_none();
                    if still_stranded
                        && stranded_after_ticks > 0
                        && vehicle.ticks_since_assignment >= stranded_after_ticks
                        && !vehicle.stranded_reported
                    {
                        warn!(
                            "Vehicle {:?} stranded: no reachable charger for {} ticks at {:.1}% battery",
                            vehicle.id,
                            vehicle.ticks_since_assignment,
                            vehicle.battery_percent().unwrap_or(0.0)
                        );
                        vehicle.stranded_reported = true;
                        self.stats.strand_events += 1;
                        update.events.push(VehicleEvent::Stranded);
                    }
                }
            }

            if !update.is_empty() {
                updates.push(update);
            }
        }

        updates
    }

    /// Plan the current leg again, keeping clear of `avoid`
    pub fn reroute(
        &mut self,
        vehicle_id: VehicleId,
        avoid: &HashSet<SegmentId>,
        finder: &PathFinder,
        network: &ChargingNetwork,
    ) -> RoutingResult<Route> {
        let vehicle = self
            .vehicles
            .get_mut(&vehicle_id)
            .ok_or(RoutingError::UnknownVehicle(vehicle_id))?;

        if matches!(vehicle.state, VehicleState::Charging | VehicleState::Arrived) {
            return Err(RoutingError::InvalidState {
                vehicle: vehicle_id,
                state: vehicle.state.as_str(),
                expected: "Traveling or SeekingCharger",
            });
        }

        let target = vehicle.leg_target(station_segment(vehicle, network));
        let route = finder
            .shortest_path(vehicle.current_segment, target, avoid)
            .ok_or(RoutingError::Unreachable {
                from: vehicle.current_segment,
                to: target,
            })?;

        vehicle.route = route.segments.clone();
        vehicle.leg_cost_secs = route.cost_secs;
        self.stats.route_replans += 1;
        debug!(
            "Vehicle {:?} rerouted around {} segments: {} hops",
            vehicle_id,
            avoid.len(),
            route.segments.len()
        );
        Ok(route)
    }

    /// Unregister a vehicle, giving back any slot it holds
    pub fn remove(&mut self, vehicle_id: VehicleId, network: &mut ChargingNetwork) -> RoutingResult<Vehicle> {
        let vehicle = self
            .vehicles
            .remove(&vehicle_id)
            .ok_or(RoutingError::UnknownVehicle(vehicle_id))?;

        if let Some(station) = vehicle.assigned_station {
            release_slot(network, station, vehicle_id);
        }

        self.stats.vehicles_removed += 1;
        debug!("Removed vehicle {:?} in state {}", vehicle_id, vehicle.state.as_str());
        Ok(vehicle)
    }

    /// Evict a vehicle that has arrived
    pub fn complete(&mut self, vehicle_id: VehicleId, network: &mut ChargingNetwork) -> RoutingResult<Vehicle> {
        let state = self
            .vehicles
            .get(&vehicle_id)
            .map(|v| v.state)
            .ok_or(RoutingError::UnknownVehicle(vehicle_id))?;

        if state != VehicleState::Arrived {
            return Err(RoutingError::InvalidState {
                vehicle: vehicle_id,
                state: state.as_str(),
                expected: "Arrived",
            });
        }

        self.remove(vehicle_id, network)
    }

    /// Release every held slot and empty the fleet
    pub fn drain(&mut self, network: &mut ChargingNetwork) -> FleetStats {
        let ids: Vec<VehicleId> = self.vehicles.keys().copied().collect();
        for vehicle_id in ids {
            if let Err(err) = self.remove(vehicle_id, network) {
                warn!("Failed to drain {:?}: {}", vehicle_id, err);
            }
        }
        self.stats.clone()
    }
}

fn station_segment(vehicle: &Vehicle, network: &ChargingNetwork) -> Option<SegmentId> {
    vehicle
        .assigned_station
        .and_then(|station| network.station(station))
        .map(|station| station.segment)
}

fn release_slot(network: &mut ChargingNetwork, station: StationId, vehicle_id: VehicleId) {
    match network.release(station, vehicle_id) {
        Ok(ReleaseOutcome::Released) => {}
        Ok(ReleaseOutcome::NotHeld) => {
            debug!("Vehicle {:?} held no slot at {:?}", vehicle_id, station);
        }
        Err(err) => warn!("Failed to release {:?} for {:?}: {}", station, vehicle_id, err),
    }
}

/// Give up the assigned station and go back to looking for one
fn drop_assignment(vehicle: &mut Vehicle, network: &mut ChargingNetwork) {
    if let Some(station) = vehicle.assigned_station.take() {
        release_slot(network, station, vehicle.id);
    }
    vehicle.charge_started_at = None;
    vehicle.state = VehicleState::SeekingCharger;
}

/// Check where the vehicle now stands and make the transition that follows
fn settle(
    vehicle: &mut Vehicle,
    finder: &PathFinder,
    network: &mut ChargingNetwork,
    stats: &mut FleetStats,
    now: f64,
    update: &mut VehicleUpdate,
) {
    if matches!(vehicle.state, VehicleState::Charging | VehicleState::Arrived) {
        return;
    }

    if let Some(station) = vehicle.assigned_station {
        if station_segment(vehicle, network) == Some(vehicle.current_segment) {
            begin_charging(vehicle, station, network, stats, now, update);
        }
        return;
    }

    if vehicle.current_segment == vehicle.destination {
        vehicle.state = VehicleState::Arrived;
        vehicle.route = vec![vehicle.destination];
        stats.vehicles_arrived += 1;
        update.events.push(VehicleEvent::Arrived);
        info!(
            "Vehicle {:?} arrived at {:?} after {:.0}m",
            vehicle.id, vehicle.destination, vehicle.distance_traveled_m
        );
        return;
    }

    if vehicle.needs_charger() {
        seek_charger(vehicle, finder, network, stats, now, update);
    }
}

/// Look for the best station and reserve it. With nothing suitable the
/// vehicle keeps heading to its destination and tries again later.
fn seek_charger(
    vehicle: &mut Vehicle,
    finder: &PathFinder,
    network: &mut ChargingNetwork,
    stats: &mut FleetStats,
    now: f64,
    update: &mut VehicleUpdate,
) {
    if vehicle.state != VehicleState::SeekingCharger {
        debug!(
            "Vehicle {:?} low on battery ({:.1}%), seeking charger",
            vehicle.id,
            vehicle.battery_percent().unwrap_or(0.0)
        );
        vehicle.state = VehicleState::SeekingCharger;
    }

    let Some(consumption) = vehicle.spec.battery().map(|b| b.consumption_kwh_per_km) else {
        return;
    };

    let Some(candidate) =
        network.best_candidate(finder, vehicle.current_segment, vehicle.battery_kwh, consumption)
    else {
        debug!("No charger reachable for {:?} yet", vehicle.id);
        return;
    };

    if let Err(err) = network.reserve(candidate.station, vehicle.id) {
        warn!("Vehicle {:?} could not reserve: {}", vehicle.id, err);
        return;
    }

    vehicle.assigned_station = Some(candidate.station);
    vehicle.route = candidate.route.segments;
    vehicle.leg_cost_secs = candidate.route.cost_secs;
    vehicle.ticks_since_assignment = 0;
    vehicle.stranded_reported = false;
    stats.charger_assignments += 1;
    update.events.push(VehicleEvent::AssignedStation(candidate.station));
    update.route_changed(&vehicle.route);

    info!(
        "Vehicle {:?} heading to station {:?} ({:.0}m, score {:.1})",
        vehicle.id, candidate.station, candidate.route.length_m, candidate.score
    );

    if station_segment(vehicle, network) == Some(vehicle.current_segment) {
        begin_charging(vehicle, candidate.station, network, stats, now, update);
    }
}

fn begin_charging(
    vehicle: &mut Vehicle,
    station: StationId,
    network: &mut ChargingNetwork,
    stats: &mut FleetStats,
    now: f64,
    update: &mut VehicleUpdate,
) {
    if let Err(err) = network.begin_charging(station, vehicle.id) {
        warn!("Vehicle {:?} could not plug in: {}", vehicle.id, err);
        drop_assignment(vehicle, network);
        return;
    }

    vehicle.state = VehicleState::Charging;
    vehicle.charge_started_at = Some(now);
    vehicle.session_energy_kwh = 0.0;
    vehicle.route = vec![vehicle.current_segment];
    stats.charging_sessions_started += 1;
    update.events.push(VehicleEvent::ChargingStarted(station));

    info!(
        "Vehicle {:?} charging at {:?} from {:.1}%",
        vehicle.id,
        station,
        vehicle.battery_percent().unwrap_or(0.0)
    );
}

fn charge_step(
    vehicle: &mut Vehicle,
    dt_secs: f64,
    finder: &PathFinder,
    network: &mut ChargingNetwork,
    stats: &mut FleetStats,
    now: f64,
    update: &mut VehicleUpdate,
) {
    let Some(station) = vehicle.assigned_station else {
        warn!("Vehicle {:?} charging without a station", vehicle.id);
        vehicle.state = VehicleState::Traveling;
        return;
    };
    let Some(power_kw) = network.station(station).map(|s| s.power_kw) else {
        warn!("Vehicle {:?} charging at unknown station {:?}", vehicle.id, station);
        drop_assignment(vehicle, network);
        return;
    };

    stats.energy_delivered_kwh += vehicle.charge(power_kw, dt_secs);

    if !vehicle.reached_target_charge() {
        return;
    }

    release_slot(network, station, vehicle.id);
    let duration = vehicle.charge_started_at.map(|t| now - t).unwrap_or(0.0);
    stats.charging_sessions_completed += 1;
    update.events.push(VehicleEvent::ChargingFinished {
        station,
        energy_kwh: vehicle.session_energy_kwh,
    });
    info!(
        "Vehicle {:?} done charging at {:?}: +{:.2} kWh in {:.0}s, now {:.1}%",
        vehicle.id,
        station,
        vehicle.session_energy_kwh,
        duration,
        vehicle.battery_percent().unwrap_or(0.0)
    );

    vehicle.assigned_station = None;
    vehicle.charge_started_at = None;
    vehicle.ticks_since_assignment = 0;
    vehicle.stranded_reported = false;
    vehicle.state = VehicleState::Traveling;

    replan_leg(vehicle, finder, network, stats, update);
    settle(vehicle, finder, network, stats, now, update);
}

/// Plan a route from the current segment to the end of the current leg.
///
/// When the assigned station turns out to be unreachable the slot is given
/// back. When nothing is reachable the route collapses to the current
/// segment and the next tick retries.
fn replan_leg(
    vehicle: &mut Vehicle,
    finder: &PathFinder,
    network: &mut ChargingNetwork,
    stats: &mut FleetStats,
    update: &mut VehicleUpdate,
) {
    let target = vehicle.leg_target(station_segment(vehicle, network));

    match finder.path(vehicle.current_segment, target) {
        Some(route) => {
            vehicle.route = route.segments;
            vehicle.leg_cost_secs = route.cost_secs;
            stats.route_replans += 1;
            update.events.push(VehicleEvent::Replanned);
            update.route_changed(&vehicle.route);
        }
        None => {
            if vehicle.route == [vehicle.current_segment] {
                debug!("Vehicle {:?} still has no route to {:?}", vehicle.id, target);
            } else {
                warn!(
                    "Vehicle {:?} has no route from {:?} to {:?}",
                    vehicle.id, vehicle.current_segment, target
                );
            }
            if vehicle.assigned_station.is_some() {
                drop_assignment(vehicle, network);
            }
            vehicle.route = vec![vehicle.current_segment];
        }
    }
}

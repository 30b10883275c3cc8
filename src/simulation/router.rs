//! Router facade tying the graph, charging network and fleet together
//!
//! This is the only type a host talks to. It owns all mutable state of a
//! session; calls must come from one thread of control.

use log::info;
use std::collections::HashSet;

use super::charging::{ChargingNetwork, StationDefinition};
use super::config::RouterConfig;
use super::error::{RoutingError, RoutingResult};
use super::fleet::{VehicleFleet, VehicleUpdate};
use super::pathfinder::{PathFinder, Route};
use super::road_network::{GraphOptions, RoadGraph, SegmentSpec};
use super::telemetry::{FleetStats, StationSnapshot, VehicleSnapshot};
use super::types::{GeoProjection, SegmentId, VehicleId};
use super::vehicle::{Vehicle, VehicleState};
use super::vehicle_spec::VehicleSpec;

pub struct RouterService {
    graph: RoadGraph,

    network: ChargingNetwork,

    fleet: VehicleFleet,

    config: RouterConfig,

    /// Simulation time in seconds, advanced by `tick`
    time: f64,

    ticks: u64,
}

impl RouterService {
    /// Set up a session over an already built graph.
    ///
    /// Stations given by coordinates are snapped onto the graph here; one
    /// that cannot be snapped aborts construction.
    pub fn new(
        graph: RoadGraph,
        stations: Vec<StationDefinition>,
        config: RouterConfig,
    ) -> RoutingResult<Self> {
        let network = ChargingNetwork::from_definitions(stations, &graph, &config)?;
        let fleet = VehicleFleet::new(config.stranded_after_ticks);

        info!(
            "Router ready: {} segments, {} stations, {} charging slots",
            graph.segment_count(),
            network.len(),
            network.stations().map(|s| s.capacity as u64).sum::<u64>()
        );

        Ok(Self {
            graph,
            network,
            fleet,
            config,
            time: 0.0,
            ticks: 0,
        })
    }

    /// Build the graph from raw segments using the config's speed floor and
    /// index cell size, then set up the session
    pub fn from_segments(
        segments: Vec<SegmentSpec>,
        projection: GeoProjection,
        stations: Vec<StationDefinition>,
        config: RouterConfig,
    ) -> RoutingResult<Self> {
        let graph = RoadGraph::build_with(
            segments,
            GraphOptions {
                projection,
                min_speed_mps: config.min_speed_mps,
                spatial_cell_size_m: config.spatial_cell_size_m,
            },
        )?;
        Self::new(graph, stations, config)
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn network(&self) -> &ChargingNetwork {
        &self.network
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn path_finder(&self) -> PathFinder<'_> {
        PathFinder::with_free_flow_speed(&self.graph, self.config.free_flow_speed_mps)
    }

    /// Shortest route between two segments, as an error when there is none
    pub fn plan_route(&self, from: SegmentId, to: SegmentId) -> RoutingResult<Route> {
        if !self.graph.contains(from) {
            return Err(RoutingError::UnknownSegment(from));
        }
        self.path_finder()
            .path(from, to)
            .ok_or(RoutingError::Unreachable { from, to })
    }

    /// Register a vehicle with a full battery
    pub fn create_vehicle(
        &mut self,
        vehicle_id: VehicleId,
        spec: VehicleSpec,
        start: SegmentId,
        destination: SegmentId,
    ) -> RoutingResult<&Vehicle> {
        self.create_vehicle_with_battery(vehicle_id, spec, start, destination, 100.0)
    }

    /// Register a vehicle with an initial state of charge in percent.
    ///
    /// Fails without registering anything when the destination cannot be
    /// reached. A vehicle that starts below its charging threshold starts
    /// seeking a charger right away.
    pub fn create_vehicle_with_battery(
        &mut self,
        vehicle_id: VehicleId,
        spec: VehicleSpec,
        start: SegmentId,
        destination: SegmentId,
        battery_percent: f64,
    ) -> RoutingResult<&Vehicle> {
        spec.validate()?;
        for segment in [start, destination] {
            if !self.graph.contains(segment) {
                return Err(RoutingError::UnknownSegment(segment));
            }
        }
        if self.fleet.contains(vehicle_id) {
            return Err(RoutingError::DuplicateVehicle(vehicle_id));
        }

        let finder = PathFinder::with_free_flow_speed(&self.graph, self.config.free_flow_speed_mps);
        let route = finder
            .path(start, destination)
            .ok_or(RoutingError::UnreachableDestination { start, destination })?;

        let vehicle = Vehicle::new(
            vehicle_id,
            spec,
            start,
            destination,
            route.segments,
            route.cost_secs,
            battery_percent,
        );
        self.fleet
            .register(vehicle, &finder, &mut self.network, self.time)?;

        self.fleet
            .get(vehicle_id)
            .ok_or(RoutingError::UnknownVehicle(vehicle_id))
    }

    pub fn vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.fleet.get(vehicle_id)
    }

    /// Iterate vehicles in ascending id order
    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.fleet.vehicles()
    }

    pub fn vehicle_count(&self) -> usize {
        self.fleet.len()
    }

    /// Report where the stepper has moved a vehicle to
    pub fn report_position(
        &mut self,
        vehicle_id: VehicleId,
        segment: SegmentId,
        offset_m: f64,
    ) -> RoutingResult<VehicleUpdate> {
        let finder = PathFinder::with_free_flow_speed(&self.graph, self.config.free_flow_speed_mps);
        self.fleet.report_position(
            vehicle_id,
            segment,
            offset_m,
            &finder,
            &mut self.network,
            self.time,
        )
    }

    /// Advance simulation time by `dt_secs`. Vehicles are not moved.
    pub fn tick(&mut self, dt_secs: f64) -> Vec<VehicleUpdate> {
        let dt_secs = dt_secs.max(0.0);
        self.time += dt_secs;
        self.ticks += 1;

        let finder = PathFinder::with_free_flow_speed(&self.graph, self.config.free_flow_speed_mps);
        self.fleet.tick(dt_secs, &finder, &mut self.network, self.time)
    }

    /// Replan a vehicle's current leg around closed segments
    pub fn reroute(&mut self, vehicle_id: VehicleId, avoid: &HashSet<SegmentId>) -> RoutingResult<Route> {
        let finder = PathFinder::with_free_flow_speed(&self.graph, self.config.free_flow_speed_mps);
        self.fleet.reroute(vehicle_id, avoid, &finder, &self.network)
    }

    /// Unregister a vehicle in any state
    pub fn remove_vehicle(&mut self, vehicle_id: VehicleId) -> RoutingResult<Vehicle> {
        self.fleet.remove(vehicle_id, &mut self.network)
    }

    /// Evict a vehicle the stepper has seen arrive
    pub fn complete_vehicle(&mut self, vehicle_id: VehicleId) -> RoutingResult<Vehicle> {
        self.fleet.complete(vehicle_id, &mut self.network)
    }

    pub fn vehicle_snapshot(&self, vehicle_id: VehicleId) -> Option<VehicleSnapshot> {
        self.fleet.get(vehicle_id).map(VehicleSnapshot::from)
    }

    pub fn vehicle_snapshots(&self) -> Vec<VehicleSnapshot> {
        self.fleet.vehicles().map(VehicleSnapshot::from).collect()
    }

    pub fn station_snapshots(&self) -> Vec<StationSnapshot> {
        self.network.stations().map(StationSnapshot::from).collect()
    }

    pub fn stats(&self) -> &FleetStats {
        self.fleet.stats()
    }

    pub fn stranded_vehicles(&self) -> Vec<VehicleId> {
        self.fleet.stranded()
    }

    /// End the session, releasing every slot
    pub fn shutdown(mut self) -> FleetStats {
        let stats = self.fleet.drain(&mut self.network);
        info!(
            "Router shut down after {} ticks ({:.1}s simulated)",
            self.ticks, self.time
        );
        stats
    }

    /// Log a summary of the session state
    pub fn log_summary(&self) {
        let snapshots = self.vehicle_snapshots();
        let count_state = |state: VehicleState| {
            snapshots.iter().filter(|s| s.state == state).count()
        };

        info!("=== Fleet Summary ===");
        info!("Time: {:.1}s ({} ticks)", self.time, self.ticks);
        info!(
            "Vehicles: {} (traveling={}, seeking={}, charging={}, arrived={})",
            snapshots.len(),
            count_state(VehicleState::Traveling),
            count_state(VehicleState::SeekingCharger),
            count_state(VehicleState::Charging),
            count_state(VehicleState::Arrived)
        );

        for station in self.station_snapshots() {
            info!(
                "  Station {:?} '{}': {}/{} free, queue={}, load={:.0} kW",
                station.id.0,
                station.name,
                station.available,
                station.capacity,
                station.queue_length,
                station.current_load_kw
            );
        }

        let stranded = self.stranded_vehicles();
        if !stranded.is_empty() {
            info!("Stranded: {:?}", stranded);
        }
    }
}

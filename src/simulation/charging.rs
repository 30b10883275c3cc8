//! Charging station registry with slot reservation
//!
//! A slot is held from the moment a vehicle reserves it until the vehicle
//! finishes charging or is unregistered. Reserved-but-not-arrived vehicles
//! wait in the station's FIFO queue; plugged-in vehicles move to the
//! charging set. `available` always equals
//! `capacity - queue.len() - charging.len()`.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::config::{RouterConfig, DEFAULT_SAFETY_RANGE_FRACTION};
use super::error::{RoutingError, RoutingResult};
use super::pathfinder::{PathFinder, Route};
use super::road_network::RoadGraph;
use super::types::{SegmentId, StationId, VehicleId};

/// Where a station sits, as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StationLocation {
    Segment(SegmentId),
    /// Snapped to the nearest drivable segment at construction
    Coordinates { lat: f64, lon: f64 },
}

/// Static station configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDefinition {
    pub id: StationId,
    pub name: String,
    pub location: StationLocation,
    pub capacity: u32,
    pub power_kw: f64,
}

/// What a call to [`ChargingNetwork::release`] actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The vehicle held a slot and it was freed
    Released,
    /// The vehicle held nothing here; nothing changed
    NotHeld,
}

/// A charging station with a fixed number of slots
#[derive(Debug, Clone)]
pub struct ChargingStation {
    pub id: StationId,
    pub name: String,
    pub segment: SegmentId,
    pub capacity: u32,
    pub power_kw: f64,
    available: u32,
    /// Reserved slots whose vehicle has not arrived yet, oldest first
    queue: VecDeque<VehicleId>,
    /// Vehicles plugged in
    charging: BTreeSet<VehicleId>,
}

impl ChargingStation {
    pub fn new(
        id: StationId,
        name: impl Into<String>,
        segment: SegmentId,
        capacity: u32,
        power_kw: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            segment,
            capacity,
            power_kw,
            available: capacity,
            queue: VecDeque::new(),
            charging: BTreeSet::new(),
        }
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn queue(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.queue.iter().copied()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn charging(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.charging.iter().copied()
    }

    pub fn charging_count(&self) -> usize {
        self.charging.len()
    }

    pub fn is_reserved_by(&self, vehicle: VehicleId) -> bool {
        self.queue.contains(&vehicle)
    }

    pub fn is_charging(&self, vehicle: VehicleId) -> bool {
        self.charging.contains(&vehicle)
    }

    /// Whether the vehicle holds a slot here in any form
    pub fn holds(&self, vehicle: VehicleId) -> bool {
        self.is_reserved_by(vehicle) || self.is_charging(vehicle)
    }

    pub fn availability_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.available as f64 / self.capacity as f64
        }
    }

    /// Power drawn by the plugged-in vehicles
    pub fn current_load_kw(&self) -> f64 {
        self.charging.len() as f64 * self.power_kw
    }

    fn check_invariant(&self) {
        debug_assert_eq!(
            self.available as usize + self.queue.len() + self.charging.len(),
            self.capacity as usize,
            "slot accounting broken at station {:?}",
            self.id
        );
    }
}

/// A scored station considered for a vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct StationCandidate {
    pub station: StationId,
    pub route: Route,
    pub score: f64,
}

/// All charging stations of a session
#[derive(Debug, Clone)]
pub struct ChargingNetwork {
    stations: BTreeMap<StationId, ChargingStation>,
    /// Power of the fastest station class; scores are normalised against it
    reference_power_kw: f64,
    safety_range_fraction: f64,
}

impl ChargingNetwork {
    /// Build the registry from stations already placed on segments
    pub fn new(stations: Vec<ChargingStation>, config: &RouterConfig) -> RoutingResult<Self> {
        let mut by_id = BTreeMap::new();
        for station in stations {
            if station.capacity == 0 {
                return Err(RoutingError::InvalidSpec(format!(
                    "station {:?} has zero capacity",
                    station.id
                )));
            }
            if !(station.power_kw > 0.0) {
                return Err(RoutingError::InvalidSpec(format!(
                    "station {:?} has non-positive power {}",
                    station.id, station.power_kw
                )));
            }
            let id = station.id;
            if by_id.insert(id, station).is_some() {
                return Err(RoutingError::DuplicateStation(id));
            }
        }

        let fastest = by_id
            .values()
            .map(|s| s.power_kw)
            .fold(0.0_f64, f64::max);
        let reference_power_kw = match config.reference_power_kw {
            Some(power) if power > 0.0 => power,
            _ if fastest > 0.0 => fastest,
            _ => 1.0,
        };

        let safety_range_fraction = if config.safety_range_fraction > 0.0 {
            config.safety_range_fraction
        } else {
            DEFAULT_SAFETY_RANGE_FRACTION
        };

        Ok(Self {
            stations: by_id,
            reference_power_kw,
            safety_range_fraction,
        })
    }

    /// Build the registry from host definitions, snapping coordinate
    /// locations onto the graph
    pub fn from_definitions(
        definitions: Vec<StationDefinition>,
        graph: &RoadGraph,
        config: &RouterConfig,
    ) -> RoutingResult<Self> {
        let mut stations = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let segment = match definition.location {
                StationLocation::Segment(segment) => {
                    if !graph.contains(segment) {
                        return Err(RoutingError::UnknownSegment(segment));
                    }
                    segment
                }
                StationLocation::Coordinates { lat, lon } => {
                    graph.nearest_segment(lat, lon, config.station_snap_radius_m)?
                }
            };

            info!(
                "Station {:?} '{}': {} slots at {:.0} kW on segment {:?}",
                definition.id, definition.name, definition.capacity, definition.power_kw, segment
            );

            stations.push(ChargingStation::new(
                definition.id,
                definition.name,
                segment,
                definition.capacity,
                definition.power_kw,
            ));
        }

        Self::new(stations, config)
    }

    pub fn station(&self, station_id: StationId) -> Option<&ChargingStation> {
        self.stations.get(&station_id)
    }

    /// Iterate stations in ascending id order
    pub fn stations(&self) -> impl Iterator<Item = &ChargingStation> {
        self.stations.values()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn reference_power_kw(&self) -> f64 {
        self.reference_power_kw
    }

    /// Every station with a free slot that is within safe range, scored.
    ///
    /// Lower scores are better: `distance / (availability × power_ratio)`.
    /// A station is out of range when reaching it would use more than the
    /// safety fraction of the remaining range.
    pub fn candidates(
        &self,
        finder: &PathFinder,
        from: SegmentId,
        battery_kwh: f64,
        consumption_kwh_per_km: f64,
    ) -> Vec<StationCandidate> {
        let range_m = if consumption_kwh_per_km > 0.0 {
            battery_kwh.max(0.0) / consumption_kwh_per_km * 1000.0
        } else {
            f64::INFINITY
        };
        let max_distance_m = range_m * self.safety_range_fraction;

        let mut candidates = Vec::new();
        for station in self.stations.values() {
            if station.available == 0 {
                continue;
            }

            let Some(route) = finder.path(from, station.segment) else {
                debug!("Station {:?} unreachable from {:?}", station.id, from);
                continue;
            };

            if route.length_m > max_distance_m {
                debug!(
                    "Station {:?} out of range: {:.0}m > {:.0}m",
                    station.id, route.length_m, max_distance_m
                );
                continue;
            }

            let power_ratio = station.power_kw / self.reference_power_kw;
            let score = route.length_m / (station.availability_ratio() * power_ratio);

            candidates.push(StationCandidate {
                station: station.id,
                route,
                score,
            });
        }

        candidates
    }

    /// Best candidate; ties go to the lower station id
    pub fn best_candidate(
        &self,
        finder: &PathFinder,
        from: SegmentId,
        battery_kwh: f64,
        consumption_kwh_per_km: f64,
    ) -> Option<StationCandidate> {
        // candidates come in ascending id order, so a strict comparison keeps
        // the lowest id among equal scores
        self.candidates(finder, from, battery_kwh, consumption_kwh_per_km)
            .into_iter()
            .fold(None, |best: Option<StationCandidate>, candidate| match best {
                Some(b) if candidate.score >= b.score => Some(b),
                _ => Some(candidate),
            })
    }

    /// Station a vehicle at `from` should head to, if any is reachable and free
    pub fn reachable_and_available(
        &self,
        finder: &PathFinder,
        from: SegmentId,
        battery_kwh: f64,
        consumption_kwh_per_km: f64,
    ) -> Option<StationId> {
        self.best_candidate(finder, from, battery_kwh, consumption_kwh_per_km)
            .map(|c| c.station)
    }

    /// Hold a slot for a vehicle. Never blocks: a full station is an error
    /// and the caller has to pick another one.
    pub fn reserve(&mut self, station_id: StationId, vehicle: VehicleId) -> RoutingResult<()> {
        let station = self
            .stations
            .get_mut(&station_id)
            .ok_or(RoutingError::UnknownStation(station_id))?;

        if station.holds(vehicle) {
            debug!("Vehicle {:?} already holds a slot at {:?}", vehicle, station_id);
            return Ok(());
        }

        if station.available == 0 {
            return Err(RoutingError::StationFull(station_id));
        }

        station.available -= 1;
        station.queue.push_back(vehicle);
        station.check_invariant();

        debug!(
            "Vehicle {:?} reserved {:?} ({}/{} free)",
            vehicle, station_id, station.available, station.capacity
        );
        Ok(())
    }

    /// Move a vehicle from the queue onto a charger.
    ///
    /// A vehicle that arrives without a reservation takes a free slot
    /// directly, or gets `StationFull`.
    pub fn begin_charging(&mut self, station_id: StationId, vehicle: VehicleId) -> RoutingResult<()> {
        let station = self
            .stations
            .get_mut(&station_id)
            .ok_or(RoutingError::UnknownStation(station_id))?;

        if station.charging.contains(&vehicle) {
            return Ok(());
        }

        if let Some(index) = station.queue.iter().position(|v| *v == vehicle) {
            station.queue.remove(index);
        } else if station.available > 0 {
            station.available -= 1;
        } else {
            return Err(RoutingError::StationFull(station_id));
        }

        station.charging.insert(vehicle);
        station.check_invariant();
        Ok(())
    }

    /// Give back whatever slot the vehicle holds at the station.
    ///
    /// Safe to call repeatedly; a call that finds nothing to release is
    /// logged and reported as [`ReleaseOutcome::NotHeld`].
    pub fn release(&mut self, station_id: StationId, vehicle: VehicleId) -> RoutingResult<ReleaseOutcome> {
        let station = self
            .stations
            .get_mut(&station_id)
            .ok_or(RoutingError::UnknownStation(station_id))?;

        let was_queued = match station.queue.iter().position(|v| *v == vehicle) {
            Some(index) => {
                station.queue.remove(index);
                true
            }
            None => false,
        };
        let was_charging = station.charging.remove(&vehicle);

        if !was_queued && !was_charging {
            warn!(
                "Release of {:?} by {:?} ignored: no slot held",
                station_id, vehicle
            );
            return Ok(ReleaseOutcome::NotHeld);
        }

        station.available = (station.available + 1).min(station.capacity);
        station.check_invariant();

        debug!(
            "Vehicle {:?} released {:?} ({}/{} free)",
            vehicle, station_id, station.available, station.capacity
        );
        Ok(ReleaseOutcome::Released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::road_network::{link_by_shared_endpoints, SegmentSpec};
    use crate::simulation::types::Position;

    /// Straight road of ten 100 m segments, ids 0..10
    fn long_road() -> RoadGraph {
        let mut specs: Vec<SegmentSpec> = (0..10)
            .map(|i| {
                SegmentSpec::straight(
                    SegmentId(i),
                    Position::new(i as f64 * 100.0, 0.0),
                    Position::new((i + 1) as f64 * 100.0, 0.0),
                    10.0,
                )
            })
            .collect();
        link_by_shared_endpoints(&mut specs);
        RoadGraph::build(specs).unwrap()
    }

    fn network(stations: Vec<ChargingStation>) -> ChargingNetwork {
        ChargingNetwork::new(stations, &RouterConfig::default()).unwrap()
    }

    #[test]
    fn test_reserve_until_full() {
        let mut network = network(vec![ChargingStation::new(StationId(0), "s", SegmentId(3), 1, 150.0)]);

        network.reserve(StationId(0), VehicleId(1)).unwrap();
        assert_eq!(
            network.reserve(StationId(0), VehicleId(2)),
            Err(RoutingError::StationFull(StationId(0)))
        );

        let station = network.station(StationId(0)).unwrap();
        assert_eq!(station.available(), 0);
        assert_eq!(station.queue().collect::<Vec<_>>(), vec![VehicleId(1)]);
    }

    #[test]
    fn test_repeated_reserve_holds_one_slot() {
        let mut network = network(vec![ChargingStation::new(StationId(0), "s", SegmentId(3), 2, 150.0)]);
        network.reserve(StationId(0), VehicleId(1)).unwrap();
        network.reserve(StationId(0), VehicleId(1)).unwrap();
        assert_eq!(network.station(StationId(0)).unwrap().available(), 1);
    }

    #[test]
    fn test_double_release_is_reported_not_fatal() {
        let mut network = network(vec![ChargingStation::new(StationId(0), "s", SegmentId(3), 2, 150.0)]);
        network.reserve(StationId(0), VehicleId(1)).unwrap();

        assert_eq!(network.release(StationId(0), VehicleId(1)), Ok(ReleaseOutcome::Released));
        assert_eq!(network.release(StationId(0), VehicleId(1)), Ok(ReleaseOutcome::NotHeld));
        assert_eq!(network.station(StationId(0)).unwrap().available(), 2);
    }

    #[test]
    fn test_begin_charging_moves_out_of_queue() {
        let mut network = network(vec![ChargingStation::new(StationId(0), "s", SegmentId(3), 2, 150.0)]);
        network.reserve(StationId(0), VehicleId(1)).unwrap();
        network.begin_charging(StationId(0), VehicleId(1)).unwrap();

        let station = network.station(StationId(0)).unwrap();
        assert_eq!(station.queue_len(), 0);
        assert_eq!(station.charging_count(), 1);
        assert_eq!(station.available(), 1);
        assert_eq!(station.current_load_kw(), 150.0);
    }

    #[test]
    fn test_walk_in_needs_free_slot() {
        let mut network = network(vec![ChargingStation::new(StationId(0), "s", SegmentId(3), 1, 150.0)]);
        network.reserve(StationId(0), VehicleId(1)).unwrap();
        assert_eq!(
            network.begin_charging(StationId(0), VehicleId(2)),
            Err(RoutingError::StationFull(StationId(0)))
        );
    }

    #[test]
    fn test_unknown_station_errors() {
        let mut network = network(vec![]);
        assert_eq!(
            network.reserve(StationId(9), VehicleId(1)),
            Err(RoutingError::UnknownStation(StationId(9)))
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ChargingNetwork::new(
            vec![ChargingStation::new(StationId(0), "s", SegmentId(3), 0, 150.0)],
            &RouterConfig::default(),
        );
        assert!(matches!(result, Err(RoutingError::InvalidSpec(_))));
    }

    #[test]
    fn test_selection_prefers_fast_free_station() {
        let graph = long_road();
        let finder = PathFinder::new(&graph);
        // Same distance class: slow station at 2, fast at 4
        let network = network(vec![
            ChargingStation::new(StationId(0), "slow", SegmentId(2), 4, 50.0),
            ChargingStation::new(StationId(1), "fast", SegmentId(4), 4, 250.0),
        ]);

        // 200 m vs 400 m; scores 200/(1*0.2)=1000 vs 400/(1*1)=400
        assert_eq!(
            network.reachable_and_available(&finder, SegmentId(0), 10.0, 0.2),
            Some(StationId(1))
        );
    }

    #[test]
    fn test_out_of_safe_range_never_selected() {
        let graph = long_road();
        let finder = PathFinder::new(&graph);
        let network = network(vec![ChargingStation::new(StationId(0), "far", SegmentId(9), 4, 250.0)]);

        // 900 m needed; 0.1 kWh at 0.1 kWh/km is 1000 m of range, 900 m usable
        assert_eq!(
            network.reachable_and_available(&finder, SegmentId(0), 0.1, 0.1),
            Some(StationId(0))
        );
        // 0.099 kWh leaves 891 m usable
        assert_eq!(network.reachable_and_available(&finder, SegmentId(0), 0.099, 0.1), None);
    }

    #[test]
    fn test_full_station_skipped() {
        let graph = long_road();
        let finder = PathFinder::new(&graph);
        let mut network = network(vec![
            ChargingStation::new(StationId(0), "near", SegmentId(1), 1, 250.0),
            ChargingStation::new(StationId(1), "far", SegmentId(5), 1, 250.0),
        ]);

        assert_eq!(
            network.reachable_and_available(&finder, SegmentId(0), 50.0, 0.2),
            Some(StationId(0))
        );
        network.reserve(StationId(0), VehicleId(1)).unwrap();
        assert_eq!(
            network.reachable_and_available(&finder, SegmentId(0), 50.0, 0.2),
            Some(StationId(1))
        );
    }

    #[test]
    fn test_equal_scores_break_on_station_id() {
        let graph = long_road();
        let finder = PathFinder::new(&graph);
        let network = network(vec![
            ChargingStation::new(StationId(4), "b", SegmentId(3), 2, 150.0),
            ChargingStation::new(StationId(2), "a", SegmentId(3), 2, 150.0),
        ]);
        assert_eq!(
            network.reachable_and_available(&finder, SegmentId(0), 50.0, 0.2),
            Some(StationId(2))
        );
    }
}

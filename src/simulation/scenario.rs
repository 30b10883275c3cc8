//! Synthetic midtown grid used by the headless demo and the tests
//!
//! The grid is a square of two-way streets: every block edge becomes two
//! directed segments. Stations are defined by coordinates and snapped onto
//! the grid the same way real station lists are.

use log::{info, warn};
use rand::seq::IndexedRandom;
use rand::Rng;

use super::charging::{StationDefinition, StationLocation};
use super::config::{FleetMix, RouterConfig};
use super::error::{RoutingError, RoutingResult};
use super::road_network::{link_by_shared_endpoints, SegmentSpec};
use super::router::RouterService;
use super::types::{GeoProjection, Position, SegmentId, StationId, VehicleId};
use super::vehicle_spec::VehicleModel;

/// Coordinate the grid's south-west corner is pinned to
pub const MIDTOWN_ORIGIN: (f64, f64) = (40.7484, -73.9967);

/// Default block length, roughly one avenue block
pub const DEFAULT_BLOCK_M: f64 = 250.0;

/// Default street speed, about 30 km/h
pub const DEFAULT_STREET_SPEED_MPS: f64 = 8.33;

pub fn midtown_projection() -> GeoProjection {
    GeoProjection::new(MIDTOWN_ORIGIN.0, MIDTOWN_ORIGIN.1)
}

/// Two-way street grid with `side × side` junctions, `block_m` apart
pub fn grid_city(side: usize, block_m: f64, speed_mps: f64) -> RoutingResult<Vec<SegmentSpec>> {
    if side < 2 {
        return Err(RoutingError::InvalidSpec(format!(
            "grid needs at least 2 junctions per side, got {}",
            side
        )));
    }
    if !(block_m > 0.0) {
        return Err(RoutingError::InvalidSpec(format!("block length {} must be positive", block_m)));
    }

    let junction = |row: usize, col: usize| Position::new(col as f64 * block_m, row as f64 * block_m);
    let mut segments = Vec::with_capacity(4 * side * (side - 1));

    for row in 0..side {
        for col in 0..side {
            let here = junction(row, col);
            if col + 1 < side {
                let east = junction(row, col + 1);
                for (from, to) in [(here, east), (east, here)] {
                    let id = SegmentId(segments.len());
                    segments.push(SegmentSpec::straight(id, from, to, speed_mps));
                }
            }
            if row + 1 < side {
                let north = junction(row + 1, col);
                for (from, to) in [(here, north), (north, here)] {
                    let id = SegmentId(segments.len());
                    segments.push(SegmentSpec::straight(id, from, to, speed_mps));
                }
            }
        }
    }

    link_by_shared_endpoints(&mut segments);
    Ok(segments)
}

/// Named stations spread over a grid of the given extent
pub fn midtown_stations(side: usize, block_m: f64, projection: &GeoProjection) -> Vec<StationDefinition> {
    let extent = side.saturating_sub(1) as f64 * block_m;

    // (name, east fraction, north fraction, slots, kW)
    let layout = [
        ("Times Square Supercharger", 0.5, 0.5, 8, 250.0),
        ("Penn Station Hub", 0.2, 0.3, 6, 150.0),
        ("Grand Central Charging", 0.8, 0.4, 6, 150.0),
        ("Columbus Circle EV", 0.3, 0.9, 4, 50.0),
        ("Murray Hill Garage", 0.7, 0.1, 4, 50.0),
    ];

    layout
        .iter()
        .enumerate()
        .map(|(index, (name, east, north, capacity, power_kw))| {
            // Half a block east of the nominal spot keeps stations off junctions
            let position = Position::new(east * extent + block_m * 0.5, north * extent);
            let (lat, lon) = projection.to_geo(&position);
            StationDefinition {
                id: StationId(index),
                name: name.to_string(),
                location: StationLocation::Coordinates { lat, lon },
                capacity: *capacity,
                power_kw: *power_kw,
            }
        })
        .collect()
}

/// Grid plus stations, ready to take vehicles
pub fn build_midtown_router(side: usize, config: RouterConfig) -> RoutingResult<RouterService> {
    let projection = midtown_projection();
    let segments = grid_city(side, DEFAULT_BLOCK_M, DEFAULT_STREET_SPEED_MPS)?;
    let stations = midtown_stations(side, DEFAULT_BLOCK_M, &projection);
    RouterService::from_segments(segments, projection, stations, config)
}

/// Spawn `count` vehicles with random models, trips and charge levels.
///
/// Ids start at `first_id`. Trips that cannot be planned are skipped.
pub fn spawn_random_vehicles<R: Rng + ?Sized>(
    router: &mut RouterService,
    count: usize,
    first_id: usize,
    mix: &FleetMix,
    rng: &mut R,
) -> Vec<VehicleId> {
    let segment_ids: Vec<SegmentId> = router.graph().segments().map(|s| s.id).collect();
    let electric: Vec<VehicleModel> = VehicleModel::electric_models().collect();
    let combustion: Vec<VehicleModel> = VehicleModel::combustion_models().collect();

    let mut spawned = Vec::with_capacity(count);

    for offset in 0..count {
        let vehicle_id = VehicleId(first_id + offset);

        let is_electric = mix.roll_electric(rng);
        let pool = if is_electric { &electric } else { &combustion };
        let (Some(model), Some(start), Some(destination)) = (
            pool.choose(rng).copied(),
            segment_ids.choose(rng).copied(),
            segment_ids.choose(rng).copied(),
        ) else {
            continue;
        };

        let battery_percent = if is_electric {
            mix.roll_battery_percent(rng)
        } else {
            100.0
        };

        match router.create_vehicle_with_battery(vehicle_id, model.spec(), start, destination, battery_percent) {
            Ok(vehicle) => {
                info!(
                    "Spawned {:?} ({}) {:?} -> {:?}, {} segments, battery {}",
                    vehicle_id,
                    model.label(),
                    start,
                    destination,
                    vehicle.route.len(),
                    vehicle
                        .battery_percent()
                        .map(|p| format!("{:.0}%", p))
                        .unwrap_or_else(|| "n/a".to_string())
                );
                spawned.push(vehicle_id);
            }
            Err(err) => warn!("Could not spawn {:?}: {}", vehicle_id, err),
        }
    }

    spawned
}

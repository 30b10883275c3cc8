use std::collections::HashSet;

use fleet_router::simulation::scenario::{self, build_midtown_router, spawn_random_vehicles};
use fleet_router::simulation::{
    link_by_shared_endpoints, BatterySpec, ChargingNetwork, ChargingStation, FleetMix, PathFinder,
    Position, RoadGraph, RouterConfig, RouterService, RoutingError, SegmentId, SegmentSpec,
    StationDefinition, StationId, StationLocation, VehicleEvent, VehicleId, VehicleSpec,
    VehicleState,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `count` segments of `length` metres laid end to end along the x axis
fn line_specs(count: usize, length: f64, speed: f64) -> Vec<SegmentSpec> {
    let mut specs: Vec<SegmentSpec> = (0..count)
        .map(|i| {
            SegmentSpec::straight(
                SegmentId(i),
                Position::new(i as f64 * length, 0.0),
                Position::new((i + 1) as f64 * length, 0.0),
                speed,
            )
        })
        .collect();
    link_by_shared_endpoints(&mut specs);
    specs
}

fn line(count: usize) -> RoadGraph {
    RoadGraph::build(line_specs(count, 100.0, 10.0)).unwrap()
}

fn station(id: usize, segment: usize, capacity: u32, power_kw: f64) -> StationDefinition {
    StationDefinition {
        id: StationId(id),
        name: format!("station-{}", id),
        location: StationLocation::Segment(SegmentId(segment)),
        capacity,
        power_kw,
    }
}

/// 10 kWh, 1 kWh/km, charge below 20 %, stop at 80 %
fn small_ev() -> VehicleSpec {
    VehicleSpec::electric(
        "small_ev",
        BatterySpec {
            capacity_kwh: 10.0,
            consumption_kwh_per_km: 1.0,
            charging_power_kw: 50.0,
            min_battery_percent: 20.0,
            target_charge_percent: 80.0,
        },
        15.0,
    )
}

fn router(graph: RoadGraph, stations: Vec<StationDefinition>) -> RouterService {
    RouterService::new(graph, stations, RouterConfig::default()).unwrap()
}

#[test]
fn test_line_scenario_route_and_cost() {
    let mut router = router(line(3), vec![]);
    let spec = VehicleSpec::electric(
        "line_ev",
        BatterySpec {
            capacity_kwh: 1.0,
            consumption_kwh_per_km: 0.01,
            charging_power_kw: 11.0,
            min_battery_percent: 15.0,
            target_charge_percent: 80.0,
        },
        15.0,
    );

    let vehicle = router
        .create_vehicle(VehicleId(1), spec, SegmentId(0), SegmentId(2))
        .unwrap();

    assert_eq!(vehicle.route, vec![SegmentId(0), SegmentId(1), SegmentId(2)]);
    assert!((vehicle.leg_cost_secs - 20.0).abs() < 1e-9);
    assert_eq!(vehicle.state, VehicleState::Traveling);
    assert_eq!(vehicle.battery_percent(), Some(100.0));

    let route = router.plan_route(SegmentId(0), SegmentId(2)).unwrap();
    assert!((route.cost_secs - 20.0).abs() < 1e-9);
}

#[test]
fn test_path_to_self_is_trivial_everywhere() {
    let graph = RoadGraph::build(scenario::grid_city(4, 100.0, 10.0).unwrap()).unwrap();
    let finder = PathFinder::new(&graph);

    for segment in graph.segments() {
        let route = finder.path(segment.id, segment.id).unwrap();
        assert_eq!(route.segments, vec![segment.id]);
        assert_eq!(route.cost_secs, 0.0);
    }
}

#[test]
fn test_unreachable_destination_not_registered() {
    let mut router = router(line(5), vec![]);

    let err = router
        .create_vehicle(VehicleId(1), small_ev(), SegmentId(4), SegmentId(0))
        .unwrap_err();

    assert_eq!(
        err,
        RoutingError::UnreachableDestination {
            start: SegmentId(4),
            destination: SegmentId(0)
        }
    );
    assert_eq!(router.vehicle_count(), 0);
    assert_eq!(router.stats().vehicles_created, 0);
}

#[test]
fn test_repeated_position_report_is_idempotent() {
    let mut router = router(line(5), vec![]);
    router
        .create_vehicle(VehicleId(1), small_ev(), SegmentId(0), SegmentId(4))
        .unwrap();

    router.report_position(VehicleId(1), SegmentId(1), 50.0).unwrap();
    let after_first = router.vehicle(VehicleId(1)).unwrap().battery_kwh;
    router.report_position(VehicleId(1), SegmentId(1), 50.0).unwrap();
    let after_second = router.vehicle(VehicleId(1)).unwrap().battery_kwh;

    assert_eq!(after_first, after_second);
    // 150 m at 1 kWh/km
    assert!((10.0 - after_first - 0.15).abs() < 1e-9);
    assert!((router.vehicle(VehicleId(1)).unwrap().distance_traveled_m - 150.0).abs() < 1e-9);
}

#[test]
fn test_unknown_vehicle_and_segment_reports_fail() {
    let mut router = router(line(3), vec![]);
    router
        .create_vehicle(VehicleId(1), small_ev(), SegmentId(0), SegmentId(2))
        .unwrap();

    assert_eq!(
        router.report_position(VehicleId(9), SegmentId(1), 0.0),
        Err(RoutingError::UnknownVehicle(VehicleId(9)))
    );
    assert_eq!(
        router.report_position(VehicleId(1), SegmentId(99), 0.0),
        Err(RoutingError::UnknownSegment(SegmentId(99)))
    );
}

#[test]
fn test_low_battery_vehicle_reaches_charger_and_resumes() {
    let mut router = router(line(10), vec![station(0, 5, 2, 50.0)]);
    let vehicle = router
        .create_vehicle_with_battery(VehicleId(1), small_ev(), SegmentId(0), SegmentId(9), 10.0)
        .unwrap();

    assert_eq!(vehicle.state, VehicleState::SeekingCharger);
    assert_eq!(vehicle.assigned_station, Some(StationId(0)));
    assert_eq!(vehicle.route.last(), Some(&SegmentId(5)));

    // Drive one segment per tick until plugged in
    let mut ticks = 0;
    while router.vehicle(VehicleId(1)).unwrap().state != VehicleState::Charging {
        ticks += 1;
        assert!(ticks <= 10, "vehicle never started charging");
        router
            .report_position(VehicleId(1), SegmentId(ticks.min(5)), 0.0)
            .unwrap();
        router.tick(1.0);
    }

    let station = &router.station_snapshots()[0];
    assert_eq!(station.charging, vec![VehicleId(1)]);
    assert_eq!(station.queue_length, 0);
    assert_eq!(station.current_load_kw, 50.0);

    // Reports while plugged in do not move the vehicle
    let before = router.vehicle(VehicleId(1)).unwrap().battery_kwh;
    router.report_position(VehicleId(1), SegmentId(7), 10.0).unwrap();
    assert_eq!(router.vehicle(VehicleId(1)).unwrap().battery_kwh, before);
    assert_eq!(router.vehicle(VehicleId(1)).unwrap().current_segment, SegmentId(5));

    // 36 s at 50 kW is exactly 0.5 kWh
    router.tick(36.0);
    let after = router.vehicle(VehicleId(1)).unwrap().battery_kwh;
    assert!((after - before - 0.5).abs() < 1e-9);

    let mut finished = false;
    for _ in 0..100 {
        let updates = router.tick(60.0);
        if updates.iter().any(|u| {
            u.events
                .iter()
                .any(|e| matches!(e, VehicleEvent::ChargingFinished { .. }))
        }) {
            finished = true;
            break;
        }
    }
    assert!(finished);

    let vehicle = router.vehicle(VehicleId(1)).unwrap();
    assert_eq!(vehicle.state, VehicleState::Traveling);
    assert_eq!(vehicle.assigned_station, None);
    assert!(vehicle.battery_percent().unwrap() >= 80.0);
    assert_eq!(vehicle.route.first(), Some(&SegmentId(5)));
    assert_eq!(vehicle.route.last(), Some(&SegmentId(9)));
    assert_eq!(router.network().station(StationId(0)).unwrap().available(), 2);
    assert_eq!(router.stats().charging_sessions_completed, 1);
}

#[test]
fn test_station_on_start_segment_charges_immediately() {
    let mut router = router(line(4), vec![station(0, 0, 1, 50.0)]);
    let vehicle = router
        .create_vehicle_with_battery(VehicleId(1), small_ev(), SegmentId(0), SegmentId(3), 5.0)
        .unwrap();

    assert_eq!(vehicle.state, VehicleState::Charging);
    assert_eq!(vehicle.assigned_station, Some(StationId(0)));
}

#[test]
fn test_second_reserve_on_full_station_fails() {
    let graph = line(4);
    let mut network = ChargingNetwork::new(
        vec![ChargingStation::new(StationId(0), "solo", SegmentId(2), 1, 50.0)],
        &RouterConfig::default(),
    )
    .unwrap();

    network.reserve(StationId(0), VehicleId(1)).unwrap();
    assert_eq!(
        network.reserve(StationId(0), VehicleId(2)),
        Err(RoutingError::StationFull(StationId(0)))
    );

    // The full station is no longer offered to anyone
    let finder = PathFinder::new(&graph);
    assert_eq!(
        network.reachable_and_available(&finder, SegmentId(0), 5.0, 0.2),
        None
    );
}

#[test]
fn test_second_vehicle_waits_until_slot_released() {
    let mut router = router(line(10), vec![station(0, 2, 1, 50.0)]);

    router
        .create_vehicle_with_battery(VehicleId(1), small_ev(), SegmentId(0), SegmentId(9), 10.0)
        .unwrap();
    let second = router
        .create_vehicle_with_battery(VehicleId(2), small_ev(), SegmentId(0), SegmentId(9), 10.0)
        .unwrap();

    assert_eq!(second.state, VehicleState::SeekingCharger);
    assert_eq!(second.assigned_station, None);

    router.report_position(VehicleId(1), SegmentId(2), 0.0).unwrap();
    assert_eq!(router.vehicle(VehicleId(1)).unwrap().state, VehicleState::Charging);

    for _ in 0..3 {
        router.tick(1.0);
        let second = router.vehicle(VehicleId(2)).unwrap();
        assert_eq!(second.state, VehicleState::SeekingCharger);
        assert_eq!(second.assigned_station, None);
        assert!(second.ticks_since_assignment > 0);
    }

    // One long tick finishes the first session; the freed slot goes to the
    // second vehicle in the same sweep
    router.tick(3600.0);
    assert_eq!(router.vehicle(VehicleId(1)).unwrap().state, VehicleState::Traveling);
    let second = router.vehicle(VehicleId(2)).unwrap();
    assert_eq!(second.assigned_station, Some(StationId(0)));
    assert_eq!(second.ticks_since_assignment, 0);
}

#[test]
fn test_out_of_range_station_never_assigned() {
    let config = RouterConfig {
        stranded_after_ticks: 5,
        ..RouterConfig::default()
    };
    let mut router = RouterService::new(line(10), vec![station(0, 9, 4, 250.0)], config).unwrap();

    // 0.5 kWh at 1 kWh/km: 450 m usable, the station is 900 m away
    router
        .create_vehicle_with_battery(VehicleId(1), small_ev(), SegmentId(0), SegmentId(9), 5.0)
        .unwrap();

    for _ in 0..10 {
        router.tick(1.0);
        let vehicle = router.vehicle(VehicleId(1)).unwrap();
        assert_eq!(vehicle.assigned_station, None);
        assert_eq!(vehicle.state, VehicleState::SeekingCharger);
    }

    // Still heading for the destination, and reported as stranded
    let snapshot = router.vehicle_snapshot(VehicleId(1)).unwrap();
    assert_eq!(snapshot.route.last(), Some(&SegmentId(9)));
    assert_eq!(snapshot.ticks_since_assignment, 10);
    assert_eq!(router.stranded_vehicles(), vec![VehicleId(1)]);
    assert_eq!(router.stats().strand_events, 1);
}

#[test]
fn test_arrival_and_completion() {
    let mut router = router(line(4), vec![]);
    router
        .create_vehicle(VehicleId(1), VehicleSpec::combustion("car", 20.0), SegmentId(0), SegmentId(3))
        .unwrap();

    assert!(matches!(
        router.complete_vehicle(VehicleId(1)),
        Err(RoutingError::InvalidState { .. })
    ));

    let update = router.report_position(VehicleId(1), SegmentId(3), 0.0).unwrap();
    assert_eq!(update.events, vec![VehicleEvent::Arrived]);
    assert_eq!(router.vehicle(VehicleId(1)).unwrap().state, VehicleState::Arrived);

    let vehicle = router.complete_vehicle(VehicleId(1)).unwrap();
    assert!((vehicle.distance_traveled_m - 300.0).abs() < 1e-9);
    assert_eq!(router.vehicle_count(), 0);
    assert_eq!(router.stats().vehicles_arrived, 1);
}

#[test]
fn test_start_on_destination_arrives_immediately() {
    let mut router = router(line(3), vec![]);
    let vehicle = router
        .create_vehicle(VehicleId(1), small_ev(), SegmentId(1), SegmentId(1))
        .unwrap();
    assert_eq!(vehicle.state, VehicleState::Arrived);
    assert_eq!(vehicle.route, vec![SegmentId(1)]);
}

#[test]
fn test_reroute_avoids_closed_segment() {
    let graph = RoadGraph::build(scenario::grid_city(4, 100.0, 10.0).unwrap()).unwrap();
    let mut router = router(graph, vec![]);
    let route = router
        .create_vehicle(VehicleId(1), VehicleSpec::combustion("car", 20.0), SegmentId(0), SegmentId(40))
        .unwrap()
        .route
        .clone();
    assert!(route.len() > 2);

    let closed = route[1];
    let avoid: HashSet<SegmentId> = [closed].into_iter().collect();
    let rerouted = router.reroute(VehicleId(1), &avoid).unwrap();

    assert!(!rerouted.segments.contains(&closed));
    assert_eq!(rerouted.first(), Some(SegmentId(0)));
    assert_eq!(rerouted.last(), Some(SegmentId(40)));
    assert_eq!(router.vehicle(VehicleId(1)).unwrap().route, rerouted.segments);
}

#[test]
fn test_reroute_with_everything_closed_is_unreachable() {
    let mut router = router(line(4), vec![]);
    router
        .create_vehicle(VehicleId(1), small_ev(), SegmentId(0), SegmentId(3))
        .unwrap();

    let avoid: HashSet<SegmentId> = [SegmentId(2)].into_iter().collect();
    assert_eq!(
        router.reroute(VehicleId(1), &avoid),
        Err(RoutingError::Unreachable {
            from: SegmentId(0),
            to: SegmentId(3)
        })
    );
    // The old route is kept
    assert_eq!(router.vehicle(VehicleId(1)).unwrap().route.len(), 4);
}

#[test]
fn test_remove_and_shutdown_release_slots() {
    let mut router = router(line(10), vec![station(0, 5, 3, 50.0)]);
    for id in 1..=3 {
        router
            .create_vehicle_with_battery(VehicleId(id), small_ev(), SegmentId(0), SegmentId(9), 10.0)
            .unwrap();
    }
    assert_eq!(router.network().station(StationId(0)).unwrap().available(), 0);

    router.remove_vehicle(VehicleId(2)).unwrap();
    assert_eq!(router.network().station(StationId(0)).unwrap().available(), 1);

    let stats = router.shutdown();
    assert_eq!(stats.vehicles_created, 3);
    assert_eq!(stats.vehicles_removed, 3);
}

#[test]
fn test_station_outside_snap_radius_aborts_setup() {
    let graph = line(3);
    let far_away = StationDefinition {
        id: StationId(0),
        name: "nowhere".to_string(),
        location: StationLocation::Coordinates { lat: 10.0, lon: 10.0 },
        capacity: 2,
        power_kw: 50.0,
    };

    let result = RouterService::new(graph, vec![far_away], RouterConfig::default());
    assert!(matches!(result, Err(RoutingError::NoSegmentInRadius { .. })));
}

#[test]
fn test_malformed_graph_is_fatal() {
    let mut specs = line_specs(3, 100.0, 10.0);
    specs[0].successors.push(SegmentId(42));

    let result = RouterService::from_segments(
        specs,
        scenario::midtown_projection(),
        vec![],
        RouterConfig::default(),
    );
    match result {
        Err(err) => {
            assert!(err.is_fatal());
            assert!(matches!(err, RoutingError::MalformedGraph { .. }));
        }
        Ok(_) => panic!("malformed graph accepted"),
    }
}

#[test]
fn test_snapshot_serializes_state_by_name() {
    let mut router = router(line(10), vec![station(0, 5, 1, 50.0)]);
    router
        .create_vehicle_with_battery(VehicleId(1), small_ev(), SegmentId(0), SegmentId(9), 10.0)
        .unwrap();

    let value = serde_json::to_value(router.vehicle_snapshot(VehicleId(1)).unwrap()).unwrap();
    assert_eq!(value["state"], "SeekingCharger");
    assert_eq!(value["vehicle_type"], "small_ev");

    let stations = serde_json::to_value(router.station_snapshots()).unwrap();
    assert_eq!(stations[0]["available"], 0);
    assert_eq!(stations[0]["queue_length"], 1);
}

/// Move every driving vehicle `speed × dt` along its route
fn step(router: &mut RouterService, dt: f64) {
    let view: &RouterService = router;
    let moves: Vec<(VehicleId, SegmentId, f64)> = view
        .vehicles()
        .filter(|v| matches!(v.state, VehicleState::Traveling | VehicleState::SeekingCharger))
        .map(|v| {
            let graph = view.graph();
            let mut segment = v.current_segment;
            let mut offset = v.offset_m;
            let mut remaining = graph.segment(segment).unwrap().speed_mps * dt;
            for next in v.route.iter().skip(1) {
                let length = graph.segment(segment).unwrap().length_m;
                if offset + remaining < length {
                    break;
                }
                remaining -= length - offset;
                segment = *next;
                offset = 0.0;
            }
            let length = graph.segment(segment).unwrap().length_m;
            (v.id, segment, (offset + remaining).min(length))
        })
        .collect();

    for (id, segment, offset) in moves {
        router.report_position(id, segment, offset).unwrap();
    }
}

#[test]
fn test_fleet_invariants_hold_over_a_busy_run() {
    let mut router = build_midtown_router(6, RouterConfig::default()).unwrap();
    let mix = FleetMix {
        low_battery_share: 0.8,
        ..FleetMix::default()
    };
    let mut rng = StdRng::seed_from_u64(7);
    let spawned = spawn_random_vehicles(&mut router, 80, 0, &mix, &mut rng);
    assert!(!spawned.is_empty());

    for _ in 0..400 {
        step(&mut router, 2.0);
        router.tick(2.0);

        for vehicle in router.vehicles() {
            if let Some(battery) = vehicle.spec.battery() {
                assert!(vehicle.battery_kwh >= 0.0);
                assert!(vehicle.battery_kwh <= battery.capacity_kwh + 1e-9);
            }
            if vehicle.state == VehicleState::Charging {
                let station = vehicle.assigned_station.expect("charging without station");
                assert!(router
                    .network()
                    .station(station)
                    .unwrap()
                    .is_charging(vehicle.id));
            }
        }

        for station in router.network().stations() {
            assert!(station.available() <= station.capacity);
            let charging_here = router
                .vehicles()
                .filter(|v| v.state == VehicleState::Charging && v.assigned_station == Some(station.id))
                .count();
            assert!(charging_here <= station.capacity as usize);
            assert_eq!(
                station.available() as usize,
                station.capacity as usize - station.charging_count() - station.queue_len()
            );
        }
    }

    assert!(router.stats().charger_assignments > 0);
}

#[test]
fn test_identical_runs_are_identical() {
    let run = || {
        let mut router = build_midtown_router(5, RouterConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        spawn_random_vehicles(&mut router, 30, 0, &FleetMix::default(), &mut rng);
        for _ in 0..200 {
            step(&mut router, 2.0);
            router.tick(2.0);
        }
        serde_json::to_string(&router.vehicle_snapshots()).unwrap()
    };

    assert_eq!(run(), run());
}

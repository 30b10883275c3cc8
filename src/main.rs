use anyhow::{Context, Result};
use clap::Parser;
use fleet_router::simulation::{
    scenario, FleetMix, RouterConfig, RouterService, SegmentId, Vehicle, VehicleId, VehicleState,
};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser)]
#[command(name = "fleet_router")]
#[command(about = "Headless fleet routing and EV charging simulation")]
struct Cli {
    /// Number of vehicles to spawn at the start
    #[arg(long, default_value = "40")]
    vehicles: usize,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "600")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "1.0")]
    delta: f64,

    /// Seed for trips, models and initial charge
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Junctions per side of the street grid
    #[arg(long, default_value = "8")]
    grid: usize,

    /// Print final vehicle and station snapshots as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn,fleet_router=info"))
        .init();

    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the simulation without any host: vehicles are moved along their
/// routes here and reported back to the router every tick
fn run_headless(cli: &Cli) -> Result<()> {
    info!("Running fleet simulation in headless mode...");
    info!(
        "Vehicles: {}, Ticks: {}, Delta: {}s, Grid: {}x{}, Seed: {}",
        cli.vehicles, cli.ticks, cli.delta, cli.grid, cli.grid, cli.seed
    );

    let mut router = scenario::build_midtown_router(cli.grid, RouterConfig::default())
        .context("Failed to build the midtown grid")?;
    let mut rng = StdRng::seed_from_u64(cli.seed);

    info!("=== SPAWNING VEHICLES ===");
    let spawned = scenario::spawn_random_vehicles(&mut router, cli.vehicles, 0, &FleetMix::default(), &mut rng);
    info!("Spawned {}/{} vehicles", spawned.len(), cli.vehicles);

    // One summary per simulated minute
    let ticks_per_report = ((60.0 / cli.delta).ceil() as u32).max(1);
    let mut completed = 0usize;

    for tick in 1..=cli.ticks {
        step_vehicles(&mut router, cli.delta);
        router.tick(cli.delta);
        completed += complete_arrivals(&mut router)?;

        if tick % ticks_per_report == 0 {
            info!("--- After tick {} ({:.0}s simulated time) ---", tick, router.time());
            router.log_summary();
        }
    }

    let stats = router.stats().clone();
    info!("=== SIMULATION COMPLETE ===");
    info!("Simulated time: {:.1}s over {} ticks", router.time(), router.tick_count());
    info!("Total vehicles spawned: {}", stats.vehicles_created);
    info!("Total vehicles arrived: {}", stats.vehicles_arrived);
    info!("Active vehicles: {}", router.vehicle_count());
    info!(
        "Charging sessions: {} started, {} completed",
        stats.charging_sessions_started, stats.charging_sessions_completed
    );
    info!("Energy delivered: {:.2} kWh", stats.energy_delivered_kwh);
    info!("Energy consumed: {:.2} kWh", stats.energy_consumed_kwh);
    info!("Strand events: {}", stats.strand_events);
    info!("Completion rate: {:.1}%", stats.completion_rate());

    if cli.json {
        let report = serde_json::json!({
            "stats": &stats,
            "vehicles": router.vehicle_snapshots(),
            "stations": router.station_snapshots(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize snapshots")?
        );
    }

    let final_stats = router.shutdown();
    info!(
        "Evicted {} arrived vehicles, {} removed in total",
        completed, final_stats.vehicles_removed
    );
    Ok(())
}

/// Move every driving vehicle along its route and report the new position
fn step_vehicles(router: &mut RouterService, delta: f64) {
    let view: &RouterService = router;
    let moves: Vec<(VehicleId, SegmentId, f64)> = view
        .vehicles()
        .filter(|v| matches!(v.state, VehicleState::Traveling | VehicleState::SeekingCharger))
        .filter_map(|v| next_position(view, v, delta).map(|(segment, offset)| (v.id, segment, offset)))
        .collect();

    for (vehicle_id, segment, offset) in moves {
        if let Err(err) = router.report_position(vehicle_id, segment, offset) {
            warn!("Position report for {:?} rejected: {}", vehicle_id, err);
        }
    }
}

/// Where a vehicle ends up after driving `delta` seconds along its route
fn next_position(router: &RouterService, vehicle: &Vehicle, delta: f64) -> Option<(SegmentId, f64)> {
    let graph = router.graph();
    let current = graph.segment(vehicle.current_segment)?;
    let speed = current
        .speed_mps
        .max(router.config().min_speed_mps)
        .min(vehicle.spec.max_speed_mps);

    let mut segment = vehicle.current_segment;
    let mut offset = vehicle.offset_m;
    let mut remaining = speed * delta;

    for next in vehicle.route.iter().skip(1) {
        let length = graph.segment(segment)?.length_m;
        if offset + remaining < length {
            break;
        }
        remaining -= length - offset;
        segment = *next;
        offset = 0.0;
    }

    let length = graph.segment(segment)?.length_m;
    Some((segment, (offset + remaining).min(length)))
}

/// Evict vehicles that reached their destination, as a host would
fn complete_arrivals(router: &mut RouterService) -> Result<usize> {
    let arrived: Vec<VehicleId> = router
        .vehicles()
        .filter(|v| v.state == VehicleState::Arrived)
        .map(|v| v.id)
        .collect();

    for vehicle_id in &arrived {
        router
            .complete_vehicle(*vehicle_id)
            .with_context(|| format!("Failed to complete {:?}", vehicle_id))?;
    }

    Ok(arrived.len())
}

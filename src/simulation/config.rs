//! In-memory configuration supplied by the host
//!
//! Nothing here is read from disk; hosts build these structs directly (or
//! deserialize them from whatever format they like).

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Assumed free-flow speed used by the A* heuristic
pub const DEFAULT_FREE_FLOW_SPEED_MPS: f64 = 10.0;

/// Floor applied to segment speeds when computing travel time
pub const DEFAULT_MIN_SPEED_MPS: f64 = 1.0;

/// Share of the remaining range a vehicle may spend reaching a charger
pub const DEFAULT_SAFETY_RANGE_FRACTION: f64 = 0.9;

/// Radius used to snap coordinate-defined stations onto the road graph
pub const DEFAULT_STATION_SNAP_RADIUS_M: f64 = 200.0;

/// Side length of one bucket of the segment spatial index
pub const DEFAULT_SPATIAL_CELL_SIZE_M: f64 = 250.0;

/// Ticks without a charger assignment before a vehicle is reported stranded
pub const DEFAULT_STRANDED_AFTER_TICKS: u32 = 60;

/// Tunables for the router facade and its components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Divisor turning straight-line distance into a travel time estimate
    pub free_flow_speed_mps: f64,
    /// Lower bound on segment speed for travel time (avoids division by zero)
    pub min_speed_mps: f64,
    /// Fraction of remaining range a charger may be away (0.9 = 10% reserve)
    pub safety_range_fraction: f64,
    /// Power the station score is normalised against; `None` uses the fastest station
    pub reference_power_kw: Option<f64>,
    /// Snap radius for stations defined by coordinates
    pub station_snap_radius_m: f64,
    /// Spatial index bucket size
    pub spatial_cell_size_m: f64,
    /// Watchdog threshold for vehicles seeking a charger without assignment
    pub stranded_after_ticks: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            free_flow_speed_mps: DEFAULT_FREE_FLOW_SPEED_MPS,
            min_speed_mps: DEFAULT_MIN_SPEED_MPS,
            safety_range_fraction: DEFAULT_SAFETY_RANGE_FRACTION,
            reference_power_kw: None,
            station_snap_radius_m: DEFAULT_STATION_SNAP_RADIUS_M,
            spatial_cell_size_m: DEFAULT_SPATIAL_CELL_SIZE_M,
            stranded_after_ticks: DEFAULT_STRANDED_AFTER_TICKS,
        }
    }
}

/// Fleet composition used when the host spawns randomised vehicles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetMix {
    /// Percentage of spawned vehicles that are electric
    pub ev_percentage: f64,
    /// Draw a random initial charge instead of `default_battery_percent`
    pub random_initial_battery: bool,
    pub min_initial_battery_percent: f64,
    pub max_initial_battery_percent: f64,
    /// Share of EVs that start very low so they need a charger early
    pub low_battery_share: f64,
    pub low_battery_range_percent: (f64, f64),
    pub default_battery_percent: f64,
}

impl Default for FleetMix {
    fn default() -> Self {
        Self {
            ev_percentage: 70.0,
            random_initial_battery: true,
            min_initial_battery_percent: 20.0,
            max_initial_battery_percent: 95.0,
            low_battery_share: 0.2,
            low_battery_range_percent: (10.0, 25.0),
            default_battery_percent: 70.0,
        }
    }
}

impl FleetMix {
    /// Decide whether the next spawned vehicle is electric
    pub fn roll_electric<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random_range(0.0..100.0) < self.ev_percentage
    }

    /// Draw an initial state of charge in percent
    pub fn roll_battery_percent<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if !self.random_initial_battery {
            return self.default_battery_percent;
        }

        if rng.random_bool(self.low_battery_share.clamp(0.0, 1.0)) {
            let (low, high) = self.low_battery_range_percent;
            rng.random_range(low..=high)
        } else {
            rng.random_range(self.min_initial_battery_percent..=self.max_initial_battery_percent)
        }
    }
}

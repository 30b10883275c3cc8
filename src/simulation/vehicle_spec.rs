//! Static per-type vehicle data
//!
//! A vehicle's type is resolved once, at creation, into a [`VehicleSpec`]
//! that is stored by value on the vehicle record.

use serde::{Deserialize, Serialize};

use super::error::{RoutingError, RoutingResult};
use super::types::kmh_to_mps;

/// Battery and charging behaviour of an electric vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySpec {
    pub capacity_kwh: f64,
    pub consumption_kwh_per_km: f64,
    /// Power the vehicle accepts from a charger
    pub charging_power_kw: f64,
    /// Go looking for a charger below this state of charge
    pub min_battery_percent: f64,
    /// Unplug once this state of charge is reached
    pub target_charge_percent: f64,
}

impl BatterySpec {
    /// Full-battery range in kilometres
    pub fn full_range_km(&self) -> f64 {
        if self.consumption_kwh_per_km > 0.0 {
            self.capacity_kwh / self.consumption_kwh_per_km
        } else {
            f64::INFINITY
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Powertrain {
    Electric(BatterySpec),
    Combustion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpec {
    /// Type label exposed in telemetry
    pub name: String,
    pub powertrain: Powertrain,
    /// Cruise speed cap
    pub max_speed_mps: f64,
}

impl VehicleSpec {
    pub fn electric(name: impl Into<String>, battery: BatterySpec, max_speed_mps: f64) -> Self {
        Self {
            name: name.into(),
            powertrain: Powertrain::Electric(battery),
            max_speed_mps,
        }
    }

    pub fn combustion(name: impl Into<String>, max_speed_mps: f64) -> Self {
        Self {
            name: name.into(),
            powertrain: Powertrain::Combustion,
            max_speed_mps,
        }
    }

    pub fn is_electric(&self) -> bool {
        matches!(self.powertrain, Powertrain::Electric(_))
    }

    pub fn battery(&self) -> Option<&BatterySpec> {
        match &self.powertrain {
            Powertrain::Electric(battery) => Some(battery),
            Powertrain::Combustion => None,
        }
    }

    /// Reject specs the charging state machine cannot work with
    pub fn validate(&self) -> RoutingResult<()> {
        if !(self.max_speed_mps > 0.0) {
            return Err(RoutingError::InvalidSpec(format!(
                "{}: max speed must be positive",
                self.name
            )));
        }

        let Some(battery) = self.battery() else {
            return Ok(());
        };

        if !(battery.capacity_kwh > 0.0) {
            return Err(RoutingError::InvalidSpec(format!(
                "{}: electric vehicle needs a positive battery capacity",
                self.name
            )));
        }
        if !(battery.consumption_kwh_per_km >= 0.0) {
            return Err(RoutingError::InvalidSpec(format!(
                "{}: consumption must not be negative",
                self.name
            )));
        }
        if !(0.0..=100.0).contains(&battery.min_battery_percent)
            || !(0.0..=100.0).contains(&battery.target_charge_percent)
            || battery.target_charge_percent <= battery.min_battery_percent
        {
            return Err(RoutingError::InvalidSpec(format!(
                "{}: thresholds must satisfy 0 <= min ({}) < target ({}) <= 100",
                self.name, battery.min_battery_percent, battery.target_charge_percent
            )));
        }

        Ok(())
    }
}

/// Catalogue of vehicle types the demo fleet is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleModel {
    TeslaModel3,
    TeslaModelY,
    NissanLeaf,
    RivianR1T,
    BmwI4,
    FordMustangMachE,
    ToyotaCamry,
    HondaAccord,
    FordF150,
}

impl VehicleModel {
    pub const ALL: [VehicleModel; 9] = [
        VehicleModel::TeslaModel3,
        VehicleModel::TeslaModelY,
        VehicleModel::NissanLeaf,
        VehicleModel::RivianR1T,
        VehicleModel::BmwI4,
        VehicleModel::FordMustangMachE,
        VehicleModel::ToyotaCamry,
        VehicleModel::HondaAccord,
        VehicleModel::FordF150,
    ];

    pub fn electric_models() -> impl Iterator<Item = VehicleModel> {
        Self::ALL.into_iter().filter(|m| m.is_electric())
    }

    pub fn combustion_models() -> impl Iterator<Item = VehicleModel> {
        Self::ALL.into_iter().filter(|m| !m.is_electric())
    }

    pub fn label(&self) -> &'static str {
        match self {
            VehicleModel::TeslaModel3 => "tesla_model3",
            VehicleModel::TeslaModelY => "tesla_modely",
            VehicleModel::NissanLeaf => "nissan_leaf",
            VehicleModel::RivianR1T => "rivian_r1t",
            VehicleModel::BmwI4 => "bmw_i4",
            VehicleModel::FordMustangMachE => "ford_mache",
            VehicleModel::ToyotaCamry => "toyota_camry",
            VehicleModel::HondaAccord => "honda_accord",
            VehicleModel::FordF150 => "ford_f150",
        }
    }

    pub fn is_electric(&self) -> bool {
        !matches!(
            self,
            VehicleModel::ToyotaCamry | VehicleModel::HondaAccord | VehicleModel::FordF150
        )
    }

    /// Resolve the model into its static spec
    pub fn spec(&self) -> VehicleSpec {
        // (capacity kWh, kWh/km, charger kW, min %, max km/h)
        let electric = |capacity, consumption, power, min, max_kmh: f64| {
            VehicleSpec::electric(
                self.label(),
                BatterySpec {
                    capacity_kwh: capacity,
                    consumption_kwh_per_km: consumption,
                    charging_power_kw: power,
                    min_battery_percent: min,
                    target_charge_percent: 80.0,
                },
                kmh_to_mps(max_kmh),
            )
        };

        match self {
            VehicleModel::TeslaModel3 => electric(75.0, 0.16, 250.0, 15.0, 160.0),
            VehicleModel::TeslaModelY => electric(82.0, 0.18, 250.0, 15.0, 155.0),
            VehicleModel::NissanLeaf => electric(40.0, 0.17, 50.0, 20.0, 145.0),
            VehicleModel::RivianR1T => electric(135.0, 0.25, 200.0, 15.0, 180.0),
            VehicleModel::BmwI4 => electric(80.0, 0.16, 200.0, 15.0, 190.0),
            VehicleModel::FordMustangMachE => electric(88.0, 0.19, 150.0, 15.0, 180.0),
            VehicleModel::ToyotaCamry => VehicleSpec::combustion(self.label(), kmh_to_mps(180.0)),
            VehicleModel::HondaAccord => VehicleSpec::combustion(self.label(), kmh_to_mps(175.0)),
            VehicleModel::FordF150 => VehicleSpec::combustion(self.label(), kmh_to_mps(160.0)),
        }
    }
}

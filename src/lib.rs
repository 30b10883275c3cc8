//! Fleet Router Library
//!
//! Routing and charging core for mixed electric and combustion fleets.

pub mod simulation;

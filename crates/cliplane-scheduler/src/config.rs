//! Scheduler configuration.

use cliplane_models::Lane;

/// Per-lane effective throughput: input-minutes processed per wall-minute.
///
/// Lane P0 is provisioned fastest, P2 slowest.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub throughput_p0: f64,
    pub throughput_p1: f64,
    pub throughput_p2: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            throughput_p0: 1.6,
            throughput_p1: 1.2,
            throughput_p2: 1.0,
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            throughput_p0: std::env::var("THROUGHPUT_P0")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.6),
            throughput_p1: std::env::var("THROUGHPUT_P1")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.2),
            throughput_p2: std::env::var("THROUGHPUT_P2")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        }
    }

    /// Throughput constant for a lane.
    pub fn throughput_for(&self, lane: Lane) -> f64 {
        match lane {
            Lane::P0 => self.throughput_p0,
            Lane::P1 => self.throughput_p1,
            Lane::P2 => self.throughput_p2,
        }
    }
}

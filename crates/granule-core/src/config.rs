//! Simulation settings

use granule_simulation::AMBIENT_TEMPERATURE;
use serde::{Deserialize, Serialize};

/// Tunables for a simulation instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World seed; drives the world RNG and every per-chunk RNG
    pub seed: u64,
    /// Worker threads for the parallel phase (0 = one per core)
    pub worker_threads: usize,
    /// Chunks kept loaded around each point of interest (square radius)
    pub load_radius: i32,
    /// Fixed ticks per second
    pub tick_rate: f32,
    /// Temperature empty cells relax toward (Celsius)
    pub ambient_temperature: f32,
    /// Minimum lateral hydrostatic gradient that pushes liquids sideways
    pub pressure_threshold: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            worker_threads: 0,
            load_radius: 3, // 7x7 grid = 49 chunks
            tick_rate: 60.0,
            ambient_temperature: AMBIENT_TEMPERATURE,
            pressure_threshold: 0.5,
        }
    }
}

impl SimConfig {
    /// Seconds simulated by one tick
    pub fn dt(&self) -> f32 {
        if self.tick_rate > 0.0 {
            1.0 / self.tick_rate
        } else {
            1.0 / 60.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.load_radius, 3);
        assert_eq!(config.ambient_temperature, 20.0);
        assert_eq!(config.pressure_threshold, 0.5);
        assert!((config.dt() - 1.0 / 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_tick_rate_falls_back() {
        let config = SimConfig {
            tick_rate: 0.0,
            ..Default::default()
        };
        assert!((config.dt() - 1.0 / 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: SimConfig = ron::from_str("(seed: 7, worker_threads: 2)").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.load_radius, 3);
    }
}

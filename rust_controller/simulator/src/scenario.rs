use config::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use prelude::*;

pub static SCENARIO_FILE: &'static str = "simulator.toml";

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Simulated duration in seconds.
    pub t: float,
    /// Sleep so each control cycle takes `dt` of wall clock time.
    pub real_time: bool,
    pub initial_speed: float,
    pub seed: u64,
    pub road: Road,
    pub waypoints: Waypoints,
    pub noise: Noise,
}

/// Sinusoidal road `y = amplitude sin(2 pi x / wavelength)` in world coordinates.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Road {
    pub amplitude: float,
    pub wavelength: float,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Waypoints {
    /// Distance along x between waypoints.
    pub spacing: float,
    pub count: usize,
    /// Waypoints taken from behind the vehicle.
    pub behind: usize,
}

/// Standard deviations of the measurement noise.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Noise {
    pub position: float,
    pub heading: float,
    pub speed: float,
}

impl Road {
    pub fn y(&self, x: float) -> float {
        self.amplitude * (2.0 * PI * x / self.wavelength).sin()
    }

    pub fn heading(&self, x: float) -> float {
        let k = 2.0 * PI / self.wavelength;
        (self.amplitude * k * (k * x).cos()).atan()
    }

    /// Waypoints around `x` in world coordinates.
    pub fn waypoints(&self, x: float, waypoints: &Waypoints) -> Vec<(float, float)> {
        let first = x - waypoints.spacing * waypoints.behind as float;
        (0..waypoints.count)
            .map(|i| {
                let wx = first + waypoints.spacing * i as float;
                (wx, self.y(wx))
            })
            .collect()
    }
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Scenario, ConfigError> {
        let path = path.as_ref();
        let scenario_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario: Scenario = toml::from_str(&scenario_str)?;

        if scenario.waypoints.count < 4 {
            return Err(ConfigError::InvalidValue {
                field: "waypoints.count",
                reason: "needs at least four points to fit a cubic".to_string(),
            });
        }
        if !(scenario.road.wavelength > 0.0 && scenario.waypoints.spacing > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "road.wavelength",
                reason: "wavelength and waypoint spacing must be positive".to_string(),
            });
        }
        Ok(scenario)
    }
}

#![allow(non_snake_case)]

extern crate prelude;
extern crate serde;
extern crate thiserror;
extern crate toml;

use prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
pub use toml::Value;

pub static CONFIG_FILE: &'static str = "controller.toml";

/// Upper limit on `solver_time_budget` in seconds.
pub const MAX_SOLVER_TIME_BUDGET: float = 10.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("unable to deserialise configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unable to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("horizon N must be at least 2, got {0}")]
    InvalidHorizon(usize),
    #[error("dt must be finite and positive, got {0}")]
    InvalidTimestep(float),
    #[error("latency of {latency_steps} steps must be less than N - 1 = {limit}")]
    LatencyExceedsHorizon { latency_steps: usize, limit: usize },
    #[error("{field} {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// What to command when a cycle's solution cannot be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailSafePolicy {
    /// Repeat the previous command.
    Hold,
    /// Keep the previous steering angle and brake with `FailSafe::acceleration`.
    Decelerate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailSafe {
    pub policy: FailSafePolicy,
    /// Normalised acceleration commanded by `Decelerate`, within [-max_accel, 0].
    pub acceleration: float,
    /// Use the best-effort solution when the solver runs out of time, provided it is finite.
    pub accept_time_exceeded: bool,
}

impl Default for FailSafe {
    fn default() -> FailSafe {
        FailSafe {
            policy: FailSafePolicy::Hold,
            acceleration: -0.5,
            accept_time_exceeded: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MpcConfig {
    /// Number of predicted states, including the measured one.
    pub N: usize,
    /// Model step in seconds.
    pub dt: float,
    /// Delay between measuring the state and the command taking effect.
    pub latency_seconds: float,
    pub Lf: float,
    pub ref_v: float,
    pub weight_cte: float,
    pub weight_epsi: float,
    pub weight_v: float,
    pub weight_delta: float,
    pub weight_accel: float,
    pub weight_delta_rate: float,
    pub weight_accel_rate: float,
    /// Steering limit in radians.
    pub max_steer: float,
    pub max_accel: float,
    /// Wall clock budget for one solve, in seconds.
    pub solver_time_budget: float,
    pub solver_max_iterations: u32,
    pub solver_tolerance: float,
    #[serde(default)]
    pub fail_safe: FailSafe,
}

/// Named tunings, each tracking a particular target speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    #[serde(rename = "72mph")]
    Mph72,
    #[serde(rename = "88mph")]
    Mph88,
    #[serde(rename = "85mph")]
    Mph85,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Mph72, Preset::Mph88, Preset::Mph85];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Mph72 => "72mph",
            Preset::Mph88 => "88mph",
            Preset::Mph85 => "85mph",
        }
    }

    pub fn config(self) -> MpcConfig {
        let base = MpcConfig {
            N: 10,
            dt: 0.05,
            latency_seconds: 0.1,
            Lf: 2.67,
            ref_v: 75.0,
            weight_cte: 1.0,
            weight_epsi: 1.0,
            weight_v: 1.0,
            weight_delta: 200.0,
            weight_accel: 1.0,
            weight_delta_rate: 500.0,
            weight_accel_rate: 1.0,
            max_steer: 25.0f64.to_radians(),
            max_accel: 1.0,
            solver_time_budget: 0.05,
            solver_max_iterations: 50,
            solver_tolerance: 1.0e-5,
            fail_safe: FailSafe::default(),
        };

        match self {
            Preset::Mph72 => base,
            Preset::Mph88 => MpcConfig {
                N: 12,
                dt: 0.1,
                ref_v: 90.0,
                weight_delta: 5000.0,
                weight_delta_rate: 1.0,
                ..base
            },
            Preset::Mph85 => MpcConfig {
                N: 12,
                ref_v: 85.0,
                weight_delta_rate: 700.0,
                ..base
            },
        }
    }
}

impl Default for Preset {
    fn default() -> Preset {
        Preset::Mph72
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Preset, ConfigError> {
        Preset::ALL
            .iter()
            .cloned()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "preset",
                reason: format!("{:?} is not one of 72mph, 88mph, 85mph", s),
            })
    }
}

impl Default for MpcConfig {
    fn default() -> MpcConfig {
        Preset::default().config()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn check_non_negative(field: &'static str, value: float) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and non-negative, got {}", value)))
    }
}

fn check_positive(field: &'static str, value: float) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and positive, got {}", value)))
    }
}

// Recursively overlays `overrides` onto `base`, replacing everything that is not a table.
fn merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Table(base), Value::Table(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, value) => *base = value,
    }
}

impl MpcConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MpcConfig, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        MpcConfig::from_toml_str(&config_str)
    }

    /// Parses and validates a TOML configuration. The optional `preset` key names the profile the
    /// remaining keys override; it defaults to `72mph`.
    pub fn from_toml_str(config_str: &str) -> Result<MpcConfig, ConfigError> {
        let mut table: toml::Table = config_str.parse()?;

        let preset = match table.remove("preset") {
            None => Preset::default(),
            Some(Value::String(name)) => name.parse()?,
            Some(other) => return Err(invalid("preset", format!("must be a string, got {}", other))),
        };

        let mut merged = Value::try_from(preset.config())?;
        merge(&mut merged, Value::Table(table));

        let config: MpcConfig = merged.try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Number of leading actuations already committed when the state was measured.
    pub fn latency_steps(&self) -> usize {
        (self.latency_seconds / self.dt).round() as usize
    }

    /// Zero when the budget is not a representable duration, which `validate` rejects.
    pub fn time_budget(&self) -> Duration {
        Duration::try_from_secs_f64(self.solver_time_budget).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.N < 2 {
            return Err(ConfigError::InvalidHorizon(self.N));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::InvalidTimestep(self.dt));
        }
        check_non_negative("latency_seconds", self.latency_seconds)?;
        let latency_steps = self.latency_steps();
        if latency_steps >= self.N - 1 {
            return Err(ConfigError::LatencyExceedsHorizon {
                latency_steps,
                limit: self.N - 1,
            });
        }

        check_positive("Lf", self.Lf)?;
        if !self.ref_v.is_finite() {
            return Err(invalid("ref_v", "must be finite"));
        }

        check_non_negative("weight_cte", self.weight_cte)?;
        check_non_negative("weight_epsi", self.weight_epsi)?;
        check_non_negative("weight_v", self.weight_v)?;
        check_non_negative("weight_delta", self.weight_delta)?;
        check_non_negative("weight_accel", self.weight_accel)?;
        check_non_negative("weight_delta_rate", self.weight_delta_rate)?;
        check_non_negative("weight_accel_rate", self.weight_accel_rate)?;

        check_positive("max_steer", self.max_steer)?;
        check_positive("max_accel", self.max_accel)?;
        check_positive("solver_time_budget", self.solver_time_budget)?;
        if self.solver_time_budget > MAX_SOLVER_TIME_BUDGET {
            return Err(invalid(
                "solver_time_budget",
                format!(
                    "must be at most {} s, got {}",
                    MAX_SOLVER_TIME_BUDGET, self.solver_time_budget
                ),
            ));
        }
        check_positive("solver_tolerance", self.solver_tolerance)?;
        if self.solver_max_iterations == 0 {
            return Err(invalid("solver_max_iterations", "must be at least 1"));
        }

        let deceleration = self.fail_safe.acceleration;
        if !(deceleration <= 0.0 && deceleration >= -self.max_accel) {
            return Err(invalid(
                "fail_safe.acceleration",
                format!("must be within [-{}, 0], got {}", self.max_accel, deceleration),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_72mph() {
        let config = MpcConfig::default();
        assert_eq!(config, Preset::Mph72.config());
        assert_eq!(config.N, 10);
        assert_eq!(config.dt, 0.05);
        assert_eq!(config.ref_v, 75.0);
        assert_eq!(config.latency_steps(), 2);
        assert!((config.max_steer - 0.436332).abs() < 1e-6);
        config.validate().unwrap();
    }

    #[test]
    fn presets_are_valid() {
        for preset in Preset::ALL.iter() {
            let config = preset.config();
            config.validate().unwrap();
            assert_eq!(preset.name().parse::<Preset>().unwrap(), *preset);
        }

        let fast = Preset::Mph88.config();
        assert_eq!((fast.N, fast.dt, fast.ref_v), (12, 0.1, 90.0));
        assert_eq!((fast.weight_delta, fast.weight_delta_rate), (5000.0, 1.0));
        assert_eq!(fast.latency_steps(), 1);

        let medium = Preset::Mph85.config();
        assert_eq!((medium.N, medium.dt, medium.ref_v), (12, 0.05, 85.0));
        assert_eq!((medium.weight_delta, medium.weight_delta_rate), (200.0, 700.0));
    }

    #[test]
    fn empty_file_gives_default() {
        assert_eq!(MpcConfig::from_toml_str("").unwrap(), MpcConfig::default());
    }

    #[test]
    fn keys_override_preset() {
        let config = MpcConfig::from_toml_str(
            r#"
            preset = "88mph"
            ref_v = 60
            weight_cte = 3.5

            [fail_safe]
            policy = "decelerate"
            acceleration = -0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.N, 12);
        assert_eq!(config.ref_v, 60.0);
        assert_eq!(config.weight_cte, 3.5);
        assert_eq!(config.weight_delta, 5000.0);
        assert_eq!(config.fail_safe.policy, FailSafePolicy::Decelerate);
        assert_eq!(config.fail_safe.acceleration, -0.25);
        assert!(config.fail_safe.accept_time_exceeded);
    }

    #[test]
    fn serialised_config_round_trips() {
        let config = Preset::Mph85.config();
        let parsed = MpcConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn unknown_preset_and_keys_are_rejected() {
        match MpcConfig::from_toml_str("preset = \"100mph\"") {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "preset"),
            other => panic!("unexpected {:?}", other),
        }
        match MpcConfig::from_toml_str("horizon = 4") {
            Err(ConfigError::Parse(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_horizon_and_timestep() {
        match MpcConfig::from_toml_str("N = 1") {
            Err(ConfigError::InvalidHorizon(1)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match MpcConfig::from_toml_str("dt = 0.0") {
            Err(ConfigError::InvalidTimestep(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn latency_must_leave_free_actuations() {
        // 0.1 s at 0.05 s per step is 2 steps, leaving none free with N = 3.
        match MpcConfig::from_toml_str("N = 3") {
            Err(ConfigError::LatencyExceedsHorizon {
                latency_steps: 2,
                limit: 2,
            }) => {}
            other => panic!("unexpected {:?}", other),
        }
        MpcConfig::from_toml_str("N = 4").unwrap();
        MpcConfig::from_toml_str("N = 2\nlatency_seconds = 0.0").unwrap();
    }

    #[test]
    fn latency_rounds_to_nearest_step() {
        let mut config = MpcConfig::default();
        config.latency_seconds = 0.074;
        assert_eq!(config.latency_steps(), 1);
        config.latency_seconds = 0.076;
        assert_eq!(config.latency_steps(), 2);
    }

    #[test]
    fn out_of_range_values() {
        let mut config = MpcConfig::default();
        config.weight_delta = -1.0;
        assert!(config.validate().is_err());

        let mut config = MpcConfig::default();
        config.fail_safe.acceleration = -2.0;
        assert!(config.validate().is_err());

        let mut config = MpcConfig::default();
        config.solver_time_budget = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_time_budget_is_rejected() {
        match MpcConfig::from_toml_str("solver_time_budget = 1e20") {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "solver_time_budget"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(MpcConfig::from_toml_str("solver_time_budget = 10.5").is_err());
        assert!(MpcConfig::from_toml_str("solver_time_budget = 10.0").is_ok());

        let config = MpcConfig {
            solver_time_budget: 1.0e20,
            ..MpcConfig::default()
        };
        assert_eq!(config.time_budget(), Duration::from_secs(0));
    }

    #[test]
    fn missing_file() {
        match MpcConfig::load("this/file/does/not/exist.toml") {
            Err(ConfigError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("this/file/does/not/exist.toml"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

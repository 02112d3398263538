// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

extern crate env_logger;
#[macro_use]
extern crate log;
extern crate rand;
extern crate rand_distr;
extern crate serde;
extern crate stats;
extern crate toml;

extern crate config;
extern crate control_model;
extern crate controller;
extern crate prelude;

mod fit;
mod profile;
mod scenario;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::VecDeque;
use std::env;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use config::MpcConfig;
use control_model::{Actuation, ControlModel, KinematicBicycle, Polynomial, State};
use controller::Mpc;
use prelude::*;
use scenario::Scenario;

fn main() {
    env_logger::init();

    let controller_file = env::args()
        .nth(1)
        .unwrap_or_else(|| config::CONFIG_FILE.to_string());

    let mpc_config = match MpcConfig::load(&controller_file) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    let scenario = match Scenario::load(scenario::SCENARIO_FILE) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(mpc_config, &scenario) {
        error!("{}", e);
        process::exit(1);
    }

    let profile = profile::Profile::collect();
    profile.print_summary();
    if let Err(e) = profile.write_html("flame-graph.html") {
        warn!("unable to write flame graph: {}", e);
    }
}

struct Sensor {
    rng: StdRng,
    position: Normal<float>,
    heading: Normal<float>,
    speed: Normal<float>,
}

impl Sensor {
    fn new(scenario: &Scenario) -> Result<Sensor, rand_distr::NormalError> {
        Ok(Sensor {
            rng: StdRng::seed_from_u64(scenario.seed),
            position: Normal::new(0.0, scenario.noise.position)?,
            heading: Normal::new(0.0, scenario.noise.heading)?,
            speed: Normal::new(0.0, scenario.noise.speed)?,
        })
    }

    /// World pose (x, y, psi, v) with measurement noise.
    fn measure(&mut self, truth: &State) -> (float, float, float, float) {
        let rng = &mut self.rng;
        (
            truth.x + self.position.sample(rng),
            truth.y + self.position.sample(rng),
            truth.psi + self.heading.sample(rng),
            truth.v + self.speed.sample(rng),
        )
    }
}

fn run(mpc_config: MpcConfig, scenario: &Scenario) -> Result<(), Box<dyn std::error::Error>> {
    let dt = mpc_config.dt;
    let latency_steps = mpc_config.latency_steps();
    let dt_duration = Duration::from_secs_f64(dt);
    let n_steps = (scenario.t / dt) as usize;

    // The vehicle moves under the same model the controller predicts with.
    let vehicle = KinematicBicycle::new(mpc_config.Lf, dt);
    let mut mpc = Mpc::new(mpc_config)?;
    let mut sensor = Sensor::new(scenario)?;

    let road = &scenario.road;
    let mut truth = State::new(0.0, road.y(0.0), road.heading(0.0), scenario.initial_speed, 0.0, 0.0);

    // Commands sent but not yet acting on the vehicle.
    let mut in_flight: VecDeque<Actuation> = (0..latency_steps).map(|_| Actuation::default()).collect();

    let mut solve_stats = stats::OnlineStats::new();
    let mut cte_stats = stats::OnlineStats::new();
    let mut max_cte: float = 0.0;
    let mut n_fallback = 0;

    for i in 0..n_steps {
        let step_start = Instant::now();

        let (px, py, psi, v) = sensor.measure(&truth);
        let waypoints = fit::to_vehicle_frame(&road.waypoints(px, &scenario.waypoints), px, py, psi);
        let reference = match fit::fit_cubic(&waypoints) {
            Some(reference) => reference,
            None => {
                warn!("unable to fit reference at step {}, assuming straight road", i);
                Polynomial::straight()
            }
        };

        // The vehicle frame puts the car at the origin facing along x.
        let cte = reference.eval(0.0);
        let epsi = -reference.derivative(0.0).atan();
        let state = State::new(0.0, 0.0, 0.0, v, cte, epsi);

        let controller_start = Instant::now();
        let out = mpc.solve(&state, &reference);
        let controller_millis = controller_start.elapsed().as_secs_f64() * 1e3;
        solve_stats.add(controller_millis);

        let true_cte = road.y(truth.x) - truth.y;
        cte_stats.add(true_cte.abs());
        max_cte = max(max_cte, true_cte.abs());
        if out.diagnostics.fallback {
            n_fallback += 1;
        }

        info!(
            "t {:.2}: cte {:.3} epsi {:.4} v {:.2} -> delta {:.4} a {:.3} ({:?}, {:.1} ms)",
            i as float * dt,
            cte,
            epsi,
            v,
            out.actuation.delta,
            out.actuation.a,
            out.diagnostics.status,
            controller_millis
        );

        in_flight.push_back(out.actuation);
        let applied = in_flight.pop_front().unwrap_or(out.actuation);
        truth = vehicle.step(&truth, &applied, &Polynomial::straight());

        let step_elapsed = step_start.elapsed();
        if let Some(step_remaining) = dt_duration.checked_sub(step_elapsed) {
            if scenario.real_time {
                thread::sleep(step_remaining);
            }
        } else {
            debug!(
                "step missed deadline. took {:.1}ms.",
                step_elapsed.as_secs_f64() * 1e3
            );
        }
    }

    println!(
        "{} steps, {} fallbacks, max |cte| {:.3}",
        n_steps, n_fallback, max_cte
    );
    println!("Controller time (mean/ms, stdev/ms): {:?}", solve_stats);
    println!("|cte| (mean, stdev): {:?}", cte_stats);

    Ok(())
}

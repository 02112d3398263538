use log::Level::Debug;
use std::time::{Duration, Instant};
use thiserror::Error;

use config::{ConfigError, FailSafePolicy, MpcConfig};
use control_model::{Actuation, ControlModel, KinematicBicycle, Polynomial, State};
use nlp::{NlpSolver, SolveResult, SolveStatus, SqpSettings, SqpSolver};
use prelude::flame;
use prelude::*;

use crate::{build_bounds, Evaluator, Layout, Limits, Weights};

/// Why a cycle's solution was not used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CycleFault {
    #[error("solver finished with status {0:?}")]
    SolverNonConvergence(SolveStatus),
    #[error("solution or inputs contain non-finite values")]
    NumericalInstability,
    #[error("solver ran out of time")]
    TimeBudgetExceeded,
}

/// State carried between cycles: the last command sent to the vehicle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerState {
    pub last_actuation: Actuation,
}

#[derive(Clone, Debug)]
pub struct Diagnostics {
    pub status: SolveStatus,
    pub objective: float,
    pub iterations: u32,
    pub solve_time: Duration,
    pub constraint_violation: float,
    pub fault: Option<CycleFault>,
    /// The actuation came from the fail-safe policy rather than the solver.
    pub fallback: bool,
}

#[derive(Clone, Debug)]
pub struct MpcOutput {
    /// Predicted state one step ahead.
    pub next_state: State,
    /// Command to send, the first actuation after the latency window.
    pub actuation: Actuation,
    /// Predicted (x, y) for steps 1 to N - 1.
    pub predicted_path: Vec<(float, float)>,
    pub diagnostics: Diagnostics,
}

pub struct Mpc<S: NlpSolver = SqpSolver> {
    config: MpcConfig,
    layout: Layout,
    model: KinematicBicycle,
    weights: Weights,
    limits: Limits,
    latency_steps: usize,
    solver: S,
    state: ControllerState,
}

impl Mpc<SqpSolver> {
    pub fn new(config: MpcConfig) -> Result<Mpc<SqpSolver>, ConfigError> {
        let settings = SqpSettings {
            max_iterations: config.solver_max_iterations,
            step_tolerance: config.solver_tolerance,
            constraint_tolerance: config.solver_tolerance,
            ..SqpSettings::default()
        };
        Mpc::with_solver(config, SqpSolver::new(settings))
    }
}

impl<S: NlpSolver> Mpc<S> {
    pub fn with_solver(config: MpcConfig, solver: S) -> Result<Mpc<S>, ConfigError> {
        config.validate()?;

        info!(
            "mpc: N = {}, dt = {}, latency {} steps, ref_v = {}",
            config.N,
            config.dt,
            config.latency_steps(),
            config.ref_v
        );

        Ok(Mpc {
            layout: Layout::new(config.N),
            model: KinematicBicycle::new(config.Lf, config.dt),
            weights: Weights::from_config(&config),
            limits: Limits {
                max_steer: config.max_steer,
                max_accel: config.max_accel,
            },
            latency_steps: config.latency_steps(),
            solver,
            state: ControllerState::default(),
            config,
        })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn latency_steps(&self) -> usize {
        self.latency_steps
    }

    pub fn controller_state(&self) -> &ControllerState {
        &self.state
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Forgets the last command, as if the controller had just been created.
    pub fn reset(&mut self) {
        self.state = ControllerState::default();
    }

    /// Zero except for the measured state and the actuations already in flight.
    fn initial_guess(&self, measured: &State) -> Vec<float> {
        let mut vars = vec![0.0; self.layout.n_vars()];
        self.layout.set_state(&mut vars, 0, measured);
        for i in 0..self.latency_steps {
            self.layout
                .set_actuation(&mut vars, i, &self.state.last_actuation);
        }
        vars
    }

    fn check(&self, result: &SolveResult) -> Option<CycleFault> {
        match result.status {
            SolveStatus::Success => {}
            SolveStatus::TimeExceeded
                if self.config.fail_safe.accept_time_exceeded && result.iterations > 0 => {}
            SolveStatus::TimeExceeded => return Some(CycleFault::TimeBudgetExceeded),
            status => return Some(CycleFault::SolverNonConvergence(status)),
        }

        if result.x.len() != self.layout.n_vars()
            || !result.objective.is_finite()
            || !result.x.iter().all(|v| v.is_finite())
        {
            return Some(CycleFault::NumericalInstability);
        }

        None
    }

    fn fallback_actuation(&self) -> Actuation {
        let last = self.state.last_actuation;
        match self.config.fail_safe.policy {
            FailSafePolicy::Hold => last,
            FailSafePolicy::Decelerate => Actuation::new(last.delta, self.config.fail_safe.acceleration),
        }
    }

    /// Plans one cycle from the measured `state` along `reference`, both in the vehicle frame.
    ///
    /// Never fails: when the solution cannot be used the command comes from the configured
    /// fail-safe policy, and the fault is reported in the diagnostics.
    pub fn solve(&mut self, state: &State, reference: &Polynomial) -> MpcOutput {
        let _guard = flame::start_guard("mpc solve");
        let start = Instant::now();
        let layout = self.layout;
        let N = layout.horizon();

        let inputs_finite = state.is_finite() && reference.is_finite();
        let result = if inputs_finite {
            let bounds = flame::span_of("build bounds", || {
                build_bounds(
                    &layout,
                    state,
                    &self.state.last_actuation,
                    self.latency_steps,
                    &self.limits,
                )
            });
            let x0 = self.initial_guess(state);
            let evaluator = Evaluator::new(
                layout,
                &self.model,
                self.weights,
                self.config.ref_v,
                *reference,
            );
            self.solver
                .solve(&evaluator, &x0, &bounds, self.config.time_budget())
        } else {
            SolveResult {
                status: SolveStatus::NotConverged,
                x: Vec::new(),
                objective: NAN,
                iterations: 0,
                constraint_violation: NAN,
            }
        };
        let solve_time = start.elapsed();

        let fault = if result.x.is_empty() {
            Some(CycleFault::NumericalInstability)
        } else {
            self.check(&result)
        };

        let (actuation, next_state, predicted_path) = match fault {
            None => {
                let actuation = layout.actuation(&result.x, self.latency_steps);
                let next_state = layout.state(&result.x, 1);
                let predicted_path = (1..N)
                    .map(|i| {
                        let s = layout.state(&result.x, i);
                        (s.x, s.y)
                    })
                    .collect();
                (actuation, next_state, predicted_path)
            }
            Some(fault) => {
                let actuation = self.fallback_actuation();
                warn!(
                    "mpc fault: {} after {} iterations in {:?}, commanding {:?}",
                    fault, result.iterations, solve_time, actuation
                );
                if inputs_finite {
                    let states = self
                        .model
                        .rollout(state, &vec![actuation; N - 1], reference);
                    let predicted_path = states[1..].iter().map(|s| (s.x, s.y)).collect();
                    (actuation, states[1], predicted_path)
                } else {
                    // Nothing can be predicted from non-finite inputs.
                    (actuation, *state, Vec::new())
                }
            }
        };
        self.state.last_actuation = actuation;

        if log_enabled!(Debug) {
            debug!(
                "mpc {:?}: objective {:.4}, {} iterations, violation {:.2e}, {:?}",
                result.status, result.objective, result.iterations, result.constraint_violation, solve_time
            );
            debug!("mpc actuation: delta {:.4}, a {:.4}", actuation.delta, actuation.a);
        }

        MpcOutput {
            next_state,
            actuation,
            predicted_path,
            diagnostics: Diagnostics {
                status: result.status,
                objective: result.objective,
                iterations: result.iterations,
                solve_time,
                constraint_violation: result.constraint_violation,
                fallback: fault.is_some(),
                fault,
            },
        }
    }
}

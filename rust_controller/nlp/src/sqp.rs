use log::Level::Debug;
use osqp::Settings;
use prelude::flame;
use prelude::*;
use std::time::{Duration, Instant};

use crate::derivatives::{gradient, hessian, jacobian};
use crate::qp::{Problem, QpOutcome};
use crate::{NlpProblem, NlpSolver, ProblemBounds, SolveResult, SolveStatus};

// Sufficient decrease factor for the merit line search.
const ARMIJO: float = 1.0e-4;
const MIN_STEP: float = 1.0 / 1024.0;
// Smallest time limit handed to OSQP. Zero disables its limit entirely.
const MIN_QP_TIME: Duration = Duration::from_micros(100);

#[derive(Clone, Debug)]
pub struct SqpSettings {
    pub max_iterations: u32,
    /// Converged once the infinity norm of an undamped QP step falls below this. Both tolerances are relative
    /// to the largest magnitude in the iterate, or absolute when that is below one.
    pub step_tolerance: float,
    /// Largest constraint violation accepted at convergence.
    pub constraint_tolerance: float,
    pub qp_eps_abs: float,
    pub qp_eps_rel: float,
    pub qp_max_iter: u32,
}

impl Default for SqpSettings {
    fn default() -> SqpSettings {
        SqpSettings {
            max_iterations: 50,
            step_tolerance: 1.0e-5,
            constraint_tolerance: 1.0e-5,
            qp_eps_abs: 1.0e-6,
            qp_eps_rel: 1.0e-6,
            qp_max_iter: 4000,
        }
    }
}

/// Sequential quadratic programming with an l1 merit line search.
///
/// Each iteration linearises the constraints around the current point and solves the resulting QP
/// with OSQP. The QP uses the exact cost hessian, evaluated once at the projected starting point;
/// constraint curvature is not included. Iterates are always clamped into the variable bounds, so
/// variables with coincident bounds hold their bound value exactly.
pub struct SqpSolver {
    settings: SqpSettings,
}

impl SqpSolver {
    pub fn new(settings: SqpSettings) -> SqpSolver {
        SqpSolver { settings }
    }

    pub fn settings(&self) -> &SqpSettings {
        &self.settings
    }

    fn qp_settings(&self, time_limit: Duration) -> Settings {
        Settings::default()
            .verbose(log_enabled!(Debug))
            .polish(true)
            // OSQP's automatic interval depends on measured setup time, making solves irreproducible.
            .adaptive_rho_interval(Some(25))
            .eps_abs(self.settings.qp_eps_abs)
            .eps_rel(self.settings.qp_eps_rel)
            .max_iter(self.settings.qp_max_iter)
            .time_limit(Some(max(time_limit, MIN_QP_TIME)))
    }
}

impl Default for SqpSolver {
    fn default() -> SqpSolver {
        SqpSolver::new(SqpSettings::default())
    }
}

struct Merit {
    cost: float,
    violation: float,
    value: float,
}

fn merit<P: NlpProblem>(problem: &P, bounds: &ProblemBounds, x: &[float], penalty: float) -> Merit {
    let mut g = vec![0.0; problem.n_constraints()];
    problem.constraints(x, &mut g);
    let cost = problem.cost(x);
    let violation = bounds.constraint_violation_l1(&g);
    Merit {
        cost,
        violation,
        value: cost + penalty * violation,
    }
}

fn shift_bound(bound: float, value: float) -> float {
    if is_unbounded(bound) {
        bound.signum() * INFINITY
    } else {
        bound - value
    }
}

fn all_finite(values: &[float]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Backtracks from the full step `d` until the merit decreases sufficiently. `None` when no step
/// down to `MIN_STEP` does.
fn line_search<P: NlpProblem>(
    problem: &P,
    bounds: &ProblemBounds,
    x: &[float],
    d: &[float],
    penalty: float,
    current: &Merit,
    slope: float,
) -> Option<(Vec<float>, float)> {
    // Rounding in the merit near a stationary point.
    let slack = 16.0 * float::EPSILON * max(1.0, current.value.abs());
    let mut alpha = 1.0;
    while alpha >= MIN_STEP {
        let mut trial: Vec<float> = x.iter().zip(d).map(|(x, d)| x + alpha * d).collect();
        bounds.project(&mut trial);
        let trial_merit = merit(problem, bounds, &trial, penalty);

        if trial_merit.value.is_finite()
            && trial_merit.value <= current.value + ARMIJO * alpha * min(slope, 0.0) + slack
        {
            return Some((trial, alpha));
        }
        alpha *= 0.5;
    }
    None
}

impl NlpSolver for SqpSolver {
    fn solve<P: NlpProblem>(
        &mut self,
        problem: &P,
        x0: &[float],
        bounds: &ProblemBounds,
        time_budget: Duration,
    ) -> SolveResult {
        let _guard = flame::start_guard("sqp solve");
        let start = Instant::now();

        let n = problem.n_vars();
        let m = problem.n_constraints();
        assert_eq!(x0.len(), n, "initial guess has the wrong length");
        assert_eq!(bounds.x_lower.len(), n);
        assert_eq!(bounds.x_upper.len(), n);
        assert_eq!(bounds.g_lower.len(), m);
        assert_eq!(bounds.g_upper.len(), m);

        let mut x = x0.to_vec();
        bounds.project(&mut x);

        let mut status = SolveStatus::NotConverged;
        let mut iterations = 0;
        let mut penalty = 1.0;

        let P = if all_finite(&x) {
            let _guard = flame::start_guard("cost hessian");
            Some(hessian(problem, &x).upper_triangular().build_csc())
        } else {
            warn!("initial guess is not finite");
            None
        };

        while let Some(P) = &P {
            if iterations >= self.settings.max_iterations {
                status = SolveStatus::NotConverged;
                break;
            }

            let remaining = match time_budget.checked_sub(start.elapsed()) {
                Some(remaining) if remaining > Duration::from_secs(0) => remaining,
                _ => {
                    status = SolveStatus::TimeExceeded;
                    break;
                }
            };
            iterations += 1;

            let (grad, g, J) = {
                let _guard = flame::start_guard("linearise");
                let grad = gradient(problem, &x);
                let (g, J) = jacobian(problem, &x);
                (grad, g, J)
            };
            if !all_finite(&grad) || !all_finite(&g) {
                warn!("cost gradient or constraints not finite at iteration {}", iterations);
                status = SolveStatus::NotConverged;
                break;
            }

            let mut l = Vec::with_capacity(m + n);
            let mut u = Vec::with_capacity(m + n);
            for i in 0..m {
                l.push(shift_bound(bounds.g_lower[i], g[i]));
                u.push(shift_bound(bounds.g_upper[i], g[i]));
            }
            for i in 0..n {
                l.push(shift_bound(bounds.x_lower[i], x[i]));
                u.push(shift_bound(bounds.x_upper[i], x[i]));
            }
            let A = sparse::vstack(&[J, sparse::eye(n)]).build_csc();

            let outcome = match Problem::new(P, &grad, &A, &l, &u, &self.qp_settings(remaining)) {
                Ok(mut qp) => qp.solve(),
                Err(e) => {
                    warn!("osqp setup failed: {:?}", e);
                    status = SolveStatus::NotConverged;
                    break;
                }
            };

            let (d, y, time_limited) = match outcome {
                QpOutcome::Solved { x, y, time_limited } => (x, y, time_limited),
                QpOutcome::PrimalInfeasible => {
                    debug!("linearised subproblem infeasible at iteration {}", iterations);
                    status = SolveStatus::Infeasible;
                    break;
                }
                QpOutcome::Failed(reason) => {
                    debug!("subproblem failed at iteration {}: {}", iterations, reason);
                    status = SolveStatus::NotConverged;
                    break;
                }
            };

            // The penalty must dominate the constraint multipliers for the QP step to be a
            // descent direction of the merit function.
            let multiplier = y.iter().take(m).fold(0.0, |acc, &y| max(acc, y.abs()));
            penalty = max(penalty, 2.0 * multiplier);

            let scale = x.iter().fold(1.0, |acc, x| max(acc, x.abs()));
            let step = d.iter().fold(0.0, |acc, d| max(acc, d.abs()));

            let _guard = flame::start_guard("line search");
            let current = merit(problem, bounds, &x, penalty);
            let slope: float = grad.iter().zip(&d).map(|(g, d)| g * d).sum::<float>()
                - penalty * current.violation;

            let converging = step <= self.settings.step_tolerance * scale;
            let (trial, alpha) = if converging {
                let mut trial: Vec<float> = x.iter().zip(&d).map(|(x, d)| x + d).collect();
                bounds.project(&mut trial);
                (trial, 1.0)
            } else {
                match line_search(problem, bounds, &x, &d, penalty, &current, slope) {
                    Some(accepted) => accepted,
                    None => {
                        debug!("no merit decrease along the step at iteration {}", iterations);
                        status = SolveStatus::NotConverged;
                        break;
                    }
                }
            };
            x = trial;

            let mut g = vec![0.0; m];
            problem.constraints(&x, &mut g);
            let violation = bounds.constraint_violation_max(&g);
            trace!(
                "sqp iteration {}: cost {:.6} violation {:.3e} step {:.3e} alpha {}",
                iterations,
                current.cost,
                violation,
                step,
                alpha
            );

            if converging && violation <= self.settings.constraint_tolerance * scale {
                status = SolveStatus::Success;
                break;
            }
            if time_limited {
                status = SolveStatus::TimeExceeded;
                break;
            }
        }

        let objective = problem.cost(&x);
        let mut g = vec![0.0; m];
        problem.constraints(&x, &mut g);
        let constraint_violation = bounds.constraint_violation_max(&g);

        SolveResult {
            status,
            x,
            objective,
            iterations,
            constraint_violation,
        }
    }
}

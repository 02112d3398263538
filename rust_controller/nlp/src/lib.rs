//! Nonlinear programming interface used by the controller, and an SQP solver implementing it.
//!
//! A problem has the form
//!
//! ```text
//! minimise   f(x)
//! subject to g_lower <= g(x) <= g_upper
//!            x_lower <= x    <= x_upper
//! ```
//!
//! Bounds at or beyond `prelude::UNBOUNDED` in magnitude are treated as infinite.

#![allow(non_snake_case)]

#[macro_use]
extern crate log;
extern crate osqp;
extern crate prelude;
extern crate sparse;

use std::time::Duration;

use prelude::*;

mod derivatives;
mod qp;
mod sqp;
pub use sqp::{SqpSettings, SqpSolver};

/// Cost and constraint callbacks. Both are evaluated on plain floats and on dual numbers, so any
/// implementation written against `Scalar` is differentiated exactly by the solver.
pub trait NlpProblem {
    fn n_vars(&self) -> usize;

    fn n_constraints(&self) -> usize;

    fn cost<T: Scalar>(&self, x: &[T]) -> T;

    /// Writes the `n_constraints()` constraint values at `x` into `g`.
    fn constraints<T: Scalar>(&self, x: &[T], g: &mut [T]);
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProblemBounds {
    pub x_lower: Vec<float>,
    pub x_upper: Vec<float>,
    pub g_lower: Vec<float>,
    pub g_upper: Vec<float>,
}

impl ProblemBounds {
    /// Sum of the distances of `g` outside its bounds.
    pub fn constraint_violation_l1(&self, g: &[float]) -> float {
        g.iter()
            .zip(&self.g_lower)
            .zip(&self.g_upper)
            .map(|((&g, &l), &u)| violation(g, l, u))
            .sum()
    }

    /// Largest distance of `g` outside its bounds.
    pub fn constraint_violation_max(&self, g: &[float]) -> float {
        g.iter()
            .zip(&self.g_lower)
            .zip(&self.g_upper)
            .fold(0.0, |acc, ((&g, &l), &u)| max(acc, violation(g, l, u)))
    }

    /// Clamps `x` into the variable bounds. Variables with coincident bounds take the bound value
    /// exactly.
    pub fn project(&self, x: &mut [float]) {
        for ((x, &l), &u) in x.iter_mut().zip(&self.x_lower).zip(&self.x_upper) {
            *x = clamp(*x, l, u);
        }
    }
}

fn violation(g: float, l: float, u: float) -> float {
    if g.is_nan() {
        INFINITY
    } else {
        max(0.0, max(l - g, g - u))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Success,
    NotConverged,
    Infeasible,
    TimeExceeded,
}

#[derive(Clone, Debug)]
pub struct SolveResult {
    pub status: SolveStatus,
    /// Best point found. Always has the length of the decision vector, even on failure.
    pub x: Vec<float>,
    pub objective: float,
    pub iterations: u32,
    /// Largest constraint bound violation at `x`.
    pub constraint_violation: float,
}

pub trait NlpSolver {
    /// Solves `problem` starting from `x0`, returning no later than `time_budget` plus the
    /// duration of a single iteration's bookkeeping.
    fn solve<P: NlpProblem>(
        &mut self,
        problem: &P,
        x0: &[float],
        bounds: &ProblemBounds,
        time_budget: Duration,
    ) -> SolveResult;
}

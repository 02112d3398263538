#![allow(non_snake_case)]

extern crate prelude;
extern crate serde;

use prelude::*;
use serde::{Deserialize, Serialize};

mod kinematic_bicycle;
pub use kinematic_bicycle::KinematicBicycle;

/// Vehicle state in the frame anchored at the vehicle pose at the start of a planning cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct State<T = float> {
    pub x: T,
    pub y: T,
    pub psi: T,
    pub v: T,
    pub cte: T,
    pub epsi: T,
}

/// Steering angle and normalised acceleration (-1 full brake, 1 full throttle).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuation<T = float> {
    pub delta: T,
    pub a: T,
}

impl<T: Copy> State<T> {
    /// Number of state components.
    pub const DIM: usize = 6;

    pub fn new(x: T, y: T, psi: T, v: T, cte: T, epsi: T) -> State<T> {
        State {
            x,
            y,
            psi,
            v,
            cte,
            epsi,
        }
    }

    /// Components in decision vector block order: x, y, psi, v, cte, epsi.
    pub fn to_array(&self) -> [T; 6] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    pub fn from_array([x, y, psi, v, cte, epsi]: [T; 6]) -> State<T> {
        State::new(x, y, psi, v, cte, epsi)
    }

    pub fn map<U: Copy, F: FnMut(T) -> U>(&self, mut f: F) -> State<U> {
        let [x, y, psi, v, cte, epsi] = self.to_array();
        State::new(f(x), f(y), f(psi), f(v), f(cte), f(epsi))
    }
}

impl State<float> {
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl<T: Copy> Actuation<T> {
    /// Number of actuation components.
    pub const DIM: usize = 2;

    pub fn new(delta: T, a: T) -> Actuation<T> {
        Actuation { delta, a }
    }

    pub fn to_array(&self) -> [T; 2] {
        [self.delta, self.a]
    }

    pub fn map<U: Copy, F: FnMut(T) -> U>(&self, mut f: F) -> Actuation<U> {
        Actuation::new(f(self.delta), f(self.a))
    }
}

impl Actuation<float> {
    pub fn is_finite(&self) -> bool {
        self.delta.is_finite() && self.a.is_finite()
    }
}

/// Cubic reference path `y = c0 + c1 x + c2 x^2 + c3 x^3` in the vehicle frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coeffs: [float; 4],
}

impl Polynomial {
    pub fn new(c0: float, c1: float, c2: float, c3: float) -> Polynomial {
        Polynomial {
            coeffs: [c0, c1, c2, c3],
        }
    }

    /// Builds a polynomial from up to four coefficients, lowest order first. Missing higher order
    /// coefficients are zero.
    pub fn from_slice(coeffs: &[float]) -> Option<Polynomial> {
        if coeffs.len() > 4 {
            return None;
        }
        let mut c = [0.0; 4];
        c[..coeffs.len()].copy_from_slice(coeffs);
        Some(Polynomial { coeffs: c })
    }

    pub fn straight() -> Polynomial {
        Polynomial::default()
    }

    pub fn coefficients(&self) -> &[float; 4] {
        &self.coeffs
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }

    pub fn eval<T: Scalar>(&self, x: T) -> T {
        let [c0, c1, c2, c3] = self.coeffs;
        ((x * c3 + c2) * x + c1) * x + c0
    }

    pub fn derivative<T: Scalar>(&self, x: T) -> T {
        let [_, c1, c2, c3] = self.coeffs;
        (x * (3.0 * c3) + 2.0 * c2) * x + c1
    }
}

pub trait ControlModel {
    fn name() -> &'static str
    where
        Self: Sized;

    /// Length of one model step in seconds.
    fn dt(&self) -> float;

    /// Advances `x` by one step under actuation `u`, tracking errors measured against `reference`.
    fn step<T: Scalar>(&self, x: &State<T>, u: &Actuation<T>, reference: &Polynomial) -> State<T>;

    /// Applies each actuation in turn, returning every visited state including `x0`.
    fn rollout(&self, x0: &State, u: &[Actuation], reference: &Polynomial) -> Vec<State> {
        let mut states = Vec::with_capacity(u.len() + 1);
        states.push(*x0);
        for u_i in u {
            let x_i = *states.last().unwrap_or(x0);
            states.push(self.step(&x_i, u_i, reference));
        }
        states
    }
}

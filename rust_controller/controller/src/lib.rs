//! Nonlinear model predictive control of a kinematic bicycle tracking a cubic reference path.

#![allow(non_snake_case)]

extern crate config;
extern crate control_model;
#[macro_use]
extern crate log;
extern crate nlp;
extern crate prelude;
extern crate thiserror;

mod bounds;
pub use bounds::{build_bounds, Limits};

mod evaluator;
pub use evaluator::{Evaluator, Weights};

mod layout;
pub use layout::Layout;

mod mpc;
pub use mpc::{ControllerState, CycleFault, Diagnostics, Mpc, MpcOutput};

// Kinematic Bicycle Model from Rajesh Rajamani. Vehicle Dynamics and Control.
// Euler discretised, with the tracking errors propagated against a cubic reference path.

use prelude::*;

use crate::{Actuation, ControlModel, Polynomial, State};

pub struct KinematicBicycle {
    /// Distance from the front axle to the centre of gravity. Tuned so the turning radius of the
    /// model matches the vehicle at constant steering angle and speed.
    pub Lf: float,
    pub dt: float,
}

impl KinematicBicycle {
    pub fn new(Lf: float, dt: float) -> KinematicBicycle {
        KinematicBicycle { Lf, dt }
    }
}

impl ControlModel for KinematicBicycle {
    fn name() -> &'static str {
        "kinematic_bicycle"
    }

    fn dt(&self) -> float {
        self.dt
    }

    fn step<T: Scalar>(&self, x: &State<T>, u: &Actuation<T>, reference: &Polynomial) -> State<T> {
        let dt = self.dt;
        let yaw_step = x.v * u.delta * (dt / self.Lf);

        let f = reference.eval(x.x);
        let psi_des = reference.derivative(x.x).atan();

        State {
            x: x.x + x.v * x.psi.cos() * dt,
            y: x.y + x.v * x.psi.sin() * dt,
            psi: x.psi + yaw_step,
            v: x.v + u.a * dt,
            cte: (f - x.y) + x.v * x.epsi.sin() * dt,
            epsi: (x.psi - psi_des) + yaw_step,
        }
    }
}

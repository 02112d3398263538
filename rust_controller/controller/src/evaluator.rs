use config::MpcConfig;
use control_model::{ControlModel, Polynomial};
use nlp::NlpProblem;
use prelude::*;

use crate::Layout;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weights {
    pub cte: float,
    pub epsi: float,
    pub v: float,
    pub delta: float,
    pub accel: float,
    pub delta_rate: float,
    pub accel_rate: float,
}

impl Weights {
    pub fn from_config(config: &MpcConfig) -> Weights {
        Weights {
            cte: config.weight_cte,
            epsi: config.weight_epsi,
            v: config.weight_v,
            delta: config.weight_delta,
            accel: config.weight_accel,
            delta_rate: config.weight_delta_rate,
            accel_rate: config.weight_accel_rate,
        }
    }
}

/// Tracking cost and dynamics residuals of one planning cycle, against a fixed reference path.
pub struct Evaluator<'a, M: ControlModel> {
    layout: Layout,
    model: &'a M,
    weights: Weights,
    ref_v: float,
    reference: Polynomial,
}

impl<'a, M: ControlModel> Evaluator<'a, M> {
    pub fn new(
        layout: Layout,
        model: &'a M,
        weights: Weights,
        ref_v: float,
        reference: Polynomial,
    ) -> Evaluator<'a, M> {
        Evaluator {
            layout,
            model,
            weights,
            ref_v,
            reference,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Cost and constraint residuals of `vars`.
    pub fn evaluate(&self, vars: &[float]) -> (float, Vec<float>) {
        let mut g = vec![0.0; self.layout.n_constraints()];
        self.constraints(vars, &mut g);
        (self.cost(vars), g)
    }
}

impl<'a, M: ControlModel> NlpProblem for Evaluator<'a, M> {
    fn n_vars(&self) -> usize {
        self.layout.n_vars()
    }

    fn n_constraints(&self) -> usize {
        self.layout.n_constraints()
    }

    fn cost<T: Scalar>(&self, vars: &[T]) -> T {
        let l = &self.layout;
        let w = &self.weights;
        let N = l.horizon();
        let mut cost = T::constant(0.0);

        for i in 0..N {
            let cte = vars[l.cte_start() + i];
            let epsi = vars[l.epsi_start() + i];
            let v_error = vars[l.v_start() + i] - self.ref_v;
            cost += cte * cte * w.cte + epsi * epsi * w.epsi + v_error * v_error * w.v;
        }

        for i in 0..N - 1 {
            let delta = vars[l.delta_start() + i];
            let a = vars[l.a_start() + i];
            cost += delta * delta * w.delta + a * a * w.accel;
        }

        for i in 0..N - 2 {
            let delta_rate = vars[l.delta_start() + i + 1] - vars[l.delta_start() + i];
            let accel_rate = vars[l.a_start() + i + 1] - vars[l.a_start() + i];
            cost += delta_rate * delta_rate * w.delta_rate + accel_rate * accel_rate * w.accel_rate;
        }

        cost
    }

    fn constraints<T: Scalar>(&self, vars: &[T], g: &mut [T]) {
        let l = &self.layout;
        let starts = l.state_starts();

        // The first state of each block is pinned through the constraint bounds.
        for &start in starts.iter() {
            g[start] = vars[start];
        }

        for i in 0..l.horizon() - 1 {
            let predicted = self
                .model
                .step(&l.state(vars, i), &l.actuation(vars, i), &self.reference);
            let next = l.state(vars, i + 1);

            for ((&start, &next), &predicted) in starts
                .iter()
                .zip(next.to_array().iter())
                .zip(predicted.to_array().iter())
            {
                g[start + i + 1] = next - predicted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use control_model::{Actuation, KinematicBicycle, State};
    use prelude::num_dual::Dual64;

    fn weights() -> Weights {
        Weights {
            cte: 2.0,
            epsi: 3.0,
            v: 0.5,
            delta: 200.0,
            accel: 7.0,
            delta_rate: 500.0,
            accel_rate: 11.0,
        }
    }

    fn consistent_vars(layout: &Layout, model: &KinematicBicycle, reference: &Polynomial) -> Vec<float> {
        let N = layout.horizon();
        let u: Vec<Actuation> = (0..N - 1)
            .map(|i| Actuation::new(0.02 * i as float - 0.05, 0.3 - 0.1 * i as float))
            .collect();
        let states = model.rollout(&State::new(0.0, 0.1, 0.05, 12.0, 0.2, -0.04), &u, reference);

        let mut vars = vec![0.0; layout.n_vars()];
        for (i, s) in states.iter().enumerate() {
            layout.set_state(&mut vars, i, s);
        }
        for (i, u_i) in u.iter().enumerate() {
            layout.set_actuation(&mut vars, i, u_i);
        }
        vars
    }

    #[test]
    fn consistent_trajectory_has_zero_dynamics_residuals() {
        let layout = Layout::new(6);
        let model = KinematicBicycle::new(2.67, 0.1);
        let reference = Polynomial::new(0.5, 0.1, -0.01, 0.001);
        let vars = consistent_vars(&layout, &model, &reference);

        let evaluator = Evaluator::new(layout, &model, weights(), 10.0, reference);
        let (_, g) = evaluator.evaluate(&vars);

        assert_eq!(g.len(), layout.n_constraints());
        for &start in layout.state_starts().iter() {
            assert_eq!(g[start], vars[start]);
            for i in 1..layout.horizon() {
                assert_eq!(g[start + i], 0.0);
            }
        }
    }

    #[test]
    fn residual_is_difference_from_model_step() {
        let layout = Layout::new(4);
        let model = KinematicBicycle::new(2.67, 0.05);
        let reference = Polynomial::new(1.0, 0.0, 0.0, 0.0);
        let mut vars = consistent_vars(&layout, &model, &reference);
        vars[layout.y_start() + 2] += 0.25;

        let evaluator = Evaluator::new(layout, &model, weights(), 10.0, reference);
        let (_, g) = evaluator.evaluate(&vars);

        let expected = layout.state(&vars, 2).y
            - model
                .step(&layout.state(&vars, 1), &layout.actuation(&vars, 1), &reference)
                .y;
        assert_relative_eq!(g[layout.y_start() + 2], expected, epsilon = 1e-12);
        assert_relative_eq!(g[layout.y_start() + 2], 0.25, epsilon = 1e-12);
        // The perturbed state also feeds the following transition.
        assert!(g[layout.cte_start() + 3] != 0.0);
    }

    #[test]
    fn cost_terms() {
        let layout = Layout::new(3);
        let model = KinematicBicycle::new(2.67, 0.05);
        let w = weights();
        let evaluator = Evaluator::new(layout, &model, w, 10.0, Polynomial::straight());

        let mut vars = vec![0.0; layout.n_vars()];
        for i in 0..3 {
            layout.set_state(&mut vars, i, &State::new(0.0, 0.0, 0.0, 10.0, 0.0, 0.0));
        }
        assert_eq!(evaluator.cost(&vars), 0.0);

        vars[layout.cte_start() + 1] = 0.5;
        vars[layout.epsi_start() + 2] = -0.2;
        vars[layout.v_start()] = 8.0;
        layout.set_actuation(&mut vars, 0, &Actuation::new(0.1, 0.5));
        layout.set_actuation(&mut vars, 1, &Actuation::new(0.3, -0.5));

        let expected = w.cte * 0.25
            + w.epsi * 0.04
            + w.v * 4.0
            + w.delta * (0.01 + 0.09)
            + w.accel * (0.25 + 0.25)
            + w.delta_rate * 0.04
            + w.accel_rate * 1.0;
        assert_relative_eq!(evaluator.cost(&vars), expected, epsilon = 1e-9);
    }

    #[test]
    fn dual_evaluation_matches_float() {
        let layout = Layout::new(5);
        let model = KinematicBicycle::new(2.67, 0.1);
        let reference = Polynomial::new(0.5, 0.1, -0.01, 0.001);
        let mut vars = consistent_vars(&layout, &model, &reference);
        vars[layout.psi_start() + 3] += 0.1;
        let evaluator = Evaluator::new(layout, &model, weights(), 10.0, reference);

        let (cost, g) = evaluator.evaluate(&vars);

        let dual_vars: Vec<Dual64> = vars.iter().map(|&v| Dual64::from(v)).collect();
        let mut dual_g = vec![Dual64::from(0.0); layout.n_constraints()];
        evaluator.constraints(&dual_vars, &mut dual_g);

        assert_relative_eq!(evaluator.cost(&dual_vars).re, cost, epsilon = 1e-9);
        for (d, f) in dual_g.iter().zip(&g) {
            assert_relative_eq!(d.re, *f, epsilon = 1e-12);
        }
    }
}

use control_model::{Actuation, State};
use nlp::ProblemBounds;
use prelude::*;

use crate::Layout;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Limits {
    /// Steering limit in radians, symmetric about zero.
    pub max_steer: float,
    pub max_accel: float,
}

/// Variable and constraint bounds for one cycle.
///
/// The first state is pinned to `measured`, as are the first `latency_steps` actuations to
/// `committed`, the command still in flight when the state was measured. Every other state is
/// unbounded and every other actuation is limited by `limits`.
///
/// # Panics
///
/// If `latency_steps` leaves no free actuation, `latency_steps >= N - 1`.
pub fn build_bounds(
    layout: &Layout,
    measured: &State,
    committed: &Actuation,
    latency_steps: usize,
    limits: &Limits,
) -> ProblemBounds {
    let N = layout.horizon();
    assert!(
        latency_steps < N - 1,
        "latency of {} steps leaves no free actuation with N = {}",
        latency_steps,
        N
    );

    let n_vars = layout.n_vars();
    let n_constraints = layout.n_constraints();
    let mut x_lower = vec![-UNBOUNDED; n_vars];
    let mut x_upper = vec![UNBOUNDED; n_vars];
    let mut g_lower = vec![0.0; n_constraints];
    let mut g_upper = vec![0.0; n_constraints];

    for (&start, &value) in layout.state_starts().iter().zip(measured.to_array().iter()) {
        x_lower[start] = value;
        x_upper[start] = value;
        g_lower[start] = value;
        g_upper[start] = value;
    }

    for i in 0..N - 1 {
        let (delta, a) = (layout.delta_start() + i, layout.a_start() + i);
        if i < latency_steps {
            x_lower[delta] = committed.delta;
            x_upper[delta] = committed.delta;
            x_lower[a] = committed.a;
            x_upper[a] = committed.a;
        } else {
            x_lower[delta] = -limits.max_steer;
            x_upper[delta] = limits.max_steer;
            x_lower[a] = -limits.max_accel;
            x_upper[a] = limits.max_accel;
        }
    }

    ProblemBounds {
        x_lower,
        x_upper,
        g_lower,
        g_upper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: Limits = Limits {
        max_steer: 0.436332,
        max_accel: 1.0,
    };

    #[test]
    fn initial_state_pinned() {
        let layout = Layout::new(5);
        let measured = State::new(1.0, -2.0, 0.3, 40.0, 0.5, -0.1);
        let bounds = build_bounds(&layout, &measured, &Actuation::default(), 0, &LIMITS);

        assert_eq!(bounds.x_lower.len(), layout.n_vars());
        assert_eq!(bounds.g_lower.len(), layout.n_constraints());
        assert_eq!(layout.state(&bounds.x_lower, 0), measured);
        assert_eq!(layout.state(&bounds.x_upper, 0), measured);
        assert_eq!(layout.state(&bounds.g_lower, 0), measured);
        assert_eq!(layout.state(&bounds.g_upper, 0), measured);

        for i in 1..5 {
            assert_eq!(layout.state(&bounds.g_lower, i), State::default());
            assert_eq!(layout.state(&bounds.g_upper, i), State::default());
            assert!(is_unbounded(layout.state(&bounds.x_lower, i).v));
            assert!(is_unbounded(layout.state(&bounds.x_upper, i).psi));
        }
    }

    #[test]
    fn latency_pins_committed_actuation() {
        let layout = Layout::new(6);
        let committed = Actuation::new(-0.2, 0.4);
        let bounds = build_bounds(&layout, &State::default(), &committed, 2, &LIMITS);

        for i in 0..2 {
            assert_eq!(layout.actuation(&bounds.x_lower, i), committed);
            assert_eq!(layout.actuation(&bounds.x_upper, i), committed);
        }
        for i in 2..5 {
            assert_eq!(layout.actuation(&bounds.x_lower, i), Actuation::new(-0.436332, -1.0));
            assert_eq!(layout.actuation(&bounds.x_upper, i), Actuation::new(0.436332, 1.0));
        }
    }

    #[test]
    #[should_panic]
    fn latency_covering_horizon_panics() {
        let layout = Layout::new(3);
        build_bounds(&layout, &State::default(), &Actuation::default(), 2, &LIMITS);
    }
}

use control_model::{Actuation, State};

/// Positions of the trajectory components in the flat decision vector.
///
/// The vector holds six blocks of `N` state values (x, y, psi, v, cte, epsi) followed by two
/// blocks of `N - 1` actuation values (delta, a). The constraint vector has the six state blocks
/// only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    N: usize,
}

impl Layout {
    pub fn new(N: usize) -> Layout {
        assert!(N >= 2, "horizon must have at least two states");
        Layout { N }
    }

    pub fn horizon(&self) -> usize {
        self.N
    }

    pub fn x_start(&self) -> usize {
        0
    }

    pub fn y_start(&self) -> usize {
        self.N
    }

    pub fn psi_start(&self) -> usize {
        2 * self.N
    }

    pub fn v_start(&self) -> usize {
        3 * self.N
    }

    pub fn cte_start(&self) -> usize {
        4 * self.N
    }

    pub fn epsi_start(&self) -> usize {
        5 * self.N
    }

    pub fn delta_start(&self) -> usize {
        6 * self.N
    }

    pub fn a_start(&self) -> usize {
        6 * self.N + self.N - 1
    }

    pub fn n_vars(&self) -> usize {
        State::<f64>::DIM * self.N + Actuation::<f64>::DIM * (self.N - 1)
    }

    pub fn n_constraints(&self) -> usize {
        State::<f64>::DIM * self.N
    }

    /// Start of each state component block, in `State::to_array` order.
    pub fn state_starts(&self) -> [usize; 6] {
        [
            self.x_start(),
            self.y_start(),
            self.psi_start(),
            self.v_start(),
            self.cte_start(),
            self.epsi_start(),
        ]
    }

    pub fn state<T: Copy>(&self, vars: &[T], i: usize) -> State<T> {
        debug_assert!(i < self.N);
        let s = self.state_starts();
        State::new(
            vars[s[0] + i],
            vars[s[1] + i],
            vars[s[2] + i],
            vars[s[3] + i],
            vars[s[4] + i],
            vars[s[5] + i],
        )
    }

    pub fn set_state<T: Copy>(&self, vars: &mut [T], i: usize, state: &State<T>) {
        debug_assert!(i < self.N);
        for (start, value) in self.state_starts().iter().zip(state.to_array().iter()) {
            vars[start + i] = *value;
        }
    }

    pub fn actuation<T: Copy>(&self, vars: &[T], i: usize) -> Actuation<T> {
        debug_assert!(i < self.N - 1);
        Actuation::new(vars[self.delta_start() + i], vars[self.a_start() + i])
    }

    pub fn set_actuation<T: Copy>(&self, vars: &mut [T], i: usize, actuation: &Actuation<T>) {
        debug_assert!(i < self.N - 1);
        vars[self.delta_start() + i] = actuation.delta;
        vars[self.a_start() + i] = actuation.a;
    }
}

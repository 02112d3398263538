// Exact derivatives of an `NlpProblem` by forward-mode dual numbers.

use prelude::num_dual::{Dual64, HyperDual64};
use prelude::*;
use sparse::Builder;

use crate::NlpProblem;

pub fn gradient<P: NlpProblem>(problem: &P, x: &[float]) -> Vec<float> {
    let mut x_dual: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
    let mut grad = vec![0.0; x.len()];

    for i in 0..x.len() {
        x_dual[i].eps = 1.0;
        grad[i] = problem.cost(&x_dual).eps;
        x_dual[i].eps = 0.0;
    }

    grad
}

/// Constraint values and the sparse constraint jacobian at `x`.
pub fn jacobian<P: NlpProblem>(problem: &P, x: &[float]) -> (Vec<float>, Builder) {
    let n = problem.n_vars();
    let m = problem.n_constraints();

    let mut g = vec![0.0; m];
    problem.constraints(x, &mut g);

    let mut x_dual: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
    let mut g_dual = vec![Dual64::from(0.0); m];
    let mut J = Builder::with_capacity(m, n, 4 * m);

    for c in 0..n {
        x_dual[c].eps = 1.0;
        problem.constraints(&x_dual, &mut g_dual);
        for (r, g_r) in g_dual.iter().enumerate() {
            if g_r.eps != 0.0 {
                J.push(r, c, g_r.eps);
            }
        }
        x_dual[c].eps = 0.0;
    }

    (g, J)
}

/// Upper triangle of the cost hessian at `x`.
pub fn hessian<P: NlpProblem>(problem: &P, x: &[float]) -> Builder {
    let n = x.len();
    let mut x_dual: Vec<HyperDual64> = x.iter().map(|&v| HyperDual64::from(v)).collect();
    let mut H = Builder::with_capacity(n, n, 2 * n);

    for i in 0..n {
        x_dual[i].eps1 = 1.0;
        for j in i..n {
            x_dual[j].eps2 = 1.0;
            let h = problem.cost(&x_dual).eps1eps2;
            if h != 0.0 {
                H.push(i, j, h);
            }
            x_dual[j].eps2 = 0.0;
        }
        x_dual[i].eps1 = 0.0;
    }

    H
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // f = x0^2 x1 + sin(x1), g = [x0 x1, x1 - x0^3]
    struct Curved;

    impl NlpProblem for Curved {
        fn n_vars(&self) -> usize {
            2
        }

        fn n_constraints(&self) -> usize {
            2
        }

        fn cost<T: Scalar>(&self, x: &[T]) -> T {
            x[0] * x[0] * x[1] + x[1].sin()
        }

        fn constraints<T: Scalar>(&self, x: &[T], g: &mut [T]) {
            g[0] = x[0] * x[1];
            g[1] = x[1] - x[0].powi(3);
        }
    }

    #[test]
    fn gradient_is_exact() {
        let grad = gradient(&Curved, &[1.5, 0.3]);
        assert_relative_eq!(grad[0], 2.0 * 1.5 * 0.3, epsilon = 1e-12);
        assert_relative_eq!(grad[1], 1.5 * 1.5 + 0.3f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn jacobian_is_exact() {
        let (g, mut J) = jacobian(&Curved, &[1.5, 0.3]);
        let J = J.build_csc().to_dense();
        assert_relative_eq!(g[0], 0.45, epsilon = 1e-12);
        assert_relative_eq!(g[1], 0.3 - 3.375, epsilon = 1e-12);
        assert_relative_eq!(J[(0, 0)], 0.3, epsilon = 1e-12);
        assert_relative_eq!(J[(0, 1)], 1.5, epsilon = 1e-12);
        assert_relative_eq!(J[(1, 0)], -3.0 * 1.5 * 1.5, epsilon = 1e-12);
        assert_relative_eq!(J[(1, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn hessian_upper_triangle() {
        let H = hessian(&Curved, &[1.5, 0.3]).build_csc().to_dense();
        assert_relative_eq!(H[(0, 0)], 2.0 * 0.3, epsilon = 1e-12);
        assert_relative_eq!(H[(0, 1)], 2.0 * 1.5, epsilon = 1e-12);
        assert_relative_eq!(H[(1, 1)], -0.3f64.sin(), epsilon = 1e-12);
        assert_eq!(H[(1, 0)], 0.0);
    }
}

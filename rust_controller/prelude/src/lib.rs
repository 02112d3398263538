pub extern crate flame;
pub extern crate nalgebra;
pub extern crate num_dual;

use num_dual::DualNum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

#[allow(non_camel_case_types)]
pub type float = f64;
pub use std::f64::consts::PI;
pub use std::f64::{INFINITY, NAN, NEG_INFINITY};

/// Magnitude used for variables that are effectively unconstrained. Solvers treat bounds at or
/// beyond this value as infinite.
pub const UNBOUNDED: float = 1.0e19;

/// Returns the smaller value, or `a` if the two are not comparable.
pub fn min<T: Copy + PartialOrd>(a: T, b: T) -> T {
    nalgebra::partial_min(&a, &b).map_or(a, |v| *v)
}

/// Returns the larger value, or `a` if the two are not comparable.
pub fn max<T: Copy + PartialOrd>(a: T, b: T) -> T {
    nalgebra::partial_max(&a, &b).map_or(a, |v| *v)
}

pub fn clamp(v: float, lower: float, upper: float) -> float {
    max(lower, min(v, upper))
}

pub fn is_unbounded(bound: float) -> bool {
    bound.abs() >= UNBOUNDED
}

/// Arithmetic needed to evaluate the vehicle model and the MPC objective.
///
/// Anything that can be evaluated on a `Scalar` can be evaluated on plain floats as well as on
/// forward-mode dual numbers, which is how the solver obtains exact derivatives.
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<float, Output = Self>
    + Sub<float, Output = Self>
    + Mul<float, Output = Self>
    + Div<float, Output = Self>
    + AddAssign
{
    fn constant(value: float) -> Self;

    /// The real part, with any derivative information dropped.
    fn value(&self) -> float;

    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn atan(self) -> Self;
    fn powi(self, n: i32) -> Self;
}

impl<T: DualNum<float> + Copy> Scalar for T {
    fn constant(value: float) -> Self {
        <T as From<float>>::from(value)
    }

    fn value(&self) -> float {
        <T as DualNum<float>>::re(self)
    }

    fn sin(self) -> Self {
        <T as DualNum<float>>::sin(&self)
    }

    fn cos(self) -> Self {
        <T as DualNum<float>>::cos(&self)
    }

    fn atan(self) -> Self {
        <T as DualNum<float>>::atan(&self)
    }

    fn powi(self, n: i32) -> Self {
        <T as DualNum<float>>::powi(&self, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_dual::Dual64;

    fn cubic<T: Scalar>(x: T) -> T {
        x.powi(3) * 2.0 + x.sin()
    }

    #[test]
    fn scalar_matches_between_floats_and_duals() {
        let x = 0.7;
        let d = cubic(Dual64::new(x, 1.0));
        assert!((d.value() - cubic(x)).abs() < 1e-15);
        // d/dx (2x^3 + sin x) = 6x^2 + cos x
        assert!((d.eps - (6.0 * x * x + x.cos())).abs() < 1e-12);
    }

    #[test]
    fn min_max_tolerate_nan() {
        assert_eq!(min(1.0, 2.0), 1.0);
        assert_eq!(max(1.0, 2.0), 2.0);
        assert!(min(NAN, 2.0).is_nan());
        assert_eq!(max(2.0, NAN), 2.0);
        assert_eq!(clamp(5.0, -1.0, 1.0), 1.0);
    }
}

use control_model::Polynomial;
use prelude::nalgebra::{DMatrix, DVector};
use prelude::*;

/// Expresses world points in the frame of a vehicle at `(px, py)` heading `psi`.
pub fn to_vehicle_frame(points: &[(float, float)], px: float, py: float, psi: float) -> Vec<(float, float)> {
    let (sin, cos) = psi.sin_cos();
    points
        .iter()
        .map(|&(x, y)| {
            let (dx, dy) = (x - px, y - py);
            (dx * cos + dy * sin, -dx * sin + dy * cos)
        })
        .collect()
}

/// Least squares cubic through `points`.
pub fn fit_cubic(points: &[(float, float)]) -> Option<Polynomial> {
    if points.len() < 4 {
        return None;
    }

    let A = DMatrix::from_fn(points.len(), 4, |r, c| points[r].0.powi(c as i32));
    let b = DVector::from_iterator(points.len(), points.iter().map(|p| p.1));
    let coeffs = A.svd(true, true).solve(&b, 1.0e-12).ok()?;

    Polynomial::from_slice(coeffs.as_slice()).filter(Polynomial::is_finite)
}

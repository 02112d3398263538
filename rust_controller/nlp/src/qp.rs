// OSQP wrapper taking `sparse` matrices, with setup and solve timed in the flame graph.

use osqp::{CscMatrix, Problem as InnerProblem, Settings, Status};
use prelude::flame;
use prelude::*;

pub enum QpOutcome {
    /// Primal step and constraint duals. `time_limited` is set when OSQP stopped on its time limit
    /// and returned its current iterate.
    Solved {
        x: Vec<float>,
        y: Vec<float>,
        time_limited: bool,
    },
    PrimalInfeasible,
    Failed(&'static str),
}

pub struct Problem {
    inner: InnerProblem,
}

impl Problem {
    pub fn new(
        P: &sparse::CscMatrix,
        q: &[float],
        A: &sparse::CscMatrix,
        l: &[float],
        u: &[float],
        settings: &Settings,
    ) -> Result<Problem, osqp::SetupError> {
        let _guard = flame::start_guard("osqp setup");
        let inner = InnerProblem::new(convert_sparse(P), q, convert_sparse(A), l, u, settings)?;
        Ok(Problem { inner })
    }

    pub fn solve(&mut self) -> QpOutcome {
        let _guard = flame::start_guard("osqp solve");
        match self.inner.solve() {
            Status::Solved(solution) | Status::SolvedInaccurate(solution) => QpOutcome::Solved {
                x: solution.x().to_vec(),
                y: solution.y().to_vec(),
                time_limited: false,
            },
            Status::TimeLimitReached(solution) => QpOutcome::Solved {
                x: solution.x().to_vec(),
                y: solution.y().to_vec(),
                time_limited: true,
            },
            Status::MaxIterationsReached(solution) => {
                debug!("osqp reached its iteration limit");
                QpOutcome::Solved {
                    x: solution.x().to_vec(),
                    y: solution.y().to_vec(),
                    time_limited: false,
                }
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                QpOutcome::PrimalInfeasible
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                QpOutcome::Failed("dual infeasible")
            }
            Status::NonConvex(_) => QpOutcome::Failed("non convex"),
            _ => QpOutcome::Failed("unknown status"),
        }
    }
}

fn convert_sparse(this: &sparse::CscMatrix) -> CscMatrix {
    let (nrows, ncols) = this.shape();
    CscMatrix {
        nrows,
        ncols,
        indptr: this.indptr().into(),
        indices: this.indices().into(),
        data: this.data().into(),
    }
}

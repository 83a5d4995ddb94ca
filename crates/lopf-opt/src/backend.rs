//! Solver hand-off through `good_lp`.

use good_lp::solvers::ResolutionError;
use good_lp::variable::UnsolvedProblem;
use good_lp::{Constraint, Expression, ProblemVariables, Solution, SolverModel, Variable};
use lopf_core::TerminationStatus;
use std::time::Instant;
use tracing::info;

use crate::config::SolverKind;

pub(crate) struct SolverOutput {
    /// One value per requested column, in order
    pub values: Vec<f64>,
    pub objective: f64,
}

fn termination(err: ResolutionError) -> TerminationStatus {
    match err {
        ResolutionError::Infeasible => TerminationStatus::Infeasible,
        ResolutionError::Unbounded => TerminationStatus::Unbounded,
        other => TerminationStatus::Error(other.to_string()),
    }
}

fn run<S, M>(
    solver: S,
    problem: UnsolvedProblem,
    rows: Vec<Constraint>,
    columns: &[Variable],
    objective: &Expression,
) -> Result<SolverOutput, ResolutionError>
where
    S: FnMut(UnsolvedProblem) -> M,
    M: SolverModel<Error = ResolutionError>,
{
    let mut model = problem.using(solver);
    for row in rows {
        model.add_constraint(row);
    }
    let solution = model.solve()?;
    Ok(SolverOutput {
        values: columns.iter().map(|v| solution.value(*v)).collect(),
        objective: objective.eval_with(&solution),
    })
}

/// Solve with a concrete (already resolved) backend.
pub(crate) fn solve(
    kind: SolverKind,
    vars: ProblemVariables,
    objective: Expression,
    rows: Vec<Constraint>,
    columns: &[Variable],
) -> Result<SolverOutput, TerminationStatus> {
    let start = Instant::now();
    let n_rows = rows.len();
    let problem = vars.minimise(objective.clone());
    let result = match kind {
        #[cfg(feature = "solver-clarabel")]
        SolverKind::Clarabel => run(
            good_lp::solvers::clarabel::clarabel,
            problem,
            rows,
            columns,
            &objective,
        ),
        #[cfg(feature = "solver-microlp")]
        SolverKind::Microlp => run(
            good_lp::solvers::microlp::microlp,
            problem,
            rows,
            columns,
            &objective,
        ),
        #[cfg(feature = "solver-highs")]
        SolverKind::Highs => run(
            good_lp::solvers::highs::highs,
            problem,
            rows,
            columns,
            &objective,
        ),
        other => {
            return Err(TerminationStatus::Error(format!(
                "solver backend '{}' is not available",
                other.as_str()
            )))
        }
    };
    let output = result.map_err(termination)?;
    info!(
        solver = kind.as_str(),
        variables = columns.len(),
        constraints = n_rows,
        objective = output.objective,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "solved optimisation model"
    );
    Ok(output)
}

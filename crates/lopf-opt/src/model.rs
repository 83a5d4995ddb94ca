//! The optimisation model container.
//!
//! A [`Model`] owns the solver variables, named variable groups, named
//! constraint groups and objective terms of one solve cycle. Groups are keyed
//! `"{ComponentType}-{attribute}"`; per-snapshot groups are laid out
//! (snapshot × instance) with `None` cells where an instance is inactive.
//!
//! The model moves through [`ModelState`] in one direction only. A solved
//! model is never rebuilt in place; rolling horizons create a fresh model per
//! window.

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use lopf_core::{ComponentType, LopfError, LopfResult, TerminationStatus};
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend;
use crate::config::SolverKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelState {
    Empty,
    VariablesDefined,
    ConstraintsDefined,
    ObjectiveSet,
    Solved,
    ResultsExtracted,
    Failed,
}

impl ModelState {
    fn successor(self) -> Option<ModelState> {
        match self {
            ModelState::Empty => Some(ModelState::VariablesDefined),
            ModelState::VariablesDefined => Some(ModelState::ConstraintsDefined),
            ModelState::ConstraintsDefined => Some(ModelState::ObjectiveSet),
            ModelState::ObjectiveSet => Some(ModelState::Solved),
            ModelState::Solved => Some(ModelState::ResultsExtracted),
            ModelState::ResultsExtracted | ModelState::Failed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarDomain {
    Continuous,
    Binary,
}

/// A solver variable together with the bounds it was declared with.
#[derive(Debug, Clone, Copy)]
pub struct VarCell {
    pub var: Variable,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone)]
pub struct VariableGroup {
    name: String,
    component: ComponentType,
    attr: String,
    /// Snapshot positions for per-snapshot groups, `None` for per-instance groups
    snapshots: Option<Vec<usize>>,
    columns: Vec<String>,
    domain: VarDomain,
    cells: Vec<Option<VarCell>>,
    solution: Option<Vec<f64>>,
}

impl VariableGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> ComponentType {
        self.component
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn snapshots(&self) -> Option<&[usize]> {
        self.snapshots.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn domain(&self) -> VarDomain {
        self.domain
    }

    pub fn n_rows(&self) -> usize {
        self.snapshots.as_ref().map_or(1, Vec::len)
    }

    /// (rows, columns); per-instance groups have a single row.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.columns.len())
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, r: usize, c: usize) -> Option<&VarCell> {
        self.cells
            .get(r * self.columns.len() + c)
            .and_then(Option::as_ref)
    }

    /// Variable at row `r`, column `c`; `None` where masked.
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> Option<Variable> {
        self.cell(r, c).map(|cell| cell.var)
    }

    /// Variable of `instance` at row `r`.
    pub fn lookup(&self, r: usize, instance: &str) -> Option<Variable> {
        self.column_position(instance).and_then(|c| self.get(r, c))
    }

    /// Number of declared (unmasked) variables.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.cells.iter().flatten().map(|cell| cell.var)
    }

    /// Solved value; `None` before a solve or where masked.
    pub fn value(&self, r: usize, c: usize) -> Option<f64> {
        let idx = r * self.columns.len() + c;
        match (&self.solution, self.cells.get(idx)) {
            (Some(values), Some(Some(_))) => Some(values[idx]),
            _ => None,
        }
    }

    /// Solved values of one column in row order, `fill` where masked.
    pub fn column_values(&self, c: usize, fill: f64) -> Vec<f64> {
        (0..self.n_rows())
            .map(|r| self.value(r, c).unwrap_or(fill))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// One linear row `lhs (<=|>=|==) rhs`.
#[derive(Debug, Clone)]
pub struct ConstraintRow {
    pub snapshot: Option<usize>,
    pub label: String,
    pub lhs: Expression,
    pub sense: Sense,
    pub rhs: f64,
}

impl ConstraintRow {
    pub fn new(
        snapshot: Option<usize>,
        label: impl Into<String>,
        lhs: Expression,
        sense: Sense,
        rhs: f64,
    ) -> Self {
        Self {
            snapshot,
            label: label.into(),
            lhs,
            sense,
            rhs,
        }
    }

    fn to_constraint(&self) -> Constraint {
        let lhs = self.lhs.clone();
        match self.sense {
            Sense::Le => constraint!(lhs <= self.rhs),
            Sense::Ge => constraint!(lhs >= self.rhs),
            Sense::Eq => constraint!(lhs == self.rhs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintGroup {
    name: String,
    rows: Vec<ConstraintRow>,
}

impl ConstraintGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Size summary of a built model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub variable_groups: usize,
    pub variables: usize,
    pub integer_variables: usize,
    pub constraint_groups: usize,
    pub constraints: usize,
}

pub struct Model {
    state: ModelState,
    problem: ProblemVariables,
    variables: Vec<VariableGroup>,
    constraints: Vec<ConstraintGroup>,
    objective: Vec<(String, Expression)>,
    has_integers: bool,
    status: Option<TerminationStatus>,
    objective_value: Option<f64>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("state", &self.state)
            .field("stats", &self.stats())
            .field("status", &self.status)
            .finish()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            state: ModelState::Empty,
            problem: ProblemVariables::new(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: Vec::new(),
            has_integers: false,
            status: None,
            objective_value: None,
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Move to `next`, staying put if already there.
    ///
    /// Only the next state in the build sequence may be entered; `Failed`
    /// and `ResultsExtracted` are terminal.
    pub fn enter(&mut self, next: ModelState) -> LopfResult<()> {
        if next == self.state && self.state.successor().is_some() && next != ModelState::Solved
        {
            return Ok(());
        }
        let legal = self.state.successor() == Some(next)
            || (next == ModelState::Failed && self.state == ModelState::ObjectiveSet);
        if !legal {
            return Err(LopfError::Model(format!(
                "illegal model transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    fn require(&self, allowed: &[ModelState], action: &str) -> LopfResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LopfError::Model(format!(
                "cannot {action} in state {:?}",
                self.state
            )))
        }
    }

    /// Declare a variable group.
    ///
    /// `bounds(r, c)` returns the `(lower, upper)` bounds of a cell or `None`
    /// to mask it. Groups without columns are not created. Returns the
    /// number of declared variables.
    pub fn add_variables(
        &mut self,
        component: ComponentType,
        attr: &str,
        snapshots: Option<&[usize]>,
        columns: Vec<String>,
        domain: VarDomain,
        mut bounds: impl FnMut(usize, usize) -> Option<(f64, f64)>,
    ) -> LopfResult<usize> {
        self.require(
            &[ModelState::Empty, ModelState::VariablesDefined],
            "add variables",
        )?;
        let name = format!("{component}-{attr}");
        if columns.is_empty() {
            return Ok(0);
        }
        if self.variable_group(&name).is_some() {
            return Err(LopfError::Model(format!(
                "variable group '{name}' already exists"
            )));
        }
        self.enter(ModelState::VariablesDefined)?;

        let n_rows = snapshots.map_or(1, <[usize]>::len);
        let mut cells = Vec::with_capacity(n_rows * columns.len());
        for r in 0..n_rows {
            for c in 0..columns.len() {
                let cell = bounds(r, c).map(|(lower, upper)| {
                    let definition = match domain {
                        VarDomain::Binary => variable().binary(),
                        VarDomain::Continuous => variable().min(lower).max(upper),
                    };
                    VarCell {
                        var: self.problem.add(definition),
                        lower,
                        upper,
                    }
                });
                cells.push(cell);
            }
        }
        let count = cells.iter().filter(|c| c.is_some()).count();
        if domain == VarDomain::Binary && count > 0 {
            self.has_integers = true;
        }
        debug!(group = %name, rows = n_rows, columns = columns.len(), count, "defined variables");
        self.variables.push(VariableGroup {
            name,
            component,
            attr: attr.to_string(),
            snapshots: snapshots.map(<[usize]>::to_vec),
            columns,
            domain,
            cells,
            solution: None,
        });
        Ok(count)
    }

    /// Register a named constraint group. Empty groups are skipped.
    pub fn add_constraints(
        &mut self,
        name: impl Into<String>,
        rows: Vec<ConstraintRow>,
    ) -> LopfResult<usize> {
        self.require(
            &[ModelState::VariablesDefined, ModelState::ConstraintsDefined],
            "add constraints",
        )?;
        let name = name.into();
        if rows.is_empty() {
            return Ok(0);
        }
        if self.constraint_group(&name).is_some() {
            return Err(LopfError::Model(format!(
                "constraint group '{name}' already exists"
            )));
        }
        self.enter(ModelState::ConstraintsDefined)?;
        debug!(group = %name, rows = rows.len(), "defined constraints");
        let count = rows.len();
        self.constraints.push(ConstraintGroup { name, rows });
        Ok(count)
    }

    /// Add a labelled term to the (minimised) objective.
    pub fn add_objective(&mut self, label: impl Into<String>, expr: Expression) -> LopfResult<()> {
        self.require(
            &[ModelState::ConstraintsDefined, ModelState::ObjectiveSet],
            "add objective terms",
        )?;
        self.enter(ModelState::ObjectiveSet)?;
        self.objective.push((label.into(), expr));
        Ok(())
    }

    pub fn variable_group(&self, name: &str) -> Option<&VariableGroup> {
        self.variables.iter().find(|g| g.name == name)
    }

    pub fn variable_groups(&self) -> &[VariableGroup] {
        &self.variables
    }

    pub fn constraint_group(&self, name: &str) -> Option<&ConstraintGroup> {
        self.constraints.iter().find(|g| g.name == name)
    }

    pub fn constraint_groups(&self) -> &[ConstraintGroup] {
        &self.constraints
    }

    pub fn objective_labels(&self) -> impl Iterator<Item = &str> {
        self.objective.iter().map(|(label, _)| label.as_str())
    }

    pub fn has_integers(&self) -> bool {
        self.has_integers
    }

    pub fn status(&self) -> Option<&TerminationStatus> {
        self.status.as_ref()
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            variable_groups: self.variables.len(),
            variables: self.variables.iter().map(VariableGroup::count).sum(),
            integer_variables: self
                .variables
                .iter()
                .filter(|g| g.domain == VarDomain::Binary)
                .map(VariableGroup::count)
                .sum(),
            constraint_groups: self.constraints.len(),
            constraints: self.constraints.iter().map(ConstraintGroup::len).sum(),
        }
    }

    /// Hand the model to a solver backend.
    ///
    /// On a non-optimal termination the model moves to `Failed` and the
    /// status is returned as [`LopfError::SolveFailed`]; no values are stored.
    ///
    /// A backend that cannot be resolved for this model (for example Clarabel
    /// with binary variables) is a [`LopfError::Config`] error raised before
    /// anything is handed over. The model stays in `ObjectiveSet` and the
    /// call can be retried with another [`SolverKind`].
    pub fn solve(&mut self, solver: SolverKind) -> LopfResult<f64> {
        self.require(&[ModelState::ObjectiveSet], "solve")?;
        let kind = solver.resolve(self.has_integers)?;

        let objective = self
            .objective
            .iter()
            .fold(Expression::from(0.0), |acc, (_, term)| acc + term.clone());
        let rows: Vec<Constraint> = self
            .constraints
            .iter()
            .flat_map(|g| g.rows.iter().map(ConstraintRow::to_constraint))
            .collect();
        let columns: Vec<Variable> = self
            .variables
            .iter()
            .flat_map(VariableGroup::variables)
            .collect();
        let problem = std::mem::replace(&mut self.problem, ProblemVariables::new());

        match backend::solve(kind, problem, objective, rows, &columns) {
            Ok(output) => {
                let mut values = output.values.into_iter();
                for group in &mut self.variables {
                    let solved = group
                        .cells
                        .iter()
                        .map(|cell| match cell {
                            Some(_) => values.next().unwrap_or(f64::NAN),
                            None => f64::NAN,
                        })
                        .collect();
                    group.solution = Some(solved);
                }
                self.status = Some(TerminationStatus::Optimal);
                self.objective_value = Some(output.objective);
                self.enter(ModelState::Solved)?;
                Ok(output.objective)
            }
            Err(status) => {
                warn!(solver = kind.as_str(), %status, "optimisation did not reach optimality");
                self.status = Some(status.clone());
                self.enter(ModelState::Failed)?;
                Err(LopfError::SolveFailed {
                    message: format!("{} solver terminated with status {status}", kind.as_str()),
                    status,
                })
            }
        }
    }

    /// Mark the solved values as consumed.
    pub fn finish_extraction(&mut self) -> LopfResult<()> {
        self.enter(ModelState::ResultsExtracted)
    }
}

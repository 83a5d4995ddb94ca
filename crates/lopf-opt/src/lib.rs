//! # lopf-opt: Linear optimal power flow model builder
//!
//! Turns a [`lopf_core::Network`] into a linear (or mixed-integer) program,
//! hands it to a `good_lp` backend and writes the optimum back into the
//! network.
//!
//! ## Building blocks
//!
//! | Module | Role |
//! |--------|------|
//! | [`variables`] | Variable families keyed `"{Component}-{attribute}"` |
//! | [`constraints`] | Operational limits, nodal balance, KVL, storage, commitment, ramps, losses |
//! | [`objective`] | Marginal, capital and start-up/shut-down costs |
//! | [`optimize`] | Phase orchestration, solve and result write-back |
//!
//! Builders share a read-only [`BuildContext`] and record into a [`Model`],
//! whose [`ModelState`] only moves forward.
//!
//! Passive branch flow is a single group per component, `Line-s` and
//! `Transformer-s`; there is no `Line-p0` group. [`assign_solution`] writes
//! the flow back as the `p0`/`p1` series (`p0 = s + loss/2`,
//! `p1 = -s + loss/2`), the same names links use for their `p` variable.
//!
//! ## Solver backends
//!
//! Backends are selected through cargo features:
//!
//! - `solver-clarabel` (default): interior point, continuous models only
//! - `solver-microlp` (default): pure Rust simplex with branch and bound
//! - `solver-highs`: HiGHS, needs a C++ toolchain
//!
//! [`SolverKind::Auto`] picks the first available backend able to handle
//! the model (integer unit commitment excludes Clarabel).
//!
//! ## Example
//!
//! ```rust
//! use lopf_core::{Bus, Generator, Line, Load, Network};
//! use lopf_opt::{optimize, OptimizeConfig, SolverKind};
//!
//! let mut network = Network::new();
//! network.set_snapshots(1);
//! network.buses.push(Bus::new("a"));
//! network.buses.push(Bus::new("b"));
//! network
//!     .generators
//!     .push(Generator::new("gas", "a").with_marginal_cost(50.0).extendable(1000.0));
//! network.loads.push(Load::new("city", "b", 100.0));
//! network.lines.push(Line::new("ab", "a", "b", 0.1, 1000.0));
//!
//! let config = OptimizeConfig::default().with_solver(SolverKind::Microlp);
//! let summary = optimize(&mut network, None, &config).unwrap();
//! assert!((summary.objective - 105_000.0).abs() < 1e-3);
//! ```

mod backend;
pub mod config;
pub mod constraints;
pub mod context;
pub mod model;
pub mod objective;
pub mod optimize;
pub mod variables;

pub use config::{OptimizeConfig, RollingHorizonConfig, SolverKind, UnitCommitment};
pub use context::BuildContext;
pub use model::{
    ConstraintGroup, ConstraintRow, Model, ModelState, ModelStats, Sense, VarCell, VarDomain,
    VariableGroup,
};
pub use optimize::{
    assign_solution, build_model, optimize, optimize_with_rolling_horizon, OptimizeSummary,
};

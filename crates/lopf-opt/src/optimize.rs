//! Build, solve and write back a linear optimal power flow.
//!
//! [`build_model`] walks the model through its build phases; [`optimize`]
//! adds network validation, the solve and [`assign_solution`]. Rolling
//! horizons solve consecutive windows with a fresh model each.

use std::time::Instant;

use lopf_core::{
    get_switchable_as_dense, Component, ComponentType, LopfError, LopfResult, Network,
    TerminationStatus, TopologyGraph,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::OptimizeConfig;
use crate::constraints::*;
use crate::context::BuildContext;
use crate::model::{Model, ModelState, ModelStats};
use crate::objective::define_objective;
use crate::variables::*;

/// Operational variables with per-unit limits, in build order.
const OPERATIONAL: [(ComponentType, &str); 8] = [
    (ComponentType::Generator, "p"),
    (ComponentType::Line, "s"),
    (ComponentType::Transformer, "s"),
    (ComponentType::Link, "p"),
    (ComponentType::StorageUnit, "p_dispatch"),
    (ComponentType::StorageUnit, "p_store"),
    (ComponentType::StorageUnit, "state_of_charge"),
    (ComponentType::Store, "e"),
];

/// Outcome of one solved model.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeSummary {
    pub status: TerminationStatus,
    pub objective: f64,
    /// Network snapshot positions covered by the model
    pub snapshots: Vec<usize>,
    pub sub_networks: usize,
    pub warnings: usize,
    pub stats: ModelStats,
    pub solve_time_ms: u64,
}

impl OptimizeSummary {
    pub fn to_json(&self) -> LopfResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| LopfError::Other(e.to_string()))
    }
}

fn check_snapshots(network: &Network, snapshots: &[usize]) -> LopfResult<()> {
    if snapshots.is_empty() {
        return Err(LopfError::Config("no snapshots selected".into()));
    }
    if let Some(&sn) = snapshots.iter().find(|&&sn| sn >= network.snapshots.len()) {
        return Err(LopfError::Data(format!(
            "snapshot {sn} is out of range, the network has {}",
            network.snapshots.len()
        )));
    }
    Ok(())
}

/// Declare every variable, constraint and cost term for `snapshots`.
pub fn build_model(
    network: &Network,
    snapshots: &[usize],
    config: &OptimizeConfig,
) -> LopfResult<Model> {
    let ctx = BuildContext::new(network, snapshots, config);
    let mut model = Model::new();
    let start = Instant::now();

    for (c, attr) in OPERATIONAL {
        define_operational_variables(&ctx, &mut model, c, attr)?;
    }
    define_operational_variables(&ctx, &mut model, ComponentType::Store, "p")?;
    for c in ComponentType::EXTENDABLE {
        if let Some(attr) = c.nominal_attr() {
            define_nominal_variables(&ctx, &mut model, c, attr)?;
        }
    }
    define_status_variables(&ctx, &mut model, ComponentType::Generator)?;
    define_start_up_variables(&ctx, &mut model, ComponentType::Generator)?;
    define_shut_down_variables(&ctx, &mut model, ComponentType::Generator)?;
    define_spillage_variables(&ctx, &mut model)?;
    if config.transmission_losses > 0 {
        for c in ComponentType::PASSIVE_BRANCHES {
            define_loss_variables(&ctx, &mut model, c)?;
        }
    }
    model.enter(ModelState::VariablesDefined)?;

    for c in ComponentType::EXTENDABLE {
        if let Some(attr) = c.nominal_attr() {
            define_nominal_constraints_for_extendables(&ctx, &mut model, c, attr)?;
        }
    }
    for (c, attr) in OPERATIONAL {
        define_operational_constraints_for_non_extendables(&ctx, &mut model, c, attr)?;
        define_operational_constraints_for_extendables(&ctx, &mut model, c, attr)?;
    }
    define_operational_constraints_for_committables(&ctx, &mut model, ComponentType::Generator)?;
    for c in [ComponentType::Generator, ComponentType::Link] {
        define_ramp_limit_constraints(&ctx, &mut model, c, "p")?;
    }
    define_nodal_balance_constraints(&ctx, &mut model)?;
    define_kirchhoff_voltage_constraints(&ctx, &mut model)?;
    define_storage_unit_constraints(&ctx, &mut model)?;
    define_store_constraints(&ctx, &mut model)?;
    if config.transmission_losses > 0 {
        for c in ComponentType::PASSIVE_BRANCHES {
            define_loss_constraints(&ctx, &mut model, c, config.transmission_losses)?;
        }
    }
    model.enter(ModelState::ConstraintsDefined)?;

    define_objective(&ctx, &mut model)?;

    let stats = model.stats();
    info!(
        snapshots = snapshots.len(),
        variables = stats.variables,
        integer_variables = stats.integer_variables,
        constraints = stats.constraints,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "built optimisation model"
    );
    Ok(model)
}

/// Optimise `network` over `snapshots` (all when `None`) and write the
/// results back.
///
/// On a failed solve the network is left untouched and the solver status
/// is returned through [`LopfError::SolveFailed`].
pub fn optimize(
    network: &mut Network,
    snapshots: Option<&[usize]>,
    config: &OptimizeConfig,
) -> LopfResult<OptimizeSummary> {
    config.validate()?;
    let diagnostics = network.validate()?;
    for issue in diagnostics.warnings() {
        warn!(%issue, "network check");
    }
    let snapshots = match snapshots {
        Some(sns) => sns.to_vec(),
        None => network.all_snapshots(),
    };
    check_snapshots(network, &snapshots)?;

    let sub_networks = TopologyGraph::build(network, |_| true).sub_networks().len();
    info!(
        sub_networks,
        snapshots = snapshots.len(),
        multi_invest = config.multi_investment_periods,
        "optimising network"
    );

    let mut model = build_model(network, &snapshots, config)?;
    let start = Instant::now();
    let objective = model.solve(config.solver)?;
    let solve_time_ms = start.elapsed().as_millis() as u64;
    let stats = model.stats();
    assign_solution(network, &mut model)?;

    Ok(OptimizeSummary {
        status: TerminationStatus::Optimal,
        objective,
        snapshots,
        sub_networks,
        warnings: diagnostics.warning_count(),
        stats,
        solve_time_ms,
    })
}

fn write_columns(
    network: &mut Network,
    c: ComponentType,
    attr: &str,
    names: &[String],
    snapshots: &[usize],
    values: impl Fn(usize) -> Vec<f64>,
) {
    for (col, name) in names.iter().enumerate() {
        network.write_series(c, attr, name, snapshots, &values(col));
    }
}

/// Write solved values into the network.
///
/// Every variable group lands in the time-series store under its
/// attribute (masked cells as 0), capacities in the `*_nom_opt` fields.
/// Branch end flows `p0`/`p1` and the net storage unit power `p` are
/// derived from the primary variables.
pub fn assign_solution(network: &mut Network, model: &mut Model) -> LopfResult<()> {
    if model.state() != ModelState::Solved {
        return Err(LopfError::Model(format!(
            "cannot extract results in state {:?}",
            model.state()
        )));
    }

    for group in model.variable_groups() {
        let (c, attr) = (group.component(), group.attr());
        match group.snapshots() {
            Some(sns) => write_columns(network, c, attr, group.columns(), sns, |col| {
                group.column_values(col, 0.0)
            }),
            None => {
                for (col, name) in group.columns().iter().enumerate() {
                    if let Some(value) = group.value(0, col) {
                        network.set_nominal_opt(c, name, value)?;
                    }
                }
            }
        }
        debug!(group = group.name(), "assigned solution");
    }

    for c in ComponentType::EXTENDABLE {
        let Some(attr) = c.nominal_attr() else {
            continue;
        };
        let fixed: Vec<(String, f64)> = network
            .components(c)
            .into_iter()
            .filter(|row| !row.is_extendable())
            .map(|row| (row.name().to_string(), row.static_attr(attr).unwrap_or(0.0)))
            .collect();
        for (name, value) in fixed {
            network.set_nominal_opt(c, &name, value)?;
        }
    }

    for c in ComponentType::PASSIVE_BRANCHES {
        let Some(flow) = model.variable_group(&format!("{c}-s")) else {
            continue;
        };
        let Some(sns) = flow.snapshots() else {
            continue;
        };
        let loss = model.variable_group(&format!("{c}-loss"));
        let half_loss = |col: usize| -> Vec<f64> {
            loss.map_or(vec![0.0; sns.len()], |g| {
                g.column_values(col, 0.0).iter().map(|l| 0.5 * l).collect()
            })
        };
        write_columns(network, c, "p0", flow.columns(), sns, |col| {
            let s = flow.column_values(col, 0.0);
            s.iter().zip(half_loss(col)).map(|(s, l)| s + l).collect()
        });
        write_columns(network, c, "p1", flow.columns(), sns, |col| {
            let s = flow.column_values(col, 0.0);
            s.iter().zip(half_loss(col)).map(|(s, l)| -s + l).collect()
        });
    }

    if let Some(flow) = model.variable_group("Link-p") {
        if let Some(sns) = flow.snapshots() {
            let efficiency =
                get_switchable_as_dense(network, ComponentType::Link, "efficiency", sns, None)?;
            let c = ComponentType::Link;
            write_columns(network, c, "p0", flow.columns(), sns, |col| {
                flow.column_values(col, 0.0)
            });
            write_columns(network, c, "p1", flow.columns(), sns, |col| {
                flow.column_values(col, 0.0)
                    .iter()
                    .enumerate()
                    .map(|(r, p)| -efficiency.get(r, col) * p)
                    .collect()
            });
        }
    }

    if let (Some(dispatch), Some(store)) = (
        model.variable_group("StorageUnit-p_dispatch"),
        model.variable_group("StorageUnit-p_store"),
    ) {
        if let Some(sns) = dispatch.snapshots() {
            write_columns(
                network,
                ComponentType::StorageUnit,
                "p",
                dispatch.columns(),
                sns,
                |col| {
                    dispatch
                        .column_values(col, 0.0)
                        .iter()
                        .zip(store.column_values(col, 0.0))
                        .map(|(d, s)| d - s)
                        .collect()
                },
            );
        }
    }

    network.objective = model.objective_value();
    model.finish_extraction()
}

fn solved_level(
    network: &Network,
    c: ComponentType,
    attr: &str,
    name: &str,
    snapshot: usize,
) -> Option<f64> {
    network
        .series(c, attr)
        .and_then(|s| s.get(name))
        .and_then(|values| values.get(snapshot).copied())
        .filter(|v| v.is_finite())
}

/// Copy the solved state at `snapshot` into the initial storage levels.
fn carry_state(network: &mut Network, snapshot: usize) {
    let view: &Network = network;
    let soc: Vec<Option<f64>> = view
        .storage_units
        .iter()
        .map(|su| solved_level(view, ComponentType::StorageUnit, "state_of_charge", &su.name, snapshot))
        .collect();
    let energy: Vec<Option<f64>> = view
        .stores
        .iter()
        .map(|st| solved_level(view, ComponentType::Store, "e", &st.name, snapshot))
        .collect();

    for (su, value) in network.storage_units.iter_mut().zip(soc) {
        if let Some(value) = value {
            su.state_of_charge_initial = value;
        }
    }
    for (st, value) in network.stores.iter_mut().zip(energy) {
        if let Some(value) = value {
            st.e_initial = value;
        }
    }
}

/// Optimise consecutive windows of `horizon` snapshots overlapping by
/// `overlap`, each with a fresh model.
///
/// Storage levels at the end of one window's non-overlapping part seed
/// the next window; the network objective holds the last window's value.
pub fn optimize_with_rolling_horizon(
    network: &mut Network,
    snapshots: Option<&[usize]>,
    config: &OptimizeConfig,
) -> LopfResult<Vec<OptimizeSummary>> {
    config.validate()?;
    let snapshots = match snapshots {
        Some(sns) => sns.to_vec(),
        None => network.all_snapshots(),
    };
    check_snapshots(network, &snapshots)?;
    let horizon = config.rolling_horizon.horizon;
    let step = horizon - config.rolling_horizon.overlap;

    let mut summaries = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + horizon).min(snapshots.len());
        if start > 0 {
            carry_state(network, snapshots[start - 1]);
        }
        info!(
            window = summaries.len(),
            first = snapshots[start],
            last = snapshots[end - 1],
            "solving rolling horizon window"
        );
        summaries.push(optimize(network, Some(&snapshots[start..end]), config)?);
        if end == snapshots.len() {
            break;
        }
        start += step;
    }
    Ok(summaries)
}

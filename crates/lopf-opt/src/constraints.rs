//! Constraint definition engine.
//!
//! Operational variable groups span every instance of their component in
//! table order, so column `i` of `Generator-p` is `network.generators[i]`.
//! Subset groups (nominal, commitment, spillage) are looked up by name.
//!
//! Builders read variable groups from the model and never fail on a missing
//! group: an absent group contributes nothing.

use std::collections::{BTreeMap, HashMap};

use good_lp::{Expression, Variable};
use lopf_core::graph_utils::passive_branches;
use lopf_core::{Component, ComponentType, DenseTable, LopfError, LopfResult, TopologyGraph};
use tracing::debug;

use crate::context::BuildContext;
use crate::model::{ConstraintRow, Model, Sense, VariableGroup};

fn group_name(c: ComponentType, attr: &str) -> String {
    format!("{c}-{attr}")
}

#[derive(Default)]
struct LowerUpper {
    lower: Vec<ConstraintRow>,
    upper: Vec<ConstraintRow>,
}

impl LowerUpper {
    fn add_to(self, model: &mut Model, prefix: &str) -> LopfResult<usize> {
        Ok(model.add_constraints(format!("{prefix}-lower"), self.lower)?
            + model.add_constraints(format!("{prefix}-upper"), self.upper)?)
    }
}

/// Per-unit lower and upper limits of an operational variable.
fn bounds_pu(
    ctx: &BuildContext,
    c: ComponentType,
    attr: &str,
) -> LopfResult<(DenseTable, DenseTable)> {
    use ComponentType::*;
    match (c, attr) {
        (Generator | Link, "p") => Ok((
            ctx.dense(c, "p_min_pu", None)?,
            ctx.dense(c, "p_max_pu", None)?,
        )),
        (Line | Transformer, "s") => {
            let max = ctx.dense(c, "s_max_pu", None)?;
            Ok((max.map(|v| -v), max))
        }
        (StorageUnit, "p_dispatch") => {
            let max = ctx.dense(c, "p_max_pu", None)?;
            Ok((max.map(|_| 0.0), max))
        }
        (StorageUnit, "p_store") => {
            let min = ctx.dense(c, "p_min_pu", None)?;
            Ok((min.map(|_| 0.0), min.map(|v| -v)))
        }
        (StorageUnit, "state_of_charge") => {
            let hours = ctx.dense(c, "max_hours", None)?;
            Ok((hours.map(|_| 0.0), hours))
        }
        (Store, "e") => Ok((
            ctx.dense(c, "e_min_pu", None)?,
            ctx.dense(c, "e_max_pu", None)?,
        )),
        _ => Err(LopfError::Model(format!(
            "no operational limits are defined for {c}-{attr}"
        ))),
    }
}

fn nominal_attr(c: ComponentType) -> LopfResult<&'static str> {
    c.nominal_attr()
        .ok_or_else(|| LopfError::Model(format!("{c} has no nominal capacity")))
}

/// Last solved value before the first selected snapshot, if any.
fn previous_value(ctx: &BuildContext, c: ComponentType, attr: &str, name: &str) -> Option<f64> {
    let prev = ctx.snapshots.first()?.checked_sub(1)?;
    ctx.network
        .series(c, attr)?
        .get(name)?
        .get(prev)
        .copied()
        .filter(|v| v.is_finite())
}

/// `{c}-ext-{nom}-lower/upper`: bounds of extendable capacities.
pub fn define_nominal_constraints_for_extendables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
) -> LopfResult<usize> {
    let Some(nom) = model.variable_group(&group_name(c, attr)) else {
        return Ok(0);
    };
    let mut rows = LowerUpper::default();
    for (col, name) in nom.columns().iter().enumerate() {
        let (Some(var), Some(row)) = (nom.get(0, col), ctx.network.component(c, name)) else {
            continue;
        };
        let min = row.static_attr(&format!("{attr}_min")).unwrap_or(0.0);
        let max = row
            .static_attr(&format!("{attr}_max"))
            .unwrap_or(f64::INFINITY);
        rows.lower
            .push(ConstraintRow::new(None, name, Expression::from(var), Sense::Ge, min));
        if max.is_finite() {
            rows.upper
                .push(ConstraintRow::new(None, name, Expression::from(var), Sense::Le, max));
        }
    }
    rows.add_to(model, &format!("{c}-ext-{attr}"))
}

/// Loss variable of a passive branch cell, if losses are modelled.
fn loss_var(loss: Option<&VariableGroup>, r: usize, col: usize) -> Option<Variable> {
    loss.and_then(|g| g.get(r, col))
}

fn with_loss(var: Variable, loss: Option<Variable>, sign: f64) -> Expression {
    let mut expr = Expression::from(var);
    if let Some(l) = loss {
        expr += sign * l;
    }
    expr
}

/// `{c}-fix-{attr}-lower/upper`: limits of instances with fixed capacity.
///
/// Committable instances are left to the commitment constraints.
pub fn define_operational_constraints_for_non_extendables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
) -> LopfResult<usize> {
    let Some(group) = model.variable_group(&group_name(c, attr)) else {
        return Ok(0);
    };
    let nom_attr = nominal_attr(c)?;
    let (min_pu, max_pu) = bounds_pu(ctx, c, attr)?;
    let loss = model.variable_group(&group_name(c, "loss"));
    let mut rows = LowerUpper::default();
    for (col, row) in ctx.network.components(c).into_iter().enumerate() {
        if row.is_extendable() || row.is_committable() {
            continue;
        }
        let nom = row.static_attr(nom_attr).unwrap_or(0.0);
        for r in 0..ctx.n_snapshots() {
            let Some(var) = group.get(r, col) else {
                continue;
            };
            let sn = Some(ctx.snapshots[r]);
            let l = loss_var(loss, r, col);
            rows.lower.push(ConstraintRow::new(
                sn,
                row.name(),
                with_loss(var, l, -1.0),
                Sense::Ge,
                min_pu.get(r, col) * nom,
            ));
            rows.upper.push(ConstraintRow::new(
                sn,
                row.name(),
                with_loss(var, l, 1.0),
                Sense::Le,
                max_pu.get(r, col) * nom,
            ));
        }
    }
    rows.add_to(model, &format!("{c}-fix-{attr}"))
}

/// `{c}-ext-{attr}-lower/upper`: limits scaled by the capacity variable.
pub fn define_operational_constraints_for_extendables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
) -> LopfResult<usize> {
    let nom_attr = nominal_attr(c)?;
    let (Some(group), Some(nom)) = (
        model.variable_group(&group_name(c, attr)),
        model.variable_group(&group_name(c, nom_attr)),
    ) else {
        return Ok(0);
    };
    let (min_pu, max_pu) = bounds_pu(ctx, c, attr)?;
    let loss = model.variable_group(&group_name(c, "loss"));
    let mut rows = LowerUpper::default();
    for (col, row) in ctx.network.components(c).into_iter().enumerate() {
        let Some(capacity) = nom.lookup(0, row.name()) else {
            continue;
        };
        for r in 0..ctx.n_snapshots() {
            let Some(var) = group.get(r, col) else {
                continue;
            };
            let sn = Some(ctx.snapshots[r]);
            let l = loss_var(loss, r, col);
            let lower = with_loss(var, l, -1.0) - *min_pu.get(r, col) * capacity;
            let upper = with_loss(var, l, 1.0) - *max_pu.get(r, col) * capacity;
            rows.lower
                .push(ConstraintRow::new(sn, row.name(), lower, Sense::Ge, 0.0));
            rows.upper
                .push(ConstraintRow::new(sn, row.name(), upper, Sense::Le, 0.0));
        }
    }
    rows.add_to(model, &format!("{c}-ext-{attr}"))
}

/// Unit commitment: dispatch limits scaled by status, status transitions
/// and minimum up/down times.
pub fn define_operational_constraints_for_committables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
) -> LopfResult<usize> {
    let (Some(p), Some(status), Some(start_up), Some(shut_down)) = (
        model.variable_group(&group_name(c, "p")),
        model.variable_group(&group_name(c, "status")),
        model.variable_group(&group_name(c, "start_up")),
        model.variable_group(&group_name(c, "shut_down")),
    ) else {
        return Ok(0);
    };
    let min_pu = ctx.dense(c, "p_min_pu", None)?;
    let max_pu = ctx.dense(c, "p_max_pu", None)?;
    let n = ctx.n_snapshots();

    let mut limits = LowerUpper::default();
    let mut transition = Vec::new();
    let mut up_time = Vec::new();
    let mut up_time_before = Vec::new();
    let mut down_time = Vec::new();

    for (col, row) in ctx.network.components(c).into_iter().enumerate() {
        let name = row.name();
        let Some(sc) = status.column_position(name) else {
            continue;
        };
        let p_nom = row.static_attr("p_nom").unwrap_or(0.0);
        let min_up = row.static_attr("min_up_time").unwrap_or(0.0) as usize;
        let min_down = row.static_attr("min_down_time").unwrap_or(0.0) as usize;
        let before = row.static_attr("up_time_before").unwrap_or(0.0) as usize;
        let initially_up = previous_value(ctx, c, "status", name)
            .map(|v| v > 0.5)
            .unwrap_or(before > 0);

        for r in 0..n {
            let (Some(s), Some(su), Some(sd)) = (
                status.get(r, sc),
                start_up.get(r, sc),
                shut_down.get(r, sc),
            ) else {
                continue;
            };
            let sn = Some(ctx.snapshots[r]);

            if let Some(var) = p.get(r, col) {
                let lower = Expression::from(var) - *min_pu.get(r, col) * p_nom * s;
                let upper = Expression::from(var) - *max_pu.get(r, col) * p_nom * s;
                limits
                    .lower
                    .push(ConstraintRow::new(sn, name, lower, Sense::Ge, 0.0));
                limits
                    .upper
                    .push(ConstraintRow::new(sn, name, upper, Sense::Le, 0.0));
            }

            // status[t] - status[t-1] = start_up[t] - shut_down[t]
            let link = Expression::from(s) - su + sd;
            if r == 0 {
                let initial = if initially_up { 1.0 } else { 0.0 };
                transition.push(ConstraintRow::new(sn, name, link, Sense::Eq, initial));
            } else if let Some(prev) = status.get(r - 1, sc) {
                transition.push(ConstraintRow::new(sn, name, link - prev, Sense::Eq, 0.0));
            }

            if min_up > 0 {
                let mut window = Expression::from(0.0);
                for k in r.saturating_sub(min_up - 1)..=r {
                    if let Some(v) = start_up.get(k, sc) {
                        window += v;
                    }
                }
                up_time.push(ConstraintRow::new(sn, name, window - s, Sense::Le, 0.0));
            }
            if min_down > 0 {
                let mut window = Expression::from(0.0);
                for k in r.saturating_sub(min_down - 1)..=r {
                    if let Some(v) = shut_down.get(k, sc) {
                        window += v;
                    }
                }
                down_time.push(ConstraintRow::new(sn, name, window + s, Sense::Le, 1.0));
            }
            if initially_up && before > 0 && r + before < min_up {
                up_time_before.push(ConstraintRow::new(
                    sn,
                    name,
                    Expression::from(s),
                    Sense::Ge,
                    1.0,
                ));
            }
        }
    }

    let mut count = limits.add_to(model, &format!("{c}-com-p"))?;
    count += model.add_constraints(format!("{c}-com-transition"), transition)?;
    count += model.add_constraints(format!("{c}-com-up-time"), up_time)?;
    count += model.add_constraints(format!("{c}-com-up-time-before"), up_time_before)?;
    count += model.add_constraints(format!("{c}-com-down-time"), down_time)?;
    Ok(count)
}

/// `{c}-{fix|ext|com}-{attr}-ramp_limit_up/down` between consecutive
/// snapshots in which the instance is active.
pub fn define_ramp_limit_constraints(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
) -> LopfResult<usize> {
    let nom_attr = nominal_attr(c)?;
    let Some(p) = model.variable_group(&group_name(c, attr)) else {
        return Ok(0);
    };
    let nom = model.variable_group(&group_name(c, nom_attr));
    let status = model.variable_group(&group_name(c, "status"));
    let n = ctx.n_snapshots();

    let mut rows: BTreeMap<(&str, &str), Vec<ConstraintRow>> = BTreeMap::new();
    for (col, row) in ctx.network.components(c).into_iter().enumerate() {
        let name = row.name();
        let up = row.static_attr("ramp_limit_up").unwrap_or(f64::NAN);
        let down = row.static_attr("ramp_limit_down").unwrap_or(f64::NAN);
        if up.is_nan() && down.is_nan() {
            continue;
        }
        let p_nom = row.static_attr(nom_attr).unwrap_or(0.0);
        let capacity = nom.and_then(|g| g.lookup(0, name));
        let sc = status.and_then(|g| g.column_position(name));

        for r in 0..n {
            let Some(cur) = p.get(r, col) else {
                continue;
            };
            let sn = Some(ctx.snapshots[r]);
            // dispatch change since the previous snapshot, constant part on the right
            let (delta, offset) = if r > 0 {
                match p.get(r - 1, col) {
                    Some(prev) => (Expression::from(cur) - prev, 0.0),
                    None => continue,
                }
            } else {
                match previous_value(ctx, c, attr, name) {
                    Some(prev) if sc.is_none() => (Expression::from(cur), prev),
                    _ => continue,
                }
            };

            match (sc, capacity) {
                (Some(sc), _) => {
                    let (Some(status), true) = (status, r > 0) else {
                        continue;
                    };
                    let (Some(s), Some(s_prev)) = (status.get(r, sc), status.get(r - 1, sc))
                    else {
                        continue;
                    };
                    let start = row.static_attr("ramp_limit_start_up").unwrap_or(1.0);
                    let shut = row.static_attr("ramp_limit_shut_down").unwrap_or(1.0);
                    if !up.is_nan() {
                        let lhs = delta.clone() - up * p_nom * s_prev - start * p_nom * s
                            + start * p_nom * s_prev;
                        rows.entry(("com", "up"))
                            .or_default()
                            .push(ConstraintRow::new(sn, name, lhs, Sense::Le, 0.0));
                    }
                    if !down.is_nan() {
                        let lhs = delta + down * p_nom * s + shut * p_nom * s_prev
                            - shut * p_nom * s;
                        rows.entry(("com", "down"))
                            .or_default()
                            .push(ConstraintRow::new(sn, name, lhs, Sense::Ge, 0.0));
                    }
                }
                (None, Some(capacity)) => {
                    if !up.is_nan() {
                        rows.entry(("ext", "up")).or_default().push(ConstraintRow::new(
                            sn,
                            name,
                            delta.clone() - up * capacity,
                            Sense::Le,
                            offset,
                        ));
                    }
                    if !down.is_nan() {
                        rows.entry(("ext", "down")).or_default().push(ConstraintRow::new(
                            sn,
                            name,
                            delta + down * capacity,
                            Sense::Ge,
                            offset,
                        ));
                    }
                }
                (None, None) => {
                    if !up.is_nan() {
                        rows.entry(("fix", "up")).or_default().push(ConstraintRow::new(
                            sn,
                            name,
                            delta.clone(),
                            Sense::Le,
                            offset + up * p_nom,
                        ));
                    }
                    if !down.is_nan() {
                        rows.entry(("fix", "down")).or_default().push(ConstraintRow::new(
                            sn,
                            name,
                            delta,
                            Sense::Ge,
                            offset - down * p_nom,
                        ));
                    }
                }
            }
        }
    }

    let mut count = 0;
    for ((kind, direction), group) in rows {
        count += model.add_constraints(
            format!("{c}-{kind}-{attr}-ramp_limit_{direction}"),
            group,
        )?;
    }
    Ok(count)
}

/// `Bus-nodal_balance`: injections equal withdrawals at every bus and snapshot.
pub fn define_nodal_balance_constraints(ctx: &BuildContext, model: &mut Model) -> LopfResult<usize> {
    let network = ctx.network;
    let bus_index: HashMap<&str, usize> = network
        .buses
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();
    let n_bus = network.buses.len();
    let group = |c: ComponentType, attr: &str| model.variable_group(&group_name(c, attr));

    let load = ctx.dense(ComponentType::Load, "p_set", None)?;
    let link_eff = ctx.dense(ComponentType::Link, "efficiency", None)?;

    let mut rows = Vec::new();
    for r in 0..ctx.n_snapshots() {
        let mut lhs: Vec<Option<Expression>> = vec![None; n_bus];
        let mut rhs = vec![0.0; n_bus];
        let mut add = |bus: &str, coef: f64, var: Option<Variable>| {
            if let (Some(&b), Some(v)) = (bus_index.get(bus), var) {
                *lhs[b].get_or_insert_with(|| Expression::from(0.0)) += coef * v;
            }
        };

        if let Some(p) = group(ComponentType::Generator, "p") {
            for (col, gen) in network.generators.iter().enumerate() {
                add(&gen.bus, 1.0, p.get(r, col));
            }
        }
        let dispatch = group(ComponentType::StorageUnit, "p_dispatch");
        let store = group(ComponentType::StorageUnit, "p_store");
        for (col, su) in network.storage_units.iter().enumerate() {
            add(&su.bus, 1.0, dispatch.and_then(|g| g.get(r, col)));
            add(&su.bus, -1.0, store.and_then(|g| g.get(r, col)));
        }
        if let Some(p) = group(ComponentType::Store, "p") {
            for (col, st) in network.stores.iter().enumerate() {
                add(&st.bus, 1.0, p.get(r, col));
            }
        }
        if let Some(p) = group(ComponentType::Link, "p") {
            for (col, link) in network.links.iter().enumerate() {
                add(&link.bus0, -1.0, p.get(r, col));
                add(&link.bus1, *link_eff.get(r, col), p.get(r, col));
            }
        }
        for c in ComponentType::PASSIVE_BRANCHES {
            let s = group(c, "s");
            let loss = group(c, "loss");
            let branches = match c {
                ComponentType::Line => network.lines.iter().collect::<Vec<_>>(),
                _ => network.transformers.iter().map(|t| &t.0).collect(),
            };
            for (col, branch) in branches.into_iter().enumerate() {
                let flow = s.and_then(|g| g.get(r, col));
                let l = loss.and_then(|g| g.get(r, col));
                add(&branch.bus0, -1.0, flow);
                add(&branch.bus1, 1.0, flow);
                add(&branch.bus0, -0.5, l);
                add(&branch.bus1, -0.5, l);
            }
        }
        for (col, l) in network.loads.iter().enumerate() {
            if let Some(&b) = bus_index.get(l.bus.as_str()) {
                rhs[b] += *load.get(r, col);
            }
        }

        for (b, bus) in network.buses.iter().enumerate() {
            let expr = match lhs[b].take() {
                Some(expr) => expr,
                None if rhs[b] != 0.0 => Expression::from(0.0),
                None => continue,
            };
            rows.push(ConstraintRow::new(
                Some(ctx.snapshots[r]),
                &bus.name,
                expr,
                Sense::Eq,
                rhs[b],
            ));
        }
    }
    model.add_constraints("Bus-nodal_balance", rows)
}

/// `Kirchhoff-Voltage-Law`: the reactance-weighted flow around every
/// independent cycle of the passive branch graph is zero.
///
/// In multi-period mode the cycles of each period are computed from the
/// branches active in that period.
pub fn define_kirchhoff_voltage_constraints(
    ctx: &BuildContext,
    model: &mut Model,
) -> LopfResult<usize> {
    let network = ctx.network;
    let periods: Vec<Option<i64>> = if ctx.multi_invest() {
        ctx.periods().into_iter().map(Some).collect()
    } else {
        vec![None]
    };

    let mut rows = Vec::new();
    for period in periods {
        let topology = TopologyGraph::build(network, |b| match period {
            None => true,
            Some(p) => network
                .component(b.component, &b.name)
                .is_some_and(|row| row.lifecycle().is_active_in(p)),
        });
        let cycles = topology.cycle_basis();
        debug!(?period, cycles = cycles.len(), "computed cycle basis");
        if cycles.is_empty() {
            continue;
        }
        // (group, column) of every branch in the topology
        let columns: Vec<Option<(&VariableGroup, usize)>> = topology
            .branches
            .iter()
            .map(|b| {
                model
                    .variable_group(&group_name(b.component, "s"))
                    .and_then(|g| g.column_position(&b.name).map(|col| (g, col)))
            })
            .collect();

        for r in (0..ctx.n_snapshots()).filter(|&r| period.is_none() || ctx.period(r) == period) {
            'cycles: for (k, cycle) in cycles.iter().enumerate() {
                let mut expr = Expression::from(0.0);
                for edge in cycle {
                    let branch = &topology.branches[edge.branch];
                    let Some(var) = columns[edge.branch].and_then(|(g, col)| g.get(r, col)) else {
                        continue 'cycles;
                    };
                    expr += edge.direction * branch.x_pu * var;
                }
                let label = match period {
                    Some(p) => format!("{p}-cycle-{k}"),
                    None => format!("cycle-{k}"),
                };
                rows.push(ConstraintRow::new(
                    Some(ctx.snapshots[r]),
                    label,
                    expr,
                    Sense::Eq,
                    0.0,
                ));
            }
        }
    }
    model.add_constraints("Kirchhoff-Voltage-Law", rows)
}

enum Previous {
    Row(usize),
    Initial,
}

/// Where the state of row `r` comes from.
fn previous_state(ctx: &BuildContext, r: usize, cyclic: bool) -> Previous {
    let n = ctx.n_snapshots();
    if r > 0 && !ctx.starts_period(r) {
        return Previous::Row(r - 1);
    }
    let per_period = ctx.multi_invest();
    if cyclic {
        if per_period && ctx.config.cyclic_state_of_charge_per_period {
            let end = (r..n)
                .take_while(|&k| ctx.period(k) == ctx.period(r))
                .last()
                .unwrap_or(r);
            return Previous::Row(end);
        }
        return Previous::Row(if r == 0 { n - 1 } else { r - 1 });
    }
    if r == 0 || (per_period && ctx.config.state_of_charge_initial_per_period) {
        Previous::Initial
    } else {
        Previous::Row(r - 1)
    }
}

/// `StorageUnit-energy_balance`:
/// `soc = (1-standing_loss)^w soc_prev + eff_store w p_store - w/eff_dispatch p_dispatch + w inflow - w spill`.
pub fn define_storage_unit_constraints(
    ctx: &BuildContext,
    model: &mut Model,
) -> LopfResult<usize> {
    let c = ComponentType::StorageUnit;
    let (Some(soc), Some(dispatch), Some(store)) = (
        model.variable_group(&group_name(c, "state_of_charge")),
        model.variable_group(&group_name(c, "p_dispatch")),
        model.variable_group(&group_name(c, "p_store")),
    ) else {
        return Ok(0);
    };
    let spill = model.variable_group(&group_name(c, "spill"));
    let standing = ctx.dense(c, "standing_loss", None)?;
    let inflow = ctx.dense(c, "inflow", None)?;

    let mut rows = Vec::new();
    for (col, su) in ctx.network.storage_units.iter().enumerate() {
        let spill_col = spill.and_then(|g| g.column_position(&su.name));
        let initial = su.state_of_charge_initial;
        for r in 0..ctx.n_snapshots() {
            let Some(level) = soc.get(r, col) else {
                continue;
            };
            let w = ctx.weightings(r).stores;
            let retained = (1.0 - standing.get(r, col)).powf(w);

            let mut lhs = -1.0 * level;
            if let Some(v) = store.get(r, col) {
                lhs += su.efficiency_store * w * v;
            }
            if let Some(v) = dispatch.get(r, col) {
                lhs += -(w / su.efficiency_dispatch) * v;
            }
            if let Some(v) = spill_col.and_then(|sc| spill.and_then(|g| g.get(r, sc))) {
                lhs += -w * v;
            }
            let mut rhs = -w * inflow.get(r, col);

            match previous_state(ctx, r, su.cyclic_state_of_charge) {
                Previous::Row(prev) => match soc.get(prev, col) {
                    Some(v) => lhs += retained * v,
                    None if !su.cyclic_state_of_charge => rhs -= retained * initial,
                    None => {}
                },
                Previous::Initial => rhs -= retained * initial,
            }
            rows.push(ConstraintRow::new(
                Some(ctx.snapshots[r]),
                &su.name,
                lhs,
                Sense::Eq,
                rhs,
            ));
        }
    }
    model.add_constraints("StorageUnit-energy_balance", rows)
}

/// `Store-energy_balance`: `e = (1-standing_loss)^w e_prev - w p`.
pub fn define_store_constraints(ctx: &BuildContext, model: &mut Model) -> LopfResult<usize> {
    let c = ComponentType::Store;
    let (Some(energy), Some(power)) = (
        model.variable_group(&group_name(c, "e")),
        model.variable_group(&group_name(c, "p")),
    ) else {
        return Ok(0);
    };
    let standing = ctx.dense(c, "standing_loss", None)?;

    let mut rows = Vec::new();
    for (col, st) in ctx.network.stores.iter().enumerate() {
        let initial = st.e_initial;
        for r in 0..ctx.n_snapshots() {
            let Some(e) = energy.get(r, col) else {
                continue;
            };
            let w = ctx.weightings(r).stores;
            let retained = (1.0 - standing.get(r, col)).powf(w);
            let mut lhs = -1.0 * e;
            if let Some(p) = power.get(r, col) {
                lhs += -w * p;
            }
            let mut rhs = 0.0;
            match previous_state(ctx, r, st.e_cyclic) {
                Previous::Row(prev) => match energy.get(prev, col) {
                    Some(v) => lhs += retained * v,
                    None if !st.e_cyclic => rhs -= retained * initial,
                    None => {}
                },
                Previous::Initial => rhs -= retained * initial,
            }
            rows.push(ConstraintRow::new(
                Some(ctx.snapshots[r]),
                &st.name,
                lhs,
                Sense::Eq,
                rhs,
            ));
        }
    }
    model.add_constraints("Store-energy_balance", rows)
}

/// Piecewise-linear outer approximation of `loss = r * s^2`.
///
/// `{c}-loss_upper` caps the loss at the maximum flow; each of the
/// `tangents` segments adds `{c}-loss_tangents-{k}-{sign}` for both flow
/// directions.
pub fn define_loss_constraints(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    tangents: usize,
) -> LopfResult<usize> {
    if tangents == 0 {
        return Ok(0);
    }
    let (Some(loss), Some(flow)) = (
        model.variable_group(&group_name(c, "loss")),
        model.variable_group(&group_name(c, "s")),
    ) else {
        return Ok(0);
    };
    let s_max_pu = ctx.dense(c, "s_max_pu", None)?;
    let branches: Vec<_> = passive_branches(ctx.network)
        .into_iter()
        .filter(|b| b.component == c)
        .collect();
    let rows_of = ctx.network.components(c);

    let mut upper = Vec::new();
    let mut segments: BTreeMap<(usize, i8), Vec<ConstraintRow>> = BTreeMap::new();
    for (col, (branch, row)) in branches.iter().zip(rows_of).enumerate() {
        let s_nom_max = if row.is_extendable() {
            row.static_attr("s_nom_max")
        } else {
            row.static_attr("s_nom")
        }
        .unwrap_or(f64::INFINITY);
        if !s_nom_max.is_finite() {
            return Err(LopfError::Config(format!(
                "loss approximation requires a finite s_nom_max for {c} '{}'",
                branch.name
            )));
        }
        for r in 0..ctx.n_snapshots() {
            let (Some(l), Some(s)) = (loss.get(r, col), flow.get(r, col)) else {
                continue;
            };
            let sn = Some(ctx.snapshots[r]);
            let cap = s_max_pu.get(r, col) * s_nom_max;
            upper.push(ConstraintRow::new(
                sn,
                &branch.name,
                Expression::from(l),
                Sense::Le,
                branch.r_pu * cap * cap,
            ));
            for k in 1..=tangents {
                let p_k = k as f64 / tangents as f64 * cap;
                let slope = 2.0 * branch.r_pu * p_k;
                let offset = branch.r_pu * p_k * p_k - slope * p_k;
                for sign in [-1i8, 1] {
                    let lhs = Expression::from(l) - f64::from(sign) * slope * s;
                    segments.entry((k, sign)).or_default().push(ConstraintRow::new(
                        sn,
                        &branch.name,
                        lhs,
                        Sense::Ge,
                        offset,
                    ));
                }
            }
        }
    }

    let mut count = model.add_constraints(format!("{c}-loss_upper"), upper)?;
    for ((k, sign), group) in segments {
        count += model.add_constraints(format!("{c}-loss_tangents-{k}-{sign}"), group)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizeConfig;
    use crate::variables::{
        define_loss_variables, define_operational_variables, define_shut_down_variables,
        define_start_up_variables, define_status_variables,
    };
    use lopf_core::{Bus, Generator, Load, Network, PassiveBranch};

    fn network(snapshots: usize) -> Network {
        let mut n = Network::new();
        n.set_snapshots(snapshots);
        for bus in ["a", "b", "c"] {
            n.buses.push(Bus::new(bus));
        }
        n
    }

    fn rhs_of(model: &Model, group: &str) -> Vec<f64> {
        model
            .constraint_group(group)
            .map(|g| g.rows().iter().map(|r| r.rhs).collect())
            .unwrap_or_default()
    }

    #[test]
    fn fixed_limits_scale_with_nominal_power() {
        let mut n = network(2);
        let mut gen = Generator::new("g", "a").with_p_nom(10.0);
        gen.p_max_pu = 0.8;
        gen.p_min_pu = 0.1;
        n.generators.push(gen);
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        let count = define_operational_constraints_for_non_extendables(
            &ctx,
            &mut model,
            ComponentType::Generator,
            "p",
        )
        .unwrap();
        assert_eq!(count, 4);
        assert_eq!(rhs_of(&model, "Generator-fix-p-upper"), vec![8.0, 8.0]);
        assert_eq!(rhs_of(&model, "Generator-fix-p-lower"), vec![1.0, 1.0]);
        assert!(model.constraint_group("Generator-ext-p-upper").is_none());
    }

    #[test]
    fn nodal_balance_keeps_unserved_demand_and_skips_empty_buses() {
        let mut n = network(1);
        n.generators.push(Generator::new("g", "a").with_p_nom(10.0));
        n.loads.push(Load::new("d", "b", 5.0));
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        assert_eq!(define_nodal_balance_constraints(&ctx, &mut model).unwrap(), 2);
        let group = model.constraint_group("Bus-nodal_balance").unwrap();
        let labels: Vec<&str> = group.rows().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(group.rows()[1].rhs, 5.0);
    }

    #[test]
    fn triangle_has_one_voltage_law_row_per_snapshot() {
        let mut n = network(3);
        n.lines.push(PassiveBranch::new("ab", "a", "b", 0.1, 100.0));
        n.lines.push(PassiveBranch::new("bc", "b", "c", 0.2, 100.0));
        n.lines.push(PassiveBranch::new("ca", "c", "a", 0.3, 100.0));
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Line, "s").unwrap();
        assert_eq!(define_kirchhoff_voltage_constraints(&ctx, &mut model).unwrap(), 3);
        let group = model.constraint_group("Kirchhoff-Voltage-Law").unwrap();
        assert!(group.rows().iter().all(|r| r.sense == Sense::Eq && r.rhs == 0.0));
    }

    #[test]
    fn voltage_law_follows_period_topology() {
        let mut n = network(2);
        n.lines.push(PassiveBranch::new("ab", "a", "b", 0.1, 100.0));
        n.lines.push(PassiveBranch::new("bc", "b", "c", 0.2, 100.0));
        n.lines
            .push(PassiveBranch::new("ca", "c", "a", 0.3, 100.0).with_lifecycle(2040, 30.0));
        n.set_investment_periods(&[2030, 2040]).unwrap();
        let config = OptimizeConfig::default().with_multi_investment_periods(true);
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Line, "s").unwrap();
        // the loop only closes once "ca" is built
        assert_eq!(define_kirchhoff_voltage_constraints(&ctx, &mut model).unwrap(), 2);
        let group = model.constraint_group("Kirchhoff-Voltage-Law").unwrap();
        assert!(group.rows().iter().all(|r| r.label.starts_with("2040")));
    }

    #[test]
    fn storage_state_wraps_per_period() {
        let mut n = network(3);
        n.set_investment_periods(&[2030, 2040]).unwrap();
        let sns = n.all_snapshots();
        let config = OptimizeConfig::default().with_multi_investment_periods(true);
        let ctx = BuildContext::new(&n, &sns, &config);
        assert!(matches!(previous_state(&ctx, 0, true), Previous::Row(2)));
        assert!(matches!(previous_state(&ctx, 3, true), Previous::Row(5)));
        assert!(matches!(previous_state(&ctx, 4, true), Previous::Row(3)));
        assert!(matches!(previous_state(&ctx, 3, false), Previous::Initial));

        let single = OptimizeConfig::default();
        let ctx = BuildContext::new(&n, &sns, &single);
        assert!(matches!(previous_state(&ctx, 0, true), Previous::Row(5)));
        assert!(matches!(previous_state(&ctx, 3, false), Previous::Row(2)));
        assert!(matches!(previous_state(&ctx, 0, false), Previous::Initial));
    }

    #[test]
    fn commitment_rows_cover_every_active_snapshot() {
        let mut n = network(4);
        let mut gen = Generator::new("coal", "a").with_p_nom(100.0).committable();
        gen.p_min_pu = 0.3;
        gen.min_up_time = 2;
        gen.up_time_before = 0;
        n.generators.push(gen);
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        let c = ComponentType::Generator;
        define_operational_variables(&ctx, &mut model, c, "p").unwrap();
        define_status_variables(&ctx, &mut model, c).unwrap();
        define_start_up_variables(&ctx, &mut model, c).unwrap();
        define_shut_down_variables(&ctx, &mut model, c).unwrap();
        define_operational_constraints_for_committables(&ctx, &mut model, c).unwrap();

        for group in [
            "Generator-com-p-lower",
            "Generator-com-p-upper",
            "Generator-com-transition",
            "Generator-com-up-time",
        ] {
            assert_eq!(model.constraint_group(group).map(|g| g.len()), Some(4), "{group}");
        }
        assert!(model.constraint_group("Generator-com-down-time").is_none());
        assert!(model.constraint_group("Generator-com-up-time-before").is_none());
        // initially off
        assert_eq!(rhs_of(&model, "Generator-com-transition")[0], 0.0);
        assert!(model.constraint_group("Generator-fix-p-upper").is_none());
    }

    #[test]
    fn ramp_limits_skip_the_first_snapshot_without_history() {
        let mut n = network(3);
        let mut gen = Generator::new("g", "a").with_p_nom(50.0);
        gen.ramp_limit_up = Some(0.5);
        n.generators.push(gen);
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        let count =
            define_ramp_limit_constraints(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        assert_eq!(count, 2);
        assert_eq!(rhs_of(&model, "Generator-fix-p-ramp_limit_up"), vec![25.0, 25.0]);
        assert!(model
            .constraint_group("Generator-fix-p-ramp_limit_down")
            .is_none());
    }

    fn snapshots_of(model: &Model, group: &str) -> Vec<Option<usize>> {
        model
            .constraint_group(group)
            .map(|g| g.rows().iter().map(|r| r.snapshot).collect())
            .unwrap_or_default()
    }

    /// Two snapshots repeated over 2030 and 2040, with a unit built in 2040.
    fn late_unit_network(gen: Generator) -> Network {
        let mut n = network(2);
        n.generators.push(gen.with_lifecycle(2040, 30.0));
        n.set_investment_periods(&[2030, 2040]).unwrap();
        n
    }

    #[test]
    fn ramp_limits_only_link_active_snapshots() {
        let mut gen = Generator::new("late", "a").with_p_nom(50.0);
        gen.ramp_limit_up = Some(0.5);
        let n = late_unit_network(gen);
        let config = OptimizeConfig::default().with_multi_investment_periods(true);
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        let count =
            define_ramp_limit_constraints(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        // snapshot 2 opens 2040 and follows an inactive snapshot
        assert_eq!(count, 1);
        assert_eq!(
            snapshots_of(&model, "Generator-fix-p-ramp_limit_up"),
            vec![Some(3)]
        );
        assert_eq!(rhs_of(&model, "Generator-fix-p-ramp_limit_up"), vec![25.0]);
    }

    #[test]
    fn commitment_transitions_only_link_active_snapshots() {
        let mut gen = Generator::new("late", "a").with_p_nom(100.0).committable();
        gen.p_min_pu = 0.3;
        let n = late_unit_network(gen);
        let config = OptimizeConfig::default().with_multi_investment_periods(true);
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        let c = ComponentType::Generator;
        define_operational_variables(&ctx, &mut model, c, "p").unwrap();
        define_status_variables(&ctx, &mut model, c).unwrap();
        define_start_up_variables(&ctx, &mut model, c).unwrap();
        define_shut_down_variables(&ctx, &mut model, c).unwrap();
        define_operational_constraints_for_committables(&ctx, &mut model, c).unwrap();

        assert_eq!(
            snapshots_of(&model, "Generator-com-p-upper"),
            vec![Some(2), Some(3)]
        );
        assert_eq!(
            snapshots_of(&model, "Generator-com-transition"),
            vec![Some(3)]
        );
    }

    #[test]
    fn losses_need_a_finite_capacity() {
        let mut n = network(1);
        n.lines.push(
            PassiveBranch::new("ab", "a", "b", 0.1, 100.0)
                .with_resistance(0.01)
                .extendable(10.0, f64::INFINITY),
        );
        let config = OptimizeConfig::default().with_transmission_losses(2);
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Line, "s").unwrap();
        define_loss_variables(&ctx, &mut model, ComponentType::Line).unwrap();
        let err = define_loss_constraints(&ctx, &mut model, ComponentType::Line, 2).unwrap_err();
        assert!(matches!(err, LopfError::Config(_)));
    }

    #[test]
    fn loss_tangents_are_grouped_by_segment_and_sign() {
        let mut n = network(2);
        n.lines
            .push(PassiveBranch::new("ab", "a", "b", 0.1, 100.0).with_resistance(0.01));
        let config = OptimizeConfig::default().with_transmission_losses(2);
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Line, "s").unwrap();
        define_loss_variables(&ctx, &mut model, ComponentType::Line).unwrap();
        let count = define_loss_constraints(&ctx, &mut model, ComponentType::Line, 2).unwrap();
        assert_eq!(count, 2 + 2 * 2 * 2);
        let r_pu = passive_branches(&n)[0].r_pu;
        assert_eq!(rhs_of(&model, "Line-loss_upper"), vec![r_pu * 1e4; 2]);
        for name in [
            "Line-loss_tangents-1--1",
            "Line-loss_tangents-1-1",
            "Line-loss_tangents-2--1",
            "Line-loss_tangents-2-1",
        ] {
            assert!(model.constraint_group(name).is_some(), "{name}");
        }
        // the outermost tangent touches the parabola at full flow
        let offset = rhs_of(&model, "Line-loss_tangents-2-1")[0];
        assert!((offset + r_pu * 1e4).abs() < 1e-9);
    }
}

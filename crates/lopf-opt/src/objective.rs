//! Total system cost.
//!
//! Operational costs are weighted by the objective weighting of each
//! snapshot and the discount weight of its period. Capital costs are
//! charged once per extendable asset, scaled in multi-period mode by the
//! weight of every period the asset operates in.

use good_lp::Expression;
use lopf_core::{Component, ComponentType, LopfResult};
use tracing::debug;

use crate::context::BuildContext;
use crate::model::Model;

/// Operational variables that carry a marginal cost.
const PRICED: [(ComponentType, &str); 4] = [
    (ComponentType::Generator, "p"),
    (ComponentType::Link, "p"),
    (ComponentType::StorageUnit, "p_dispatch"),
    (ComponentType::Store, "p"),
];

fn add_term(model: &mut Model, label: String, expr: Expression, terms: usize) -> LopfResult<usize> {
    if terms == 0 {
        return Ok(0);
    }
    debug!(%label, terms, "objective term");
    model.add_objective(label, expr)?;
    Ok(1)
}

fn marginal_costs(ctx: &BuildContext, model: &mut Model) -> LopfResult<usize> {
    let mut added = 0;
    for (c, attr) in PRICED {
        let Some(group) = model.variable_group(&format!("{c}-{attr}")) else {
            continue;
        };
        let cost = ctx.dense(c, "marginal_cost", None)?;
        let mut expr = Expression::from(0.0);
        let mut terms = 0;
        for r in 0..ctx.n_snapshots() {
            let weight = ctx.weightings(r).objective * ctx.period_weight(r);
            for col in 0..group.columns().len() {
                let mc = *cost.get(r, col);
                if mc == 0.0 {
                    continue;
                }
                if let Some(var) = group.get(r, col) {
                    expr += weight * mc * var;
                    terms += 1;
                }
            }
        }
        added += add_term(model, format!("{c}-{attr}-marginal_cost"), expr, terms)?;
    }
    Ok(added)
}

/// Sum of period weights over which `row` operates (1 in single-period mode).
fn capital_weight(ctx: &BuildContext, row: &dyn Component) -> f64 {
    if !ctx.multi_invest() {
        return 1.0;
    }
    ctx.periods()
        .into_iter()
        .filter(|&p| row.lifecycle().is_active_in(p))
        .filter_map(|p| ctx.network.investment_period(p))
        .map(|p| p.objective_weight)
        .sum()
}

fn capital_costs(ctx: &BuildContext, model: &mut Model) -> LopfResult<usize> {
    let mut added = 0;
    for c in ComponentType::EXTENDABLE {
        let Some(attr) = c.nominal_attr() else {
            continue;
        };
        let Some(group) = model.variable_group(&format!("{c}-{attr}")) else {
            continue;
        };
        let mut expr = Expression::from(0.0);
        let mut terms = 0;
        for (col, name) in group.columns().iter().enumerate() {
            let (Some(var), Some(row)) = (group.get(0, col), ctx.network.component(c, name)) else {
                continue;
            };
            let cost = row.static_attr("capital_cost").unwrap_or(0.0) * capital_weight(ctx, row);
            if cost != 0.0 {
                expr += cost * var;
                terms += 1;
            }
        }
        added += add_term(model, format!("{c}-{attr}-capital_cost"), expr, terms)?;
    }
    Ok(added)
}

fn commitment_costs(ctx: &BuildContext, model: &mut Model) -> LopfResult<usize> {
    let c = ComponentType::Generator;
    let mut added = 0;
    for (attr, cost_attr) in [("start_up", "start_up_cost"), ("shut_down", "shut_down_cost")] {
        let Some(group) = model.variable_group(&format!("{c}-{attr}")) else {
            continue;
        };
        let mut expr = Expression::from(0.0);
        let mut terms = 0;
        for (col, name) in group.columns().iter().enumerate() {
            let cost = ctx
                .network
                .component(c, name)
                .and_then(|row| row.static_attr(cost_attr))
                .unwrap_or(0.0);
            if cost == 0.0 {
                continue;
            }
            for r in 0..ctx.n_snapshots() {
                if let Some(var) = group.get(r, col) {
                    expr += ctx.period_weight(r) * cost * var;
                    terms += 1;
                }
            }
        }
        added += add_term(model, format!("{c}-{attr}-{cost_attr}"), expr, terms)?;
    }
    Ok(added)
}

/// Assemble the objective from all cost terms. A model without any cost
/// gets a zero objective so it can still be solved as a feasibility problem.
pub fn define_objective(ctx: &BuildContext, model: &mut Model) -> LopfResult<usize> {
    let added =
        marginal_costs(ctx, model)? + capital_costs(ctx, model)? + commitment_costs(ctx, model)?;
    if added == 0 {
        model.add_objective("constant", Expression::from(0.0))?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizeConfig;
    use crate::model::{ConstraintRow, ModelState, Sense};
    use crate::variables::{
        define_nominal_variables, define_operational_variables, define_start_up_variables,
    };
    use lopf_core::{Bus, Generator, Network};

    fn prepare(model: &mut Model) {
        // objectives need a constrained model
        let var = model.variable_groups()[0].get(0, 0).unwrap();
        model
            .add_constraints(
                "test",
                vec![ConstraintRow::new(None, "x", Expression::from(var), Sense::Ge, 0.0)],
            )
            .unwrap();
    }

    #[test]
    fn cost_terms_are_labelled_by_group() {
        let mut n = Network::new();
        n.set_snapshots(2);
        n.buses.push(Bus::new("b"));
        n.generators.push(
            Generator::new("gas", "b")
                .with_marginal_cost(50.0)
                .extendable(1000.0),
        );
        let mut coal = Generator::new("coal", "b").with_p_nom(10.0).committable();
        coal.start_up_cost = 30.0;
        n.generators.push(coal);
        n.generators.push(Generator::new("wind", "b").with_p_nom(5.0));

        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        let c = ComponentType::Generator;
        define_operational_variables(&ctx, &mut model, c, "p").unwrap();
        define_nominal_variables(&ctx, &mut model, c, "p_nom").unwrap();
        define_start_up_variables(&ctx, &mut model, c).unwrap();
        prepare(&mut model);

        assert_eq!(define_objective(&ctx, &mut model).unwrap(), 3);
        let labels: Vec<&str> = model.objective_labels().collect();
        assert_eq!(
            labels,
            vec![
                "Generator-p-marginal_cost",
                "Generator-p_nom-capital_cost",
                "Generator-start_up-start_up_cost",
            ]
        );
        assert_eq!(model.state(), ModelState::ObjectiveSet);
    }

    #[test]
    fn cost_free_models_get_a_constant_objective() {
        let mut n = Network::new();
        n.set_snapshots(1);
        n.buses.push(Bus::new("b"));
        n.generators.push(Generator::new("wind", "b").with_p_nom(5.0));
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        define_operational_variables(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        prepare(&mut model);
        assert_eq!(define_objective(&ctx, &mut model).unwrap(), 0);
        assert_eq!(model.objective_labels().collect::<Vec<_>>(), vec!["constant"]);
    }

    #[test]
    fn capital_cost_weight_counts_active_periods() {
        let mut n = Network::new();
        n.set_snapshots(1);
        n.set_investment_periods(&[2030, 2040, 2050]).unwrap();
        for (period, weight) in n.investment_periods.iter_mut().zip([10.0, 5.0, 2.0]) {
            period.objective_weight = weight;
        }
        let config = OptimizeConfig::default().with_multi_investment_periods(true);
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let late = Generator::new("late", "b").with_lifecycle(2040, 20.0);
        assert_eq!(capital_weight(&ctx, &late), 7.0);
        let always = Generator::new("always", "b");
        assert_eq!(capital_weight(&ctx, &always), 17.0);

        let single = OptimizeConfig::default();
        let ctx = BuildContext::new(&n, &sns, &single);
        assert_eq!(capital_weight(&ctx, &late), 1.0);
    }
}

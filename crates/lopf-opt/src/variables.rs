//! Variable definition engine.
//!
//! One function per variable family. Every function returns the number of
//! variables it declared and is a no-op when its component subset is empty,
//! so calling it on a network without e.g. committable generators leaves the
//! model untouched.

use lopf_core::{ComponentType, LopfResult};
use tracing::debug;

use crate::config::UnitCommitment;
use crate::context::BuildContext;
use crate::model::{Model, VarDomain};

const FREE: (f64, f64) = (f64::NEG_INFINITY, f64::INFINITY);

/// Per-snapshot variables for `subset`, masked by activity.
fn define_masked(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
    subset: Vec<String>,
    domain: VarDomain,
    bounds: (f64, f64),
) -> LopfResult<usize> {
    if subset.is_empty() {
        return Ok(0);
    }
    let mask = ctx.mask(c, Some(&subset))?;
    model.add_variables(c, attr, Some(ctx.snapshots), subset, domain, |r, col| {
        mask.is_active(r, col).then_some(bounds)
    })
}

/// Continuous (snapshot × instance) variables for all instances of `c`.
pub fn define_operational_variables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
) -> LopfResult<usize> {
    let names = ctx.network.instance_names(c);
    define_masked(ctx, model, c, attr, names, VarDomain::Continuous, FREE)
}

fn define_commitment_variables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
) -> LopfResult<usize> {
    let domain = match ctx.unit_commitment() {
        UnitCommitment::Integer => VarDomain::Binary,
        UnitCommitment::Linearized => VarDomain::Continuous,
    };
    let committable = ctx.network.get_committable_i(c);
    define_masked(ctx, model, c, attr, committable, domain, (0.0, 1.0))
}

/// On/off status of committable instances.
pub fn define_status_variables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
) -> LopfResult<usize> {
    define_commitment_variables(ctx, model, c, "status")
}

pub fn define_start_up_variables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
) -> LopfResult<usize> {
    define_commitment_variables(ctx, model, c, "start_up")
}

pub fn define_shut_down_variables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
) -> LopfResult<usize> {
    define_commitment_variables(ctx, model, c, "shut_down")
}

/// One free capacity variable per extendable instance.
///
/// Bounds are imposed separately by the nominal-bound constraints.
pub fn define_nominal_variables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
    attr: &str,
) -> LopfResult<usize> {
    let extendable = ctx.network.get_extendable_i(c);
    if extendable.is_empty() {
        return Ok(0);
    }
    model.add_variables(c, attr, None, extendable, VarDomain::Continuous, |_, _| {
        Some(FREE)
    })
}

/// Spillage of storage units, bounded by the available inflow.
///
/// Only units with a positive inflow somewhere are included and cells
/// without inflow are masked. Nothing is created when no unit ever has
/// inflow.
pub fn define_spillage_variables(ctx: &BuildContext, model: &mut Model) -> LopfResult<usize> {
    let c = ComponentType::StorageUnit;
    if ctx.network.is_empty(c) {
        return Ok(0);
    }
    let inflow = ctx.dense(c, "inflow", None)?;
    let max_inflow = inflow.column_max();
    let positions: Vec<usize> = (0..inflow.n_columns())
        .filter(|&col| max_inflow[col] > 0.0)
        .collect();
    if positions.is_empty() {
        debug!("no storage unit has inflow, skipping spillage variables");
        return Ok(0);
    }
    let upper = inflow.select_columns(&positions);
    let subset = upper.columns().to_vec();
    let mask = ctx.mask(c, Some(&subset))?;
    model.add_variables(
        c,
        "spill",
        Some(ctx.snapshots),
        subset,
        VarDomain::Continuous,
        |r, col| {
            let bound = *upper.get(r, col);
            (bound > 0.0 && mask.is_active(r, col)).then_some((0.0, bound))
        },
    )
}

/// Non-negative linearised losses of passive branches. Other component
/// types have no losses and declare nothing.
pub fn define_loss_variables(
    ctx: &BuildContext,
    model: &mut Model,
    c: ComponentType,
) -> LopfResult<usize> {
    if !c.is_passive_branch() {
        return Ok(0);
    }
    let names = ctx.network.instance_names(c);
    define_masked(
        ctx,
        model,
        c,
        "loss",
        names,
        VarDomain::Continuous,
        (0.0, f64::INFINITY),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizeConfig;
    use crate::model::ModelState;
    use lopf_core::{Bus, Generator, Network, StorageUnit};

    fn network() -> Network {
        let mut n = Network::new();
        n.set_snapshots(4);
        n.buses.push(Bus::new("b"));
        n.generators.push(Generator::new("g", "b").with_p_nom(10.0));
        n.storage_units.push(StorageUnit::new("dry", "b", 5.0, 2.0));
        n.storage_units.push(StorageUnit::new("hydro", "b", 5.0, 2.0));
        n
    }

    #[test]
    fn empty_subsets_are_idempotent_no_ops() {
        let n = network();
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        for _ in 0..2 {
            assert_eq!(
                define_nominal_variables(&ctx, &mut model, ComponentType::Generator, "p_nom")
                    .unwrap(),
                0
            );
            assert_eq!(
                define_status_variables(&ctx, &mut model, ComponentType::Generator).unwrap(),
                0
            );
            assert_eq!(
                define_start_up_variables(&ctx, &mut model, ComponentType::Generator).unwrap(),
                0
            );
            assert_eq!(
                define_shut_down_variables(&ctx, &mut model, ComponentType::Generator).unwrap(),
                0
            );
            assert_eq!(define_spillage_variables(&ctx, &mut model).unwrap(), 0);
            assert_eq!(
                define_loss_variables(&ctx, &mut model, ComponentType::Line).unwrap(),
                0
            );
        }
        assert_eq!(model.stats().variables, 0);
        assert!(model.variable_groups().is_empty());
    }

    #[test]
    fn spillage_is_bounded_by_inflow() {
        let mut n = network();
        n.set_series(ComponentType::StorageUnit, "inflow", "hydro", vec![0.0, 0.0, 5.0, 0.0])
            .unwrap();
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        assert_eq!(define_spillage_variables(&ctx, &mut model).unwrap(), 1);

        let spill = model.variable_group("StorageUnit-spill").unwrap();
        assert_eq!(spill.columns(), &["hydro".to_string()]);
        for r in 0..4 {
            match spill.cell(r, 0) {
                Some(cell) => {
                    assert_eq!(r, 2);
                    assert_eq!((cell.lower, cell.upper), (0.0, 5.0));
                }
                None => assert_ne!(r, 2),
            }
        }
    }

    #[test]
    fn commitment_domain_follows_mode() {
        let mut n = network();
        n.generators.push(Generator::new("coal", "b").with_p_nom(50.0).committable());
        let sns = n.all_snapshots();
        for (mode, domain) in [
            (UnitCommitment::Integer, VarDomain::Binary),
            (UnitCommitment::Linearized, VarDomain::Continuous),
        ] {
            let config = OptimizeConfig::default().with_unit_commitment(mode);
            let ctx = BuildContext::new(&n, &sns, &config);
            let mut model = Model::new();
            define_status_variables(&ctx, &mut model, ComponentType::Generator).unwrap();
            define_start_up_variables(&ctx, &mut model, ComponentType::Generator).unwrap();
            define_shut_down_variables(&ctx, &mut model, ComponentType::Generator).unwrap();
            for attr in ["status", "start_up", "shut_down"] {
                let group = model
                    .variable_group(&format!("Generator-{attr}"))
                    .unwrap();
                assert_eq!(group.domain(), domain);
                assert_eq!(group.shape(), (4, 1));
                let cell = group.cell(0, 0).unwrap();
                assert_eq!((cell.lower, cell.upper), (0.0, 1.0));
            }
            assert_eq!(model.has_integers(), mode == UnitCommitment::Integer);
        }
    }

    #[test]
    fn operational_variables_respect_activity() {
        let mut n = network();
        n.generators[0] = Generator::new("g", "b").with_lifecycle(2040, 10.0);
        n.set_investment_periods(&[2030, 2040]).unwrap();
        let config = OptimizeConfig::default().with_multi_investment_periods(true);
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        let count =
            define_operational_variables(&ctx, &mut model, ComponentType::Generator, "p").unwrap();
        assert_eq!(count, 4);
        let p = model.variable_group("Generator-p").unwrap();
        assert_eq!(p.shape(), (8, 1));
        assert!(p.get(3, 0).is_none());
        assert!(p.get(4, 0).is_some());
    }

    #[test]
    fn loss_variables_skip_links() {
        let n = network();
        let config = OptimizeConfig::default();
        let sns = n.all_snapshots();
        let ctx = BuildContext::new(&n, &sns, &config);
        let mut model = Model::new();
        let count = define_loss_variables(&ctx, &mut model, ComponentType::Link).unwrap();
        assert_eq!(count, 0);
        assert!(model.variable_group("Link-loss").is_none());
        assert_eq!(model.state(), ModelState::Empty);
    }
}

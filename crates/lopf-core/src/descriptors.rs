//! Attribute descriptors: activity masks and switchable attribute resolution.
//!
//! Model builders never branch on whether an attribute is static or
//! time-varying, nor on whether multi-period investment is enabled. They ask
//! this module for a uniform [`DenseTable`] or an [`ActivityMask`].

use crate::components::{Component, ComponentType};
use crate::error::{LopfError, LopfResult};
use crate::network::Network;
use crate::table::{BoolTable, DenseTable, Table};

/// Whether instances are active in each snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityMask {
    /// Single-period mode: every instance is always active
    Always,
    /// Multi-period mode: (snapshot, instance) activity from build year and lifetime
    Mask(BoolTable),
}

impl ActivityMask {
    /// Activity of the cell at row position `r`, column position `c`.
    #[inline]
    pub fn is_active(&self, r: usize, c: usize) -> bool {
        match self {
            ActivityMask::Always => true,
            ActivityMask::Mask(table) => *table.get(r, c),
        }
    }

    /// Combine with an additional condition, materialising the mask.
    pub fn restrict(&self, other: &BoolTable) -> BoolTable {
        match self {
            ActivityMask::Always => other.clone(),
            ActivityMask::Mask(table) => table.and(other),
        }
    }
}

/// Value of one attribute of one instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Switchable<'a> {
    Static(f64),
    /// One value per network snapshot
    TimeVarying(&'a [f64]),
}

impl Switchable<'_> {
    /// Value at a network snapshot position.
    #[inline]
    pub fn at(&self, snapshot: usize) -> f64 {
        match self {
            Switchable::Static(v) => *v,
            Switchable::TimeVarying(series) => series[snapshot],
        }
    }
}

fn select<'n>(
    network: &'n Network,
    c: ComponentType,
    subset: Option<&[String]>,
) -> LopfResult<Vec<&'n dyn Component>> {
    let all = network.components(c);
    match subset {
        None => Ok(all),
        Some(names) => names
            .iter()
            .map(|name| {
                all.iter()
                    .copied()
                    .find(|r| r.name() == name)
                    .ok_or_else(|| LopfError::Data(format!("{c} '{name}' does not exist")))
            })
            .collect(),
    }
}

fn snapshot_period(network: &Network, sn: usize) -> LopfResult<i64> {
    let snapshot = network.snapshots.get(sn).ok_or_else(|| {
        LopfError::Config(format!(
            "snapshot position {sn} is out of range ({} snapshots)",
            network.snapshots.len()
        ))
    })?;
    let period = snapshot.period.ok_or_else(|| {
        LopfError::Config(format!(
            "multi-period investment requires a period for snapshot '{}'",
            snapshot.timestep
        ))
    })?;
    if network.investment_period(period).is_none() {
        return Err(LopfError::Config(format!(
            "snapshot '{}' refers to undeclared investment period {period}",
            snapshot.timestep
        )));
    }
    Ok(period)
}

/// Activity of `subset` (or all instances of `c`) in the given snapshots.
///
/// An instance is active iff `build_year <= period < build_year + lifetime`.
/// Fails with a configuration error when a snapshot has no valid period.
pub fn get_activity_mask(
    network: &Network,
    c: ComponentType,
    sns: &[usize],
    subset: Option<&[String]>,
) -> LopfResult<BoolTable> {
    let rows = select(network, c, subset)?;
    let periods = sns
        .iter()
        .map(|&sn| snapshot_period(network, sn))
        .collect::<LopfResult<Vec<_>>>()?;
    let columns = rows.iter().map(|r| r.name().to_string()).collect();
    let lifecycles: Vec<_> = rows.iter().map(|r| r.lifecycle()).collect();
    Ok(Table::from_fn(sns.to_vec(), columns, |r, col| {
        lifecycles[col].is_active_in(periods[r])
    }))
}

/// Activity mask honouring the multi-period investment flag.
pub fn activity_mask(
    network: &Network,
    c: ComponentType,
    sns: &[usize],
    subset: Option<&[String]>,
    multi_invest: bool,
) -> LopfResult<ActivityMask> {
    if multi_invest {
        get_activity_mask(network, c, sns, subset).map(ActivityMask::Mask)
    } else {
        Ok(ActivityMask::Always)
    }
}

/// Resolve one attribute of one instance to its static or time-varying value.
pub fn switchable<'n>(
    network: &'n Network,
    c: ComponentType,
    row: &dyn Component,
    attr: &str,
) -> LopfResult<Switchable<'n>> {
    if let Some(series) = network.series(c, attr).and_then(|s| s.get(row.name())) {
        if series.len() != network.snapshots.len() {
            return Err(LopfError::Data(format!(
                "series {c}-{attr} for '{}' does not match the snapshots",
                row.name()
            )));
        }
        return Ok(Switchable::TimeVarying(series));
    }
    row.static_attr(attr).map(Switchable::Static).ok_or_else(|| {
        LopfError::Data(format!(
            "attribute '{attr}' is neither static nor time-varying for component type {c}"
        ))
    })
}

/// Dense (snapshot × instance) table of an attribute that may be static or
/// time-varying per instance.
pub fn get_switchable_as_dense(
    network: &Network,
    c: ComponentType,
    attr: &str,
    sns: &[usize],
    subset: Option<&[String]>,
) -> LopfResult<DenseTable> {
    if let Some(&bad) = sns.iter().find(|&&sn| sn >= network.snapshots.len()) {
        return Err(LopfError::Data(format!(
            "snapshot position {bad} is out of range ({} snapshots)",
            network.snapshots.len()
        )));
    }
    let rows = select(network, c, subset)?;
    let values = rows
        .iter()
        .map(|&row| switchable(network, c, row, attr))
        .collect::<LopfResult<Vec<_>>>()?;
    let columns = rows.iter().map(|r| r.name().to_string()).collect();
    Ok(Table::from_fn(sns.to_vec(), columns, |r, col| {
        values[col].at(sns[r])
    }))
}

/// Static attribute for each instance of `subset` (or all instances).
pub fn get_static(
    network: &Network,
    c: ComponentType,
    attr: &str,
    subset: Option<&[String]>,
) -> LopfResult<Vec<f64>> {
    select(network, c, subset)?
        .iter()
        .map(|row| {
            row.static_attr(attr).ok_or_else(|| {
                LopfError::Data(format!("attribute '{attr}' is not static for {c}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Generator, StorageUnit};
    use crate::network::Network;

    fn network() -> Network {
        let mut n = Network::new();
        n.set_snapshots(3);
        n.generators.push(Generator::new("old", "b").with_lifecycle(2020, 15.0));
        n.generators.push(Generator::new("new", "b").with_lifecycle(2035, 30.0));
        n
    }

    #[test]
    fn static_attribute_is_broadcast() {
        let mut n = network();
        n.generators[0].p_max_pu = 0.7;
        let t = get_switchable_as_dense(&n, ComponentType::Generator, "p_max_pu", &[0, 2], None)
            .unwrap();
        assert_eq!(t.shape(), (2, 2));
        assert_eq!(t.rows(), &[0, 2]);
        for r in 0..2 {
            assert_eq!(t.row(r), &[0.7, 1.0]);
        }
    }

    #[test]
    fn time_varying_attribute_is_returned_unchanged() {
        let mut n = network();
        n.set_series(ComponentType::Generator, "p_max_pu", "new", vec![0.1, 0.5, 0.9])
            .unwrap();
        let t = get_switchable_as_dense(
            &n,
            ComponentType::Generator,
            "p_max_pu",
            &[0, 1, 2],
            Some(&["new".to_string()]),
        )
        .unwrap();
        assert_eq!(t.column(0).copied().collect::<Vec<_>>(), vec![0.1, 0.5, 0.9]);

        let mixed =
            get_switchable_as_dense(&n, ComponentType::Generator, "p_max_pu", &[1], None).unwrap();
        assert_eq!(mixed.row(0), &[1.0, 0.5]);
    }

    #[test]
    fn missing_attribute_is_a_data_error() {
        let n = network();
        let err = get_switchable_as_dense(&n, ComponentType::Generator, "inflow", &[0], None)
            .unwrap_err();
        match err {
            LopfError::Data(msg) => {
                assert!(msg.contains("inflow"));
                assert!(msg.contains("Generator"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        let unknown = get_switchable_as_dense(
            &n,
            ComponentType::Generator,
            "p_max_pu",
            &[0],
            Some(&["ghost".to_string()]),
        );
        assert!(matches!(unknown, Err(LopfError::Data(_))));
    }

    #[test]
    fn empty_component_table_resolves_to_zero_width() {
        let n = network();
        let t = get_switchable_as_dense(&n, ComponentType::StorageUnit, "inflow", &[0, 1], None)
            .unwrap();
        assert_eq!(t.shape(), (2, 0));
    }

    #[test]
    fn activity_mask_follows_build_year_and_lifetime() {
        let mut n = network();
        n.set_investment_periods(&[2030, 2040, 2050]).unwrap();
        let sns = n.all_snapshots();
        let mask = get_activity_mask(&n, ComponentType::Generator, &sns, None).unwrap();
        for (r, &sn) in sns.iter().enumerate() {
            let period = n.snapshots[sn].period.unwrap();
            assert_eq!(*mask.get(r, 0), (2020..2035).contains(&period));
            assert_eq!(*mask.get(r, 1), (2035..2065).contains(&period));
        }
    }

    #[test]
    fn activity_mask_respects_subset_and_flag() {
        let mut n = network();
        n.set_investment_periods(&[2030, 2040]).unwrap();
        let subset = vec!["new".to_string()];
        let mask = activity_mask(&n, ComponentType::Generator, &[0, 3], Some(&subset), true)
            .unwrap();
        let ActivityMask::Mask(table) = &mask else {
            panic!("expected a mask");
        };
        assert_eq!(table.columns(), &subset[..]);
        assert!(!mask.is_active(0, 0));
        assert!(mask.is_active(1, 0));

        let off = activity_mask(&n, ComponentType::Generator, &[0], None, false).unwrap();
        assert_eq!(off, ActivityMask::Always);
        assert!(off.is_active(0, 1));
    }

    #[test]
    fn multi_invest_without_periods_fails_fast() {
        let n = network();
        let err = get_activity_mask(&n, ComponentType::Generator, &[0], None).unwrap_err();
        assert!(matches!(err, LopfError::Config(_)));

        let mut undeclared = network();
        undeclared.snapshots[0].period = Some(2030);
        let err = get_activity_mask(&undeclared, ComponentType::Generator, &[0], None).unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn static_lookup_covers_subsets() {
        let mut n = network();
        n.storage_units.push(StorageUnit::new("hydro", "b", 10.0, 6.0));
        let hours = get_static(&n, ComponentType::StorageUnit, "max_hours", None).unwrap();
        assert_eq!(hours, vec![6.0]);
    }
}

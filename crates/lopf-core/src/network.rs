//! The network container: component tables, snapshots and time series.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::components::{
    Bus, Component, ComponentType, Generator, Line, Link, Load, StorageUnit, Store, Transformer,
};
use crate::diagnostics::Diagnostics;
use crate::error::{LopfError, LopfResult};

/// Per-snapshot weightings (hours represented by the snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weightings {
    /// Weight of operational costs in the objective
    pub objective: f64,
    /// Elapsed hours for storage state-of-charge updates
    pub stores: f64,
    /// Elapsed hours for generator energy accounting
    pub generators: f64,
}

impl Default for Weightings {
    fn default() -> Self {
        Self {
            objective: 1.0,
            stores: 1.0,
            generators: 1.0,
        }
    }
}

impl Weightings {
    pub fn uniform(hours: f64) -> Self {
        Self {
            objective: hours,
            stores: hours,
            generators: hours,
        }
    }
}

/// One discrete time step of the optimisation horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Investment period the snapshot belongs to (multi-period planning only)
    pub period: Option<i64>,
    pub timestep: String,
    pub weightings: Weightings,
}

impl Snapshot {
    pub fn new(timestep: impl Into<String>) -> Self {
        Self {
            period: None,
            timestep: timestep.into(),
            weightings: Weightings::default(),
        }
    }

    pub fn in_period(mut self, period: i64) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_weightings(mut self, weightings: Weightings) -> Self {
        self.weightings = weightings;
        self
    }
}

/// A planning period with its objective weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPeriod {
    pub period: i64,
    /// Discounted weight applied to all costs incurred in the period
    pub objective_weight: f64,
    /// Number of years the period represents
    pub years: f64,
}

impl InvestmentPeriod {
    pub fn new(period: i64) -> Self {
        Self {
            period,
            objective_weight: 1.0,
            years: 1.0,
        }
    }
}

/// Time series of one attribute: instance name -> value per network snapshot.
pub type TimeSeries = BTreeMap<String, Vec<f64>>;

/// Power network with component tables and a time-series store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub name: String,
    pub buses: Vec<Bus>,
    pub generators: Vec<Generator>,
    pub loads: Vec<Load>,
    pub lines: Vec<Line>,
    pub transformers: Vec<Transformer>,
    pub links: Vec<Link>,
    pub storage_units: Vec<StorageUnit>,
    pub stores: Vec<Store>,
    pub snapshots: Vec<Snapshot>,
    pub investment_periods: Vec<InvestmentPeriod>,
    /// Time-varying inputs and solved outputs, keyed by component and attribute
    pub series: BTreeMap<ComponentType, BTreeMap<String, TimeSeries>>,
    /// Objective value of the last successful optimisation
    pub objective: Option<f64>,
}

/// Basic statistics about a network
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_generators: usize,
    pub num_loads: usize,
    pub num_passive_branches: usize,
    pub num_links: usize,
    pub num_storage_units: usize,
    pub num_stores: usize,
    pub num_snapshots: usize,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshots with `n` hourly steps labelled `0..n`.
    pub fn set_snapshots(&mut self, n: usize) {
        self.snapshots = (0..n).map(|t| Snapshot::new(t.to_string())).collect();
    }

    /// Declare investment periods and repeat the current timesteps once per period.
    ///
    /// Periods must be strictly increasing. Snapshots that already carry a
    /// period are kept as they are.
    pub fn set_investment_periods(&mut self, periods: &[i64]) -> LopfResult<()> {
        if periods.is_empty() {
            return Err(LopfError::Config("investment periods must not be empty".into()));
        }
        if periods.windows(2).any(|w| w[0] >= w[1]) {
            return Err(LopfError::Config(format!(
                "investment periods must be strictly increasing, got {periods:?}"
            )));
        }
        if !self.series.is_empty() && self.snapshots.iter().all(|s| s.period.is_none()) {
            return Err(LopfError::Config(
                "cannot expand snapshots into periods once time series are attached".into(),
            ));
        }

        if self.snapshots.iter().all(|s| s.period.is_none()) {
            let steps = std::mem::take(&mut self.snapshots);
            self.snapshots = periods
                .iter()
                .flat_map(|&p| steps.iter().cloned().map(move |s| s.in_period(p)))
                .collect();
        }
        self.investment_periods = periods.iter().map(|&p| InvestmentPeriod::new(p)).collect();
        Ok(())
    }

    /// Positions of all snapshots.
    pub fn all_snapshots(&self) -> Vec<usize> {
        (0..self.snapshots.len()).collect()
    }

    pub fn investment_period(&self, period: i64) -> Option<&InvestmentPeriod> {
        self.investment_periods.iter().find(|p| p.period == period)
    }

    /// All instances of a component type as trait objects, in table order.
    pub fn components(&self, c: ComponentType) -> Vec<&dyn Component> {
        fn erase<T: Component>(rows: &[T]) -> Vec<&dyn Component> {
            rows.iter().map(|r| r as &dyn Component).collect()
        }
        match c {
            ComponentType::Bus => erase(&self.buses),
            ComponentType::Generator => erase(&self.generators),
            ComponentType::Load => erase(&self.loads),
            ComponentType::Line => erase(&self.lines),
            ComponentType::Transformer => erase(&self.transformers),
            ComponentType::Link => erase(&self.links),
            ComponentType::StorageUnit => erase(&self.storage_units),
            ComponentType::Store => erase(&self.stores),
        }
    }

    pub fn component(&self, c: ComponentType, name: &str) -> Option<&dyn Component> {
        self.components(c).into_iter().find(|r| r.name() == name)
    }

    pub fn is_empty(&self, c: ComponentType) -> bool {
        self.components(c).is_empty()
    }

    /// Instance names of a component type, in table order.
    pub fn instance_names(&self, c: ComponentType) -> Vec<String> {
        self.components(c)
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Instances whose nominal capacity is a decision variable.
    pub fn get_extendable_i(&self, c: ComponentType) -> Vec<String> {
        self.components(c)
            .iter()
            .filter(|r| r.is_extendable())
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Instances with fixed nominal capacity.
    pub fn get_non_extendable_i(&self, c: ComponentType) -> Vec<String> {
        self.components(c)
            .iter()
            .filter(|r| !r.is_extendable())
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Instances subject to unit commitment.
    pub fn get_committable_i(&self, c: ComponentType) -> Vec<String> {
        self.components(c)
            .iter()
            .filter(|r| r.is_committable())
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Time series of an attribute, if any instance has one.
    pub fn series(&self, c: ComponentType, attr: &str) -> Option<&TimeSeries> {
        self.series.get(&c).and_then(|attrs| attrs.get(attr))
    }

    /// Attach a time-varying value for one instance.
    ///
    /// The series must have one value per network snapshot.
    pub fn set_series(
        &mut self,
        c: ComponentType,
        attr: &str,
        instance: &str,
        values: Vec<f64>,
    ) -> LopfResult<()> {
        if values.len() != self.snapshots.len() {
            return Err(LopfError::Data(format!(
                "series {c}-{attr} for '{instance}' has {} values but the network has {} snapshots",
                values.len(),
                self.snapshots.len()
            )));
        }
        if self.component(c, instance).is_none() {
            return Err(LopfError::Data(format!("{c} '{instance}' does not exist")));
        }
        self.series
            .entry(c)
            .or_default()
            .entry(attr.to_string())
            .or_default()
            .insert(instance.to_string(), values);
        Ok(())
    }

    /// Write values for a subset of snapshots, creating NaN-filled series as needed.
    pub fn write_series(
        &mut self,
        c: ComponentType,
        attr: &str,
        instance: &str,
        snapshots: &[usize],
        values: &[f64],
    ) {
        let n = self.snapshots.len();
        let series = self
            .series
            .entry(c)
            .or_default()
            .entry(attr.to_string())
            .or_default()
            .entry(instance.to_string())
            .or_insert_with(|| vec![f64::NAN; n]);
        for (&sn, &v) in snapshots.iter().zip(values) {
            series[sn] = v;
        }
    }

    /// Record an optimised nominal capacity (`p_nom_opt`, `s_nom_opt`, `e_nom_opt`).
    pub fn set_nominal_opt(&mut self, c: ComponentType, name: &str, value: f64) -> LopfResult<()> {
        let slot = match c {
            ComponentType::Generator => self
                .generators
                .iter_mut()
                .find(|g| g.name == name)
                .map(|g| &mut g.p_nom_opt),
            ComponentType::Line => self
                .lines
                .iter_mut()
                .find(|l| l.name == name)
                .map(|l| &mut l.s_nom_opt),
            ComponentType::Transformer => self
                .transformers
                .iter_mut()
                .find(|t| t.0.name == name)
                .map(|t| &mut t.0.s_nom_opt),
            ComponentType::Link => self
                .links
                .iter_mut()
                .find(|l| l.name == name)
                .map(|l| &mut l.p_nom_opt),
            ComponentType::StorageUnit => self
                .storage_units
                .iter_mut()
                .find(|s| s.name == name)
                .map(|s| &mut s.p_nom_opt),
            ComponentType::Store => self
                .stores
                .iter_mut()
                .find(|s| s.name == name)
                .map(|s| &mut s.e_nom_opt),
            ComponentType::Bus | ComponentType::Load => {
                return Err(LopfError::Data(format!("{c} has no nominal capacity")))
            }
        };
        match slot {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(LopfError::Data(format!("{c} '{name}' does not exist"))),
        }
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            num_buses: self.buses.len(),
            num_generators: self.generators.len(),
            num_loads: self.loads.len(),
            num_passive_branches: self.lines.len() + self.transformers.len(),
            num_links: self.links.len(),
            num_storage_units: self.storage_units.len(),
            num_stores: self.stores.len(),
            num_snapshots: self.snapshots.len(),
        }
    }

    /// Validate network data for issues that would produce a broken model.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.buses.is_empty() {
            diag.add_error("structure", "Network has no buses");
            return;
        }
        if self.snapshots.is_empty() {
            diag.add_error("structure", "Network has no snapshots");
        }

        for c in ComponentType::ALL {
            let mut seen = HashSet::new();
            for row in self.components(c) {
                if !seen.insert(row.name()) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("duplicate {c} name"),
                        row.name(),
                    );
                }
            }
        }

        let buses: HashSet<&str> = self.buses.iter().map(|b| b.name.as_str()).collect();
        let check_bus = |diag: &mut Diagnostics, c: ComponentType, name: &str, bus: &str| {
            if !buses.contains(bus) {
                diag.add_error_with_entity(
                    "reference",
                    &format!("{c} attached to unknown bus '{bus}'"),
                    name,
                );
            }
        };
        for g in &self.generators {
            check_bus(diag, ComponentType::Generator, &g.name, &g.bus);
        }
        for l in &self.loads {
            check_bus(diag, ComponentType::Load, &l.name, &l.bus);
        }
        for s in &self.storage_units {
            check_bus(diag, ComponentType::StorageUnit, &s.name, &s.bus);
        }
        for s in &self.stores {
            check_bus(diag, ComponentType::Store, &s.name, &s.bus);
        }
        for l in &self.links {
            check_bus(diag, ComponentType::Link, &l.name, &l.bus0);
            check_bus(diag, ComponentType::Link, &l.name, &l.bus1);
        }
        let branches = self
            .lines
            .iter()
            .map(|l| (ComponentType::Line, l))
            .chain(self.transformers.iter().map(|t| (ComponentType::Transformer, &t.0)));
        for (c, b) in branches {
            check_bus(diag, c, &b.name, &b.bus0);
            check_bus(diag, c, &b.name, &b.bus1);
            if b.x.abs() < 1e-12 {
                diag.add_error_with_entity("physical", &format!("{c} has zero reactance"), &b.name);
            }
        }

        for g in &self.generators {
            if g.committable && g.p_nom_extendable {
                diag.add_error_with_entity(
                    "validation",
                    "Generator cannot be both committable and extendable",
                    &g.name,
                );
            }
            if g.p_nom_extendable && g.p_nom_min > g.p_nom_max {
                diag.add_error_with_entity("validation", "p_nom_min exceeds p_nom_max", &g.name);
            }
            if g.p_min_pu > g.p_max_pu {
                diag.add_warning_with_entity("validation", "p_min_pu exceeds p_max_pu", &g.name);
            }
        }

        for su in &self.storage_units {
            if su.efficiency_dispatch <= 0.0 {
                diag.add_error_with_entity(
                    "physical",
                    "StorageUnit efficiency_dispatch must be positive",
                    &su.name,
                );
            }
        }

        let n = self.snapshots.len();
        for (c, attrs) in &self.series {
            for (attr, table) in attrs {
                for (instance, values) in table {
                    if values.len() != n {
                        diag.add_error_with_entity(
                            "series",
                            &format!("{c}-{attr} has {} values for {n} snapshots", values.len()),
                            instance,
                        );
                    }
                }
            }
        }

        if self.generators.is_empty() && self.storage_units.is_empty() && self.stores.is_empty() {
            diag.add_warning("structure", "Network has no generation or storage");
        }
    }

    /// Validate and fail on the first batch of errors.
    pub fn validate(&self) -> LopfResult<Diagnostics> {
        let mut diag = Diagnostics::new();
        self.validate_into(&mut diag);
        if diag.has_errors() {
            let messages: Vec<String> = diag.errors().map(|i| i.to_string()).collect();
            return Err(LopfError::Validation(messages.join("; ")));
        }
        Ok(diag)
    }
}

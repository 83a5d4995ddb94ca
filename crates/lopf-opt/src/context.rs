//! Read-only view of the network handed to every model builder.

use lopf_core::{
    activity_mask, get_switchable_as_dense, ActivityMask, ComponentType, DenseTable, LopfResult,
    Network, Weightings,
};

use crate::config::{OptimizeConfig, UnitCommitment};

/// Network, snapshot selection and settings of one model build.
///
/// Row `r` of every per-snapshot table and variable group corresponds to
/// `snapshots[r]`.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub network: &'a Network,
    pub snapshots: &'a [usize],
    pub config: &'a OptimizeConfig,
}

impl<'a> BuildContext<'a> {
    pub fn new(network: &'a Network, snapshots: &'a [usize], config: &'a OptimizeConfig) -> Self {
        Self {
            network,
            snapshots,
            config,
        }
    }

    pub fn multi_invest(&self) -> bool {
        self.config.multi_investment_periods
    }

    pub fn unit_commitment(&self) -> UnitCommitment {
        self.config.unit_commitment
    }

    pub fn n_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Activity of `subset` (or all instances) over the selected snapshots.
    pub fn mask(&self, c: ComponentType, subset: Option<&[String]>) -> LopfResult<ActivityMask> {
        activity_mask(self.network, c, self.snapshots, subset, self.multi_invest())
    }

    /// Attribute as a (snapshot × instance) table over the selected snapshots.
    pub fn dense(
        &self,
        c: ComponentType,
        attr: &str,
        subset: Option<&[String]>,
    ) -> LopfResult<DenseTable> {
        get_switchable_as_dense(self.network, c, attr, self.snapshots, subset)
    }

    pub fn weightings(&self, r: usize) -> &Weightings {
        &self.network.snapshots[self.snapshots[r]].weightings
    }

    pub fn period(&self, r: usize) -> Option<i64> {
        self.network.snapshots[self.snapshots[r]].period
    }

    /// Discount weight of the period of row `r` (1 outside multi-period mode).
    pub fn period_weight(&self, r: usize) -> f64 {
        if !self.multi_invest() {
            return 1.0;
        }
        self.period(r)
            .and_then(|p| self.network.investment_period(p))
            .map_or(1.0, |p| p.objective_weight)
    }

    /// Distinct periods of the selection, in order of appearance.
    pub fn periods(&self) -> Vec<i64> {
        let mut periods: Vec<i64> = Vec::new();
        for r in 0..self.snapshots.len() {
            if let Some(p) = self.period(r) {
                if !periods.contains(&p) {
                    periods.push(p);
                }
            }
        }
        periods
    }

    /// Whether row `r` opens a new investment period.
    pub fn starts_period(&self, r: usize) -> bool {
        r == 0 || (self.multi_invest() && self.period(r) != self.period(r - 1))
    }
}

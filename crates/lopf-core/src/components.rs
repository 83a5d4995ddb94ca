//! Component tables of a network.
//!
//! Every component row is keyed by its unique `name` within its
//! [`ComponentType`]. Rows carry static attributes; attributes that may vary
//! over time (`p_max_pu`, `marginal_cost`, `inflow`, ...) can additionally be
//! overridden per instance through the network's time-series store.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LopfError;

/// Kind of network component.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ComponentType {
    Bus,
    Generator,
    Load,
    Line,
    Transformer,
    Link,
    StorageUnit,
    Store,
}

impl ComponentType {
    pub const ALL: [ComponentType; 8] = [
        ComponentType::Bus,
        ComponentType::Generator,
        ComponentType::Load,
        ComponentType::Line,
        ComponentType::Transformer,
        ComponentType::Link,
        ComponentType::StorageUnit,
        ComponentType::Store,
    ];

    /// Branches whose flow follows impedance (Kirchhoff's voltage law).
    pub const PASSIVE_BRANCHES: [ComponentType; 2] =
        [ComponentType::Line, ComponentType::Transformer];

    /// Components carrying a nominal capacity that may be extendable.
    pub const EXTENDABLE: [ComponentType; 6] = [
        ComponentType::Generator,
        ComponentType::Line,
        ComponentType::Transformer,
        ComponentType::Link,
        ComponentType::StorageUnit,
        ComponentType::Store,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Bus => "Bus",
            ComponentType::Generator => "Generator",
            ComponentType::Load => "Load",
            ComponentType::Line => "Line",
            ComponentType::Transformer => "Transformer",
            ComponentType::Link => "Link",
            ComponentType::StorageUnit => "StorageUnit",
            ComponentType::Store => "Store",
        }
    }

    pub fn is_passive_branch(&self) -> bool {
        matches!(self, ComponentType::Line | ComponentType::Transformer)
    }

    /// Name of the nominal capacity attribute (`p_nom`, `s_nom`, `e_nom`).
    pub fn nominal_attr(&self) -> Option<&'static str> {
        match self {
            ComponentType::Generator | ComponentType::Link | ComponentType::StorageUnit => {
                Some("p_nom")
            }
            ComponentType::Line | ComponentType::Transformer => Some("s_nom"),
            ComponentType::Store => Some("e_nom"),
            ComponentType::Bus | ComponentType::Load => None,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = LopfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentType::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LopfError::Parse(format!("unknown component type '{s}'")))
    }
}

/// JSON has no infinity and writes it as `null`; read that back as
/// `f64::INFINITY`.
fn infinite_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

/// Build year and lifetime of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub build_year: i64,
    /// Years of operation; `f64::INFINITY` for assets that never retire.
    #[serde(deserialize_with = "infinite_if_null")]
    pub lifetime: f64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            build_year: 0,
            lifetime: f64::INFINITY,
        }
    }
}

impl Lifecycle {
    pub fn new(build_year: i64, lifetime: f64) -> Self {
        Self {
            build_year,
            lifetime,
        }
    }

    /// Whether the asset operates in the given investment period.
    pub fn is_active_in(&self, period: i64) -> bool {
        let start = self.build_year as f64;
        let period = period as f64;
        start <= period && period < start + self.lifetime
    }
}

/// Read access shared by all component rows.
pub trait Component: fmt::Debug {
    fn name(&self) -> &str;

    /// Static numeric value of an attribute, `None` if the component type
    /// has no such attribute.
    fn static_attr(&self, attr: &str) -> Option<f64>;

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::default()
    }

    fn is_extendable(&self) -> bool {
        false
    }

    fn is_committable(&self) -> bool {
        false
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bus {
    pub name: String,
    /// Nominal voltage (kV), used to convert line impedances to per unit
    pub v_nom: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            name: String::new(),
            v_nom: 1.0,
        }
    }
}

impl Bus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Component for Bus {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        match attr {
            "v_nom" => Some(self.v_nom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Generator {
    pub name: String,
    pub bus: String,
    pub p_nom: f64,
    pub p_nom_extendable: bool,
    pub p_nom_min: f64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub p_nom_max: f64,
    pub p_min_pu: f64,
    pub p_max_pu: f64,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub committable: bool,
    pub start_up_cost: f64,
    pub shut_down_cost: f64,
    /// Minimum number of snapshots the unit stays on once started
    pub min_up_time: usize,
    /// Minimum number of snapshots the unit stays off once shut down
    pub min_down_time: usize,
    /// Snapshots the unit has been running before the horizon; > 0 means initially on
    pub up_time_before: usize,
    /// Per-unit of `p_nom` per snapshot
    pub ramp_limit_up: Option<f64>,
    pub ramp_limit_down: Option<f64>,
    pub ramp_limit_start_up: f64,
    pub ramp_limit_shut_down: f64,
    pub build_year: i64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub lifetime: f64,
    /// Optimised nominal capacity (written back after a solve)
    pub p_nom_opt: Option<f64>,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: String::new(),
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_min_pu: 0.0,
            p_max_pu: 1.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            committable: false,
            start_up_cost: 0.0,
            shut_down_cost: 0.0,
            min_up_time: 0,
            min_down_time: 0,
            up_time_before: 1,
            ramp_limit_up: None,
            ramp_limit_down: None,
            ramp_limit_start_up: 1.0,
            ramp_limit_shut_down: 1.0,
            build_year: 0,
            lifetime: f64::INFINITY,
            p_nom_opt: None,
        }
    }
}

impl Generator {
    pub fn new(name: impl Into<String>, bus: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            ..Self::default()
        }
    }

    pub fn with_p_nom(mut self, p_nom: f64) -> Self {
        self.p_nom = p_nom;
        self
    }

    pub fn with_marginal_cost(mut self, cost: f64) -> Self {
        self.marginal_cost = cost;
        self
    }

    /// Make the capacity a decision variable with the given annualised capital cost.
    pub fn extendable(mut self, capital_cost: f64) -> Self {
        self.p_nom_extendable = true;
        self.capital_cost = capital_cost;
        self
    }

    pub fn committable(mut self) -> Self {
        self.committable = true;
        self
    }

    pub fn with_lifecycle(mut self, build_year: i64, lifetime: f64) -> Self {
        self.build_year = build_year;
        self.lifetime = lifetime;
        self
    }
}

impl Component for Generator {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        match attr {
            "p_nom" => Some(self.p_nom),
            "p_nom_extendable" => Some(flag(self.p_nom_extendable)),
            "p_nom_min" => Some(self.p_nom_min),
            "p_nom_max" => Some(self.p_nom_max),
            "p_min_pu" => Some(self.p_min_pu),
            "p_max_pu" => Some(self.p_max_pu),
            "marginal_cost" => Some(self.marginal_cost),
            "capital_cost" => Some(self.capital_cost),
            "committable" => Some(flag(self.committable)),
            "start_up_cost" => Some(self.start_up_cost),
            "shut_down_cost" => Some(self.shut_down_cost),
            "min_up_time" => Some(self.min_up_time as f64),
            "min_down_time" => Some(self.min_down_time as f64),
            "up_time_before" => Some(self.up_time_before as f64),
            "ramp_limit_up" => Some(self.ramp_limit_up.unwrap_or(f64::NAN)),
            "ramp_limit_down" => Some(self.ramp_limit_down.unwrap_or(f64::NAN)),
            "ramp_limit_start_up" => Some(self.ramp_limit_start_up),
            "ramp_limit_shut_down" => Some(self.ramp_limit_shut_down),
            "build_year" => Some(self.build_year as f64),
            "lifetime" => Some(self.lifetime),
            _ => None,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.build_year, self.lifetime)
    }

    fn is_extendable(&self) -> bool {
        self.p_nom_extendable
    }

    fn is_committable(&self) -> bool {
        self.committable
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Load {
    pub name: String,
    pub bus: String,
    /// Active power demand (MW)
    pub p_set: f64,
}

impl Load {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, p_set: f64) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            p_set,
        }
    }
}

impl Component for Load {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        match attr {
            "p_set" => Some(self.p_set),
            _ => None,
        }
    }
}

/// Impedance-based branch (shared layout of lines and transformers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PassiveBranch {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    /// Series reactance (Ohm for lines, per unit for transformers)
    pub x: f64,
    /// Series resistance (Ohm for lines, per unit for transformers)
    pub r: f64,
    pub s_nom: f64,
    pub s_nom_extendable: bool,
    pub s_nom_min: f64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub s_nom_max: f64,
    pub s_max_pu: f64,
    pub capital_cost: f64,
    pub build_year: i64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub lifetime: f64,
    pub s_nom_opt: Option<f64>,
}

impl Default for PassiveBranch {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus0: String::new(),
            bus1: String::new(),
            x: 0.0,
            r: 0.0,
            s_nom: 0.0,
            s_nom_extendable: false,
            s_nom_min: 0.0,
            s_nom_max: f64::INFINITY,
            s_max_pu: 1.0,
            capital_cost: 0.0,
            build_year: 0,
            lifetime: f64::INFINITY,
            s_nom_opt: None,
        }
    }
}

impl PassiveBranch {
    pub fn new(
        name: impl Into<String>,
        bus0: impl Into<String>,
        bus1: impl Into<String>,
        x: f64,
        s_nom: f64,
    ) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            x,
            s_nom,
            ..Self::default()
        }
    }

    pub fn with_resistance(mut self, r: f64) -> Self {
        self.r = r;
        self
    }

    pub fn extendable(mut self, capital_cost: f64, s_nom_max: f64) -> Self {
        self.s_nom_extendable = true;
        self.capital_cost = capital_cost;
        self.s_nom_max = s_nom_max;
        self
    }

    pub fn with_lifecycle(mut self, build_year: i64, lifetime: f64) -> Self {
        self.build_year = build_year;
        self.lifetime = lifetime;
        self
    }

    fn attr(&self, attr: &str) -> Option<f64> {
        match attr {
            "x" => Some(self.x),
            "r" => Some(self.r),
            "s_nom" => Some(self.s_nom),
            "s_nom_extendable" => Some(flag(self.s_nom_extendable)),
            "s_nom_min" => Some(self.s_nom_min),
            "s_nom_max" => Some(self.s_nom_max),
            "s_max_pu" => Some(self.s_max_pu),
            "capital_cost" => Some(self.capital_cost),
            "build_year" => Some(self.build_year as f64),
            "lifetime" => Some(self.lifetime),
            _ => None,
        }
    }
}

/// Transmission line; impedances in Ohm.
pub type Line = PassiveBranch;

/// Two-winding transformer; impedances in per unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transformer(pub PassiveBranch);

impl Component for PassiveBranch {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        self.attr(attr)
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.build_year, self.lifetime)
    }

    fn is_extendable(&self) -> bool {
        self.s_nom_extendable
    }
}

impl Component for Transformer {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        self.0.attr(attr)
    }

    fn lifecycle(&self) -> Lifecycle {
        self.0.lifecycle()
    }

    fn is_extendable(&self) -> bool {
        self.0.s_nom_extendable
    }
}

/// Controllable point-to-point branch (HVDC, converters, heat pumps, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    /// Share of the power withdrawn at `bus0` that arrives at `bus1`
    pub efficiency: f64,
    pub p_nom: f64,
    pub p_nom_extendable: bool,
    pub p_nom_min: f64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub p_nom_max: f64,
    pub p_min_pu: f64,
    pub p_max_pu: f64,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub ramp_limit_up: Option<f64>,
    pub ramp_limit_down: Option<f64>,
    pub build_year: i64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub lifetime: f64,
    pub p_nom_opt: Option<f64>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus0: String::new(),
            bus1: String::new(),
            efficiency: 1.0,
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_min_pu: 0.0,
            p_max_pu: 1.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            ramp_limit_up: None,
            ramp_limit_down: None,
            build_year: 0,
            lifetime: f64::INFINITY,
            p_nom_opt: None,
        }
    }
}

impl Link {
    pub fn new(
        name: impl Into<String>,
        bus0: impl Into<String>,
        bus1: impl Into<String>,
        p_nom: f64,
    ) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            p_nom,
            ..Self::default()
        }
    }
}

impl Component for Link {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        match attr {
            "efficiency" => Some(self.efficiency),
            "p_nom" => Some(self.p_nom),
            "p_nom_extendable" => Some(flag(self.p_nom_extendable)),
            "p_nom_min" => Some(self.p_nom_min),
            "p_nom_max" => Some(self.p_nom_max),
            "p_min_pu" => Some(self.p_min_pu),
            "p_max_pu" => Some(self.p_max_pu),
            "marginal_cost" => Some(self.marginal_cost),
            "capital_cost" => Some(self.capital_cost),
            "ramp_limit_up" => Some(self.ramp_limit_up.unwrap_or(f64::NAN)),
            "ramp_limit_down" => Some(self.ramp_limit_down.unwrap_or(f64::NAN)),
            "build_year" => Some(self.build_year as f64),
            "lifetime" => Some(self.lifetime),
            _ => None,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.build_year, self.lifetime)
    }

    fn is_extendable(&self) -> bool {
        self.p_nom_extendable
    }
}

/// Storage with a fixed energy-to-power ratio (pumped hydro, batteries).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageUnit {
    pub name: String,
    pub bus: String,
    pub p_nom: f64,
    pub p_nom_extendable: bool,
    pub p_nom_min: f64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub p_nom_max: f64,
    /// Negative: maximum charging power per unit of `p_nom`
    pub p_min_pu: f64,
    pub p_max_pu: f64,
    /// Energy capacity in hours at nominal power
    pub max_hours: f64,
    pub efficiency_store: f64,
    pub efficiency_dispatch: f64,
    /// Share of the state of charge lost per hour
    pub standing_loss: f64,
    /// Natural inflow (MW)
    pub inflow: f64,
    pub state_of_charge_initial: f64,
    pub cyclic_state_of_charge: bool,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub build_year: i64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub lifetime: f64,
    pub p_nom_opt: Option<f64>,
}

impl Default for StorageUnit {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: String::new(),
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: f64::INFINITY,
            p_min_pu: -1.0,
            p_max_pu: 1.0,
            max_hours: 1.0,
            efficiency_store: 1.0,
            efficiency_dispatch: 1.0,
            standing_loss: 0.0,
            inflow: 0.0,
            state_of_charge_initial: 0.0,
            cyclic_state_of_charge: false,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            build_year: 0,
            lifetime: f64::INFINITY,
            p_nom_opt: None,
        }
    }
}

impl StorageUnit {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, p_nom: f64, max_hours: f64) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            p_nom,
            max_hours,
            ..Self::default()
        }
    }
}

impl Component for StorageUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        match attr {
            "p_nom" => Some(self.p_nom),
            "p_nom_extendable" => Some(flag(self.p_nom_extendable)),
            "p_nom_min" => Some(self.p_nom_min),
            "p_nom_max" => Some(self.p_nom_max),
            "p_min_pu" => Some(self.p_min_pu),
            "p_max_pu" => Some(self.p_max_pu),
            "max_hours" => Some(self.max_hours),
            "efficiency_store" => Some(self.efficiency_store),
            "efficiency_dispatch" => Some(self.efficiency_dispatch),
            "standing_loss" => Some(self.standing_loss),
            "inflow" => Some(self.inflow),
            "state_of_charge_initial" => Some(self.state_of_charge_initial),
            "cyclic_state_of_charge" => Some(flag(self.cyclic_state_of_charge)),
            "marginal_cost" => Some(self.marginal_cost),
            "capital_cost" => Some(self.capital_cost),
            "build_year" => Some(self.build_year as f64),
            "lifetime" => Some(self.lifetime),
            _ => None,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.build_year, self.lifetime)
    }

    fn is_extendable(&self) -> bool {
        self.p_nom_extendable
    }
}

/// Energy store without power limits of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    pub name: String,
    pub bus: String,
    pub e_nom: f64,
    pub e_nom_extendable: bool,
    pub e_nom_min: f64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub e_nom_max: f64,
    pub e_min_pu: f64,
    pub e_max_pu: f64,
    pub e_initial: f64,
    pub e_cyclic: bool,
    pub standing_loss: f64,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub build_year: i64,
    #[serde(deserialize_with = "infinite_if_null")]
    pub lifetime: f64,
    pub e_nom_opt: Option<f64>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: String::new(),
            e_nom: 0.0,
            e_nom_extendable: false,
            e_nom_min: 0.0,
            e_nom_max: f64::INFINITY,
            e_min_pu: 0.0,
            e_max_pu: 1.0,
            e_initial: 0.0,
            e_cyclic: false,
            standing_loss: 0.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            build_year: 0,
            lifetime: f64::INFINITY,
            e_nom_opt: None,
        }
    }
}

impl Store {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, e_nom: f64) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            e_nom,
            ..Self::default()
        }
    }
}

impl Component for Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn static_attr(&self, attr: &str) -> Option<f64> {
        match attr {
            "e_nom" => Some(self.e_nom),
            "e_nom_extendable" => Some(flag(self.e_nom_extendable)),
            "e_nom_min" => Some(self.e_nom_min),
            "e_nom_max" => Some(self.e_nom_max),
            "e_min_pu" => Some(self.e_min_pu),
            "e_max_pu" => Some(self.e_max_pu),
            "e_initial" => Some(self.e_initial),
            "e_cyclic" => Some(flag(self.e_cyclic)),
            "standing_loss" => Some(self.standing_loss),
            "marginal_cost" => Some(self.marginal_cost),
            "capital_cost" => Some(self.capital_cost),
            "build_year" => Some(self.build_year as f64),
            "lifetime" => Some(self.lifetime),
            _ => None,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.build_year, self.lifetime)
    }

    fn is_extendable(&self) -> bool {
        self.e_nom_extendable
    }
}

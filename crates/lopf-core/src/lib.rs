//! # lopf-core: Network data model for linear optimal power flow
//!
//! Holds the component tables, snapshots and time series that the model
//! builder in `lopf-opt` reads from, plus the small utilities every builder
//! relies on.
//!
//! ## Design
//!
//! - A [`Network`] owns one `Vec` per component type. Rows are keyed by a
//!   unique name and implement the object-safe [`Component`] trait.
//! - Attributes that may vary over time are stored in a per-network series
//!   store (`component -> attribute -> instance -> values`). Builders never
//!   look there directly; they go through [`descriptors::get_switchable_as_dense`].
//! - Multi-period planning partitions snapshots into investment periods.
//!   [`descriptors::activity_mask`] turns build year and lifetime into an
//!   [`ActivityMask`].
//!
//! ## Quick Start
//!
//! ```rust
//! use lopf_core::*;
//!
//! let mut network = Network::new();
//! network.set_snapshots(2);
//! network.buses.push(Bus::new("north"));
//! network.buses.push(Bus::new("south"));
//! network
//!     .generators
//!     .push(Generator::new("wind", "north").with_p_nom(80.0));
//! network.loads.push(Load::new("city", "south", 50.0));
//! network
//!     .lines
//!     .push(Line::new("north-south", "north", "south", 0.1, 100.0));
//!
//! network
//!     .set_series(ComponentType::Generator, "p_max_pu", "wind", vec![0.3, 0.9])
//!     .unwrap();
//! let avail = get_switchable_as_dense(
//!     &network,
//!     ComponentType::Generator,
//!     "p_max_pu",
//!     &network.all_snapshots(),
//!     None,
//! )
//! .unwrap();
//! assert_eq!(avail.row(1), &[0.9]);
//! assert!(network.validate().is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`components`] - Component rows and the [`ComponentType`] catalogue
//! - [`network`] - The network container, snapshots and investment periods
//! - [`descriptors`] - Activity masks and static/time-varying attribute resolution
//! - [`graph_utils`] - Passive branch topology (cycle basis, sub-networks)
//! - [`diagnostics`] - Validation reporting
//! - [`table`] - Dense (snapshot × instance) tables

pub mod components;
pub mod descriptors;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod network;
pub mod table;

pub use components::{
    Bus, Component, ComponentType, Generator, Lifecycle, Line, Link, Load, PassiveBranch,
    StorageUnit, Store, Transformer,
};
pub use descriptors::{
    activity_mask, get_activity_mask, get_static, get_switchable_as_dense, ActivityMask,
    Switchable,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{LopfError, LopfResult, TerminationStatus};
pub use graph_utils::{BranchRef, Cycle, CycleEdge, SubNetwork, TopologyGraph};
pub use network::{InvestmentPeriod, Network, NetworkStats, Snapshot, TimeSeries, Weightings};
pub use table::{BoolTable, DenseTable, Table};

//! Optimisation settings.
//!
//! [`OptimizeConfig`] carries every switch the model builder reads. It is
//! usually constructed in code, but can be loaded from TOML where
//! unspecified values keep their defaults:
//!
//! ```toml
//! multi_investment_periods = true
//! unit_commitment = "linearized"
//! transmission_losses = 3
//! solver = "highs"
//!
//! [rolling_horizon]
//! horizon = 24
//! overlap = 4
//! ```

use std::path::Path;

use lopf_core::{LopfError, LopfResult};
use serde::{Deserialize, Serialize};

/// How on/off decisions of committable units are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitCommitment {
    /// Binary status, start-up and shut-down variables (MILP)
    #[default]
    Integer,
    /// Continuous variables in [0, 1]
    #[serde(alias = "relaxed")]
    Linearized,
}

/// Solver backend used for the final solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Clarabel for pure LPs, a MILP-capable backend otherwise
    #[default]
    Auto,
    Clarabel,
    Microlp,
    Highs,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Auto => "auto",
            SolverKind::Clarabel => "clarabel",
            SolverKind::Microlp => "microlp",
            SolverKind::Highs => "highs",
        }
    }

    /// Whether the backend was compiled into this build.
    pub fn is_available(&self) -> bool {
        match self {
            SolverKind::Auto => true,
            SolverKind::Clarabel => cfg!(feature = "solver-clarabel"),
            SolverKind::Microlp => cfg!(feature = "solver-microlp"),
            SolverKind::Highs => cfg!(feature = "solver-highs"),
        }
    }

    pub fn supports_integers(&self) -> bool {
        matches!(self, SolverKind::Microlp | SolverKind::Highs)
    }

    /// Pick a concrete backend for a model.
    pub fn resolve(self, has_integers: bool) -> LopfResult<SolverKind> {
        let concrete = match self {
            SolverKind::Auto => {
                let preference: &[SolverKind] = if has_integers {
                    &[SolverKind::Highs, SolverKind::Microlp]
                } else {
                    &[SolverKind::Clarabel, SolverKind::Highs, SolverKind::Microlp]
                };
                preference
                    .iter()
                    .copied()
                    .find(SolverKind::is_available)
                    .ok_or_else(|| {
                        LopfError::Config(format!(
                            "no solver backend enabled for a {} model",
                            if has_integers { "mixed-integer" } else { "linear" }
                        ))
                    })?
            }
            explicit => {
                if !explicit.is_available() {
                    return Err(LopfError::Config(format!(
                        "solver backend '{}' is not enabled (feature solver-{})",
                        explicit.as_str(),
                        explicit.as_str()
                    )));
                }
                explicit
            }
        };
        if has_integers && !concrete.supports_integers() {
            return Err(LopfError::Config(format!(
                "solver '{}' cannot handle integer variables; use unit_commitment = \"linearized\" or a MILP backend",
                concrete.as_str()
            )));
        }
        Ok(concrete)
    }
}

/// Window layout for rolling-horizon optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingHorizonConfig {
    /// Snapshots per window
    pub horizon: usize,
    /// Snapshots shared by consecutive windows
    pub overlap: usize,
}

impl Default for RollingHorizonConfig {
    fn default() -> Self {
        Self {
            horizon: 100,
            overlap: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    /// Mask assets by build year and lifetime, weight costs per investment period
    pub multi_investment_periods: bool,
    pub unit_commitment: UnitCommitment,
    /// Number of tangents in the loss approximation (0 disables losses)
    pub transmission_losses: usize,
    pub solver: SolverKind,
    /// Wrap the state of charge within each investment period instead of the horizon
    pub cyclic_state_of_charge_per_period: bool,
    /// Restart from the initial state of charge at the start of each period
    pub state_of_charge_initial_per_period: bool,
    pub rolling_horizon: RollingHorizonConfig,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            multi_investment_periods: false,
            unit_commitment: UnitCommitment::Integer,
            transmission_losses: 0,
            solver: SolverKind::Auto,
            cyclic_state_of_charge_per_period: true,
            state_of_charge_initial_per_period: true,
            rolling_horizon: RollingHorizonConfig::default(),
        }
    }
}

impl OptimizeConfig {
    pub fn with_multi_investment_periods(mut self, enabled: bool) -> Self {
        self.multi_investment_periods = enabled;
        self
    }

    pub fn with_unit_commitment(mut self, mode: UnitCommitment) -> Self {
        self.unit_commitment = mode;
        self
    }

    pub fn with_transmission_losses(mut self, tangents: usize) -> Self {
        self.transmission_losses = tangents;
        self
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Check settings that do not depend on the network.
    pub fn validate(&self) -> LopfResult<()> {
        let rh = &self.rolling_horizon;
        if rh.horizon == 0 {
            return Err(LopfError::Config("rolling horizon must be positive".into()));
        }
        if rh.overlap >= rh.horizon {
            return Err(LopfError::Config(format!(
                "rolling horizon overlap ({}) must be smaller than the horizon ({})",
                rh.overlap, rh.horizon
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> LopfResult<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| LopfError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> LopfResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> LopfResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| LopfError::Parse(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = OptimizeConfig::default();
        assert!(!config.multi_investment_periods);
        assert_eq!(config.unit_commitment, UnitCommitment::Integer);
        assert_eq!(config.transmission_losses, 0);
        assert_eq!(config.solver, SolverKind::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_parsing() {
        let toml = r#"
            unit_commitment = "relaxed"
            transmission_losses = 2

            [rolling_horizon]
            horizon = 24
        "#;
        let config = OptimizeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.unit_commitment, UnitCommitment::Linearized);
        assert_eq!(config.transmission_losses, 2);
        assert_eq!(config.rolling_horizon.horizon, 24);
        assert_eq!(config.rolling_horizon.overlap, 0);
        assert!(config.cyclic_state_of_charge_per_period);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            OptimizeConfig::from_toml_str("solver = \"gurobi\""),
            Err(LopfError::Parse(_))
        ));
        let overlap = "[rolling_horizon]\nhorizon = 4\noverlap = 4\n";
        assert!(matches!(
            OptimizeConfig::from_toml_str(overlap),
            Err(LopfError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let config = OptimizeConfig::default()
            .with_multi_investment_periods(true)
            .with_unit_commitment(UnitCommitment::Linearized)
            .with_solver(SolverKind::Microlp);
        let file = NamedTempFile::new().unwrap();
        config.save_to(file.path()).unwrap();
        let loaded = OptimizeConfig::load_from(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OptimizeConfig::load_from(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, LopfError::Io(_)));
    }

    #[test]
    fn test_solver_resolution() {
        assert!(SolverKind::Clarabel.resolve(true).is_err());
        if cfg!(feature = "solver-clarabel") {
            assert_eq!(SolverKind::Auto.resolve(false).unwrap(), SolverKind::Clarabel);
        }
        if let Ok(kind) = SolverKind::Auto.resolve(true) {
            assert!(kind.supports_integers());
        }
    }
}

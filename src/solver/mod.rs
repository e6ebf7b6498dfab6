//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! The system `A v = z` is written over the non-ground node voltages only:
//! - A holds the conductances of every admittance-like device
//! - z holds injected currents (sources and companion-model history)
//! - Ideal voltage constraints replace rows of A instead of adding branch
//!   current unknowns
//!
//! ## Nonlinear devices
//!
//! Diodes are stamped as a chord conductance that depends on a guess of
//! their terminal voltage. For each transient step the guess vector is
//! driven to a fixed point by [`NewtonRaphson`] or [`levenberg`].

pub mod levenberg;
mod mna;
mod newton;
mod simulator;

pub use mna::{assemble, assemble_operating_point, assemble_transient, MnaMatrix};
pub use newton::{NewtonRaphson, StepProblem};
pub use simulator::{
    OperatingPointRun, SimulationResult, Simulator, TransientRow, TransientRun,
};

/// Newton iterations per transient step.
pub const NEWTON_ITERATIONS: usize = 1000;

/// Fraction of the Newton step applied per iteration.
pub const NEWTON_DAMPING: f64 = 0.005;

/// Relative parameter tolerance for Levenberg-Marquardt.
pub const LM_XTOL: f64 = 1e-10;

/// Residual evaluations allowed to Levenberg-Marquardt per step.
pub const LM_MAX_EVALUATIONS: usize = 1000;

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Newton iteration budget per step.
    pub newton_iterations: usize,
    /// Newton damping factor.
    pub newton_damping: f64,
    /// Optional early exit when the residual norm drops below this value.
    pub newton_tolerance: Option<f64>,
    /// Levenberg-Marquardt `xtol`.
    pub lm_xtol: f64,
    /// Levenberg-Marquardt evaluation budget.
    pub lm_max_evaluations: usize,
    /// Draw a progress bar on stderr during linear transients.
    pub progress: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            newton_iterations: NEWTON_ITERATIONS,
            newton_damping: NEWTON_DAMPING,
            newton_tolerance: None,
            lm_xtol: LM_XTOL,
            lm_max_evaluations: LM_MAX_EVALUATIONS,
            progress: false,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Newton iteration budget.
    pub fn with_newton_iterations(mut self, iterations: usize) -> Self {
        self.newton_iterations = iterations;
        self
    }

    /// Set the Newton damping factor.
    pub fn with_newton_damping(mut self, damping: f64) -> Self {
        self.newton_damping = damping;
        self
    }

    /// Stop Newton early once the residual norm is below `tolerance` (volts).
    ///
    /// Off by default: the full budget is always spent.
    pub fn with_newton_tolerance(mut self, tolerance: f64) -> Self {
        self.newton_tolerance = Some(tolerance);
        self
    }

    /// Set the Levenberg-Marquardt parameter tolerance.
    pub fn with_lm_xtol(mut self, xtol: f64) -> Self {
        self.lm_xtol = xtol;
        self
    }

    /// Set the Levenberg-Marquardt evaluation budget.
    pub fn with_lm_max_evaluations(mut self, evaluations: usize) -> Self {
        self.lm_max_evaluations = evaluations;
        self
    }

    /// Enable the stderr progress bar.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

//! Core types for circuit representation.

use std::fmt;

/// A stable identifier for a node in the circuit arena.
/// Slot 0 is always ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The ground node (always slot 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// A stable identifier for a component in the circuit arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// An electrical connection point.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// Row/column in the linear system; `None` for ground.
    pub index: Option<usize>,
    /// Voltage from the most recent committed solve.
    pub voltage: f64,
    /// Incident components (not owned).
    pub components: Vec<ComponentId>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            name: name.into(),
            index,
            voltage: 0.0,
            components: Vec::new(),
        }
    }

    /// Check if this node is excluded from the linear system.
    pub fn is_ground(&self) -> bool {
        self.index.is_none()
    }
}

/// Nonlinear iteration strategy, chosen per circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationStrategy {
    /// Fixed-budget damped Newton with a finite-difference Jacobian
    Newton,
    /// Trust-region Levenberg-Marquardt least squares
    #[default]
    LevenbergMarquardt,
}

impl std::str::FromStr for IterationStrategy {
    type Err = crate::error::NodalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newton" => Ok(Self::Newton),
            "levenberg" | "lm" | "levenberg-marquardt" => Ok(Self::LevenbergMarquardt),
            _ => Err(crate::error::NodalError::UnknownIterationStrategy {
                name: s.to_string(),
            }),
        }
    }
}

/// An analysis requested for the circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Analysis {
    /// DC operating point
    OperatingPoint,
    /// Fixed-step transient sweep
    Transient {
        /// Stop time in seconds
        stop: f64,
        /// Rows before this time are computed but not emitted
        save_start: f64,
        /// Fixed timestep in seconds
        step: f64,
    },
}

impl Analysis {
    /// Create a transient analysis; a zero step defaults to a thousand steps.
    pub fn transient(stop: f64, save_start: f64, step: f64) -> Self {
        let step = if step == 0.0 { stop / 1000.0 } else { step };
        Analysis::Transient {
            stop,
            save_start,
            step,
        }
    }

    /// Reject transient timing that cannot drive a fixed-step sweep.
    pub fn check(&self) -> crate::error::Result<()> {
        let Analysis::Transient { stop, save_start, step } = *self else {
            return Ok(());
        };
        let invalid = |message: String| Err(crate::error::NodalError::InvalidSimulationParam { message });
        if !step.is_finite() || step <= 0.0 {
            return invalid(format!("transient step must be positive and finite, got {}", step));
        }
        if !stop.is_finite() || stop <= 0.0 {
            return invalid(format!("transient stop time must be positive and finite, got {}", stop));
        }
        if !save_start.is_finite() || save_start < 0.0 {
            return invalid(format!("transient save start must be non-negative, got {}", save_start));
        }
        Ok(())
    }

    /// Short label used in output file names.
    pub fn label(&self) -> &'static str {
        match self {
            Analysis::OperatingPoint => "OP",
            Analysis::Transient { .. } => "TRAN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_strategy_from_str() {
        assert_eq!("Newton".parse::<IterationStrategy>().unwrap(), IterationStrategy::Newton);
        assert_eq!("lm".parse::<IterationStrategy>().unwrap(), IterationStrategy::LevenbergMarquardt);
        assert!("secant".parse::<IterationStrategy>().is_err());
    }

    #[test]
    fn test_check_rejects_bad_timing() {
        assert!(Analysis::OperatingPoint.check().is_ok());
        assert!(Analysis::transient(1e-3, 0.0, 1e-6).check().is_ok());
        for bad in [
            Analysis::Transient { stop: 1.0, save_start: 0.0, step: 0.0 },
            Analysis::Transient { stop: 1.0, save_start: 0.0, step: -1e-3 },
            Analysis::Transient { stop: f64::INFINITY, save_start: 0.0, step: 1e-3 },
            Analysis::Transient { stop: 0.0, save_start: 0.0, step: 1e-3 },
            Analysis::Transient { stop: 1.0, save_start: f64::NAN, step: 1e-3 },
        ] {
            assert!(
                matches!(bad.check(), Err(crate::error::NodalError::InvalidSimulationParam { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_transient_default_step() {
        match Analysis::transient(1e-3, 0.0, 0.0) {
            Analysis::Transient { step, .. } => assert!((step - 1e-6).abs() < 1e-18),
            _ => unreachable!(),
        }
    }
}

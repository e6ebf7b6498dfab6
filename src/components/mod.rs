//! Component models for circuit simulation.
//!
//! This module provides models for all supported circuit components:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source, Current Source
//! - Nonlinear: Diode, Transistor
//!
//! [`Component`] is a closed enum; the assembly engine dispatches on its
//! capability methods ([`Component::conductance`],
//! [`Component::current_contribution`], [`Component::is_source`],
//! [`Component::is_nonlinear`]) rather than inspecting variants itself.
//!
//! Sign convention: every two-terminal device reports the current flowing
//! through it from its first terminal to its second.

mod bjt;
mod diode;
mod linear;
mod sources;

pub use bjt::{Transistor, TransistorParams, TransistorPolarity};
pub use diode::{Diode, DiodeParams};
pub use linear::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, VoltageSource, Waveform};

use crate::circuit::{ComponentId, NodeId, ParamTable};
use crate::error::{NodalError, Result};

/// Conductance used for a capacitor when the timestep is not positive.
pub const MAX_CONDUCTANCE: f64 = 1e13;

/// Conductance used for an inductor when the timestep is not positive.
pub const MIN_CONDUCTANCE: f64 = 1e-13;

/// A device value: either a literal or a variable resolved per sweep point.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(f64),
    Variable(String),
}

impl Value {
    /// Resolve against a parameter table.
    pub fn resolve(&self, component: &str, params: &ParamTable) -> Result<f64> {
        match self {
            Value::Literal(v) => Ok(*v),
            Value::Variable(name) => params.get(name).ok_or_else(|| NodalError::UnboundVariable {
                component: component.to_string(),
                variable: name.clone(),
            }),
        }
    }

    /// The variable name, if symbolic.
    pub fn variable(&self) -> Option<&str> {
        match self {
            Value::Variable(name) => Some(name),
            Value::Literal(_) => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Literal(v)
    }
}

impl From<&str> for Value {
    fn from(name: &str) -> Self {
        Value::Variable(name.to_string())
    }
}

/// Which system formulation a device is being asked about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveMode {
    /// DC operating point: reactive devices use their op-replacement
    OperatingPoint,
    /// One transient step at `time` with effective step `step`
    Transient { time: f64, step: f64 },
}

impl SolveMode {
    /// Create a transient mode; the step is forced to 0 at `t = 0`.
    pub fn transient(time: f64, step: f64) -> Self {
        let step = if time == 0.0 { 0.0 } else { step };
        SolveMode::Transient { time, step }
    }

    pub fn time(&self) -> f64 {
        match self {
            SolveMode::OperatingPoint => 0.0,
            SolveMode::Transient { time, .. } => *time,
        }
    }

    pub fn step(&self) -> f64 {
        match self {
            SolveMode::OperatingPoint => -1.0,
            SolveMode::Transient { step, .. } => *step,
        }
    }
}

/// The ideal source a reactive device is replaced with at operating point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpReplacement {
    /// Zero-valued current source (capacitor: open)
    Current(f64),
    /// Zero-valued voltage source (inductor: short)
    Voltage(f64),
}

/// A circuit component.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Diode(Diode),
    Transistor(Transistor),
}

impl Component {
    /// Get the component ID.
    pub fn id(&self) -> ComponentId {
        match self {
            Component::Resistor(r) => r.id,
            Component::Capacitor(c) => c.id,
            Component::Inductor(l) => l.id,
            Component::VoltageSource(v) => v.id,
            Component::CurrentSource(i) => i.id,
            Component::Diode(d) => d.id,
            Component::Transistor(q) => q.id,
        }
    }

    /// Get the component name.
    pub fn name(&self) -> &str {
        match self {
            Component::Resistor(r) => &r.name,
            Component::Capacitor(c) => &c.name,
            Component::Inductor(l) => &l.name,
            Component::VoltageSource(v) => &v.name,
            Component::CurrentSource(i) => &i.name,
            Component::Diode(d) => &d.name,
            Component::Transistor(q) => &q.name,
        }
    }

    /// Terminal nodes; the first two are the positive and negative terminal.
    pub fn nodes(&self) -> &[NodeId] {
        match self {
            Component::Resistor(r) => &r.nodes,
            Component::Capacitor(c) => &c.nodes,
            Component::Inductor(l) => &l.nodes,
            Component::VoltageSource(v) => &v.nodes,
            Component::CurrentSource(i) => &i.nodes,
            Component::Diode(d) => &d.nodes,
            Component::Transistor(q) => &q.nodes,
        }
    }

    pub fn pos_node(&self) -> NodeId {
        self.nodes()[0]
    }

    pub fn neg_node(&self) -> NodeId {
        self.nodes()[1]
    }

    /// Whether the device enters the system by row replacement or as an
    /// injected current rather than as an admittance.
    pub fn is_source(&self) -> bool {
        matches!(self, Component::VoltageSource(_) | Component::CurrentSource(_))
    }

    /// Whether the device has a companion model with history.
    pub fn is_reactive(&self) -> bool {
        matches!(self, Component::Capacitor(_) | Component::Inductor(_))
    }

    /// Check if this component forces nonlinear solving.
    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Component::Diode(_) | Component::Transistor(_))
    }

    /// Whether the device constrains its terminal voltage in `mode`.
    pub fn is_voltage_like(&self, mode: SolveMode) -> bool {
        match self {
            Component::VoltageSource(_) => true,
            Component::Inductor(_) => mode == SolveMode::OperatingPoint,
            _ => false,
        }
    }

    /// Conductance stamped between the first two terminals.
    ///
    /// `v` is the terminal voltage from the last committed solve. Returns
    /// `None` for devices without a defined conductance (ideal sources, the
    /// transistor) and for reactive devices at operating point, which are
    /// excluded from the matrix entirely.
    pub fn conductance(&self, params: &ParamTable, mode: SolveMode, v: f64) -> Result<Option<f64>> {
        match (self, mode) {
            (Component::Resistor(r), _) => r.conductance(params).map(Some),
            (Component::Capacitor(_) | Component::Inductor(_), SolveMode::OperatingPoint) => Ok(None),
            (Component::Capacitor(c), SolveMode::Transient { step, .. }) => c.conductance(params, step).map(Some),
            (Component::Inductor(l), SolveMode::Transient { step, .. }) => l.conductance(params, step).map(Some),
            (Component::Diode(d), SolveMode::OperatingPoint) => Ok(Some(d.op_conductance(v))),
            (Component::Diode(d), SolveMode::Transient { step, .. }) => Ok(Some(d.conductance(step, v))),
            (Component::VoltageSource(_) | Component::CurrentSource(_) | Component::Transistor(_), _) => Ok(None),
        }
    }

    /// Net current injected into the first terminal (and drawn from the
    /// second) by the device's source term and companion history.
    pub fn current_contribution(&self, params: &ParamTable, mode: SolveMode, v: f64) -> Result<f64> {
        match (self, mode) {
            (Component::CurrentSource(i), _) => Ok(-i.output(params, mode.time())?),
            (Component::Capacitor(c), SolveMode::Transient { step, .. }) => c.companion_current(params, step, v),
            (Component::Inductor(l), SolveMode::Transient { step, .. }) => l.companion_current(params, step, v),
            (Component::Diode(d), SolveMode::Transient { step, .. }) => Ok(d.companion_current(step, v)),
            (Component::Capacitor(c), SolveMode::OperatingPoint) => match c.op_replacement() {
                OpReplacement::Current(i) => Ok(i),
                OpReplacement::Voltage(_) => Ok(0.0),
            },
            _ => Ok(0.0),
        }
    }

    /// Value forced across the terminals by row replacement, if any.
    pub fn source_voltage(&self, params: &ParamTable, mode: SolveMode) -> Result<Option<f64>> {
        match (self, mode) {
            (Component::VoltageSource(v), _) => v.output(params, mode.time()).map(Some),
            (Component::Inductor(l), SolveMode::OperatingPoint) => match l.op_replacement() {
                OpReplacement::Voltage(v) => Ok(Some(v)),
                OpReplacement::Current(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Current through the device from first to second terminal.
    ///
    /// Voltage-like devices return `None`; their current is derived from
    /// Kirchhoff's Current Law by [`crate::circuit::Circuit::component_current`].
    pub fn branch_current(&self, params: &ParamTable, mode: SolveMode, v: f64) -> Result<Option<f64>> {
        if self.is_voltage_like(mode) {
            return Ok(None);
        }
        let current = match (self, mode) {
            (Component::Resistor(r), _) => v * r.conductance(params)?,
            (Component::Capacitor(_), SolveMode::OperatingPoint) => 0.0,
            (Component::Capacitor(c), SolveMode::Transient { step, .. }) => c.current(params, step, v)?,
            (Component::Inductor(l), SolveMode::Transient { step, .. }) => l.current(params, step, v)?,
            (Component::CurrentSource(i), _) => i.output(params, mode.time())?,
            (Component::Diode(d), SolveMode::OperatingPoint) => v * d.op_conductance(v),
            (Component::Diode(d), SolveMode::Transient { step, .. }) => d.current(step, v)?,
            _ => 0.0,
        };
        Ok(Some(current))
    }

    /// Advance companion history after a successful step.
    ///
    /// `v_prev` is the terminal voltage the step was assembled from.
    pub fn commit(&mut self, params: &ParamTable, step: f64, v_prev: f64) -> Result<()> {
        match self {
            Component::Capacitor(c) => c.commit(params, step, v_prev),
            Component::Inductor(l) => l.commit(params, step, v_prev),
            Component::Diode(d) => d.commit(step, v_prev),
            _ => Ok(()),
        }
    }

    /// Clear all history so a sweep point starts from rest.
    pub fn reset_state(&mut self) {
        match self {
            Component::Capacitor(c) => c.i_prev = 0.0,
            Component::Inductor(l) => l.i_prev = 0.0,
            Component::Diode(d) => d.reset_state(),
            _ => {}
        }
    }

    /// Variable names this component resolves through the parameter table.
    pub fn variables(&self) -> Vec<&str> {
        let value = match self {
            Component::Resistor(r) => Some(&r.resistance),
            Component::Capacitor(c) => Some(&c.capacitance),
            Component::Inductor(l) => Some(&l.inductance),
            Component::VoltageSource(v) => Some(&v.waveform.dc),
            Component::CurrentSource(i) => Some(&i.waveform.dc),
            Component::Diode(_) | Component::Transistor(_) => None,
        };
        value.and_then(Value::variable).into_iter().collect()
    }
}

//! Linear passive components: Resistor, Capacitor, Inductor.
//!
//! Reactive devices use backward-Euler companion models. For a step `h`
//! the capacitor becomes a conductance `C/h` in parallel with a current
//! source carrying its history; the inductor becomes `h/L` in parallel
//! with the previous branch current.

use super::{OpReplacement, Value, MAX_CONDUCTANCE, MIN_CONDUCTANCE};
use crate::circuit::{ComponentId, NodeId, ParamTable};
use crate::error::Result;

/// Companion conductance of a capacitance at step `h`.
pub(crate) fn capacitive_conductance(capacitance: f64, step: f64) -> f64 {
    if step <= 0.0 {
        MAX_CONDUCTANCE
    } else {
        capacitance / step
    }
}

/// Companion conductance of an inductance at step `h`.
pub(crate) fn inductive_conductance(inductance: f64, step: f64) -> f64 {
    if step <= 0.0 {
        MIN_CONDUCTANCE
    } else {
        step / inductance
    }
}

/// A resistor component.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [positive, negative]
    pub resistance: Value,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], resistance: Value) -> Self {
        Self {
            id,
            name,
            nodes,
            resistance,
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self, params: &ParamTable) -> Result<f64> {
        Ok(1.0 / self.resistance.resolve(&self.name, params)?)
    }
}

/// A capacitor component.
///
/// `i_prev` holds the companion current `g * V` of the last committed step;
/// the reported current is `V * g - i_prev`.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub capacitance: Value,
    /// Initial condition from the netlist. Parsed and kept, not applied.
    pub initial_voltage: f64,
    /// Companion current of the previous step
    pub i_prev: f64,
}

impl Capacitor {
    /// Create a new capacitor.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], capacitance: Value) -> Self {
        Self {
            id,
            name,
            nodes,
            capacitance,
            initial_voltage: 0.0,
            i_prev: 0.0,
        }
    }

    /// Set the netlist initial condition.
    pub fn with_initial_voltage(mut self, v: f64) -> Self {
        self.initial_voltage = v;
        self
    }

    /// Companion conductance; `1e13` when the step is not positive.
    pub fn conductance(&self, params: &ParamTable, step: f64) -> Result<f64> {
        let c = self.capacitance.resolve(&self.name, params)?;
        Ok(capacitive_conductance(c, step))
    }

    /// History current source: `g * V_prev`.
    pub fn companion_current(&self, params: &ParamTable, step: f64, v_prev: f64) -> Result<f64> {
        Ok(self.conductance(params, step)? * v_prev)
    }

    /// Branch current at terminal voltage `v`.
    pub fn current(&self, params: &ParamTable, step: f64, v: f64) -> Result<f64> {
        Ok(v * self.conductance(params, step)? - self.i_prev)
    }

    pub fn commit(&mut self, params: &ParamTable, step: f64, v_prev: f64) -> Result<()> {
        self.i_prev = self.companion_current(params, step, v_prev)?;
        Ok(())
    }

    /// Open circuit at DC.
    pub fn op_replacement(&self) -> OpReplacement {
        OpReplacement::Current(0.0)
    }
}

/// An inductor component.
///
/// `i_prev` holds the branch current of the last committed step.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub inductance: Value,
    /// Initial condition from the netlist. Parsed and kept, not applied.
    pub initial_current: f64,
    /// Branch current of the previous step
    pub i_prev: f64,
}

impl Inductor {
    /// Create a new inductor.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], inductance: Value) -> Self {
        Self {
            id,
            name,
            nodes,
            inductance,
            initial_current: 0.0,
            i_prev: 0.0,
        }
    }

    /// Set the netlist initial condition.
    pub fn with_initial_current(mut self, i: f64) -> Self {
        self.initial_current = i;
        self
    }

    /// Companion conductance; `1e-13` when the step is not positive.
    pub fn conductance(&self, params: &ParamTable, step: f64) -> Result<f64> {
        let l = self.inductance.resolve(&self.name, params)?;
        Ok(inductive_conductance(l, step))
    }

    /// History current source: `i_prev - g * V_prev`.
    pub fn companion_current(&self, params: &ParamTable, step: f64, v_prev: f64) -> Result<f64> {
        Ok(self.i_prev - self.conductance(params, step)? * v_prev)
    }

    /// Branch current at terminal voltage `v`.
    pub fn current(&self, params: &ParamTable, step: f64, v: f64) -> Result<f64> {
        Ok(v * self.conductance(params, step)? - self.i_prev)
    }

    pub fn commit(&mut self, params: &ParamTable, step: f64, v_prev: f64) -> Result<()> {
        self.i_prev = self.companion_current(params, step, v_prev)?;
        Ok(())
    }

    /// Short circuit at DC.
    pub fn op_replacement(&self) -> OpReplacement {
        OpReplacement::Voltage(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> [NodeId; 2] {
        [NodeId(1), NodeId(0)]
    }

    #[test]
    fn test_resistor_conductance() {
        let r = Resistor::new(ComponentId(0), "R1".to_string(), nodes(), Value::Literal(1000.0));
        assert!((r.conductance(&ParamTable::new()).unwrap() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_resistor_symbolic() {
        let r = Resistor::new(ComponentId(0), "R1".to_string(), nodes(), Value::from("R"));
        let params: ParamTable = [("R", 500.0)].into_iter().collect();
        assert!((r.conductance(&params).unwrap() - 0.002).abs() < 1e-15);
        assert!(r.conductance(&ParamTable::new()).is_err());
    }

    #[test]
    fn test_capacitor_companion() {
        let params = ParamTable::new();
        let mut c = Capacitor::new(ComponentId(0), "C1".to_string(), nodes(), Value::Literal(1e-6));
        assert_eq!(c.conductance(&params, 0.0).unwrap(), MAX_CONDUCTANCE);
        assert!((c.conductance(&params, 1e-3).unwrap() - 1e-3).abs() < 1e-15);

        c.commit(&params, 1e-3, 2.0).unwrap();
        assert!((c.i_prev - 2e-3).abs() < 1e-15);
        // Voltage unchanged over the step means no current
        assert!(c.current(&params, 1e-3, 2.0).unwrap().abs() < 1e-15);
    }

    #[test]
    fn test_inductor_companion() {
        let params = ParamTable::new();
        let mut l = Inductor::new(ComponentId(0), "L1".to_string(), nodes(), Value::Literal(1e-3));
        assert_eq!(l.conductance(&params, -1.0).unwrap(), MIN_CONDUCTANCE);
        assert!((l.conductance(&params, 1e-6).unwrap() - 1e-3).abs() < 1e-15);

        l.i_prev = 0.5;
        l.commit(&params, 1e-6, 1.0).unwrap();
        assert!((l.i_prev - (0.5 - 1e-3)).abs() < 1e-12);
    }

    #[test]
    fn test_op_replacements() {
        let c = Capacitor::new(ComponentId(0), "C1".to_string(), nodes(), Value::Literal(1e-6));
        let l = Inductor::new(ComponentId(1), "L1".to_string(), nodes(), Value::Literal(1e-3));
        assert_eq!(c.op_replacement(), OpReplacement::Current(0.0));
        assert_eq!(l.op_replacement(), OpReplacement::Voltage(0.0));
    }
}

//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / Vt) - 1)
//!
//! The device is stamped as a chord conductance `I(V)/V` from the latest
//! guess, in series with a fixed 100 Ω ohmic path and in parallel with a
//! small leakage, plus a voltage-dependent junction capacitance:
//!   Cj = Cj0 / sqrt(1 - V / Vj)   for V <= 1, else 0

use super::linear::{capacitive_conductance, Capacitor};
use super::Value;
use crate::circuit::{ComponentId, NodeId, ParamTable};
use crate::error::{NodalError, Result};
use crate::netlist::ModelDef;
use crate::THERMAL_VOLTAGE;

/// Leakage conductance always present across the junction.
pub const GMIN: f64 = 1e-5;

/// Conductance of the ohmic path in series with the junction (100 Ω).
const SERIES_CONDUCTANCE: f64 = 1.0 / 100.0;

/// Series combination `1 / (1/a + 1/b)`; NaN maps to 0, overflow to 1e30.
pub fn parallel_add(a: f64, b: f64) -> f64 {
    let result = 1.0 / (1.0 / a + 1.0 / b);
    if result.is_nan() {
        0.0
    } else if !result.is_finite() {
        1e30
    } else {
        result
    }
}

/// Parameters for a diode model.
#[derive(Debug, Clone, PartialEq)]
pub struct DiodeParams {
    /// Saturation current (Is)
    pub is: f64,
    /// Series resistance. Parsed, not used by the stamp.
    pub rs: f64,
    /// Zero-bias junction capacitance
    pub cj0: f64,
    /// Transit time. Parsed, not used by the stamp.
    pub tt: f64,
    /// Reverse breakdown voltage. Parsed, not used by the stamp.
    pub bv: f64,
    /// Current at breakdown. Parsed, not used by the stamp.
    pub ibv: f64,
    /// Junction potential
    pub vj: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            rs: 0.0,
            cj0: 1e-14,
            tt: 0.0,
            bv: 100.0,
            ibv: 1e-11,
            vj: 1.0,
        }
    }
}

impl DiodeParams {
    /// Create parameters from a `.MODEL` card. Unspecified keys keep their
    /// defaults; unknown keys are rejected.
    pub fn from_model(model: &ModelDef) -> Result<Self> {
        let mut params = Self::default();
        for (key, &value) in &model.params {
            match key.as_str() {
                "is" => params.is = value,
                "rs" => params.rs = value,
                "cj0" | "cjo" => params.cj0 = value,
                "tt" => params.tt = value,
                "bv" => params.bv = value,
                "ibv" => params.ibv = value,
                "vj" => params.vj = value,
                _ => {
                    return Err(NodalError::InvalidParameter {
                        component: model.name.clone(),
                        param: key.clone(),
                        message: "unknown diode model parameter".to_string(),
                    })
                }
            }
        }
        Ok(params)
    }

    /// Junction capacitance at bias `v`.
    pub fn junction_capacitance(&self, v: f64) -> f64 {
        if v <= 1.0 {
            self.cj0 / (1.0 - v / self.vj).sqrt()
        } else {
            0.0
        }
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [anode, cathode]
    pub model_name: String,
    pub params: DiodeParams,
    /// Chord conductance `I/V` from the latest guess
    pub g_inst: f64,
    /// Shockley current at the latest guess
    pub i_shockley: f64,
    /// Junction capacitance companion, sharing the diode's terminals
    pub junction: Capacitor,
}

impl Diode {
    /// Create a new diode.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], model_name: String, params: DiodeParams) -> Self {
        let junction = Capacitor::new(id, format!("{}.CJ", name), nodes, Value::Literal(params.cj0));
        Self {
            id,
            name,
            nodes,
            model_name,
            params,
            g_inst: 0.0,
            i_shockley: 0.0,
            junction,
        }
    }

    /// Shockley current at `v`.
    pub fn shockley(&self, v: f64) -> f64 {
        self.params.is * ((v / THERMAL_VOLTAGE).exp() - 1.0)
    }

    /// Update the chord conductance from a nonlinear guess.
    pub fn set_conductance(&mut self, v_guess: f64) {
        let i = self.shockley(v_guess);
        if v_guess != 0.0 && !i.is_nan() {
            self.i_shockley = i;
            self.g_inst = i / v_guess;
        } else {
            self.i_shockley = 0.0;
            self.g_inst = 0.0;
        }
    }

    /// Resistive part: ohmic path in series with leakage plus chord.
    pub fn leakage_conductance(&self) -> f64 {
        parallel_add(SERIES_CONDUCTANCE, GMIN + self.g_inst)
    }

    fn junction_conductance(&self, step: f64, v: f64) -> f64 {
        capacitive_conductance(self.params.junction_capacitance(v), step)
    }

    /// Total transient conductance at bias `v`.
    pub fn conductance(&self, step: f64, v: f64) -> f64 {
        self.leakage_conductance() + self.junction_conductance(step, v)
    }

    /// Junction capacitor history current; NaN maps to 0.
    pub fn companion_current(&self, step: f64, v_prev: f64) -> f64 {
        let i = self.junction_conductance(step, v_prev) * v_prev;
        if i.is_nan() {
            0.0
        } else {
            i
        }
    }

    /// Conductance at operating point: the junction capacitor takes its
    /// `h <= 0` clamp, so the diode is effectively shorted.
    pub fn op_conductance(&self, v: f64) -> f64 {
        self.conductance(-1.0, v)
    }

    /// Reported current at bias `v`.
    ///
    /// The junction term uses the capacitance committed with the last step,
    /// the same one its history current was built from.
    pub fn current(&self, step: f64, v: f64) -> Result<f64> {
        let junction = self.junction.current(&ParamTable::new(), step, v)?;
        Ok(v * self.leakage_conductance() + junction)
    }

    /// Commit the junction companion after a successful step.
    pub fn commit(&mut self, step: f64, v_prev: f64) -> Result<()> {
        self.junction.capacitance = Value::Literal(self.params.junction_capacitance(v_prev));
        self.junction.commit(&ParamTable::new(), step, v_prev)?;
        if self.junction.i_prev.is_nan() {
            self.junction.i_prev = 0.0;
        }
        Ok(())
    }

    pub fn reset_state(&mut self) {
        self.g_inst = 0.0;
        self.i_shockley = 0.0;
        self.junction.capacitance = Value::Literal(self.params.cj0);
        self.junction.i_prev = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn diode() -> Diode {
        Diode::new(
            ComponentId(0),
            "D1".to_string(),
            [NodeId(1), NodeId(0)],
            "D".to_string(),
            DiodeParams::default(),
        )
    }

    #[test]
    fn test_parallel_add() {
        assert_relative_eq!(parallel_add(2.0, 2.0), 1.0);
        assert_eq!(parallel_add(0.0, 0.0), 0.0);
        assert_relative_eq!(parallel_add(f64::INFINITY, 4.0), 4.0);
    }

    #[test]
    fn test_set_conductance_forward_bias() {
        let mut d = diode();
        d.set_conductance(0.6);
        let expected = 1e-14 * ((0.6f64 / 0.025).exp() - 1.0);
        assert_relative_eq!(d.i_shockley, expected);
        assert_relative_eq!(d.g_inst, expected / 0.6);
    }

    #[test]
    fn test_set_conductance_zero_bias() {
        let mut d = diode();
        d.set_conductance(0.6);
        d.set_conductance(0.0);
        assert_eq!(d.g_inst, 0.0);
        assert_eq!(d.i_shockley, 0.0);
    }

    #[test]
    fn test_unbiased_leakage() {
        let d = diode();
        assert_relative_eq!(d.leakage_conductance(), parallel_add(0.01, GMIN));
    }

    #[test]
    fn test_junction_capacitance() {
        let params = DiodeParams::default();
        assert_relative_eq!(params.junction_capacitance(0.0), 1e-14);
        assert_relative_eq!(params.junction_capacitance(0.75), 2e-14);
        assert_eq!(params.junction_capacitance(1.5), 0.0);
    }

    #[test]
    fn test_op_conductance_is_clamped() {
        let d = diode();
        assert_relative_eq!(d.op_conductance(0.0), d.leakage_conductance() + 1e13);
        assert_relative_eq!(d.op_conductance(1.5), d.leakage_conductance() + 1e13);
    }

    #[test]
    fn test_current_uses_committed_junction() {
        let mut d = diode();
        let step = 1e-6;
        d.commit(step, 0.75).unwrap();
        // Cj(0.75) = 2e-14, so the history current is 2e-8 * 0.75
        assert_relative_eq!(d.junction.i_prev, 1.5e-8);

        let i = d.current(step, 0.5).unwrap();
        let expected = 0.5 * d.leakage_conductance() + 0.5 * 2e-8 - 1.5e-8;
        assert_relative_eq!(i, expected, epsilon = 1e-20);

        d.reset_state();
        assert_eq!(d.junction.capacitance, Value::Literal(1e-14));
        assert_eq!(d.junction.i_prev, 0.0);
    }

    #[test]
    fn test_from_model_rejects_unknown_key() {
        let mut params = BTreeMap::new();
        params.insert("is".to_string(), 2e-14);
        let model = ModelDef {
            name: "DMOD".to_string(),
            kind: "D".to_string(),
            params: params.clone(),
        };
        assert_relative_eq!(DiodeParams::from_model(&model).unwrap().is, 2e-14);

        params.insert("foo".to_string(), 1.0);
        let model = ModelDef { params, ..model };
        assert!(DiodeParams::from_model(&model).is_err());
    }
}

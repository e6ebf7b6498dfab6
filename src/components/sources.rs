//! Voltage and current sources.

use std::f64::consts::PI;

use super::Value;
use crate::circuit::{ComponentId, NodeId, ParamTable};
use crate::error::Result;

/// Time-domain description of an independent source.
///
/// The output is `dc + offset + amplitude * sin(2π f t)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub dc: Value,
    /// Small-signal amplitude. Parsed and kept; no AC analysis uses it.
    pub small_signal: f64,
    pub sine_offset: f64,
    pub sine_amplitude: f64,
    pub sine_frequency: f64,
}

impl Waveform {
    /// A constant source.
    pub fn dc(value: impl Into<Value>) -> Self {
        Self {
            dc: value.into(),
            small_signal: 0.0,
            sine_offset: 0.0,
            sine_amplitude: 0.0,
            sine_frequency: 0.0,
        }
    }

    /// A sinusoid around `offset` with no separate DC term.
    pub fn sine(offset: f64, amplitude: f64, frequency: f64) -> Self {
        Self {
            sine_offset: offset,
            sine_amplitude: amplitude,
            sine_frequency: frequency,
            ..Self::dc(0.0)
        }
    }

    /// Source value at time `t`.
    pub fn output(&self, component: &str, params: &ParamTable, t: f64) -> Result<f64> {
        let dc = self.dc.resolve(component, params)?;
        Ok(dc + self.sine_offset + self.sine_amplitude * (2.0 * PI * self.sine_frequency * t).sin())
    }
}

/// A voltage source component.
///
/// Enters the system by row replacement and enforces `V+ - V- = V_source`.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [positive, negative]
    pub waveform: Waveform,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], waveform: Waveform) -> Self {
        Self {
            id,
            name,
            nodes,
            waveform,
        }
    }

    /// Get the source voltage at time `t`.
    pub fn output(&self, params: &ParamTable, t: f64) -> Result<f64> {
        self.waveform.output(&self.name, params, t)
    }
}

/// A current source component.
///
/// The output current leaves the positive node and is injected into the
/// negative node, so a positive value flows from + to - through the source.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [positive, negative]
    pub waveform: Waveform,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], waveform: Waveform) -> Self {
        Self {
            id,
            name,
            nodes,
            waveform,
        }
    }

    /// Get the source current at time `t`.
    pub fn output(&self, params: &ParamTable, t: f64) -> Result<f64> {
        self.waveform.output(&self.name, params, t)
    }
}

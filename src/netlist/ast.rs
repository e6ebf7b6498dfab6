//! Abstract Syntax Tree types for SPICE netlists.

use std::collections::BTreeMap;

use crate::circuit::{Analysis, SweepKind};
use crate::components::{Value, Waveform};

/// Complete representation of a parsed netlist.
#[derive(Debug, Clone, Default)]
pub struct Netlist {
    /// First line of the file
    pub title: String,
    /// Component cards in file order
    pub components: Vec<ComponentDef>,
    /// `.MODEL` definitions by name
    pub models: BTreeMap<String, ModelDef>,
    /// `.OP` / `.TRAN` commands in file order
    pub analyses: Vec<Analysis>,
    /// `.STEP` sweeps by variable name
    pub sweeps: BTreeMap<String, SweepKind>,
}

impl Netlist {
    /// Create an empty netlist with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A component card.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDef {
    pub component_type: ComponentType,
    /// Unique component name (the full first field, e.g. `R1`)
    pub name: String,
    /// Connected node names
    pub nodes: Vec<String>,
    /// Type-specific payload
    pub kind: ComponentKind,
    /// Source line number for error reporting
    pub line: usize,
}

/// Card payload by component type.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    /// R, C and L: value plus optional initial condition
    Passive { value: Value, initial: Option<f64> },
    /// V and I
    Source(Waveform),
    /// D and Q
    Model(String),
}

/// Component types supported by the netlist reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    /// Resistor
    Resistor,
    /// Capacitor
    Capacitor,
    /// Inductor
    Inductor,
    /// Diode
    Diode,
    /// Bipolar Junction Transistor
    Bjt,
    /// Voltage Source
    VoltageSource,
    /// Current Source
    CurrentSource,
}

impl ComponentType {
    /// Parse a component type from its card prefix.
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix.to_ascii_uppercase() {
            'R' => Some(Self::Resistor),
            'C' => Some(Self::Capacitor),
            'L' => Some(Self::Inductor),
            'D' => Some(Self::Diode),
            'Q' => Some(Self::Bjt),
            'V' => Some(Self::VoltageSource),
            'I' => Some(Self::CurrentSource),
            _ => None,
        }
    }

    /// Get the expected number of nodes for this component type.
    pub fn expected_node_count(&self) -> usize {
        match self {
            Self::Bjt => 3,
            _ => 2,
        }
    }
}

/// Card prefixes recognized as SPICE devices but not simulated.
pub const UNSUPPORTED_PREFIXES: &[char] = &['M', 'E', 'G', 'H', 'F', 'J', 'K', 'B', 'X', 'S', 'W', 'T'];

/// A `.MODEL` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDef {
    /// Model name referenced by device cards
    pub name: String,
    /// Model kind as written (`D`, `NPN`, `PNP`)
    pub kind: String,
    /// Parameters with lowercase keys
    pub params: BTreeMap<String, f64>,
}

impl ModelDef {
    /// Whether this is a diode model.
    pub fn is_diode(&self) -> bool {
        self.kind.eq_ignore_ascii_case("d")
    }
}

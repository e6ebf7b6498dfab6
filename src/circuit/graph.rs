//! Circuit graph structure.
//!
//! Nodes and components live in two arenas indexed by [`NodeId`] and
//! [`ComponentId`]. A component stores the ids of its terminals; a node
//! stores the ids of its incident components. Removed entries leave an
//! empty slot so ids held elsewhere never alias a different entry.

use std::collections::BTreeMap;

use super::params::{expand_sweeps, ParamTable, SweepKind};
use super::types::{Analysis, ComponentId, IterationStrategy, Node, NodeId};
use crate::components::{
    Capacitor, Component, CurrentSource, Diode, DiodeParams, Inductor, Resistor, SolveMode, Transistor,
    TransistorParams, TransistorPolarity, Value, VoltageSource, Waveform,
};
use crate::error::{NodalError, Result};
use crate::netlist::{ComponentKind, ComponentType, Netlist, DEFAULT_DIODE_MODEL};

/// Name under which the ground node is registered.
pub const GROUND_NAME: &str = "0";

/// Whether a netlist node name refers to ground.
pub fn is_ground_name(name: &str) -> bool {
    name == GROUND_NAME || name.eq_ignore_ascii_case("gnd")
}

/// A complete circuit ready for simulation.
#[derive(Debug, Clone)]
pub struct Circuit {
    /// Title line of the netlist, used to name output files
    pub title: String,

    /// Nonlinear iteration strategy
    pub iteration: IterationStrategy,

    /// Requested analyses, in netlist order
    pub analyses: Vec<Analysis>,

    /// Swept variables, by name
    sweeps: BTreeMap<String, SweepKind>,

    /// One table per sweep point; never empty
    tables: Vec<ParamTable>,

    nodes: Vec<Option<Node>>,
    components: Vec<Option<Component>>,
    node_map: BTreeMap<String, NodeId>,
    component_map: BTreeMap<String, ComponentId>,

    /// Diodes whose chord conductance tracks the nonlinear guess
    nonlinear_devices: Vec<ComponentId>,

    /// Set when a nonlinear device is added; never cleared
    nonlinear: bool,

    /// Number of non-ground nodes
    num_unknowns: usize,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new("")
    }
}

impl Circuit {
    /// Create an empty circuit containing only the ground node.
    pub fn new(title: impl Into<String>) -> Self {
        let mut node_map = BTreeMap::new();
        node_map.insert(GROUND_NAME.to_string(), NodeId::GROUND);
        Self {
            title: title.into(),
            iteration: IterationStrategy::default(),
            analyses: Vec::new(),
            sweeps: BTreeMap::new(),
            tables: vec![ParamTable::new()],
            nodes: vec![Some(Node::new(GROUND_NAME, None))],
            components: Vec::new(),
            node_map,
            component_map: BTreeMap::new(),
            nonlinear_devices: Vec::new(),
            nonlinear: false,
            num_unknowns: 0,
        }
    }

    // ============ Construction ============

    /// Look up a node by name, creating it if needed.
    pub fn node_or_insert(&mut self, name: &str) -> NodeId {
        if is_ground_name(name) {
            return NodeId::GROUND;
        }
        if let Some(&id) = self.node_map.get(name) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(name, Some(self.num_unknowns))));
        self.node_map.insert(name.to_string(), id);
        self.num_unknowns += 1;
        id
    }

    /// Insert a component built from its id and resolved terminals.
    fn insert<F>(&mut self, name: &str, terminals: &[&str], build: F) -> Result<ComponentId>
    where
        F: FnOnce(ComponentId, String, &[NodeId]) -> Component,
    {
        if self.component_map.contains_key(name) {
            return Err(NodalError::DuplicateComponent { name: name.to_string() });
        }
        let id = ComponentId(self.components.len());
        let nodes: Vec<NodeId> = terminals.iter().map(|t| self.node_or_insert(t)).collect();
        for &node in &nodes {
            if let Some(node) = self.nodes[node.0].as_mut() {
                if !node.components.contains(&id) {
                    node.components.push(id);
                }
            }
        }

        let component = build(id, name.to_string(), &nodes);
        if matches!(component, Component::Diode(_)) {
            self.nonlinear_devices.push(id);
        }
        self.nonlinear |= component.is_nonlinear();
        self.components.push(Some(component));
        self.component_map.insert(name.to_string(), id);
        Ok(id)
    }

    /// Build a circuit from a parsed netlist.
    ///
    /// Device cards are added in file order; D and Q cards resolve their
    /// model against the netlist's `.MODEL` definitions.
    pub fn from_netlist(netlist: Netlist) -> Result<Self> {
        let mut circuit = Circuit::new(netlist.title);

        for card in &netlist.components {
            let n = &card.nodes;
            if n.len() != card.component_type.expected_node_count() {
                return Err(NodalError::invalid_component(
                    &card.name,
                    card.line,
                    format!("expected {} nodes, got {}", card.component_type.expected_node_count(), n.len()),
                ));
            }

            let added = match (card.component_type, &card.kind) {
                (ComponentType::Resistor, ComponentKind::Passive { value, .. }) => {
                    circuit.add_resistor(&card.name, &n[0], &n[1], value.clone())
                }
                (ComponentType::Capacitor, ComponentKind::Passive { value, initial }) => {
                    circuit.add_capacitor_with_ic(&card.name, &n[0], &n[1], value.clone(), initial.unwrap_or(0.0))
                }
                (ComponentType::Inductor, ComponentKind::Passive { value, initial }) => {
                    circuit.add_inductor_with_ic(&card.name, &n[0], &n[1], value.clone(), initial.unwrap_or(0.0))
                }
                (ComponentType::VoltageSource, ComponentKind::Source(waveform)) => {
                    circuit.add_voltage_source(&card.name, &n[0], &n[1], waveform.clone())
                }
                (ComponentType::CurrentSource, ComponentKind::Source(waveform)) => {
                    circuit.add_current_source(&card.name, &n[0], &n[1], waveform.clone())
                }
                (ComponentType::Diode, ComponentKind::Model(model_name)) => {
                    let params = match netlist.models.get(model_name) {
                        Some(model) if model.is_diode() => DiodeParams::from_model(model)?,
                        Some(model) => {
                            return Err(NodalError::invalid_component(
                                &card.name,
                                card.line,
                                format!("model '{}' is a {} model, not a diode", model.name, model.kind),
                            ))
                        }
                        None if model_name.eq_ignore_ascii_case(DEFAULT_DIODE_MODEL) => DiodeParams::default(),
                        None => {
                            return Err(NodalError::invalid_component(
                                &card.name,
                                card.line,
                                format!("unknown model '{}'", model_name),
                            ))
                        }
                    };
                    circuit.add_diode(&card.name, &n[0], &n[1], model_name, params)
                }
                (ComponentType::Bjt, ComponentKind::Model(model_name)) => {
                    let (polarity, params) = match netlist.models.get(model_name) {
                        Some(model) => TransistorParams::from_model(model)?,
                        None => match model_name.parse::<TransistorPolarity>() {
                            Ok(polarity) => (polarity, TransistorParams::default()),
                            Err(_) => {
                                return Err(NodalError::invalid_component(
                                    &card.name,
                                    card.line,
                                    format!("unknown model '{}'", model_name),
                                ))
                            }
                        },
                    };
                    circuit.add_transistor(&card.name, &n[0], &n[1], &n[2], model_name, polarity, params)
                }
                (component_type, kind) => {
                    return Err(NodalError::invalid_component(
                        &card.name,
                        card.line,
                        format!("{:?} card cannot carry {:?}", component_type, kind),
                    ))
                }
            };
            added?;
        }

        circuit.analyses = netlist.analyses;
        circuit.set_sweeps(netlist.sweeps);
        Ok(circuit)
    }

    /// Add a resistor between `pos` and `neg`.
    pub fn add_resistor(&mut self, name: &str, pos: &str, neg: &str, value: impl Into<Value>) -> Result<ComponentId> {
        let value = value.into();
        self.insert(name, &[pos, neg], |id, name, n| {
            Component::Resistor(Resistor::new(id, name, [n[0], n[1]], value))
        })
    }

    /// Add a capacitor between `pos` and `neg`.
    pub fn add_capacitor(&mut self, name: &str, pos: &str, neg: &str, value: impl Into<Value>) -> Result<ComponentId> {
        self.add_capacitor_with_ic(name, pos, neg, value, 0.0)
    }

    /// Add a capacitor carrying a netlist initial condition.
    pub fn add_capacitor_with_ic(
        &mut self,
        name: &str,
        pos: &str,
        neg: &str,
        value: impl Into<Value>,
        initial_voltage: f64,
    ) -> Result<ComponentId> {
        let value = value.into();
        self.insert(name, &[pos, neg], |id, name, n| {
            Component::Capacitor(Capacitor::new(id, name, [n[0], n[1]], value).with_initial_voltage(initial_voltage))
        })
    }

    /// Add an inductor between `pos` and `neg`.
    pub fn add_inductor(&mut self, name: &str, pos: &str, neg: &str, value: impl Into<Value>) -> Result<ComponentId> {
        self.add_inductor_with_ic(name, pos, neg, value, 0.0)
    }

    /// Add an inductor carrying a netlist initial condition.
    pub fn add_inductor_with_ic(
        &mut self,
        name: &str,
        pos: &str,
        neg: &str,
        value: impl Into<Value>,
        initial_current: f64,
    ) -> Result<ComponentId> {
        let value = value.into();
        self.insert(name, &[pos, neg], |id, name, n| {
            Component::Inductor(Inductor::new(id, name, [n[0], n[1]], value).with_initial_current(initial_current))
        })
    }

    /// Add an independent voltage source.
    pub fn add_voltage_source(&mut self, name: &str, pos: &str, neg: &str, waveform: Waveform) -> Result<ComponentId> {
        self.insert(name, &[pos, neg], |id, name, n| {
            Component::VoltageSource(VoltageSource::new(id, name, [n[0], n[1]], waveform))
        })
    }

    /// Add an independent current source.
    pub fn add_current_source(&mut self, name: &str, pos: &str, neg: &str, waveform: Waveform) -> Result<ComponentId> {
        self.insert(name, &[pos, neg], |id, name, n| {
            Component::CurrentSource(CurrentSource::new(id, name, [n[0], n[1]], waveform))
        })
    }

    /// Add a diode from `anode` to `cathode`.
    pub fn add_diode(
        &mut self,
        name: &str,
        anode: &str,
        cathode: &str,
        model_name: &str,
        params: DiodeParams,
    ) -> Result<ComponentId> {
        let model_name = model_name.to_string();
        self.insert(name, &[anode, cathode], |id, name, n| {
            Component::Diode(Diode::new(id, name, [n[0], n[1]], model_name, params))
        })
    }

    /// Add a transistor with terminals collector, base, emitter.
    #[allow(clippy::too_many_arguments)]
    pub fn add_transistor(
        &mut self,
        name: &str,
        collector: &str,
        base: &str,
        emitter: &str,
        model_name: &str,
        polarity: TransistorPolarity,
        params: TransistorParams,
    ) -> Result<ComponentId> {
        let model_name = model_name.to_string();
        self.insert(name, &[collector, base, emitter], |id, name, n| {
            Component::Transistor(Transistor::new(id, name, [n[0], n[1], n[2]], model_name, polarity, params))
        })
    }

    /// Remove a component by name.
    ///
    /// Nodes left without any incident component are deleted and the
    /// remaining nodes are renumbered densely.
    pub fn remove_component(&mut self, name: &str) -> Result<Component> {
        let id = self
            .component_map
            .remove(name)
            .ok_or_else(|| NodalError::ComponentNotFound { name: name.to_string() })?;
        let component = self.components[id.0]
            .take()
            .ok_or_else(|| NodalError::ComponentNotFound { name: name.to_string() })?;
        self.nonlinear_devices.retain(|&d| d != id);

        for &node_id in component.nodes() {
            let orphaned = match self.nodes[node_id.0].as_mut() {
                Some(node) => {
                    node.components.retain(|&c| c != id);
                    node.components.is_empty() && !node_id.is_ground()
                }
                None => false,
            };
            if orphaned {
                if let Some(node) = self.nodes[node_id.0].take() {
                    self.node_map.remove(&node.name);
                }
            }
        }
        self.reindex();
        Ok(component)
    }

    /// Assign dense matrix indices to live non-ground nodes in id order.
    fn reindex(&mut self) {
        let mut next = 0;
        for node in self.nodes.iter_mut().skip(1).flatten() {
            node.index = Some(next);
            next += 1;
        }
        self.num_unknowns = next;
    }

    /// Replace the sweep definitions and rebuild the parameter tables.
    pub fn set_sweeps(&mut self, sweeps: BTreeMap<String, SweepKind>) {
        self.tables = expand_sweeps(&sweeps);
        self.sweeps = sweeps;
    }

    // ============ Queries ============

    /// Parameter tables, one per sweep point.
    pub fn tables(&self) -> &[ParamTable] {
        &self.tables
    }

    pub fn sweeps(&self) -> &BTreeMap<String, SweepKind> {
        &self.sweeps
    }

    /// Whether any `.STEP` sweep is active.
    pub fn has_sweep(&self) -> bool {
        !self.sweeps.is_empty()
    }

    /// Size of the linear system.
    pub fn num_unknowns(&self) -> usize {
        self.num_unknowns
    }

    /// Whether a nonlinear device was ever added. Removing the device does
    /// not clear the flag.
    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }

    /// Diodes participating in nonlinear iteration.
    pub fn nonlinear_devices(&self) -> &[ComponentId] {
        &self.nonlinear_devices
    }

    /// Live components in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().flatten()
    }

    /// Live components ordered by name.
    pub fn components_by_name(&self) -> impl Iterator<Item = &Component> {
        self.component_map.values().filter_map(|id| self.component(*id))
    }

    pub fn num_components(&self) -> usize {
        self.component_map.len()
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0).and_then(Option::as_ref)
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Find a component by name.
    pub fn find_component(&self, name: &str) -> Option<&Component> {
        self.component_map.get(name).and_then(|id| self.component(*id))
    }

    fn get(&self, id: ComponentId) -> Result<&Component> {
        self.component(id).ok_or_else(|| NodalError::ComponentNotFound { name: id.to_string() })
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Live nodes ordered by name, ground included.
    pub fn nodes_by_name(&self) -> impl Iterator<Item = &Node> {
        self.node_map.values().filter_map(|id| self.node(*id))
    }

    /// Find a node ID by name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        if is_ground_name(name) {
            return Some(NodeId::GROUND);
        }
        self.node_map.get(name).copied()
    }

    /// Get the matrix index for a node voltage. Returns None for ground.
    pub fn node_index(&self, node: NodeId) -> Option<usize> {
        self.node(node).and_then(|n| n.index)
    }

    /// Voltage of a node from the last committed solve.
    pub fn node_voltage(&self, node: NodeId) -> f64 {
        self.node(node).map_or(0.0, |n| n.voltage)
    }

    /// Voltage between a component's first and second terminal.
    pub fn terminal_voltage(&self, component: &Component) -> f64 {
        self.node_voltage(component.pos_node()) - self.node_voltage(component.neg_node())
    }

    /// Node voltages in matrix-index order.
    pub fn unknowns(&self) -> Vec<f64> {
        let mut x = vec![0.0; self.num_unknowns];
        for node in self.nodes.iter().flatten() {
            if let Some(i) = node.index {
                x[i] = node.voltage;
            }
        }
        x
    }

    // ============ State ============

    /// Write a solution vector back into the node voltages.
    pub fn set_unknowns(&mut self, x: &[f64]) {
        for node in self.nodes.iter_mut().flatten() {
            if let Some(i) = node.index {
                node.voltage = x.get(i).copied().unwrap_or(0.0);
            }
        }
    }

    /// Update each diode's chord conductance from a guess of its terminal
    /// voltage, one entry per [`Circuit::nonlinear_devices`] slot.
    pub fn apply_guess(&mut self, guess: &[f64]) {
        for (slot, &v) in guess.iter().enumerate() {
            let Some(&id) = self.nonlinear_devices.get(slot) else {
                break;
            };
            if let Some(Component::Diode(d)) = self.component_mut(id) {
                d.set_conductance(v);
            }
        }
    }

    /// Terminal voltage of each nonlinear device under a solution vector.
    pub fn device_voltages(&self, x: &[f64]) -> Vec<f64> {
        let voltage = |node: NodeId| self.node_index(node).and_then(|i| x.get(i).copied()).unwrap_or(0.0);
        self.nonlinear_devices
            .iter()
            .filter_map(|&id| self.component(id))
            .map(|c| voltage(c.pos_node()) - voltage(c.neg_node()))
            .collect()
    }

    /// Advance every companion model after a successful step.
    ///
    /// Must run before the new solution is written back, so each device
    /// sees the voltage its step was assembled from.
    pub fn commit_step(&mut self, params: &ParamTable, step: f64) -> Result<()> {
        for slot in 0..self.components.len() {
            let v = match &self.components[slot] {
                Some(c) => self.terminal_voltage(c),
                None => continue,
            };
            if let Some(c) = self.components[slot].as_mut() {
                c.commit(params, step, v)?;
            }
        }
        Ok(())
    }

    /// Zero node voltages and all device history.
    pub fn reset_state(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.voltage = 0.0;
        }
        for component in self.components.iter_mut().flatten() {
            component.reset_state();
        }
    }

    // ============ Currents ============

    /// Current through a component from its first to its second terminal.
    ///
    /// Voltage-constrained devices (sources, and inductors at operating
    /// point) get their current from KCL at one terminal.
    pub fn component_current(&self, id: ComponentId, params: &ParamTable, mode: SolveMode) -> Result<f64> {
        let component = self.get(id)?;
        let v = self.terminal_voltage(component);
        match component.branch_current(params, mode, v)? {
            Some(i) => Ok(i),
            None => self.constrained_current(id, params, mode, None, 0),
        }
    }

    fn constrained_current(
        &self,
        id: ComponentId,
        params: &ParamTable,
        mode: SolveMode,
        shared: Option<NodeId>,
        depth: usize,
    ) -> Result<f64> {
        let component = self.get(id)?;
        if depth > self.components.len() {
            return Err(NodalError::topology(format!(
                "loop of voltage-constrained devices through '{}'",
                component.name()
            )));
        }

        let (pos, neg) = (component.pos_node(), component.neg_node());
        let mut reference = if pos.is_ground() { neg } else { pos };
        if shared == Some(reference) {
            let other = if reference == pos { neg } else { pos };
            if !other.is_ground() {
                reference = other;
            }
        }
        let far = if reference == pos { neg } else { pos };
        let node = self
            .node(reference)
            .ok_or_else(|| NodalError::topology(format!("'{}' has a dangling terminal", component.name())))?;

        let mut leaving = 0.0;
        for &other_id in &node.components {
            if other_id == id {
                continue;
            }
            let other = self.get(other_id)?;
            let current = if other.is_voltage_like(mode) {
                let terminals = &other.nodes()[..2];
                if terminals.contains(&reference) && terminals.contains(&far) {
                    return Err(NodalError::ParallelVoltageSources {
                        first: component.name().to_string(),
                        second: other.name().to_string(),
                    });
                }
                self.constrained_current(other_id, params, mode, Some(reference), depth + 1)?
            } else {
                let v = self.terminal_voltage(other);
                other.branch_current(params, mode, v)?.unwrap_or(0.0)
            };
            for (k, &terminal) in other.nodes().iter().take(2).enumerate() {
                if terminal == reference {
                    leaving += if k == 0 { current } else { -current };
                }
            }
        }

        Ok(if reference == pos { -leaving } else { leaving })
    }
}

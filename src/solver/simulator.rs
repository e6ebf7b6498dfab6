//! Main simulator interface.

use std::io::Write;

use nalgebra::DVector;
use tracing::{debug, info_span, warn};

use crate::circuit::{validate_circuit, Analysis, Circuit, ComponentId, IterationStrategy, ParamTable};
use crate::components::SolveMode;
use crate::error::Result;

use super::mna::{assemble, MnaMatrix};
use super::newton::{NewtonRaphson, StepProblem};
use super::{levenberg, SimulatorConfig};

/// Node voltages and device currents of one operating-point run.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatingPointRun {
    /// Sweep binding, `None` when no `.STEP` is active
    pub step: Option<ParamTable>,
    /// `(name, voltage)` for every non-ground node, by name
    pub node_voltages: Vec<(String, f64)>,
    /// `(name, current)` for every device, by name
    pub device_currents: Vec<(String, f64)>,
}

/// One emitted transient time point.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientRow {
    pub time: f64,
    /// Node voltages then device currents, in column order
    pub values: Vec<f64>,
}

/// All rows of one transient run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientRun {
    /// Sweep binding, `None` when no `.STEP` is active
    pub step: Option<ParamTable>,
    pub rows: Vec<TransientRow>,
}

/// Result of one analysis over every sweep point.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationResult {
    OperatingPoint {
        runs: Vec<OperatingPointRun>,
    },
    Transient {
        /// `V(node)` for every node (ground included) then `I(device)`,
        /// each group by name
        columns: Vec<String>,
        runs: Vec<TransientRun>,
    },
}

impl SimulationResult {
    /// Number of sweep runs carried.
    pub fn num_runs(&self) -> usize {
        match self {
            SimulationResult::OperatingPoint { runs } => runs.len(),
            SimulationResult::Transient { runs, .. } => runs.len(),
        }
    }
}

/// The main circuit simulator.
pub struct Simulator {
    /// The circuit being simulated
    circuit: Circuit,
    /// Solver settings
    config: SimulatorConfig,
}

impl Simulator {
    /// Create a new simulator for the given circuit with default configuration.
    pub fn new(circuit: Circuit) -> Self {
        Self::with_config(circuit, SimulatorConfig::default())
    }

    /// Create a new simulator for the given circuit with custom configuration.
    pub fn with_config(circuit: Circuit, config: SimulatorConfig) -> Self {
        Self { circuit, config }
    }

    /// Get the circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Validate the circuit and run every requested analysis in order.
    pub fn run(&mut self) -> Result<Vec<SimulationResult>> {
        validate_circuit(&self.circuit)?;
        let analyses = self.circuit.analyses.clone();
        analyses.into_iter().map(|a| self.run_analysis(a)).collect()
    }

    /// Run one analysis over every sweep point.
    pub fn run_analysis(&mut self, analysis: Analysis) -> Result<SimulationResult> {
        let tables = self.circuit.tables().to_vec();
        let swept = self.circuit.has_sweep();
        let total = tables.len();

        match analysis {
            Analysis::OperatingPoint => {
                let mut runs = Vec::with_capacity(total);
                for (i, params) in tables.iter().enumerate() {
                    let _span = info_span!("op", run = i + 1, total).entered();
                    if let Some(mut run) = self.operating_point(params)? {
                        run.step = swept.then(|| params.clone());
                        runs.push(run);
                    }
                }
                Ok(SimulationResult::OperatingPoint { runs })
            }
            Analysis::Transient {
                stop,
                save_start,
                step,
            } => {
                let columns = self.columns();
                let mut runs = Vec::with_capacity(total);
                for (i, params) in tables.iter().enumerate() {
                    let _span = info_span!("tran", run = i + 1, total).entered();
                    let rows = self.transient(params, stop, save_start, step, (i + 1, total))?;
                    runs.push(TransientRun {
                        step: swept.then(|| params.clone()),
                        rows,
                    });
                }
                Ok(SimulationResult::Transient { columns, runs })
            }
        }
    }

    /// Transient column names.
    pub fn columns(&self) -> Vec<String> {
        let nodes = self.circuit.nodes_by_name().map(|n| format!("V({})", n.name));
        let devices = self.circuit.components_by_name().map(|c| format!("I({})", c.name()));
        nodes.chain(devices).collect()
    }

    /// Solve the DC operating point from rest.
    ///
    /// A failed solve is logged and yields `None`.
    pub fn operating_point(&mut self, params: &ParamTable) -> Result<Option<OperatingPointRun>> {
        self.circuit.reset_state();
        let mode = SolveMode::OperatingPoint;
        let mut matrix = MnaMatrix::new(self.circuit.num_unknowns());
        assemble(&self.circuit, params, mode, &mut matrix)?;
        let x = match matrix.solve() {
            Ok(x) => x,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "operating point solve failed, run skipped");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.circuit.set_unknowns(&x);

        let node_voltages = self
            .circuit
            .nodes_by_name()
            .filter(|n| !n.is_ground())
            .map(|n| (n.name.clone(), n.voltage))
            .collect();
        let device_currents = self
            .device_ids()
            .into_iter()
            .map(|(name, id)| self.circuit.component_current(id, params, mode).map(|i| (name, i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(OperatingPointRun {
            step: None,
            node_voltages,
            device_currents,
        }))
    }

    /// Run a fixed-step transient from rest, returning the emitted rows.
    pub fn transient(
        &mut self,
        params: &ParamTable,
        stop: f64,
        save_start: f64,
        step: f64,
        run: (usize, usize),
    ) -> Result<Vec<TransientRow>> {
        Analysis::Transient { stop, save_start, step }.check()?;
        self.circuit.reset_state();
        let nonlinear = self.circuit.is_nonlinear();
        let steps = (stop / step + 1e-9).floor() as usize;
        let mut matrix = MnaMatrix::new(self.circuit.num_unknowns());
        let mut rows = Vec::new();

        for k in 0..=steps {
            let time = k as f64 * step;
            let mode = SolveMode::transient(time, step);

            let solved = if nonlinear {
                self.nonlinear_step(params, mode)
            } else {
                if self.config.progress {
                    progress_bar(k as f64 / steps.max(1) as f64, run);
                }
                assemble(&self.circuit, params, mode, &mut matrix).and_then(|_| matrix.solve())
            };

            let x = match solved {
                Ok(x) => x,
                Err(e) if e.is_recoverable() => {
                    warn!(time, error = %e, "transient step failed, row skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.circuit.commit_step(params, mode.step())?;
            self.circuit.set_unknowns(&x);

            if time >= save_start {
                rows.push(self.row(params, mode)?);
            }
        }

        if self.config.progress && !nonlinear {
            eprintln!();
        }
        Ok(rows)
    }

    /// Drive the diode guess vector to a fixed point, then solve once more.
    fn nonlinear_step(&mut self, params: &ParamTable, mode: SolveMode) -> Result<Vec<f64>> {
        let strategy = self.circuit.iteration;
        let mut problem = StepProblem::new(&mut self.circuit, params, mode);
        let guess = DVector::zeros(problem.dimension());

        let guess = match strategy {
            IterationStrategy::Newton => {
                let (guess, iterations) = NewtonRaphson::new(&self.config).solve(&mut problem, guess)?;
                debug!(time = mode.time(), iterations, "Newton step");
                guess
            }
            IterationStrategy::LevenbergMarquardt => levenberg::solve(&mut problem, guess, &self.config)?,
        };

        problem.solve_at(guess.as_slice())
    }

    fn device_ids(&self) -> Vec<(String, ComponentId)> {
        self.circuit
            .components_by_name()
            .map(|c| (c.name().to_string(), c.id()))
            .collect()
    }

    fn row(&self, params: &ParamTable, mode: SolveMode) -> Result<TransientRow> {
        let mut values: Vec<f64> = self.circuit.nodes_by_name().map(|n| n.voltage).collect();
        for (_, id) in self.device_ids() {
            values.push(self.circuit.component_current(id, params, mode)?);
        }
        Ok(TransientRow {
            time: mode.time(),
            values,
        })
    }

    /// Look up a node voltage by name from the last committed solve.
    pub fn node_voltage(&self, name: &str) -> Option<f64> {
        self.circuit.find_node(name).map(|id| self.circuit.node_voltage(id))
    }
}

/// Draw a textual progress bar on stderr.
fn progress_bar(fraction: f64, (run, total): (usize, usize)) {
    const WIDTH: usize = 50;
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * WIDTH as f64) as usize;
    let mut stderr = std::io::stderr().lock();
    let _ = write!(
        stderr,
        "\r[{}{}] {:3.0}% (run {}/{})",
        "#".repeat(filled),
        " ".repeat(WIDTH - filled),
        fraction * 100.0,
        run,
        total
    );
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::SweepKind;
    use crate::components::{Value, Waveform};
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn divider() -> Circuit {
        let mut circuit = Circuit::new("divider");
        circuit.add_voltage_source("V1", "in", "0", Waveform::dc(10.0)).unwrap();
        circuit.add_resistor("R1", "in", "out", 1000.0).unwrap();
        circuit.add_resistor("R2", "out", "0", 1000.0).unwrap();
        circuit
    }

    #[test]
    fn test_operating_point_divider() {
        let mut sim = Simulator::new(divider());
        let run = sim.operating_point(&ParamTable::new()).unwrap().unwrap();
        let voltage = |name: &str| run.node_voltages.iter().find(|(n, _)| n == name).unwrap().1;
        assert_relative_eq!(voltage("in"), 10.0, epsilon = 1e-9);
        assert_relative_eq!(voltage("out"), 5.0, epsilon = 1e-9);

        let current = |name: &str| run.device_currents.iter().find(|(n, _)| n == name).unwrap().1;
        assert_relative_eq!(current("R1"), 5e-3, epsilon = 1e-12);
        assert_relative_eq!(current("V1"), -5e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_columns_ordered_by_name() {
        let sim = Simulator::new(divider());
        assert_eq!(
            sim.columns(),
            vec!["V(0)", "V(in)", "V(out)", "I(R1)", "I(R2)", "I(V1)"]
        );
    }

    #[test]
    fn test_transient_row_count_and_save_start() {
        let mut sim = Simulator::new(divider());
        let rows = sim
            .transient(&ParamTable::new(), 1e-3, 0.0, 1e-4, (1, 1))
            .unwrap();
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[0].time, 0.0);

        let rows = sim
            .transient(&ParamTable::new(), 1e-3, 4.5e-4, 1e-4, (1, 1))
            .unwrap();
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn test_transient_rejects_zero_step() {
        let mut sim = Simulator::new(divider());
        let result = sim.transient(&ParamTable::new(), 1e-3, 0.0, 0.0, (1, 1));
        assert!(matches!(
            result,
            Err(crate::error::NodalError::InvalidSimulationParam { .. })
        ));
    }

    #[test]
    fn test_sweep_runs_carry_bindings() {
        let mut circuit = divider();
        circuit.remove_component("R2").unwrap();
        circuit.add_resistor("R2", "out", "0", Value::from("R")).unwrap();
        let mut sweeps = BTreeMap::new();
        sweeps.insert("R".to_string(), SweepKind::List(vec![1000.0, 3000.0]));
        circuit.set_sweeps(sweeps);
        circuit.analyses.push(Analysis::OperatingPoint);

        let mut sim = Simulator::new(circuit);
        let results = sim.run().unwrap();
        let SimulationResult::OperatingPoint { runs } = &results[0] else {
            panic!("expected operating point");
        };
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].step.as_ref().unwrap().get("R"), Some(3000.0));
        let out = runs[1].node_voltages.iter().find(|(n, _)| n == "out").unwrap().1;
        assert_relative_eq!(out, 7.5, epsilon = 1e-9);
    }
}

//! # Nodal Core
//!
//! A Modified Nodal Analysis circuit simulator.
//!
//! This library provides:
//! - A SPICE netlist reader (R, C, L, V, I, D, Q cards, `.MODEL`, `.OP`,
//!   `.TRAN`, `.STEP`)
//! - DC operating-point and fixed-step transient analysis
//! - Nonlinear diode solving by damped Newton-Raphson or Levenberg-Marquardt
//! - Parameter sweeps over symbolic component values
//! - CSV and tab-separated result writers
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`netlist`] - Parser for SPICE netlists
//! - [`circuit`] - Circuit graph, sweep tables and validation
//! - [`components`] - Device models and their matrix contributions
//! - [`solver`] - MNA assembly, linear solve and the analysis driver
//! - [`output`] - Result serialization
//!
//! ## Usage
//!
//! ```no_run
//! use nodal_core::{netlist, output, Circuit, Simulator};
//!
//! let netlist = netlist::parse_file("divider.cir")?;
//! let circuit = Circuit::from_netlist(netlist)?;
//! let mut simulator = Simulator::new(circuit);
//! for result in simulator.run()? {
//!     output::write_result(&result, output::OutputFormat::Csv, &mut std::io::stdout())?;
//! }
//! # Ok::<(), nodal_core::NodalError>(())
//! ```
//!
//! ## Circuit Simulation Method
//!
//! For each timestep the simulator:
//!
//! 1. Stamps every device into the system matrix A and source vector z;
//!    voltage sources replace the KCL row of their positive node
//! 2. Solves Ax = z for the node voltages with a sparse LU factorization
//! 3. For diodes, iterates a per-diode voltage guess until the solved
//!    voltages match it
//! 4. Commits capacitor and inductor history for the next step
//!
//! Reactive elements use backward-Euler companion models.

pub mod circuit;
pub mod components;
pub mod error;
pub mod netlist;
pub mod output;
pub mod solver;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use error::{NodalError, Result};
pub use solver::{SimulationResult, Simulator, SimulatorConfig};

/// Thermal voltage used by the diode equation, in volts
pub const THERMAL_VOLTAGE: f64 = 0.025;

/// Parse a netlist string and run every analysis it requests.
pub fn simulate(input: &str) -> Result<Vec<SimulationResult>> {
    let circuit = Circuit::from_netlist(netlist::parse(input)?)?;
    Simulator::new(circuit).run()
}

//! Circuit graph representation and validation.
//!
//! This module provides the internal representation of a circuit. The
//! [`Circuit`] struct owns all nodes and components, their connections,
//! the sweep parameter tables and the requested analyses.

mod graph;
mod params;
mod types;
mod validate;

pub use graph::{is_ground_name, Circuit, GROUND_NAME};
pub use params::{expand_sweeps, ParamTable, SweepKind};
pub use types::*;
pub use validate::validate_circuit;

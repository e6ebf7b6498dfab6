//! Circuit validation.

use crate::components::Component;
use crate::error::{NodalError, Result};

use super::Circuit;

/// Validate a circuit for simulation.
///
/// Checks:
/// - The circuit has at least one component
/// - No voltage source has both terminals on ground
/// - No two voltage sources share the same pair of nodes
/// - Every symbolic value is bound in every parameter table
/// - Every transient analysis has a positive, finite step and stop time
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.num_components() == 0 {
        return Err(NodalError::topology("Circuit has no components"));
    }

    for analysis in &circuit.analyses {
        analysis.check()?;
    }

    let sources: Vec<&Component> = circuit
        .components_by_name()
        .filter(|c| matches!(c, Component::VoltageSource(_)))
        .collect();

    for source in &sources {
        if source.pos_node().is_ground() && source.neg_node().is_ground() {
            return Err(NodalError::topology(format!(
                "Voltage source '{}' has both terminals grounded",
                source.name()
            )));
        }
    }

    for (i, first) in sources.iter().enumerate() {
        for second in &sources[i + 1..] {
            let same = first.pos_node() == second.pos_node() && first.neg_node() == second.neg_node();
            let swapped = first.pos_node() == second.neg_node() && first.neg_node() == second.pos_node();
            if same || swapped {
                return Err(NodalError::ParallelVoltageSources {
                    first: first.name().to_string(),
                    second: second.name().to_string(),
                });
            }
        }
    }

    for params in circuit.tables() {
        for component in circuit.components_by_name() {
            for variable in component.variables() {
                if params.get(variable).is_none() {
                    return Err(NodalError::UnboundVariable {
                        component: component.name().to_string(),
                        variable: variable.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

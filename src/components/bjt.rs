//! Bipolar transistor.
//!
//! Only the terminals and model parameters are carried. The device
//! contributes no conductance and no current; its presence switches the
//! circuit into nonlinear solving.

use crate::circuit::{ComponentId, NodeId};
use crate::error::{NodalError, Result};
use crate::netlist::ModelDef;

/// Transistor polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransistorPolarity {
    #[default]
    Npn,
    Pnp,
}

impl std::str::FromStr for TransistorPolarity {
    type Err = NodalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NPN" => Ok(Self::Npn),
            "PNP" => Ok(Self::Pnp),
            _ => Err(NodalError::InvalidParameter {
                component: s.to_string(),
                param: "type".to_string(),
                message: "expected NPN or PNP".to_string(),
            }),
        }
    }
}

/// Parameters for a transistor model.
#[derive(Debug, Clone, PartialEq)]
pub struct TransistorParams {
    /// Forward current gain
    pub bf: f64,
    /// Saturation current
    pub is: f64,
    /// Forward Early voltage
    pub vaf: f64,
}

impl Default for TransistorParams {
    fn default() -> Self {
        Self {
            bf: 100.0,
            is: 1e-16,
            vaf: f64::MAX,
        }
    }
}

impl TransistorParams {
    /// Create parameters from a `.MODEL` card of kind NPN or PNP.
    pub fn from_model(model: &ModelDef) -> Result<(TransistorPolarity, Self)> {
        let polarity = model.kind.parse::<TransistorPolarity>().map_err(|_| NodalError::InvalidParameter {
            component: model.name.clone(),
            param: "type".to_string(),
            message: "expected NPN or PNP model type".to_string(),
        })?;

        let mut params = Self::default();
        for (key, &value) in &model.params {
            match key.as_str() {
                "bf" => params.bf = value,
                "is" => params.is = value,
                "vaf" | "va" => params.vaf = value,
                _ => {
                    return Err(NodalError::InvalidParameter {
                        component: model.name.clone(),
                        param: key.clone(),
                        message: "unknown transistor model parameter".to_string(),
                    })
                }
            }
        }
        Ok((polarity, params))
    }
}

/// A transistor component.
#[derive(Debug, Clone)]
pub struct Transistor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [collector, base, emitter]
    pub model_name: String,
    pub polarity: TransistorPolarity,
    pub params: TransistorParams,
}

impl Transistor {
    /// Create a new transistor.
    pub fn new(
        id: ComponentId,
        name: String,
        nodes: [NodeId; 3],
        model_name: String,
        polarity: TransistorPolarity,
        params: TransistorParams,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            model_name,
            polarity,
            params,
        }
    }

    /// Get the collector node.
    pub fn collector(&self) -> NodeId {
        self.nodes[0]
    }

    /// Get the base node.
    pub fn base(&self) -> NodeId {
        self.nodes[1]
    }

    /// Get the emitter node.
    pub fn emitter(&self) -> NodeId {
        self.nodes[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_polarity_parsing() {
        assert_eq!("pnp".parse::<TransistorPolarity>().unwrap(), TransistorPolarity::Pnp);
        assert_eq!("NPN".parse::<TransistorPolarity>().unwrap(), TransistorPolarity::Npn);
        assert!("JFET".parse::<TransistorPolarity>().is_err());
    }

    #[test]
    fn test_from_model() {
        let mut params = BTreeMap::new();
        params.insert("bf".to_string(), 250.0);
        let model = ModelDef {
            name: "Q2N3906".to_string(),
            kind: "PNP".to_string(),
            params,
        };
        let (polarity, params) = TransistorParams::from_model(&model).unwrap();
        assert_eq!(polarity, TransistorPolarity::Pnp);
        assert_eq!(params.bf, 250.0);
        assert_eq!(params.vaf, f64::MAX);
    }

    #[test]
    fn test_default_terminal_roles() {
        let q = Transistor::new(
            ComponentId(0),
            "Q1".to_string(),
            [NodeId(1), NodeId(2), NodeId(0)],
            "NPN".to_string(),
            TransistorPolarity::Npn,
            TransistorParams::default(),
        );
        assert_eq!(q.collector(), NodeId(1));
        assert_eq!(q.base(), NodeId(2));
        assert!(q.emitter().is_ground());
    }
}

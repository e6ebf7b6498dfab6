//! Error types for the nodal circuit simulator.
//!
//! This module provides a unified error type [`NodalError`] that covers
//! netlist reading, circuit construction, topology validation and
//! simulation. Numerical failures ([`NodalError::Solve`]) are recoverable
//! at single-timestep granularity; everything else is fatal for the run.

use thiserror::Error;

/// Result type alias using [`NodalError`].
pub type Result<T> = std::result::Result<T, NodalError>;

/// Unified error type for all simulator operations.
#[derive(Error, Debug)]
pub enum NodalError {
    // ============ Netlist Errors ============
    /// Error during tokenizing of a netlist line
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Invalid component card
    #[error("Invalid component '{name}' at line {line}: {message}")]
    InvalidComponent {
        name: String,
        line: usize,
        message: String,
    },

    /// Netlist ended without an `.END` card
    #[error("No .END statement present in netlist")]
    MissingEnd,

    // ============ Configuration Errors ============
    /// Invalid device parameter (count or value)
    #[error("Invalid parameter '{param}' for component '{component}': {message}")]
    InvalidParameter {
        component: String,
        param: String,
        message: String,
    },

    /// A symbolic value has no binding in the active parameter table
    #[error("Component '{component}' references unbound variable '{variable}'")]
    UnboundVariable { component: String, variable: String },

    /// Unknown nonlinear iteration strategy
    #[error("Unknown iteration strategy '{name}' (expected 'newton' or 'levenberg')")]
    UnknownIterationStrategy { name: String },

    /// Duplicate component name
    #[error("Duplicate component name '{name}'")]
    DuplicateComponent { name: String },

    /// Component not found in circuit
    #[error("Component '{name}' not found in circuit")]
    ComponentNotFound { name: String },

    // ============ Topology Errors ============
    /// Two ideal voltage sources share the same pair of nodes
    #[error("Voltage sources '{first}' and '{second}' are connected in parallel, the system is over-determined")]
    ParallelVoltageSources { first: String, second: String },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    // ============ Simulation Errors ============
    /// The linear solve failed (singular matrix or non-finite result)
    #[error("Solve error: {0}")]
    Solve(String),

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    // ============ I/O Errors ============
    /// Error reading a netlist file
    #[error("Failed to read netlist file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing results
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodalError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid component error
    pub fn invalid_component(name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidComponent {
            name: name.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a topology error
    pub fn topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// Whether the error only invalidates the current timestep.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Solve(_))
    }
}

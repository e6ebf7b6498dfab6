//! MNA matrix assembly and solving.
//!
//! The system is assembled densely (rows must be read back for source row
//! replacement) and handed to a sparse LU factorization for the solve.

use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};

use crate::circuit::{Circuit, ParamTable};
use crate::components::SolveMode;
use crate::error::{NodalError, Result};

/// MNA matrix system Ax = z over the non-ground node voltages.
#[derive(Debug, Clone)]
pub struct MnaMatrix {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Source vector z
    pub z: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// Row currently holding each node's KCL equation; `None` once the
    /// node's group has been tied to ground by a source
    kcl_rows: Vec<Option<usize>>,
}

impl MnaMatrix {
    /// Create a zeroed system of the given dimension.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            z: vec![0.0; size],
            size,
            kcl_rows: (0..size).map(Some).collect(),
        }
    }

    /// Clear the matrix and vectors to zero.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.z.fill(0.0);
        for (i, row) in self.kcl_rows.iter_mut().enumerate() {
            *row = Some(i);
        }
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Set matrix element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] = value;
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Add to source vector element.
    pub fn add_source(&mut self, row: usize, value: f64) {
        self.z[row] += value;
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes n1 and n2:
    ///   A[n1,n1] += G
    ///   A[n2,n2] += G
    ///   A[n1,n2] -= G
    ///   A[n2,n1] -= G
    pub fn stamp_conductance(&mut self, n1: Option<usize>, n2: Option<usize>, g: f64) {
        if let Some(i) = n1 {
            self.add(i, i, g);
        }
        if let Some(j) = n2 {
            self.add(j, j, g);
        }
        if let (Some(i), Some(j)) = (n1, n2) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Inject a current into n1 and draw it from n2.
    pub fn inject_current(&mut self, n1: Option<usize>, n2: Option<usize>, current: f64) {
        if let Some(i) = n1 {
            self.add_source(i, current);
        }
        if let Some(j) = n2 {
            self.add_source(j, -current);
        }
    }

    fn take_row(&mut self, row: usize) -> (Vec<f64>, f64) {
        let start = row * self.size;
        let coefficients = self.a[start..start + self.size].to_vec();
        self.a[start..start + self.size].fill(0.0);
        let rhs = std::mem::take(&mut self.z[row]);
        (coefficients, rhs)
    }

    fn add_row(&mut self, row: usize, coefficients: &[f64], rhs: f64) {
        let start = row * self.size;
        for (dst, src) in self.a[start..start + self.size].iter_mut().zip(coefficients) {
            *dst += src;
        }
        self.z[row] += rhs;
    }

    fn redirect_kcl(&mut self, from: usize, to: Option<usize>) {
        for row in self.kcl_rows.iter_mut() {
            if *row == Some(from) {
                *row = to;
            }
        }
    }

    /// Enforce `V[pos] - V[neg] = voltage` by row replacement.
    ///
    /// The row holding the positive terminal's KCL equation is replaced by
    /// the constraint and its previous content is added into the row
    /// holding the negative terminal's KCL equation, so the two nodes act
    /// as one supernode. With one terminal grounded the constraint is a
    /// single-row `V = ±voltage`.
    pub fn stamp_voltage_row(&mut self, pos: Option<usize>, neg: Option<usize>, voltage: f64) -> Result<()> {
        let pos_row = pos.and_then(|p| self.kcl_rows[p]);
        let neg_row = neg.and_then(|n| self.kcl_rows[n]);

        match (pos_row, neg_row) {
            (Some(rp), Some(rn)) if rp == rn => Err(NodalError::topology(
                "loop of voltage sources leaves the system over-determined",
            )),
            (Some(rp), neg_row) => {
                let (coefficients, rhs) = self.take_row(rp);
                if let Some(p) = pos {
                    self.set(rp, p, 1.0);
                }
                if let Some(n) = neg {
                    self.set(rp, n, -1.0);
                }
                self.z[rp] = voltage;
                if let Some(rn) = neg_row {
                    self.add_row(rn, &coefficients, rhs);
                }
                self.redirect_kcl(rp, neg_row);
                Ok(())
            }
            (None, Some(rn)) => {
                // Positive side already tied to ground: constrain via the
                // negative side's row instead.
                self.take_row(rn);
                if let Some(p) = pos {
                    self.set(rn, p, 1.0);
                }
                if let Some(n) = neg {
                    self.set(rn, n, -1.0);
                }
                self.z[rn] = voltage;
                self.redirect_kcl(rn, None);
                Ok(())
            }
            (None, None) => Err(NodalError::topology(
                "voltage source has both terminals tied to ground",
            )),
        }
    }

    /// Solve the assembled system with sparse LU.
    pub fn solve(&self) -> Result<Vec<f64>> {
        let n = self.size;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut triplets = Vec::new();
        for row in 0..n {
            for col in 0..n {
                let val = self.get(row, col);
                if val == 0.0 {
                    continue;
                }
                if !val.is_finite() {
                    return Err(NodalError::Solve("system matrix contains NaN/Inf".into()));
                }
                triplets.push(Triplet::new(row, col, val));
            }
        }

        let a_sp = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| NodalError::Solve(format!("sparse matrix build failed: {e:?}")))?;
        let lu = a_sp
            .sp_lu()
            .map_err(|e| NodalError::Solve(format!("sparse LU factorization failed: {e:?}")))?;

        let rhs = faer::Mat::<f64>::from_fn(n, 1, |i, _| self.z[i]);
        let x = lu.solve(rhs);

        let mut out = vec![0.0; n];
        for (i, slot) in out.iter_mut().enumerate() {
            let xi = x[(i, 0)];
            if !xi.is_finite() {
                return Err(NodalError::Solve("singular system: non-finite solution".into()));
            }
            *slot = xi;
        }
        Ok(out)
    }
}

/// Assemble the system for `mode` from the circuit's committed state.
///
/// Admittances and injected currents go in first; voltage-constrained rows
/// last, since row replacement moves whatever the rows already hold.
pub fn assemble(circuit: &Circuit, params: &ParamTable, mode: SolveMode, matrix: &mut MnaMatrix) -> Result<()> {
    if matrix.size != circuit.num_unknowns() {
        *matrix = MnaMatrix::new(circuit.num_unknowns());
    } else {
        matrix.clear();
    }

    for component in circuit.components() {
        if component.is_source() {
            continue;
        }
        let n1 = circuit.node_index(component.pos_node());
        let n2 = circuit.node_index(component.neg_node());
        let v = circuit.terminal_voltage(component);
        if let Some(g) = component.conductance(params, mode, v)? {
            matrix.stamp_conductance(n1, n2, g);
        }
    }

    for component in circuit.components() {
        let n1 = circuit.node_index(component.pos_node());
        let n2 = circuit.node_index(component.neg_node());
        let v = circuit.terminal_voltage(component);
        let injected = component.current_contribution(params, mode, v)?;
        if injected != 0.0 {
            matrix.inject_current(n1, n2, injected);
        }
    }

    for component in circuit.components() {
        if let Some(value) = component.source_voltage(params, mode)? {
            let n1 = circuit.node_index(component.pos_node());
            let n2 = circuit.node_index(component.neg_node());
            matrix.stamp_voltage_row(n1, n2, value).map_err(|e| match e {
                NodalError::InvalidTopology { message } => {
                    NodalError::topology(format!("{}: {}", component.name(), message))
                }
                other => other,
            })?;
        }
    }

    Ok(())
}

/// Assemble the operating-point system.
pub fn assemble_operating_point(circuit: &Circuit, params: &ParamTable, matrix: &mut MnaMatrix) -> Result<()> {
    assemble(circuit, params, SolveMode::OperatingPoint, matrix)
}

/// Assemble one transient step at `time`; the step is forced to 0 at `t = 0`.
pub fn assemble_transient(
    circuit: &Circuit,
    params: &ParamTable,
    time: f64,
    step: f64,
    matrix: &mut MnaMatrix,
) -> Result<()> {
    assemble(circuit, params, SolveMode::transient(time, step), matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Value, Waveform};
    use approx::assert_relative_eq;

    #[test]
    fn test_stamp_conductance_grounded() {
        let mut m = MnaMatrix::new(2);
        m.stamp_conductance(Some(0), None, 0.5);
        m.stamp_conductance(Some(0), Some(1), 1.0);
        assert_eq!(m.get(0, 0), 1.5);
        assert_eq!(m.get(0, 1), -1.0);
        assert_eq!(m.get(1, 0), -1.0);
        assert_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn test_grounded_voltage_row() {
        let mut m = MnaMatrix::new(1);
        m.stamp_conductance(Some(0), None, 1e-3);
        m.stamp_voltage_row(Some(0), None, 5.0).unwrap();
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.z[0], 5.0);
        let x = m.solve().unwrap();
        assert_relative_eq!(x[0], 5.0);
    }

    #[test]
    fn test_floating_voltage_row_forms_supernode() {
        // 1 --R1-- gnd, 2 --R2-- gnd, V(1) - V(2) = 2, 1 mA injected at node 1
        let mut m = MnaMatrix::new(2);
        m.stamp_conductance(Some(0), None, 1e-3);
        m.stamp_conductance(Some(1), None, 1e-3);
        m.inject_current(Some(0), None, 1e-3);
        m.stamp_voltage_row(Some(0), Some(1), 2.0).unwrap();

        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), -1.0);
        assert_eq!(m.z[0], 2.0);
        assert_relative_eq!(m.z[1], 1e-3);

        let x = m.solve().unwrap();
        assert_relative_eq!(x[0] - x[1], 2.0, epsilon = 1e-9);
        // Supernode KCL: (V1 + V2) / 1k = 1 mA
        assert_relative_eq!(x[0] + x[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_negative_terminal_grounded() {
        let mut m = MnaMatrix::new(1);
        m.stamp_voltage_row(None, Some(0), 3.0).unwrap();
        let x = m.solve().unwrap();
        assert_relative_eq!(x[0], -3.0);
    }

    #[test]
    fn test_source_loop_is_topology_error() {
        let mut m = MnaMatrix::new(1);
        m.stamp_voltage_row(Some(0), None, 1.0).unwrap();
        assert!(matches!(
            m.stamp_voltage_row(Some(0), None, 2.0),
            Err(NodalError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_singular_system_reports_solve_error() {
        let mut m = MnaMatrix::new(2);
        m.stamp_conductance(Some(0), None, 1.0);
        m.z[1] = 1.0;
        let err = m.solve().unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_assemble_divider() {
        let mut circuit = Circuit::new("divider");
        circuit.add_voltage_source("V1", "in", "0", Waveform::dc(10.0)).unwrap();
        circuit.add_resistor("R1", "in", "out", 1000.0).unwrap();
        circuit.add_resistor("R2", "out", "0", Value::Literal(1000.0)).unwrap();

        let mut m = MnaMatrix::new(circuit.num_unknowns());
        assemble_operating_point(&circuit, &ParamTable::new(), &mut m).unwrap();
        let x = m.solve().unwrap();
        let out = circuit.node_index(circuit.find_node("out").unwrap()).unwrap();
        assert_relative_eq!(x[out], 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inductor_shorts_at_operating_point() {
        let mut circuit = Circuit::new("rl");
        circuit.add_voltage_source("V1", "in", "0", Waveform::dc(1.0)).unwrap();
        circuit.add_inductor("L1", "in", "out", 1e-3).unwrap();
        circuit.add_resistor("R1", "out", "0", 100.0).unwrap();

        let mut m = MnaMatrix::new(circuit.num_unknowns());
        assemble_operating_point(&circuit, &ParamTable::new(), &mut m).unwrap();
        let x = m.solve().unwrap();
        let out = circuit.node_index(circuit.find_node("out").unwrap()).unwrap();
        assert_relative_eq!(x[out], 1.0, epsilon = 1e-9);
    }
}

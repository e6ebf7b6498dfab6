//! Newton-Raphson iteration for nonlinear components.
//!
//! The unknowns are the diode terminal voltages, not the node voltages.
//! For a guess `g` every diode is linearized at its entry, the linear
//! system is solved, and the residual is the difference between the
//! solved diode voltages and the guess:
//!   r(g) = V_diff(solve(g)) - g

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::mna::{assemble, MnaMatrix};
use super::SimulatorConfig;
use crate::circuit::{Circuit, ParamTable};
use crate::components::SolveMode;
use crate::error::Result;

/// Clamp for NaN entries of the inverse Jacobian.
const NAN_REPLACEMENT: f64 = 1e-200;

/// Clamp for infinite entries of the inverse Jacobian.
const INF_REPLACEMENT: f64 = 1e200;

/// Inverse of the transposed Jacobian with non-finite entries clamped.
///
/// A singular Jacobian falls back to its pseudo-inverse. `None` only when
/// the Jacobian itself holds NaN or infinite entries.
pub fn clamped_inverse(jac: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let transposed = jac.transpose();
    let mut inverse = match transposed.clone().try_inverse() {
        Some(inverse) => inverse,
        None if transposed.iter().all(|v| v.is_finite()) => transposed.pseudo_inverse(f64::EPSILON).ok()?,
        None => return None,
    };
    for entry in inverse.iter_mut() {
        if entry.is_nan() {
            *entry = NAN_REPLACEMENT;
        } else if !entry.is_finite() {
            *entry = INF_REPLACEMENT;
        }
    }
    Some(inverse)
}

/// One nonlinear step: the circuit, the sweep point and the solve mode.
pub struct StepProblem<'a> {
    pub circuit: &'a mut Circuit,
    pub params: &'a ParamTable,
    pub mode: SolveMode,
    matrix: MnaMatrix,
}

impl<'a> StepProblem<'a> {
    pub fn new(circuit: &'a mut Circuit, params: &'a ParamTable, mode: SolveMode) -> Self {
        let matrix = MnaMatrix::new(circuit.num_unknowns());
        Self {
            circuit,
            params,
            mode,
            matrix,
        }
    }

    /// Number of guess entries (one per diode).
    pub fn dimension(&self) -> usize {
        self.circuit.nonlinear_devices().len()
    }

    /// Linearize the diodes at `guess` and solve for the node voltages.
    pub fn solve_at(&mut self, guess: &[f64]) -> Result<Vec<f64>> {
        self.circuit.apply_guess(guess);
        assemble(self.circuit, self.params, self.mode, &mut self.matrix)?;
        self.matrix.solve()
    }

    /// Residual `V_diff(solve(g)) - g`.
    pub fn residual(&mut self, guess: &DVector<f64>) -> Result<DVector<f64>> {
        let x = self.solve_at(guess.as_slice())?;
        let solved = self.circuit.device_voltages(&x);
        Ok(DVector::from_iterator(
            guess.len(),
            solved.iter().zip(guess.iter()).map(|(v, g)| v - g),
        ))
    }

    /// Forward-difference Jacobian of the residual at `guess`.
    ///
    /// The diodes are left linearized at `guess` on return.
    pub fn jacobian(&mut self, guess: &DVector<f64>, r0: &DVector<f64>) -> Result<DMatrix<f64>> {
        let n = guess.len();
        let eps = f64::EPSILON.sqrt();
        let mut jac = DMatrix::zeros(n, n);
        let mut shifted = guess.clone();
        for j in 0..n {
            let h = if guess[j] == 0.0 { eps } else { eps * guess[j].abs() };
            shifted[j] = guess[j] + h;
            let r = self.residual(&shifted);
            shifted[j] = guess[j];
            let r = match r {
                Ok(r) => r,
                Err(e) => {
                    self.circuit.apply_guess(guess.as_slice());
                    return Err(e);
                }
            };
            jac.set_column(j, &((r - r0) / h));
        }
        self.circuit.apply_guess(guess.as_slice());
        Ok(jac)
    }
}

/// Damped Newton-Raphson solver with a fixed iteration budget.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Iteration budget
    pub max_iterations: usize,
    /// Fraction of the full step taken each iteration
    pub damping: f64,
    /// Optional early exit on the residual norm
    pub tolerance: Option<f64>,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new(&SimulatorConfig::default())
    }
}

impl NewtonRaphson {
    /// Create a new Newton-Raphson solver.
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            max_iterations: config.newton_iterations,
            damping: config.newton_damping,
            tolerance: config.newton_tolerance,
        }
    }

    /// Iterate the guess vector.
    ///
    /// Returns the final guess and the number of iterations used.
    pub fn solve(&self, problem: &mut StepProblem<'_>, mut guess: DVector<f64>) -> Result<(DVector<f64>, usize)> {
        if guess.is_empty() {
            return Ok((guess, 0));
        }

        for iter in 0..self.max_iterations {
            let r = problem.residual(&guess)?;
            if let Some(tol) = self.tolerance {
                if r.norm() < tol {
                    return Ok((guess, iter));
                }
            }

            let jac = problem.jacobian(&guess, &r)?;
            let Some(inverse) = clamped_inverse(&jac) else {
                debug!(iteration = iter, "non-finite Jacobian, holding guess");
                continue;
            };

            guess -= (inverse * r) * self.damping;
        }

        debug!(iterations = self.max_iterations, "Newton budget spent");
        Ok((guess, self.max_iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{DiodeParams, Waveform};
    use approx::assert_abs_diff_eq;

    fn diode_circuit() -> Circuit {
        let mut circuit = Circuit::new("d");
        circuit.add_voltage_source("V1", "in", "0", Waveform::dc(1.0)).unwrap();
        circuit.add_resistor("R1", "in", "a", 1000.0).unwrap();
        circuit.add_diode("D1", "a", "0", "D", DiodeParams::default()).unwrap();
        circuit
    }

    #[test]
    fn test_residual_at_zero_guess() {
        let mut circuit = diode_circuit();
        let params = ParamTable::new();
        let mut problem = StepProblem::new(&mut circuit, &params, SolveMode::transient(1e-6, 1e-6));
        let r = problem.residual(&DVector::zeros(1)).unwrap();
        // With no chord conductance the diode sits near the divider voltage
        assert!(r[0] > 0.5);
    }

    #[test]
    fn test_jacobian_restores_linearization() {
        let mut circuit = diode_circuit();
        let params = ParamTable::new();
        let mut problem = StepProblem::new(&mut circuit, &params, SolveMode::transient(1e-6, 1e-6));
        let guess = DVector::from_element(1, 0.3);
        let r0 = problem.residual(&guess).unwrap();
        let jac = problem.jacobian(&guess, &r0).unwrap();
        assert_eq!(jac.shape(), (1, 1));
        let again = problem.residual(&guess).unwrap();
        assert_abs_diff_eq!(again[0], r0[0], epsilon = 1e-12);
    }

    #[test]
    fn test_empty_guess_skips_iteration() {
        let mut circuit = Circuit::new("q");
        circuit.add_resistor("R1", "a", "0", 1.0).unwrap();
        let params = ParamTable::new();
        let mut problem = StepProblem::new(&mut circuit, &params, SolveMode::transient(0.0, 0.0));
        let (guess, iterations) = NewtonRaphson::default().solve(&mut problem, DVector::zeros(0)).unwrap();
        assert!(guess.is_empty());
        assert_eq!(iterations, 0);
    }

    #[test]
    fn test_singular_jacobian_uses_pseudo_inverse() {
        let jac = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let inverse = clamped_inverse(&jac).unwrap();
        assert_eq!(inverse.shape(), (2, 2));
        assert!(inverse.iter().all(|v| v.is_finite()));
        // Moore-Penrose: A+ A A+ = A+
        let t = jac.transpose();
        let round_trip = &inverse * &t * &inverse;
        for (a, b) in round_trip.iter().zip(inverse.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_non_finite_jacobian_holds_guess() {
        let jac = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(clamped_inverse(&jac).is_none());
    }

    #[test]
    fn test_newton_moves_toward_fixed_point() {
        let mut circuit = diode_circuit();
        let params = ParamTable::new();
        let mut problem = StepProblem::new(&mut circuit, &params, SolveMode::transient(1e-6, 1e-6));
        let start = problem.residual(&DVector::zeros(1)).unwrap().norm();
        let (guess, _) = NewtonRaphson::default().solve(&mut problem, DVector::zeros(1)).unwrap();
        let end = problem.residual(&guess).unwrap().norm();
        assert!(end < start);
    }
}

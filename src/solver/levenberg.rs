//! Levenberg-Marquardt iteration for nonlinear components.
//!
//! Minimizes the squared norm of the same residual Newton iterates on,
//! `V_diff(solve(g)) - g`, with a trust-region least-squares solver.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use tracing::debug;

use super::newton::StepProblem;
use super::SimulatorConfig;
use crate::error::{NodalError, Result};

/// Adapter exposing a [`StepProblem`] to the least-squares solver.
///
/// Residual and Jacobian are evaluated together whenever the parameters
/// change, since both need the circuit mutably.
struct DiodeLeastSquares<'p, 'a> {
    problem: &'p mut StepProblem<'a>,
    guess: DVector<f64>,
    residuals: Option<DVector<f64>>,
    jacobian: Option<DMatrix<f64>>,
    failure: Option<NodalError>,
}

impl<'p, 'a> DiodeLeastSquares<'p, 'a> {
    fn new(problem: &'p mut StepProblem<'a>, guess: DVector<f64>) -> Self {
        let mut target = Self {
            problem,
            guess,
            residuals: None,
            jacobian: None,
            failure: None,
        };
        target.evaluate();
        target
    }

    fn evaluate(&mut self) {
        let outcome = self
            .problem
            .residual(&self.guess)
            .and_then(|r| self.problem.jacobian(&self.guess, &r).map(|j| (r, j)));
        match outcome {
            Ok((r, j)) => {
                self.residuals = Some(r);
                self.jacobian = Some(j);
                self.failure = None;
            }
            Err(e) => {
                self.residuals = None;
                self.jacobian = None;
                self.failure = Some(e);
            }
        }
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for DiodeLeastSquares<'_, '_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.guess.copy_from(x);
        self.evaluate();
    }

    fn params(&self) -> DVector<f64> {
        self.guess.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals.clone()
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.jacobian.clone()
    }
}

/// Minimize the step residual starting from `guess`.
///
/// The evaluation budget is converted to the solver's patience, which
/// counts evaluations per parameter.
pub fn solve(problem: &mut StepProblem<'_>, guess: DVector<f64>, config: &SimulatorConfig) -> Result<DVector<f64>> {
    let n = guess.len();
    if n == 0 {
        return Ok(guess);
    }

    let patience = (config.lm_max_evaluations / (n + 1)).max(1);
    let target = DiodeLeastSquares::new(problem, guess);
    let (target, report) = LevenbergMarquardt::new()
        .with_xtol(config.lm_xtol)
        .with_patience(patience)
        .minimize(target);

    debug!(
        termination = ?report.termination,
        evaluations = report.number_of_evaluations,
        objective = report.objective_function,
        "Levenberg-Marquardt finished"
    );

    match target.failure {
        Some(e) if !report.termination.was_successful() => Err(e),
        _ => Ok(target.guess),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Circuit, ParamTable};
    use crate::components::{DiodeParams, SolveMode, Waveform};

    #[test]
    fn test_lm_reduces_residual() {
        let mut circuit = Circuit::new("d");
        circuit.add_voltage_source("V1", "in", "0", Waveform::dc(1.0)).unwrap();
        circuit.add_resistor("R1", "in", "a", 1000.0).unwrap();
        circuit.add_diode("D1", "a", "0", "D", DiodeParams::default()).unwrap();

        let params = ParamTable::new();
        let mut problem = StepProblem::new(&mut circuit, &params, SolveMode::transient(1e-6, 1e-6));
        let start = problem.residual(&DVector::zeros(1)).unwrap().norm();
        let guess = solve(&mut problem, DVector::zeros(1), &SimulatorConfig::default()).unwrap();
        let end = problem.residual(&guess).unwrap().norm();
        assert!(end < start);
        // A forward-biased silicon junction settles well below the supply
        assert!(guess[0] > 0.3 && guess[0] < 0.9);
    }

    #[test]
    fn test_lm_empty_guess() {
        let mut circuit = Circuit::new("r");
        circuit.add_resistor("R1", "a", "0", 1.0).unwrap();
        let params = ParamTable::new();
        let mut problem = StepProblem::new(&mut circuit, &params, SolveMode::OperatingPoint);
        let guess = solve(&mut problem, DVector::zeros(0), &SimulatorConfig::default()).unwrap();
        assert!(guess.is_empty());
    }
}

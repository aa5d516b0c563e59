use std::fmt;
use std::sync::Arc;

use kryst::context::ksp_context::Workspace;
use kryst::matrix::op::CsrOp;
use kryst::parallel::{NoComm, UniverseComm};
use kryst::preconditioner::PcSide;
use kryst::solver::LinearSolver;
use kryst::solver::bicgstab::BiCgStabSolver;
use kryst::solver::cg::CgSolver;
use log::{debug, trace};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SolverParams;
use crate::numerics::Tolerance;
use crate::numerics::sparse::{diagonal, to_krylov};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    #[serde(rename = "CG")]
    Cg,
    #[serde(rename = "BiCGStab")]
    BiCgStab,
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMethod::Cg => write!(f, "CG"),
            SolverMethod::BiCgStab => write!(f, "BiCGStab"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error(
        "{method} failed to converge in {max_iterations} iterations \
         (residual {residual:.3e}, target {target:.3e})"
    )]
    NonConvergence {
        method: SolverMethod,
        max_iterations: u32,
        residual: f64,
        target: f64,
    },
    #[error("matrix is {rows}x{cols} but rhs has {rhs} and solution {solution} entries")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        rhs: usize,
        solution: usize,
    },
    #[error("{0} contains NaN or Inf")]
    NonFinite(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverResult {
    /// Zero when the initial guess already met the tolerance.
    pub iterations: u32,
    pub final_residual: f64,
}

/// Solves the linear system of one time step, starting from the values in
/// `solution`.
pub trait StepSolver {
    fn solve(
        &mut self,
        matrix: &CsrMatrix<f64>,
        rhs: &DVector<f64>,
        solution: &mut DVector<f64>,
    ) -> Result<SolverResult, SolverError>;
}

/// CG or BiCGStab from `kryst` on the symmetrically Jacobi scaled system
/// `D^-1/2 A D^-1/2`.
#[derive(Clone, Debug)]
pub struct KrylovSolver {
    pub method: SolverMethod,
    pub max_iterations: u32,
    pub tolerance: Tolerance,
}

impl Default for KrylovSolver {
    fn default() -> Self {
        Self::from_params(&SolverParams::default())
    }
}

impl KrylovSolver {
    pub fn from_params(params: &SolverParams) -> Self {
        Self {
            method: params.method,
            max_iterations: params.max_iterations,
            tolerance: Tolerance::from_params(params.tolerance, params.normalize_tolerance),
        }
    }

    fn non_convergence(&self, residual: f64, target: f64) -> SolverError {
        SolverError::NonConvergence {
            method: self.method,
            max_iterations: self.max_iterations,
            residual,
            target,
        }
    }

    /// Runs the Krylov method on `scaled y = b`. Returns the iteration count
    /// reported by the solver.
    fn run_krylov(
        &self,
        scaled: &CsrMatrix<f64>,
        b: &DVector<f64>,
        y: &mut DVector<f64>,
        tolerance: f64,
    ) -> Result<u32, String> {
        let n = b.len();
        let operator = CsrOp::new(Arc::new(to_krylov(scaled)));
        let comm = UniverseComm::NoComm(NoComm {});
        let mut workspace = Workspace::new(n);
        let max_iterations = self.max_iterations as usize;

        match self.method {
            SolverMethod::Cg => {
                let mut cg = CgSolver::new(tolerance, max_iterations);
                cg.setup_workspace(&mut workspace);
                cg.solve(
                    &operator,
                    None,
                    b.as_slice(),
                    y.as_mut_slice(),
                    PcSide::Left,
                    &comm,
                    None,
                    Some(&mut workspace),
                )
                .map(|stats| stats.iterations as u32)
                .map_err(|e| format!("{e:?}"))
            }
            SolverMethod::BiCgStab => {
                let mut bicgstab = BiCgStabSolver::new(tolerance, max_iterations);
                bicgstab.setup_workspace(&mut workspace);
                bicgstab
                    .solve(
                        &operator,
                        None,
                        b.as_slice(),
                        y.as_mut_slice(),
                        PcSide::Left,
                        &comm,
                        None,
                        Some(&mut workspace),
                    )
                    .map(|stats| stats.iterations as u32)
                    .map_err(|e| format!("{e:?}"))
            }
        }
    }
}

impl StepSolver for KrylovSolver {
    fn solve(
        &mut self,
        matrix: &CsrMatrix<f64>,
        rhs: &DVector<f64>,
        solution: &mut DVector<f64>,
    ) -> Result<SolverResult, SolverError> {
        let (rows, cols) = (matrix.nrows(), matrix.ncols());
        if rows != cols || rhs.len() != rows || solution.len() != rows {
            return Err(SolverError::DimensionMismatch {
                rows,
                cols,
                rhs: rhs.len(),
                solution: solution.len(),
            });
        }
        if !rhs.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite("right hand side"));
        }

        let target = self.tolerance.target(rhs.norm());
        let residual = rhs - matrix * &*solution;
        let initial = residual.norm();
        if initial <= target {
            debug!("{}: initial guess meets {target:.3e}", self.method);
            return Ok(SolverResult {
                iterations: 0,
                final_residual: initial,
            });
        }

        let scale = jacobi_scale(matrix);
        let scaled = scale_symmetric(matrix, &scale);
        let b = rhs.component_mul(&scale);
        let mut y = solution.component_div(&scale);

        // ||r|| <= ||r_scaled|| / min(scale). The divisor keeps the target
        // whether the solver measures residuals absolutely or relative to the
        // initial residual or right hand side; the half leaves room for the
        // drift between recursive and true residuals.
        let reference = 1.0_f64
            .max(b.norm())
            .max(residual.component_mul(&scale).norm());
        let tolerance = 0.5 * target * scale.min() / reference;
        trace!(
            "{}: residual {initial:.3e}, target {target:.3e}, scaled tolerance {tolerance:.3e}",
            self.method
        );

        let outcome = self.run_krylov(&scaled, &b, &mut y, tolerance);
        if !y.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite("solution"));
        }
        let candidate = y.component_mul(&scale);
        let final_residual = (rhs - matrix * &candidate).norm();

        match outcome {
            Ok(iterations) if final_residual <= target => {
                solution.copy_from(&candidate);
                // More than nothing was needed, whatever the solver reports.
                let iterations = iterations.max(1);
                debug!(
                    "{} converged in {iterations} iterations (residual {final_residual:.3e})",
                    self.method
                );
                Ok(SolverResult {
                    iterations,
                    final_residual,
                })
            }
            Ok(_) => Err(self.non_convergence(final_residual, target)),
            Err(e) => {
                debug!("{} stopped: {e}", self.method);
                Err(self.non_convergence(final_residual, target))
            }
        }
    }
}

/// `1/sqrt|a_ii|`, or one on a zero diagonal.
fn jacobi_scale(matrix: &CsrMatrix<f64>) -> DVector<f64> {
    diagonal(matrix).map(|d| if d == 0.0 { 1.0 } else { 1.0 / d.abs().sqrt() })
}

fn scale_symmetric(matrix: &CsrMatrix<f64>, scale: &DVector<f64>) -> CsrMatrix<f64> {
    let mut scaled = matrix.clone();
    let (offsets, columns, values) = scaled.csr_data_mut();
    for row in 0..scale.len() {
        for idx in offsets[row]..offsets[row + 1] {
            values[idx] *= scale[row] * scale[columns[idx]];
        }
    }
    scaled
}

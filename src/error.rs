use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::discretization::mesh::MeshError;
use crate::numerics::solver::SolverError;
use crate::physics::assembly::AssemblyError;
use crate::physics::functions::FieldError;
use crate::processing::persistence::PersistenceError;

/// Everything that can end a run early.
#[derive(Debug, Error)]
pub enum PecletError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("linear solver did not converge: {0}")]
    Convergence(#[from] SolverError),
    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),
    #[error("invalid field: {0}")]
    Field(#[from] FieldError),
    #[error("restart field on [{}, {}] does not overlap mesh on [{}, {}]", .field.0, .field.1, .mesh.0, .mesh.1)]
    RestartMismatch { field: (f64, f64), mesh: (f64, f64) },
    #[error("field persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("output failed: {0}")]
    Output(#[from] io::Error),
}

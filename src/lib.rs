//! Theta-method finite element solver for the transient convection-diffusion
//! equation `u_t + v u_x - (α u_x)_x = f` on an adaptively refined interval.

pub mod config;
pub mod discretization;
pub mod error;
pub mod logging;
pub mod numerics;
pub mod physics;
pub mod processing;

pub use config::Parameters;
pub use error::PecletError;
pub use numerics::transient::{Collaborators, TimeIntegrationController};
pub use processing::summary::RunSummary;

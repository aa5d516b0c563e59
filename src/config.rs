//! Structured run parameters.
//!
//! Every section mirrors one block of the parameter file and carries the same
//! defaults a fresh run would use, so a file only needs the entries that
//! differ. The parsed value is immutable once handed to the controller.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discretization::mesh::BoundaryId;
use crate::numerics::solver::SolverMethod;
use crate::physics::bc::{BoundaryFunctionName, BoundaryKind};

/// Step sizes below this are treated as "derive from the refinement levels".
pub const STEP_SIZE_EPSILON: f64 = 1e-14;

pub const DEFAULT_OUTPUT_DIRECTORY: &str = "output";
/// Saved field, relative to the output directory.
pub const DEFAULT_FIELD_FILE: &str = "field.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access parameter file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed parameter file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(
        "boundary {boundary}: `{function}` needs {needed} argument(s) but only {available} remain"
    )]
    ArgumentUnderflow {
        boundary: BoundaryId,
        function: &'static str,
        needed: usize,
        available: usize,
    },
    #[error(
        "{implementation_types} implementation types and {function_names} function names \
         declared for a mesh with {boundaries} boundaries"
    )]
    BoundaryCountMismatch {
        implementation_types: usize,
        function_names: usize,
        boundaries: usize,
    },
    #[error("semi-implicit theta must lie in [0, 1], got {0}")]
    InvalidTheta(f64),
    #[error("resolved time step must be positive, got {0}")]
    NonPositiveTimeStep(f64),
    #[error("end time must be positive, got {0}")]
    NonPositiveEndTime(f64),
    #[error("{name} must lie in [0, 1], got {value}")]
    InvalidFraction { name: &'static str, value: f64 },
    #[error("refine and coarsen fractions add up to {0}, which exceeds 1")]
    FractionSum(f64),
    #[error("cannot parse expression `{expression}`: {reason}")]
    Expression { expression: String, reason: String },
    #[error("invalid {section} parameters: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}

/// A parsed function of `x` and `t`, with optional named constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionParams {
    pub function_expression: String,
    pub function_constants: BTreeMap<String, f64>,
}

impl ExpressionParams {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            function_expression: expression.into(),
            function_constants: BTreeMap::new(),
        }
    }
}

impl Default for ExpressionParams {
    fn default() -> Self {
        Self::new("0")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridName {
    HyperCube,
    HyperRectangle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryParams {
    pub grid_name: GridName,
    /// `[x_min, x_max]` of the interval.
    pub sizes: Vec<f64>,
    /// Rigid shift applied to the coarse grid, `[shift_along_x]`.
    pub transformations: Vec<f64>,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            grid_name: GridName::HyperCube,
            sizes: vec![0.0, 1.0],
            transformations: vec![0.0],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdeParams {
    pub velocity: ExpressionParams,
    pub diffusivity: ExpressionParams,
    pub source: ExpressionParams,
}

impl PdeParams {
    pub fn with_unit_diffusivity() -> Self {
        Self {
            velocity: ExpressionParams::new("0"),
            diffusivity: ExpressionParams::new("1"),
            source: ExpressionParams::new("0"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConditionParams {
    /// One entry per boundary ID, in ID order.
    pub implementation_types: Vec<BoundaryKind>,
    /// One entry per boundary ID, in ID order.
    pub function_names: Vec<BoundaryFunctionName>,
    /// Consumed front to back while boundaries are resolved in ID order.
    pub function_double_arguments: Vec<f64>,
    pub parsed_function: ExpressionParams,
}

impl Default for BoundaryConditionParams {
    fn default() -> Self {
        Self {
            implementation_types: vec![BoundaryKind::Natural, BoundaryKind::Strong],
            function_names: vec![BoundaryFunctionName::Parsed, BoundaryFunctionName::Parsed],
            function_double_arguments: Vec::new(),
            parsed_function: ExpressionParams::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialValueKind {
    Parsed,
    Constant,
    InterpolateOldField,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialValueParams {
    pub function_name: InitialValueKind,
    pub function_double_arguments: Vec<f64>,
    pub parsed_function: ExpressionParams,
    /// Field written by an earlier run, read when restarting.
    pub field_file: PathBuf,
}

impl Default for InitialValueParams {
    fn default() -> Self {
        Self {
            function_name: InitialValueKind::Parsed,
            function_double_arguments: Vec::new(),
            parsed_function: ExpressionParams::default(),
            field_file: Path::new(DEFAULT_OUTPUT_DIRECTORY).join(DEFAULT_FIELD_FILE),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveRefinementParams {
    pub initial_cycles: u32,
    pub max_level: u32,
    pub max_cells: usize,
    pub interval: u32,
    pub cycles_at_interval: u32,
    pub refine_fraction: f64,
    pub coarsen_fraction: f64,
}

impl Default for AdaptiveRefinementParams {
    fn default() -> Self {
        Self {
            initial_cycles: 0,
            max_level: 10,
            max_cells: 2000,
            interval: 0,
            cycles_at_interval: 5,
            refine_fraction: 0.3,
            coarsen_fraction: 0.3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementParams {
    pub initial_global_cycles: u32,
    pub initial_boundary_cycles: u32,
    pub boundaries_to_refine: Vec<BoundaryId>,
    pub adaptive: AdaptiveRefinementParams,
}

impl Default for RefinementParams {
    fn default() -> Self {
        Self {
            initial_global_cycles: 4,
            initial_boundary_cycles: 0,
            boundaries_to_refine: vec![0],
            adaptive: AdaptiveRefinementParams::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeParams {
    pub end_time: f64,
    /// Zero means `end_time / 2^global_refinement_levels`.
    pub step_size: f64,
    pub global_refinement_levels: u32,
    pub semi_implicit_theta: f64,
    pub stop_when_steady: bool,
}

impl Default for TimeParams {
    fn default() -> Self {
        Self {
            end_time: 1.0,
            step_size: 0.0,
            global_refinement_levels: 4,
            semi_implicit_theta: 0.5,
            stop_when_steady: false,
        }
    }
}

impl TimeParams {
    pub fn resolved_step_size(&self) -> f64 {
        if self.step_size < STEP_SIZE_EPSILON {
            self.end_time / 2f64.powi(self.global_refinement_levels as i32)
        } else {
            self.step_size
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    pub method: SolverMethod,
    pub max_iterations: u32,
    pub tolerance: f64,
    pub normalize_tolerance: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            method: SolverMethod::Cg,
            max_iterations: 1000,
            tolerance: 1e-8,
            normalize_tolerance: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputParams {
    pub directory: PathBuf,
    pub write_solution_vtk: bool,
    pub write_solution_table: bool,
    /// 1 writes every step, 0 only the final one, k every k-th step.
    pub time_step_interval: u32,
    /// Where the final field is saved for a later restart.
    pub field_file: PathBuf,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            write_solution_vtk: true,
            write_solution_table: false,
            time_step_interval: 1,
            field_file: PathBuf::from(DEFAULT_FIELD_FILE),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationParams {
    pub enabled: bool,
    pub exact_solution_function: ExpressionParams,
}

/// All parameters of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub geometry: GeometryParams,
    pub pde: PdeParams,
    pub boundary_conditions: BoundaryConditionParams,
    pub initial_values: InitialValueParams,
    pub refinement: RefinementParams,
    pub time: TimeParams,
    pub solver: SolverParams,
    pub output: OutputParams,
    pub verification: VerificationParams,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            geometry: GeometryParams::default(),
            pde: PdeParams::with_unit_diffusivity(),
            boundary_conditions: BoundaryConditionParams::default(),
            initial_values: InitialValueParams::default(),
            refinement: RefinementParams::default(),
            time: TimeParams::default(),
            solver: SolverParams::default(),
            output: OutputParams::default(),
            verification: VerificationParams::default(),
        }
    }
}

impl Parameters {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Record the complete parameter set, defaults included.
    pub fn write_used<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let theta = self.time.semi_implicit_theta;
        if !(0.0..=1.0).contains(&theta) {
            return Err(ConfigError::InvalidTheta(theta));
        }
        if !(self.time.end_time > 0.0) {
            return Err(ConfigError::NonPositiveEndTime(self.time.end_time));
        }
        let step = self.time.resolved_step_size();
        if !(step > 0.0) || !step.is_finite() {
            return Err(ConfigError::NonPositiveTimeStep(step));
        }

        let adaptive = &self.refinement.adaptive;
        for (name, value) in [
            ("refine_fraction", adaptive.refine_fraction),
            ("coarsen_fraction", adaptive.coarsen_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidFraction { name, value });
            }
        }
        let sum = adaptive.refine_fraction + adaptive.coarsen_fraction;
        if sum > 1.0 {
            return Err(ConfigError::FractionSum(sum));
        }
        if adaptive.max_cells == 0 {
            return Err(ConfigError::Invalid {
                section: "refinement.adaptive",
                reason: "max_cells must be positive".into(),
            });
        }

        if !(self.solver.tolerance > 0.0) {
            return Err(ConfigError::Invalid {
                section: "solver",
                reason: format!("tolerance must be positive, got {}", self.solver.tolerance),
            });
        }
        if self.solver.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                section: "solver",
                reason: "max_iterations must be positive".into(),
            });
        }

        match self.geometry.sizes.as_slice() {
            [x0, x1] if x1 > x0 => {}
            sizes => {
                return Err(ConfigError::Invalid {
                    section: "geometry",
                    reason: format!("sizes must be [x_min, x_max] with x_min < x_max, got {sizes:?}"),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_size_falls_back_to_refinement_levels() {
        let time = TimeParams {
            end_time: 2.0,
            step_size: 0.0,
            global_refinement_levels: 3,
            ..TimeParams::default()
        };
        assert_eq!(time.resolved_step_size(), 0.25);

        let explicit = TimeParams {
            step_size: 0.1,
            ..time
        };
        assert_eq!(explicit.resolved_step_size(), 0.1);
    }

    #[test]
    fn defaults_are_valid() {
        Parameters::default().validate().expect("defaults validate");
    }

    #[test]
    fn default_restart_reads_the_default_saved_field() {
        let params = Parameters::default();
        assert_eq!(
            params.initial_values.field_file,
            params.output.directory.join(&params.output.field_file)
        );
    }

    #[test]
    fn theta_outside_unit_interval_is_rejected() {
        let mut params = Parameters::default();
        params.time.semi_implicit_theta = 1.5;
        assert!(matches!(params.validate(), Err(ConfigError::InvalidTheta(t)) if t == 1.5));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let params = Parameters::from_json(
            r#"{
                "time": { "end_time": 0.5, "semi_implicit_theta": 1.0 },
                "solver": { "method": "BiCGStab" },
                "boundary_conditions": {
                    "implementation_types": ["strong", "natural"],
                    "function_names": ["constant", "melt_film"],
                    "function_double_arguments": [1.0, 2.0, 3.0, 1.0, 0.1]
                }
            }"#,
        )
        .expect("parses");

        assert_eq!(params.time.end_time, 0.5);
        assert_eq!(params.time.global_refinement_levels, 4);
        assert_eq!(params.solver.method, SolverMethod::BiCgStab);
        assert_eq!(params.solver.max_iterations, 1000);
        assert_eq!(
            params.boundary_conditions.function_names,
            vec![BoundaryFunctionName::Constant, BoundaryFunctionName::MeltFilm]
        );
        assert_eq!(params.refinement.adaptive.max_cells, 2000);
    }

    #[test]
    fn zero_resolved_step_is_rejected() {
        let mut params = Parameters::default();
        params.time.end_time = 1e-300;
        params.time.global_refinement_levels = 1000;
        assert!(matches!(
            params.validate(),
            Err(ConfigError::NonPositiveTimeStep(_))
        ));
    }
}

//! Theta-method time integration with adaptive refinement.
//!
//! Each step solves
//!
//! ```text
//! (M + θΔt A) uⁿ = M uⁿ⁻¹ - (1-θ)Δt A uⁿ⁻¹ + Δt [θ Fⁿ + (1-θ) Fⁿ⁻¹]
//! ```
//!
//! where `A = C + K` is the convection-diffusion operator and `F` collects
//! the source and the natural boundary fluxes. Strong boundary values are
//! imposed on the assembled system after hanging-node condensation.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, info};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use nalgebra_sparse::pattern::SparsityPattern;

use crate::config::Parameters;
use crate::discretization::constraints::{ConstraintSet, apply_boundary_values};
use crate::discretization::dofs::DofMap;
use crate::discretization::generator;
use crate::discretization::mesh::Mesh;
use crate::error::PecletError;
use crate::numerics::refinement::{
    ErrorEstimator, KellyEstimator, RefinementPolicy, RefinementSchedule,
};
use crate::numerics::solver::{KrylovSolver, StepSolver};
use crate::numerics::timing;
use crate::physics::assembly::{Assembler, AssemblyError, LinearElementAssembler};
use crate::physics::bc::{BoundaryConditionSet, BoundaryKind};
use crate::physics::functions::FieldFunction;
use crate::physics::initial::InitialValueProvider;
use crate::processing::output::{FileOutput, OutputSink};
use crate::processing::persistence::{FieldFileStore, Persistence};
use crate::processing::summary::RunSummary;
use crate::processing::verification::{VerificationRecord, VerificationTable};

/// Round-off allowance when comparing the current time with the end time.
pub const EPSILON: f64 = 1e-14;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Initializing,
    PreRefining,
    Stepping,
    Finished,
}

/// Position in time. `current_time` is always `step_size * step_index`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeState {
    pub current_time: f64,
    pub step_index: u32,
    pub step_size: f64,
    pub theta: f64,
}

impl TimeState {
    pub fn new(step_size: f64, theta: f64) -> Self {
        Self {
            current_time: 0.0,
            step_index: 0,
            step_size,
            theta,
        }
    }

    pub fn advance(&mut self) {
        self.step_index += 1;
        self.current_time = self.step_size * f64::from(self.step_index);
    }

    pub fn reset(&mut self) {
        self.step_index = 0;
        self.current_time = 0.0;
    }
}

/// Everything that depends on the current mesh. Rebuilt as a whole whenever
/// the mesh changes.
#[derive(Clone, Debug)]
pub struct DiscreteSystem {
    pub mesh: Mesh,
    pub dofs: DofMap,
    pub constraints: ConstraintSet,
    pub pattern: SparsityPattern,
    pub mass_matrix: CsrMatrix<f64>,
    pub convection_diffusion_matrix: CsrMatrix<f64>,
    pub system_matrix: CsrMatrix<f64>,
    pub solution: DVector<f64>,
    pub old_solution: DVector<f64>,
    pub system_rhs: DVector<f64>,
}

impl DiscreteSystem {
    pub fn setup(mesh: Mesh, assembler: &dyn Assembler) -> Result<Self, AssemblyError> {
        let dofs = DofMap::distribute(&mesh);
        let assembled = timing::record_assembly(|| assembler.assemble(&mesh, &dofs))?;
        let n = dofs.n_dofs();
        info!("Number of active cells: {}", dofs.n_cells());
        info!("Number of degrees of freedom: {}", n);
        Ok(Self {
            system_matrix: assembled.mass_matrix.clone(),
            mesh,
            dofs,
            constraints: assembled.constraints,
            pattern: assembled.pattern,
            mass_matrix: assembled.mass_matrix,
            convection_diffusion_matrix: assembled.convection_diffusion_matrix,
            solution: DVector::zeros(n),
            old_solution: DVector::zeros(n),
            system_rhs: DVector::zeros(n),
        })
    }

    /// Rebuild after the mesh was adapted. All vectors are reset to zero.
    pub fn reinit(&mut self, assembler: &dyn Assembler) -> Result<(), AssemblyError> {
        let mesh = self.mesh.clone();
        *self = Self::setup(mesh, assembler)?;
        Ok(())
    }
}

/// `M + θΔt A`.
pub fn implicit_matrix(
    mass: &CsrMatrix<f64>,
    convection_diffusion: &CsrMatrix<f64>,
    theta: f64,
    step_size: f64,
) -> CsrMatrix<f64> {
    mass + &(convection_diffusion * (theta * step_size))
}

/// `M uⁿ⁻¹ - (1-θ)Δt A uⁿ⁻¹`.
pub fn explicit_rhs(
    mass: &CsrMatrix<f64>,
    convection_diffusion: &CsrMatrix<f64>,
    old_solution: &DVector<f64>,
    theta: f64,
    step_size: f64,
) -> DVector<f64> {
    let mut rhs = mass * old_solution;
    let operator = convection_diffusion * old_solution;
    rhs.axpy(-(1.0 - theta) * step_size, &operator, 1.0);
    rhs
}

/// `rhs += Δt [θ now + (1-θ) before]`.
pub fn add_theta_weighted(
    rhs: &mut DVector<f64>,
    now: &DVector<f64>,
    before: &DVector<f64>,
    theta: f64,
    step_size: f64,
) {
    rhs.axpy(step_size * theta, now, 1.0);
    rhs.axpy(step_size * (1.0 - theta), before, 1.0);
}

/// The replaceable parts of a run.
pub struct Collaborators {
    pub assembler: Box<dyn Assembler>,
    pub solver: Box<dyn StepSolver>,
    pub estimator: Box<dyn ErrorEstimator>,
    pub output: Box<dyn OutputSink>,
    pub persistence: Box<dyn Persistence>,
}

impl Collaborators {
    /// Linear elements, Jacobi scaled Krylov solver, Kelly indicator and file output
    /// as configured.
    pub fn from_parameters(params: &Parameters) -> Result<Self, PecletError> {
        let output = FileOutput::from_params(&params.output)?;
        let field_file = output.directory().join(&params.output.field_file);
        Ok(Self {
            assembler: Box::new(LinearElementAssembler::from_params(&params.pde)?),
            solver: Box::new(KrylovSolver::from_params(&params.solver)),
            estimator: Box::new(KellyEstimator::new(FieldFunction::parse(
                &params.pde.diffusivity,
            )?)),
            output: Box::new(output),
            persistence: Box::new(FieldFileStore::new(field_file)),
        })
    }
}

/// Drives a run from `t = 0` to the end time or a steady state.
pub struct TimeIntegrationController {
    params: Parameters,
    time: TimeState,
    state: ControllerState,
    system: DiscreteSystem,
    boundaries: BoundaryConditionSet,
    source: FieldFunction,
    exact_solution: Option<FieldFunction>,
    initial_values: InitialValueProvider,
    policy: RefinementPolicy,
    schedule: RefinementSchedule,
    verification: Option<VerificationTable>,
    summary: RunSummary,
    collaborators: Collaborators,
}

impl TimeIntegrationController {
    /// Validate the parameters and build the initial discrete system. Every
    /// configuration problem surfaces here, before the first step.
    pub fn new(params: Parameters, collaborators: Collaborators) -> Result<Self, PecletError> {
        params.validate()?;
        let mesh = generator::create_grid(&params.geometry, &params.refinement)?;
        let boundaries = BoundaryConditionSet::resolve(
            &params.boundary_conditions,
            mesh.boundary_ids().len(),
        )?;
        let source = FieldFunction::parse(&params.pde.source)?;
        let exact_solution = if params.verification.enabled {
            Some(FieldFunction::parse(
                &params.verification.exact_solution_function,
            )?)
        } else {
            None
        };
        let initial_values = InitialValueProvider::from_params(
            &params.initial_values,
            collaborators.persistence.as_ref(),
        )?;
        initial_values.check_overlap(&mesh)?;

        let system = DiscreteSystem::setup(mesh, collaborators.assembler.as_ref())?;
        let time = TimeState::new(
            params.time.resolved_step_size(),
            params.time.semi_implicit_theta,
        );
        let summary = RunSummary {
            theta: time.theta,
            step_size: time.step_size,
            solver_method: params.solver.method,
            ..RunSummary::default()
        };

        Ok(Self {
            policy: RefinementPolicy::from_params(&params.refinement.adaptive),
            schedule: RefinementSchedule::from_params(&params.refinement.adaptive),
            verification: exact_solution.as_ref().map(|_| VerificationTable::default()),
            time,
            state: ControllerState::Initializing,
            system,
            boundaries,
            source,
            exact_solution,
            initial_values,
            summary,
            collaborators,
            params,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn time(&self) -> &TimeState {
        &self.time
    }

    pub fn system(&self) -> &DiscreteSystem {
        &self.system
    }

    pub fn verification(&self) -> Option<&VerificationTable> {
        self.verification.as_ref()
    }

    pub fn run(&mut self) -> Result<RunSummary, PecletError> {
        let started = Instant::now();
        timing::reset_timing();
        info!(
            "Starting transient run: t = 0 -> {:.4e}, dt = {:.3e}, theta = {}",
            self.params.time.end_time, self.time.step_size, self.time.theta
        );

        self.start_stepping()?;
        while self.state != ControllerState::Finished {
            let final_step = self.step()?;

            if self.schedule.pre_refinement_due(self.time.step_index) {
                self.state = ControllerState::PreRefining;
                self.pre_refine()?;
                self.start_stepping()?;
                continue;
            }
            if self.schedule.periodic_due(self.time.step_index) {
                self.refine_periodically()?;
            }

            self.system.old_solution.copy_from(&self.system.solution);
            if final_step {
                self.state = ControllerState::Finished;
            }
        }

        self.finish(started.elapsed())
    }

    /// Enter `Stepping` from `t = 0` with the initial values interpolated on
    /// the current mesh.
    fn start_stepping(&mut self) -> Result<(), PecletError> {
        self.time.reset();
        let initial = self.initial_values.interpolate(&self.system.dofs);
        self.system.solution.copy_from(&initial);
        self.system.old_solution = initial;

        if self.params.output.time_step_interval != 0 {
            self.collaborators
                .output
                .write(0, 0.0, &self.system.dofs, &self.system.solution)?;
        }
        self.state = ControllerState::Stepping;
        Ok(())
    }

    fn output_due(&self, step_index: u32, final_step: bool) -> bool {
        match self.params.output.time_step_interval {
            0 => final_step,
            k => step_index % k == 0,
        }
    }

    /// One step body. Returns whether this was the final step.
    fn step(&mut self) -> Result<bool, PecletError> {
        self.time.advance();
        let TimeState {
            current_time: t,
            step_index,
            step_size: dt,
            theta,
        } = self.time;
        let mut final_step = t > self.params.time.end_time - EPSILON;
        let mut output_step = self.output_due(step_index, final_step);
        if output_step {
            info!("Time step {} at t={}", step_index, t);
        }
        self.summary.steps_taken += 1;

        let system = &mut self.system;
        let assembler = self.collaborators.assembler.as_ref();

        let mut rhs = explicit_rhs(
            &system.mass_matrix,
            &system.convection_diffusion_matrix,
            &system.old_solution,
            theta,
            dt,
        );

        self.source.set_time(t);
        let forcing_now = assembler.right_hand_side(&system.dofs, &self.source);
        self.source.set_time(t - dt);
        let forcing_before = assembler.right_hand_side(&system.dofs, &self.source);
        add_theta_weighted(&mut rhs, &forcing_now, &forcing_before, theta, dt);

        for boundary in self.boundaries.of_kind_mut(BoundaryKind::Natural) {
            boundary.function.set_time(t);
            let flux_now =
                assembler.boundary_right_hand_side(&system.dofs, &boundary.function, boundary.id);
            boundary.function.set_time(t - dt);
            let flux_before =
                assembler.boundary_right_hand_side(&system.dofs, &boundary.function, boundary.id);
            add_theta_weighted(&mut rhs, &flux_now, &flux_before, theta, dt);
        }

        let mut matrix = implicit_matrix(
            &system.mass_matrix,
            &system.convection_diffusion_matrix,
            theta,
            dt,
        );
        system.constraints.condense(&mut matrix, &mut rhs);

        let mut boundary_values = BTreeMap::new();
        for boundary in self.boundaries.of_kind_mut(BoundaryKind::Strong) {
            boundary.function.set_time(t);
            let function = &boundary.function;
            system.dofs.interpolate_boundary_values(
                boundary.id,
                |x| function.value(x),
                &mut boundary_values,
            );
        }
        apply_boundary_values(&boundary_values, &mut matrix, &mut system.solution, &mut rhs);

        let solver = &mut self.collaborators.solver;
        let result =
            timing::record_linear_solve(|| solver.solve(&matrix, &rhs, &mut system.solution))?;
        system.constraints.distribute(&mut system.solution);
        system.system_matrix = matrix;
        system.system_rhs = rhs;
        self.summary.add_solver_info(result.iterations);
        debug!(
            "Step {:>4} | t = {:.4e} | dt = {:.3e} | iters = {}",
            step_index, t, dt, result.iterations
        );

        if self.params.time.stop_when_steady && result.iterations == 0 {
            info!("Reached steady state at t = {}", t);
            final_step = true;
            output_step = true;
            self.summary.reached_steady_state = true;
        }

        if output_step {
            self.write_output()?;
        }
        Ok(final_step)
    }

    fn write_output(&mut self) -> Result<(), PecletError> {
        let TimeState {
            current_time: t,
            step_index,
            step_size,
            ..
        } = self.time;
        self.collaborators
            .output
            .write(step_index, t, &self.system.dofs, &self.system.solution)?;

        if let (Some(exact), Some(table)) = (&mut self.exact_solution, &mut self.verification) {
            exact.set_time(t);
            table.push(VerificationRecord::measure(
                &self.system.dofs,
                &self.system.solution,
                exact,
                step_size,
                t,
            ));
        }
        Ok(())
    }

    /// One refinement cycle on the solution of the first step, after which
    /// the run starts over on the new mesh.
    fn pre_refine(&mut self) -> Result<(), PecletError> {
        let system = &mut self.system;
        let indicators =
            self.collaborators
                .estimator
                .estimate(&system.mesh, &system.dofs, &system.solution);
        let policy = &self.policy;
        let refined = timing::record_refinement(|| {
            policy.apply(
                &mut system.mesh,
                &system.dofs,
                &indicators,
                &system.solution,
            )
        })?;
        system.reinit(self.collaborators.assembler.as_ref())?;
        self.schedule.complete_pre_refinement_cycle();
        self.summary.pre_refinement_cycles = self.schedule.cycles_completed();

        info!(
            "Pre-refinement cycle {}/{}: {} cells ({} flagged for refinement, {} for coarsening)",
            self.schedule.cycles_completed(),
            self.schedule.initial_cycles,
            refined.dofs.n_cells(),
            refined.flags.refine,
            refined.flags.coarsen
        );
        Ok(())
    }

    /// `cycles_at_interval` refinement cycles, each estimating on the field
    /// carried over from the previous one, then one rebuild.
    fn refine_periodically(&mut self) -> Result<(), PecletError> {
        let system = &mut self.system;
        let estimator = self.collaborators.estimator.as_ref();
        let policy = &self.policy;
        let mut dofs = system.dofs.clone();
        let mut field = system.solution.clone();

        for _ in 0..self.schedule.cycles_at_interval {
            let indicators = estimator.estimate(&system.mesh, &dofs, &field);
            let refined = timing::record_refinement(|| {
                policy.apply(&mut system.mesh, &dofs, &indicators, &field)
            })?;
            dofs = refined.dofs;
            field = refined.field;
        }

        system.reinit(self.collaborators.assembler.as_ref())?;
        system.solution = field;
        self.summary.periodic_refinements += 1;
        info!(
            "Refined at step {}: {} active cells",
            self.time.step_index,
            system.dofs.n_cells()
        );
        Ok(())
    }

    fn finish(&mut self, elapsed: Duration) -> Result<RunSummary, PecletError> {
        let handle = self.collaborators.persistence.save_field(
            &self.system.mesh,
            &self.system.dofs,
            &self.system.solution,
        )?;
        debug!("Saved final field to {}", handle.path().display());

        if let Some(table) = &self.verification {
            self.collaborators.output.write_verification(table)?;
        }
        self.collaborators.output.finish()?;
        timing::finalize_and_print(elapsed);

        let mut summary = self.summary.clone();
        summary.set_mesh_info(&self.system.mesh, self.system.dofs.n_dofs());
        summary.final_time = self.time.current_time;
        summary.final_step = self.time.step_index;
        summary.final_errors = self
            .verification
            .as_ref()
            .and_then(|table| table.last().copied());
        summary.wall_time = elapsed;
        Ok(summary)
    }
}

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use peclet_rs::config::{ExpressionParams, Parameters};
use peclet_rs::discretization::dofs::DofMap;
use peclet_rs::discretization::mesh::Mesh;
use peclet_rs::numerics::refinement::{ErrorEstimator, KellyEstimator};
use peclet_rs::numerics::solver::{KrylovSolver, StepSolver};
use peclet_rs::numerics::transient::{explicit_rhs, implicit_matrix};
use peclet_rs::physics::assembly::{Assembler, LinearElementAssembler};
use peclet_rs::{Collaborators, TimeIntegrationController};

fn refinement_levels() -> Vec<u32> {
    vec![6, 9, 12]
}

fn uniform(levels: u32) -> (Mesh, DofMap) {
    let mut mesh = Mesh::interval(0.0, 1.0).expect("unit interval");
    mesh.refine_global(levels);
    let dofs = DofMap::distribute(&mesh);
    (mesh, dofs)
}

fn assembler() -> LinearElementAssembler {
    LinearElementAssembler::new(0.01.into(), 1.0.into())
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    let assembler = assembler();
    for &levels in &refinement_levels() {
        let (mesh, dofs) = uniform(levels);
        group.bench_with_input(BenchmarkId::from_parameter(dofs.n_dofs()), &levels, |b, &_| {
            b.iter(|| {
                let system = assembler.assemble(&mesh, &dofs).expect("assembly");
                std::hint::black_box(system.mass_matrix.nnz());
            });
        });
    }
    group.finish();
}

fn bench_krylov_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("krylov_step");
    let assembler = assembler();
    for &levels in &refinement_levels() {
        let (mesh, dofs) = uniform(levels);
        let system = assembler.assemble(&mesh, &dofs).expect("assembly");
        let old = dofs.interpolate(|x| (std::f64::consts::PI * x).sin());
        let dt = 1e-3;
        let matrix = implicit_matrix(&system.mass_matrix, &system.convection_diffusion_matrix, 0.5, dt);
        let rhs = explicit_rhs(
            &system.mass_matrix,
            &system.convection_diffusion_matrix,
            &old,
            0.5,
            dt,
        );
        let mut solver = KrylovSolver::default();
        solver.method = peclet_rs::numerics::solver::SolverMethod::BiCgStab;
        group.bench_with_input(BenchmarkId::from_parameter(dofs.n_dofs()), &levels, |b, &_| {
            b.iter_batched(
                || old.clone(),
                |mut u| {
                    let _ = solver.solve(&matrix, &rhs, &mut u);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_kelly(c: &mut Criterion) {
    let mut group = c.benchmark_group("kelly_estimate");
    let estimator = KellyEstimator::default();
    for &levels in &refinement_levels() {
        let (mesh, dofs) = uniform(levels);
        let u = dofs.interpolate(|x| (-50.0 * (x - 0.5) * (x - 0.5)).exp());
        group.bench_with_input(BenchmarkId::from_parameter(dofs.n_dofs()), &levels, |b, &_| {
            b.iter(|| std::hint::black_box(estimator.estimate(&mesh, &dofs, &u)));
        });
    }
    group.finish();
}

fn bench_adaptive_run(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temporary directory");
    let mut params = Parameters::default();
    params.pde.velocity = ExpressionParams::new("1");
    params.pde.diffusivity = ExpressionParams::new("0.01");
    params.initial_values.parsed_function = ExpressionParams::new("exp(-100*(x-0.3)^2)");
    params.refinement.initial_global_cycles = 6;
    params.refinement.adaptive.interval = 4;
    params.refinement.adaptive.cycles_at_interval = 1;
    params.time.end_time = 0.25;
    params.time.step_size = 1.0 / 64.0;
    params.solver.method = peclet_rs::numerics::solver::SolverMethod::BiCgStab;
    params.output.directory = dir.path().to_path_buf();
    params.output.write_solution_vtk = false;
    params.output.time_step_interval = 0;

    c.bench_function("adaptive_run", |b| {
        b.iter(|| {
            let collaborators = Collaborators::from_parameters(&params).expect("collaborators");
            let mut controller =
                TimeIntegrationController::new(params.clone(), collaborators).expect("controller");
            std::hint::black_box(controller.run().expect("run"));
        });
    });
}

criterion_group!(
    benches,
    bench_assembly,
    bench_krylov_step,
    bench_kelly,
    bench_adaptive_run
);
criterion_main!(benches);

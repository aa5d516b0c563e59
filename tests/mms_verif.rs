use std::path::Path;

use tempfile::tempdir;

use peclet_rs::config::{ExpressionParams, Parameters};
use peclet_rs::numerics::solver::SolverMethod;
use peclet_rs::physics::bc::{BoundaryFunctionName, BoundaryKind};
use peclet_rs::processing::verification::VERIFICATION_TABLE_FILE;
use peclet_rs::{Collaborators, RunSummary, TimeIntegrationController};

fn run(params: Parameters) -> RunSummary {
    let collaborators = Collaborators::from_parameters(&params).unwrap();
    let mut controller = TimeIntegrationController::new(params, collaborators).unwrap();
    controller.run().unwrap()
}

fn manufactured(dir: &Path, exact: &str, source: &str, levels: u32, step_size: f64) -> Parameters {
    let mut params = Parameters::default();
    params.pde.source = ExpressionParams::new(source);
    params.boundary_conditions.implementation_types = vec![BoundaryKind::Strong, BoundaryKind::Strong];
    params.boundary_conditions.function_names =
        vec![BoundaryFunctionName::Parsed, BoundaryFunctionName::Parsed];
    params.boundary_conditions.parsed_function = ExpressionParams::new(exact);
    params.initial_values.parsed_function = ExpressionParams::new(exact);
    params.refinement.initial_global_cycles = levels;
    params.time.end_time = 1.0;
    params.time.step_size = step_size;
    params.solver.tolerance = 1e-12;
    params.output.directory = dir.to_path_buf();
    params.output.write_solution_vtk = false;
    params.verification.enabled = true;
    params.verification.exact_solution_function = ExpressionParams::new(exact);
    params
}

#[test]
fn linear_in_time_and_space_is_reproduced() {
    // u = t x, so u_t - u_xx = x and every theta is exact. Forward Euler
    // needs Δt below h²/6 on h = 1/16 to keep round-off from growing.
    for (theta, step_size, end_time) in [
        (0.0, 1.0 / 2048.0, 1.0 / 16.0),
        (0.5, 0.125, 1.0),
        (1.0, 0.125, 1.0),
    ] {
        let dir = tempdir().unwrap();
        let mut params = manufactured(dir.path(), "t*x", "x", 4, step_size);
        params.time.semi_implicit_theta = theta;
        params.time.end_time = end_time;
        params.output.time_step_interval = 0;
        let summary = run(params);

        let errors = summary.final_errors.expect("verification record");
        assert_eq!(errors.time, end_time);
        assert_eq!(errors.cells, 16);
        assert!(errors.l2_error < 1e-8, "theta {theta}: {:e}", errors.l2_error);
        assert!(errors.l1_error < 1e-8, "theta {theta}: {:e}", errors.l1_error);
    }
}

#[test]
fn decaying_sine_converges() {
    let exact = "exp(-t)*sin(pi*x)";
    let source = "(pi^2 - 1)*exp(-t)*sin(pi*x)";

    let coarse_dir = tempdir().unwrap();
    let coarse = run(manufactured(coarse_dir.path(), exact, source, 4, 1.0 / 16.0));
    let fine_dir = tempdir().unwrap();
    let fine = run(manufactured(fine_dir.path(), exact, source, 6, 1.0 / 64.0));

    let coarse_error = coarse.final_errors.unwrap().l2_error;
    let fine_error = fine.final_errors.unwrap().l2_error;
    assert_eq!(fine.num_cells, 64);
    assert!(fine_error < 5e-3, "fine L2 error {fine_error:e}");
    assert!(
        fine_error < coarse_error / 4.0,
        "{coarse_error:e} -> {fine_error:e}"
    );
}

#[test]
fn convection_needs_the_nonsymmetric_solver() {
    // u = x + t under unit velocity: u_t + u_x - u_xx = 2.
    let dir = tempdir().unwrap();
    let mut params = manufactured(dir.path(), "x + t", "2", 4, 0.25);
    params.pde.velocity = ExpressionParams::new("1");
    params.solver.method = SolverMethod::BiCgStab;
    let summary = run(params);
    assert!(summary.final_errors.unwrap().l2_error < 1e-8);
}

#[test]
fn verification_table_lists_every_output_step() {
    let dir = tempdir().unwrap();
    let params = manufactured(dir.path(), "t*x", "x", 3, 0.25);
    run(params);

    let table = std::fs::read_to_string(dir.path().join(VERIFICATION_TABLE_FILE)).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    // Header plus steps 1 to 4. Step 0 carries no record.
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("time_step_size"));
    assert!(lines[1].starts_with("2.50000000000000e-1"));
}

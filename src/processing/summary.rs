use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::discretization::mesh::Mesh;
use crate::numerics::solver::SolverMethod;
use crate::processing::verification::VerificationRecord;

pub const RUN_SUMMARY_FILE: &str = "run_summary.txt";

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    // Mesh info
    pub num_cells: usize,
    pub num_dofs: usize,
    pub domain_extent: (f64, f64),
    pub min_cell_diameter: f64,
    pub max_cell_diameter: f64,
    pub max_level: u32,

    // Time stepping
    pub theta: f64,
    pub step_size: f64,
    pub final_time: f64,
    pub final_step: u32,
    /// Step bodies executed, including those repeated by pre-refinement.
    pub steps_taken: u32,
    pub reached_steady_state: bool,

    // Solver info
    pub solver_method: SolverMethod,
    pub total_iterations: u64,
    pub max_iterations: u32,

    // Refinement
    pub pre_refinement_cycles: u32,
    pub periodic_refinements: u32,

    pub final_errors: Option<VerificationRecord>,
    pub wall_time: Duration,
}

impl RunSummary {
    pub fn set_mesh_info(&mut self, mesh: &Mesh, num_dofs: usize) {
        let (min_h, max_h) = mesh.diameter_range();
        self.num_cells = mesh.n_active_cells();
        self.num_dofs = num_dofs;
        self.domain_extent = mesh.bounds();
        self.min_cell_diameter = min_h;
        self.max_cell_diameter = max_h;
        self.max_level = mesh.max_active_level();
    }

    pub fn add_solver_info(&mut self, iterations: u32) {
        self.total_iterations += u64::from(iterations);
        self.max_iterations = self.max_iterations.max(iterations);
    }

    pub fn average_iterations(&self) -> f64 {
        if self.steps_taken == 0 {
            0.0
        } else {
            self.total_iterations as f64 / f64::from(self.steps_taken)
        }
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;

        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file, "CONVECTION-DIFFUSION RUN SUMMARY")?;
        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file)?;

        writeln!(file, "FINAL MESH")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Active cells:        {}", self.num_cells)?;
        writeln!(file, "Degrees of freedom:  {}", self.num_dofs)?;
        writeln!(
            file,
            "Domain extent:       {:.6e} to {:.6e}",
            self.domain_extent.0, self.domain_extent.1
        )?;
        writeln!(file, "Min cell diameter:   {:.6e}", self.min_cell_diameter)?;
        writeln!(file, "Max cell diameter:   {:.6e}", self.max_cell_diameter)?;
        writeln!(file, "Max level:           {}", self.max_level)?;
        writeln!(file)?;

        writeln!(file, "TIME STEPPING")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Theta:               {}", self.theta)?;
        writeln!(file, "Step size:           {:.6e}", self.step_size)?;
        writeln!(file, "Final time:          {:.6e}", self.final_time)?;
        writeln!(file, "Final step:          {}", self.final_step)?;
        writeln!(file, "Step bodies run:     {}", self.steps_taken)?;
        writeln!(
            file,
            "Steady state:        {}",
            if self.reached_steady_state { "reached" } else { "no" }
        )?;
        writeln!(file)?;

        writeln!(file, "SOLVER PERFORMANCE")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Method:              {}", self.solver_method)?;
        writeln!(file, "Total iterations:    {}", self.total_iterations)?;
        writeln!(file, "Max per step:        {}", self.max_iterations)?;
        writeln!(file, "Average per step:    {:.2}", self.average_iterations())?;
        writeln!(file)?;

        writeln!(file, "REFINEMENT")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Pre-refinement:      {} cycles", self.pre_refinement_cycles)?;
        writeln!(file, "Periodic:            {} events", self.periodic_refinements)?;
        writeln!(file)?;

        if let Some(errors) = &self.final_errors {
            writeln!(file, "VERIFICATION")?;
            writeln!(file, "{}", "-".repeat(60))?;
            writeln!(file, "L1 error:            {:.6e}", errors.l1_error)?;
            writeln!(file, "L2 error:            {:.6e}", errors.l2_error)?;
            writeln!(file)?;
        }

        writeln!(file, "Wall time:           {:.3}s", self.wall_time.as_secs_f64())?;
        writeln!(file, "{}", "=".repeat(60))?;

        Ok(())
    }

    pub fn print_to_console(&self) {
        println!("\n{}", "=".repeat(60));
        println!("RUN SUMMARY");
        println!("{}", "=".repeat(60));
        println!(
            "Mesh:          {} cells, {} dofs (max level {})",
            self.num_cells, self.num_dofs, self.max_level
        );
        println!(
            "Time:          t = {:.6e} after step {}{}",
            self.final_time,
            self.final_step,
            if self.reached_steady_state {
                " (steady)"
            } else {
                ""
            }
        );
        println!(
            "Iterations:    {} total, {:.2} per step",
            self.total_iterations,
            self.average_iterations()
        );
        if let Some(errors) = &self.final_errors {
            println!("L2 error:      {:.3e}", errors.l2_error);
        }
        println!("{}\n", "=".repeat(60));
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            num_cells: 0,
            num_dofs: 0,
            domain_extent: (0.0, 0.0),
            min_cell_diameter: 0.0,
            max_cell_diameter: 0.0,
            max_level: 0,
            theta: 0.0,
            step_size: 0.0,
            final_time: 0.0,
            final_step: 0,
            steps_taken: 0,
            reached_steady_state: false,
            solver_method: SolverMethod::Cg,
            total_iterations: 0,
            max_iterations: 0,
            pre_refinement_cycles: 0,
            periodic_refinements: 0,
            final_errors: None,
            wall_time: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn summary_file_lists_sections() {
        let mut mesh = Mesh::interval(0.0, 2.0).unwrap();
        mesh.refine_global(2);
        let mut summary = RunSummary {
            steps_taken: 4,
            ..RunSummary::default()
        };
        summary.set_mesh_info(&mesh, 5);
        summary.add_solver_info(3);
        summary.add_solver_info(5);
        assert_eq!(summary.max_iterations, 5);
        assert_eq!(summary.average_iterations(), 2.0);
        assert_eq!(summary.min_cell_diameter, 0.5);

        let dir = tempdir().unwrap();
        let path = dir.path().join(RUN_SUMMARY_FILE);
        summary.write_to_file(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Active cells:        4"));
        assert!(content.contains("SOLVER PERFORMANCE"));
        assert!(!content.contains("VERIFICATION"));
    }
}

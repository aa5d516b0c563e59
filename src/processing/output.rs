use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use nalgebra::DVector;

use crate::config::OutputParams;
use crate::discretization::dofs::DofMap;
use crate::processing::csv_writer::{Column, write_csv};
use crate::processing::verification::{VERIFICATION_TABLE_FILE, VerificationTable};
use crate::processing::vtk::{series_path, write_vtu};

pub const SOLUTION_TABLE_FILE: &str = "1D_solution_table.csv";

/// Receives the solution at every output step.
pub trait OutputSink {
    fn write(
        &mut self,
        step_index: u32,
        time: f64,
        dofs: &DofMap,
        solution: &DVector<f64>,
    ) -> io::Result<()>;

    fn write_verification(&mut self, _table: &VerificationTable) -> io::Result<()> {
        Ok(())
    }

    /// Called once after the last step.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Accumulated `(step, time, x, u)` rows. The mesh may change between
/// steps, so every row carries its own node position.
#[derive(Clone, Debug, Default)]
pub struct SolutionTable {
    steps: Vec<f64>,
    times: Vec<f64>,
    positions: Vec<f64>,
    values: Vec<f64>,
}

impl SolutionTable {
    pub fn append(&mut self, step_index: u32, time: f64, dofs: &DofMap, solution: &DVector<f64>) {
        for (&x, &u) in dofs.support_points().iter().zip(solution.iter()) {
            self.steps.push(f64::from(step_index));
            self.times.push(time);
            self.positions.push(x);
            self.values.push(u);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_csv(
            path,
            &[
                Column::integer("step", &self.steps),
                Column::scientific("time", &self.times),
                Column::scientific("x", &self.positions),
                Column::scientific("u", &self.values),
            ],
        )
    }
}

/// Writes VTU snapshots and, optionally, the solution table into one
/// directory.
#[derive(Debug)]
pub struct FileOutput {
    directory: PathBuf,
    write_vtk: bool,
    table: Option<SolutionTable>,
}

impl FileOutput {
    /// Stale tables of a previous run in the same directory are removed.
    pub fn new(
        directory: impl Into<PathBuf>,
        write_vtk: bool,
        write_table: bool,
    ) -> io::Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        for stale in [VERIFICATION_TABLE_FILE, SOLUTION_TABLE_FILE] {
            match fs::remove_file(directory.join(stale)) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(Self {
            directory,
            write_vtk,
            table: write_table.then(SolutionTable::default),
        })
    }

    pub fn from_params(params: &OutputParams) -> io::Result<Self> {
        Self::new(
            &params.directory,
            params.write_solution_vtk,
            params.write_solution_table,
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl OutputSink for FileOutput {
    fn write(
        &mut self,
        step_index: u32,
        time: f64,
        dofs: &DofMap,
        solution: &DVector<f64>,
    ) -> io::Result<()> {
        if self.write_vtk {
            let path = series_path(&self.directory, step_index);
            write_vtu(&path, dofs, solution, time)?;
            debug!("Wrote {}", path.display());
        }
        if let Some(table) = &mut self.table {
            table.append(step_index, time, dofs, solution);
        }
        Ok(())
    }

    fn write_verification(&mut self, table: &VerificationTable) -> io::Result<()> {
        table.write_to_file(self.directory.join(VERIFICATION_TABLE_FILE))
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(table) = &self.table {
            table.write_to_file(self.directory.join(SOLUTION_TABLE_FILE))?;
        }
        Ok(())
    }
}

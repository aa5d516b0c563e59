use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use nalgebra::DVector;

use crate::discretization::dofs::DofMap;
use crate::physics::assembly::{NormType, integrate_difference};
use crate::physics::functions::FieldFunction;

pub const VERIFICATION_TABLE_FILE: &str = "verification_table.txt";

const HEADERS: [&str; 6] = [
    "time_step_size",
    "time",
    "cells",
    "dofs",
    "L1_norm_error",
    "L2_norm_error",
];

/// Error against a known exact solution at one output step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VerificationRecord {
    pub step_size: f64,
    pub time: f64,
    pub cells: usize,
    pub dofs: usize,
    pub l1_error: f64,
    pub l2_error: f64,
}

impl VerificationRecord {
    /// `exact` must already be set to `time`.
    pub fn measure(
        dofs: &DofMap,
        solution: &DVector<f64>,
        exact: &FieldFunction,
        step_size: f64,
        time: f64,
    ) -> Self {
        Self {
            step_size,
            time,
            cells: dofs.n_cells(),
            dofs: dofs.n_dofs(),
            l1_error: integrate_difference(dofs, solution, exact, NormType::L1),
            l2_error: integrate_difference(dofs, solution, exact, NormType::L2),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VerificationTable {
    records: Vec<VerificationRecord>,
}

impl VerificationTable {
    pub fn push(&mut self, record: VerificationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[VerificationRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&VerificationRecord> {
        self.records.last()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append the table as aligned text, all columns in scientific notation
    /// with 14 digits.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut out = BufWriter::new(file);
        let width = 22;

        let header: Vec<String> = HEADERS.iter().map(|h| format!("{h:<width$}")).collect();
        writeln!(out, "{}", header.join(" ").trim_end())?;
        for r in &self.records {
            let row = [
                r.step_size,
                r.time,
                r.cells as f64,
                r.dofs as f64,
                r.l1_error,
                r.l2_error,
            ];
            let cells: Vec<String> = row.iter().map(|v| format!("{:<width$.14e}", v)).collect();
            writeln!(out, "{}", cells.join(" ").trim_end())?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExpressionParams;
    use crate::discretization::mesh::Mesh;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn exact_nodal_values_of_linear_field_have_no_error() {
        let mut mesh = Mesh::interval(0.0, 2.0).unwrap();
        mesh.refine_global(2);
        let dofs = DofMap::distribute(&mesh);
        let exact = FieldFunction::parse(&ExpressionParams::new("1 - x")).unwrap();
        let u = dofs.interpolate(|x| exact.value(x));
        let record = VerificationRecord::measure(&dofs, &u, &exact, 0.1, 0.3);
        assert_eq!(record.cells, 4);
        assert_eq!(record.dofs, 5);
        assert!(record.l1_error < 1e-15);
        assert!(record.l2_error < 1e-15);
    }

    #[test]
    fn constant_offset_gives_known_norms() {
        let mesh = Mesh::interval(0.0, 4.0).unwrap();
        let dofs = DofMap::distribute(&mesh);
        let exact = FieldFunction::from(0.0);
        let u = DVector::from_element(2, 0.5);
        let record = VerificationRecord::measure(&dofs, &u, &exact, 1.0, 1.0);
        assert!((record.l1_error - 2.0).abs() < 1e-14);
        assert!((record.l2_error - 1.0).abs() < 1e-14);
    }

    #[test]
    fn table_is_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(VERIFICATION_TABLE_FILE);
        let mut table = VerificationTable::default();
        table.push(VerificationRecord {
            step_size: 0.5,
            time: 1.0,
            cells: 8,
            dofs: 9,
            l1_error: 1e-3,
            l2_error: 2e-3,
        });
        table.write_to_file(&path).unwrap();
        table.write_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("time_step_size"));
        assert!(lines[1].starts_with("5.00000000000000e-1"));
        assert!(lines[1].contains("8.00000000000000e0"));
    }
}

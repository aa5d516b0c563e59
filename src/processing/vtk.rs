//! VTU (XML UnstructuredGrid) output of nodal solutions for ParaView.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::DVector;
use thiserror::Error;

use crate::discretization::dofs::DofMap;

#[derive(Debug, Error)]
pub enum VtkError {
    #[error("VTK I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("solution has {values} values for {points} points")]
    SizeMismatch { points: usize, values: usize },
}

impl From<VtkError> for std::io::Error {
    fn from(err: VtkError) -> Self {
        match err {
            VtkError::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidInput, other),
        }
    }
}

/// VTK cell type of a two-node line.
const VTK_LINE: u8 = 3;

struct VtkWriter<W: Write> {
    writer: BufWriter<W>,
    indent: usize,
}

impl<W: Write> VtkWriter<W> {
    fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            indent: 0,
        }
    }

    fn write_indent(&mut self) -> std::io::Result<()> {
        for _ in 0..self.indent {
            write!(self.writer, "  ")?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> std::io::Result<()> {
        writeln!(self.writer, "<?xml version=\"1.0\"?>")?;
        writeln!(
            self.writer,
            "<VTKFile type=\"UnstructuredGrid\" version=\"0.1\" byte_order=\"LittleEndian\">"
        )?;
        self.indent += 1;
        Ok(())
    }

    fn write_footer(&mut self) -> std::io::Result<()> {
        self.indent -= 1;
        writeln!(self.writer, "</VTKFile>")?;
        self.writer.flush()
    }

    fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> std::io::Result<()> {
        self.write_indent()?;
        write!(self.writer, "<{}", name)?;
        for (key, value) in attrs {
            write!(self.writer, " {}=\"{}\"", key, value)?;
        }
        writeln!(self.writer, ">")?;
        self.indent += 1;
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> std::io::Result<()> {
        self.indent -= 1;
        self.write_indent()?;
        writeln!(self.writer, "</{}>", name)
    }

    /// One `<DataArray>` with whitespace separated values, `per_line` a row.
    fn write_data_array<T: std::fmt::Display>(
        &mut self,
        attrs: &str,
        data: &[T],
        per_line: usize,
    ) -> std::io::Result<()> {
        self.write_indent()?;
        writeln!(self.writer, "<DataArray {} format=\"ascii\">", attrs)?;
        self.indent += 1;
        for chunk in data.chunks(per_line) {
            self.write_indent()?;
            let line: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
            writeln!(self.writer, "{}", line.join(" "))?;
        }
        self.indent -= 1;
        self.write_indent()?;
        writeln!(self.writer, "</DataArray>")
    }

    fn write_field_data(&mut self, name: &str, value: f64) -> std::io::Result<()> {
        self.start_element("FieldData", &[])?;
        self.write_data_array(
            &format!("type=\"Float64\" Name=\"{name}\" NumberOfTuples=\"1\""),
            &[Sci(value)],
            1,
        )?;
        self.end_element("FieldData")
    }
}

/// Scientific notation with enough digits to round-trip plots.
struct Sci(f64);

impl std::fmt::Display for Sci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.10e}", self.0)
    }
}

/// Write the nodal solution on the line cells of the dof map.
pub fn write_vtu(
    path: impl AsRef<Path>,
    dofs: &DofMap,
    solution: &DVector<f64>,
    time: f64,
) -> Result<(), VtkError> {
    let points = dofs.support_points();
    if solution.len() != points.len() {
        return Err(VtkError::SizeMismatch {
            points: points.len(),
            values: solution.len(),
        });
    }
    let n_cells = dofs.n_cells();

    let file = File::create(path)?;
    let mut writer = VtkWriter::new(file);
    writer.write_header()?;
    writer.start_element("UnstructuredGrid", &[])?;
    writer.write_field_data("TIME", time)?;
    writer.start_element(
        "Piece",
        &[
            ("NumberOfPoints", &points.len().to_string()),
            ("NumberOfCells", &n_cells.to_string()),
        ],
    )?;

    writer.start_element("Points", &[])?;
    let coordinates: Vec<Sci> = points
        .iter()
        .flat_map(|&x| [Sci(x), Sci(0.0), Sci(0.0)])
        .collect();
    writer.write_data_array("type=\"Float64\" NumberOfComponents=\"3\"", &coordinates, 6)?;
    writer.end_element("Points")?;

    writer.start_element("Cells", &[])?;
    let connectivity: Vec<usize> = (0..n_cells).flat_map(|k| dofs.cell_dofs(k)).collect();
    writer.write_data_array("type=\"Int32\" Name=\"connectivity\"", &connectivity, 20)?;
    let offsets: Vec<usize> = (1..=n_cells).map(|k| 2 * k).collect();
    writer.write_data_array("type=\"Int32\" Name=\"offsets\"", &offsets, 20)?;
    writer.write_data_array("type=\"UInt8\" Name=\"types\"", &vec![VTK_LINE; n_cells], 20)?;
    writer.end_element("Cells")?;

    writer.start_element("PointData", &[("Scalars", "solution")])?;
    let values: Vec<Sci> = solution.iter().map(|&u| Sci(u)).collect();
    writer.write_data_array("type=\"Float64\" Name=\"solution\"", &values, 6)?;
    writer.end_element("PointData")?;

    writer.end_element("Piece")?;
    writer.end_element("UnstructuredGrid")?;
    writer.write_footer()?;
    Ok(())
}

/// `solution-<step>.vtu` inside `directory`, with the step zero padded to
/// three digits.
pub fn series_path(directory: &Path, step_index: u32) -> PathBuf {
    directory.join(format!("solution-{:03}.vtu", step_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::mesh::Mesh;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn vtu_lists_points_and_line_cells() {
        let dir = tempdir().unwrap();
        let path = series_path(dir.path(), 7);
        assert!(path.to_string_lossy().ends_with("solution-007.vtu"));

        let mut mesh = Mesh::interval(0.0, 1.0).unwrap();
        mesh.refine_global(1);
        let dofs = DofMap::distribute(&mesh);
        let solution = dofs.interpolate(|x| x * x);
        write_vtu(&path, &dofs, &solution, 0.25).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("NumberOfPoints=\"3\""));
        assert!(content.contains("NumberOfCells=\"2\""));
        assert!(content.contains("0 1 1 2"));
        assert!(content.contains("2.5000000000e-1"));
        assert!(content.trim_end().ends_with("</VTKFile>"));
    }

    #[test]
    fn mismatched_solution_is_rejected() {
        let dir = tempdir().unwrap();
        let mesh = Mesh::interval(0.0, 1.0).unwrap();
        let dofs = DofMap::distribute(&mesh);
        let err = write_vtu(dir.path().join("x.vtu"), &dofs, &DVector::zeros(5), 0.0).unwrap_err();
        assert!(matches!(err, VtkError::SizeMismatch { points: 2, values: 5 }));
    }
}

//! Saving the final field so a later run can start from it.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discretization::dofs::DofMap;
use crate::discretization::mesh::{Mesh, MeshError};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed field file: {0}")]
    Format(#[from] serde_json::Error),
    #[error("stored mesh is invalid: {0}")]
    Mesh(#[from] MeshError),
    #[error("stored field has {values} values for {nodes} nodes")]
    Inconsistent { nodes: usize, values: usize },
}

/// Location of a stored field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldHandle(PathBuf);

impl FieldHandle {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

pub trait Persistence {
    fn save_field(
        &mut self,
        mesh: &Mesh,
        dofs: &DofMap,
        solution: &DVector<f64>,
    ) -> Result<FieldHandle, PersistenceError>;

    fn load_field(
        &self,
        handle: &FieldHandle,
    ) -> Result<(Mesh, DofMap, DVector<f64>), PersistenceError>;
}

#[derive(Serialize, Deserialize)]
struct StoredCell {
    left: f64,
    right: f64,
    level: u32,
}

#[derive(Serialize, Deserialize)]
struct StoredField {
    cells: Vec<StoredCell>,
    values: Vec<f64>,
}

/// JSON file holding the active cells and the nodal values.
#[derive(Clone, Debug)]
pub struct FieldFileStore {
    path: PathBuf,
}

impl FieldFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn handle(&self) -> FieldHandle {
        FieldHandle::new(&self.path)
    }
}

impl Persistence for FieldFileStore {
    fn save_field(
        &mut self,
        mesh: &Mesh,
        dofs: &DofMap,
        solution: &DVector<f64>,
    ) -> Result<FieldHandle, PersistenceError> {
        let cells = dofs
            .cell_ids()
            .iter()
            .map(|&id| {
                let cell = mesh.cell(id);
                StoredCell {
                    left: cell.left,
                    right: cell.right,
                    level: cell.level,
                }
            })
            .collect();
        let stored = StoredField {
            cells,
            values: solution.iter().copied().collect(),
        };

        let file = File::create(&self.path).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::to_writer(BufWriter::new(file), &stored)?;
        Ok(self.handle())
    }

    fn load_field(
        &self,
        handle: &FieldHandle,
    ) -> Result<(Mesh, DofMap, DVector<f64>), PersistenceError> {
        let file = File::open(handle.path()).map_err(|source| PersistenceError::Io {
            path: handle.path().to_path_buf(),
            source,
        })?;
        let stored: StoredField = serde_json::from_reader(BufReader::new(file))?;

        let cells: Vec<(f64, f64, u32)> = stored
            .cells
            .iter()
            .map(|c| (c.left, c.right, c.level))
            .collect();
        let mesh = Mesh::from_cells(&cells)?;
        let dofs = DofMap::distribute(&mesh);
        if stored.values.len() != dofs.n_dofs() {
            return Err(PersistenceError::Inconsistent {
                nodes: dofs.n_dofs(),
                values: stored.values.len(),
            });
        }
        Ok((mesh, dofs, DVector::from_vec(stored.values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn field_survives_a_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = FieldFileStore::new(dir.path().join("field.json"));

        let mut mesh = Mesh::interval(0.0, 1.0).unwrap();
        mesh.refine_global(2);
        mesh.refine_near_boundaries(&[0], 1);
        let dofs = DofMap::distribute(&mesh);
        let solution = dofs.interpolate(|x| (3.0 * x).sin());

        let handle = store.save_field(&mesh, &dofs, &solution).unwrap();
        let (loaded_mesh, loaded_dofs, loaded) = store.load_field(&handle).unwrap();

        assert_eq!(loaded_dofs.support_points(), dofs.support_points());
        assert_eq!(loaded, solution);
        assert_eq!(loaded_mesh.max_active_level(), 3);
    }

    #[test]
    fn values_are_reloaded_bit_for_bit() {
        let dir = tempdir().unwrap();
        let mut store = FieldFileStore::new(dir.path().join("field.json"));
        let mut mesh = Mesh::interval(0.0, 1.0).unwrap();
        mesh.refine_global(1);
        let dofs = DofMap::distribute(&mesh);
        let solution = DVector::from_vec(vec![0.36627252908604757, 0.1 + 0.2, 1.0 / 3.0]);

        let handle = store.save_field(&mesh, &dofs, &solution).unwrap();
        let (_, _, loaded) = store.load_field(&handle).unwrap();
        for (a, b) in loaded.iter().zip(solution.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn inconsistent_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("field.json");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"{{"cells":[{{"left":0.0,"right":1.0,"level":0}}],"values":[1.0]}}"#
        )
        .unwrap();

        let store = FieldFileStore::new(&path);
        assert!(matches!(
            store.load_field(&store.handle()),
            Err(PersistenceError::Inconsistent { nodes: 2, values: 1 })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let store = FieldFileStore::new("/nonexistent/field.json");
        let err = store.load_field(&store.handle()).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/field.json"));
    }
}

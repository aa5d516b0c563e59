use std::collections::BTreeMap;

use nalgebra::DVector;

use super::constraints::ConstraintSet;
use super::mesh::{BoundaryId, CellId, LEFT_BOUNDARY, Mesh, RIGHT_BOUNDARY};

/// Continuous piecewise-linear numbering on the active cells of a mesh.
///
/// Degree of freedom `k` sits on the `k`-th vertex from the left, so active
/// cell `k` couples dofs `k` and `k + 1`.
#[derive(Clone, Debug)]
pub struct DofMap {
    cells: Vec<CellId>,
    support_points: Vec<f64>,
}

impl DofMap {
    pub fn distribute(mesh: &Mesh) -> Self {
        Self {
            cells: mesh.active_cells(),
            support_points: mesh.vertices(),
        }
    }

    pub fn n_dofs(&self) -> usize {
        self.support_points.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_ids(&self) -> &[CellId] {
        &self.cells
    }

    pub fn cell_dofs(&self, cell: usize) -> [usize; 2] {
        [cell, cell + 1]
    }

    pub fn cell_bounds(&self, cell: usize) -> (f64, f64) {
        (self.support_points[cell], self.support_points[cell + 1])
    }

    pub fn support_points(&self) -> &[f64] {
        &self.support_points
    }

    pub fn boundary_dof(&self, boundary: BoundaryId) -> Option<usize> {
        match boundary {
            LEFT_BOUNDARY => Some(0),
            RIGHT_BOUNDARY => Some(self.n_dofs() - 1),
            _ => None,
        }
    }

    /// Nodal interpolation of `f`.
    pub fn interpolate(&self, f: impl Fn(f64) -> f64) -> DVector<f64> {
        DVector::from_iterator(self.n_dofs(), self.support_points.iter().map(|&x| f(x)))
    }

    /// Add `dof -> f(x_dof)` for every dof on `boundary`.
    pub fn interpolate_boundary_values(
        &self,
        boundary: BoundaryId,
        f: impl Fn(f64) -> f64,
        values: &mut BTreeMap<usize, f64>,
    ) {
        if let Some(dof) = self.boundary_dof(boundary) {
            values.insert(dof, f(self.support_points[dof]));
        }
    }

    /// Constraints for hanging nodes. Interval meshes are always conforming,
    /// so the set is empty; it is still closed so callers can treat it like
    /// any other constraint set.
    pub fn make_hanging_node_constraints(&self) -> ConstraintSet {
        let mut constraints = ConstraintSet::new();
        constraints.close();
        constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_cells() -> DofMap {
        let mesh = Mesh::from_cells(&[(0.0, 0.5, 1), (0.5, 0.75, 2), (0.75, 1.0, 2)]).unwrap();
        DofMap::distribute(&mesh)
    }

    #[test]
    fn numbering_follows_vertices() {
        let dofs = three_cells();
        assert_eq!(dofs.n_dofs(), 4);
        assert_eq!(dofs.n_cells(), 3);
        assert_eq!(dofs.cell_dofs(1), [1, 2]);
        assert_eq!(dofs.cell_bounds(1), (0.5, 0.75));
        assert_eq!(dofs.boundary_dof(LEFT_BOUNDARY), Some(0));
        assert_eq!(dofs.boundary_dof(RIGHT_BOUNDARY), Some(3));
        assert_eq!(dofs.boundary_dof(7), None);
    }

    #[test]
    fn boundary_values_land_on_end_dofs() {
        let dofs = three_cells();
        let mut values = BTreeMap::new();
        dofs.interpolate_boundary_values(RIGHT_BOUNDARY, |x| x + 1.0, &mut values);
        assert_eq!(values.get(&3), Some(&2.0));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn conforming_mesh_has_no_hanging_nodes() {
        let constraints = three_cells().make_hanging_node_constraints();
        assert!(constraints.is_empty());
        assert!(constraints.is_closed());
    }
}

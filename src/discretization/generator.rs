use log::info;

use super::mesh::{Mesh, MeshError};
use crate::config::{GeometryParams, GridName, RefinementParams};

/// Build the unrefined coarse grid named in the geometry parameters.
pub fn build_coarse_grid(geometry: &GeometryParams) -> Result<Mesh, MeshError> {
    let (left, right) = match geometry.sizes.as_slice() {
        [left, right, ..] => (*left, *right),
        _ => (0.0, 1.0),
    };
    match geometry.grid_name {
        // In one dimension both shapes are a single interval.
        GridName::HyperCube | GridName::HyperRectangle => Mesh::interval(left, right),
    }
}

/// Apply the configured rigid shift.
pub fn apply_transformations(mesh: &mut Mesh, geometry: &GeometryParams) {
    if let Some(&dx) = geometry.transformations.first() {
        if dx != 0.0 {
            mesh.shift(dx);
        }
    }
}

/// Coarse grid, shifted, then refined globally and towards the requested
/// boundaries.
pub fn create_grid(
    geometry: &GeometryParams,
    refinement: &RefinementParams,
) -> Result<Mesh, MeshError> {
    let mut mesh = build_coarse_grid(geometry)?;
    apply_transformations(&mut mesh, geometry);
    mesh.refine_global(refinement.initial_global_cycles);
    mesh.refine_near_boundaries(
        &refinement.boundaries_to_refine,
        refinement.initial_boundary_cycles,
    );
    let (left, right) = mesh.bounds();
    info!(
        "Created grid on [{}, {}] with {} active cells",
        left,
        right,
        mesh.n_active_cells()
    );
    Ok(mesh)
}

//! Piecewise-linear finite element assembly on interval meshes.

use nalgebra::DVector;
use nalgebra_sparse::pattern::{SparsityPattern, SparsityPatternFormatError};
use nalgebra_sparse::{CsrMatrix, SparseFormatError};
use thiserror::Error;

use crate::config::{ConfigError, PdeParams};
use crate::discretization::constraints::ConstraintSet;
use crate::discretization::dofs::DofMap;
use crate::discretization::mesh::{BoundaryId, Mesh};
use crate::numerics::sparse::{add_to_entry, make_sparsity_pattern, zeros_on};
use crate::physics::functions::FieldFunction;

/// Two point Gauss rule on the reference cell `[0, 1]` as `(point, weight)`.
const GAUSS_2: [(f64, f64); 2] = [
    (0.211_324_865_405_187_1, 0.5),
    (0.788_675_134_594_812_9, 0.5),
];

/// Three point Gauss rule on `[0, 1]`, used for error norms.
const GAUSS_3: [(f64, f64); 3] = [
    (0.112_701_665_379_258_3, 5.0 / 18.0),
    (0.5, 8.0 / 18.0),
    (0.887_298_334_620_741_7, 5.0 / 18.0),
];

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("invalid sparsity pattern: {0}")]
    Pattern(#[from] SparsityPatternFormatError),
    #[error("invalid sparse matrix: {0}")]
    Matrix(#[from] SparseFormatError),
    #[error("entry ({row}, {col}) is not part of the sparsity pattern")]
    MissingEntry { row: usize, col: usize },
}

/// Add a local cell matrix into global storage.
fn scatter(
    matrix: &mut CsrMatrix<f64>,
    local: [usize; 2],
    block: &[[f64; 2]; 2],
) -> Result<(), AssemblyError> {
    for (i, &row) in local.iter().enumerate() {
        for (j, &col) in local.iter().enumerate() {
            if !add_to_entry(matrix, row, col, block[i][j]) {
                return Err(AssemblyError::MissingEntry { row, col });
            }
        }
    }
    Ok(())
}

/// Time independent operators of a mesh.
#[derive(Clone, Debug)]
pub struct AssembledSystem {
    pub pattern: SparsityPattern,
    pub constraints: ConstraintSet,
    pub mass_matrix: CsrMatrix<f64>,
    /// Convection plus diffusion, `C + K`.
    pub convection_diffusion_matrix: CsrMatrix<f64>,
}

pub trait Assembler {
    fn assemble(&self, mesh: &Mesh, dofs: &DofMap) -> Result<AssembledSystem, AssemblyError>;

    /// `(φ_i, f)` for every dof. `f` must already carry the wanted time.
    fn right_hand_side(&self, dofs: &DofMap, function: &FieldFunction) -> DVector<f64>;

    /// `(φ_i, g)` over one boundary.
    fn boundary_right_hand_side(
        &self,
        dofs: &DofMap,
        function: &FieldFunction,
        boundary: BoundaryId,
    ) -> DVector<f64>;
}

/// Mass, convection and diffusion operators for
/// `∂u/∂t + v ∂u/∂x - ∂/∂x(α ∂u/∂x) = f`.
#[derive(Debug)]
pub struct LinearElementAssembler {
    diffusivity: FieldFunction,
    velocity: FieldFunction,
}

impl LinearElementAssembler {
    pub fn new(diffusivity: FieldFunction, velocity: FieldFunction) -> Self {
        Self {
            diffusivity,
            velocity,
        }
    }

    pub fn from_params(pde: &PdeParams) -> Result<Self, ConfigError> {
        Ok(Self::new(
            FieldFunction::parse(&pde.diffusivity)?,
            FieldFunction::parse(&pde.velocity)?,
        ))
    }
}

impl Assembler for LinearElementAssembler {
    fn assemble(&self, _mesh: &Mesh, dofs: &DofMap) -> Result<AssembledSystem, AssemblyError> {
        let pattern = make_sparsity_pattern(dofs)?;
        let constraints = dofs.make_hanging_node_constraints();
        let mut mass_matrix = zeros_on(&pattern)?;
        let mut convection_diffusion_matrix = zeros_on(&pattern)?;

        for cell in 0..dofs.n_cells() {
            let (x0, x1) = dofs.cell_bounds(cell);
            let h = x1 - x0;
            let local = dofs.cell_dofs(cell);
            let gradients = [-1.0 / h, 1.0 / h];

            let mut mass = [[0.0; 2]; 2];
            let mut operator = [[0.0; 2]; 2];
            for (s, w) in GAUSS_2 {
                let x = x0 + s * h;
                let jxw = w * h;
                let shape = [1.0 - s, s];
                let alpha = self.diffusivity.value(x);
                let v = self.velocity.value(x);
                for i in 0..2 {
                    for j in 0..2 {
                        mass[i][j] += shape[i] * shape[j] * jxw;
                        operator[i][j] += (alpha * gradients[j] * gradients[i]
                            + v * gradients[j] * shape[i])
                            * jxw;
                    }
                }
            }

            scatter(&mut mass_matrix, local, &mass)?;
            scatter(&mut convection_diffusion_matrix, local, &operator)?;
        }

        Ok(AssembledSystem {
            pattern,
            constraints,
            mass_matrix,
            convection_diffusion_matrix,
        })
    }

    fn right_hand_side(&self, dofs: &DofMap, function: &FieldFunction) -> DVector<f64> {
        let mut rhs = DVector::zeros(dofs.n_dofs());
        for cell in 0..dofs.n_cells() {
            let (x0, x1) = dofs.cell_bounds(cell);
            let h = x1 - x0;
            let [a, b] = dofs.cell_dofs(cell);
            for (s, w) in GAUSS_2 {
                let fx = function.value(x0 + s * h) * w * h;
                rhs[a] += fx * (1.0 - s);
                rhs[b] += fx * s;
            }
        }
        rhs
    }

    fn boundary_right_hand_side(
        &self,
        dofs: &DofMap,
        function: &FieldFunction,
        boundary: BoundaryId,
    ) -> DVector<f64> {
        let mut rhs = DVector::zeros(dofs.n_dofs());
        // A boundary of an interval is a point, so the face integral is a
        // point evaluation.
        if let Some(dof) = dofs.boundary_dof(boundary) {
            rhs[dof] = function.value(dofs.support_points()[dof]);
        }
        rhs
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormType {
    L1,
    L2,
}

/// `‖u_h - u‖` over the mesh.
pub fn integrate_difference(
    dofs: &DofMap,
    solution: &DVector<f64>,
    exact: &FieldFunction,
    norm: NormType,
) -> f64 {
    let mut total = 0.0;
    for cell in 0..dofs.n_cells() {
        let (x0, x1) = dofs.cell_bounds(cell);
        let h = x1 - x0;
        let [a, b] = dofs.cell_dofs(cell);
        for (s, w) in GAUSS_3 {
            let uh = solution[a] * (1.0 - s) + solution[b] * s;
            let difference = uh - exact.value(x0 + s * h);
            total += match norm {
                NormType::L1 => difference.abs(),
                NormType::L2 => difference * difference,
            } * w
                * h;
        }
    }
    match norm {
        NormType::L1 => total,
        NormType::L2 => total.sqrt(),
    }
}

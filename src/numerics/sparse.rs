//! Compressed-row helpers shared by assembly, constraint handling and the
//! Krylov solvers.

use std::collections::BTreeSet;

use nalgebra::DVector;
use nalgebra_sparse::pattern::{SparsityPattern, SparsityPatternFormatError};
use nalgebra_sparse::{CsrMatrix, SparseFormatError};

use crate::discretization::dofs::DofMap;

/// Cell couplings of the dof map plus every diagonal.
pub fn make_sparsity_pattern(dofs: &DofMap) -> Result<SparsityPattern, SparsityPatternFormatError> {
    let n = dofs.n_dofs();
    let mut rows: Vec<BTreeSet<usize>> = (0..n).map(|i| BTreeSet::from([i])).collect();
    for cell in 0..dofs.n_cells() {
        let local = dofs.cell_dofs(cell);
        for &i in &local {
            rows[i].extend(local);
        }
    }

    let mut offsets = Vec::with_capacity(n + 1);
    let mut indices = Vec::new();
    offsets.push(0);
    for row in rows {
        indices.extend(row);
        offsets.push(indices.len());
    }
    SparsityPattern::try_from_offsets_and_indices(n, n, offsets, indices)
}

pub fn zeros_on(pattern: &SparsityPattern) -> Result<CsrMatrix<f64>, SparseFormatError> {
    CsrMatrix::try_from_pattern_and_values(pattern.clone(), vec![0.0; pattern.nnz()])
}

/// Add `value` to entry `(row, col)`. Returns `false` if the entry is not
/// part of the pattern.
pub fn add_to_entry(matrix: &mut CsrMatrix<f64>, row: usize, col: usize, value: f64) -> bool {
    let (offsets, columns, values) = matrix.csr_data_mut();
    let (start, end) = (offsets[row], offsets[row + 1]);
    match columns[start..end].binary_search(&col) {
        Ok(pos) => {
            values[start + pos] += value;
            true
        }
        Err(_) => false,
    }
}

pub fn entry(matrix: &CsrMatrix<f64>, row: usize, col: usize) -> Option<f64> {
    let offsets = matrix.row_offsets();
    let (start, end) = (offsets[row], offsets[row + 1]);
    let pos = matrix.col_indices()[start..end].binary_search(&col).ok()?;
    Some(matrix.values()[start + pos])
}

pub fn diagonal(matrix: &CsrMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(
        matrix.nrows(),
        (0..matrix.nrows()).map(|i| entry(matrix, i, i).unwrap_or(0.0)),
    )
}

/// Copy into the compressed-row storage the Krylov solvers operate on.
pub fn to_krylov(matrix: &CsrMatrix<f64>) -> kryst::matrix::sparse::CsrMatrix<f64> {
    let (offsets, columns, values) = matrix.csr_data();
    kryst::matrix::sparse::CsrMatrix::from_csr(
        matrix.nrows(),
        matrix.ncols(),
        offsets.to_vec(),
        columns.to_vec(),
        values.to_vec(),
    )
}

#[cfg(test)]
pub(crate) fn dense_of(matrix: &CsrMatrix<f64>) -> nalgebra::DMatrix<f64> {
    let mut dense = nalgebra::DMatrix::zeros(matrix.nrows(), matrix.ncols());
    for (i, j, v) in matrix.triplet_iter() {
        dense[(i, j)] += *v;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::mesh::Mesh;

    fn dofs(cells: u32) -> DofMap {
        let mut mesh = Mesh::interval(0.0, 1.0).unwrap();
        mesh.refine_global(cells);
        DofMap::distribute(&mesh)
    }

    #[test]
    fn pattern_is_tridiagonal() {
        let pattern = make_sparsity_pattern(&dofs(2)).unwrap();
        assert_eq!(pattern.major_dim(), 5);
        assert_eq!(pattern.nnz(), 5 + 2 * 4);
        assert_eq!(pattern.lane(0), &[0, 1]);
        assert_eq!(pattern.lane(2), &[1, 2, 3]);
    }

    #[test]
    fn entries_outside_pattern_are_rejected() {
        let pattern = make_sparsity_pattern(&dofs(2)).unwrap();
        let mut matrix = zeros_on(&pattern).unwrap();
        assert!(add_to_entry(&mut matrix, 1, 2, 3.0));
        assert!(add_to_entry(&mut matrix, 1, 2, 1.0));
        assert!(!add_to_entry(&mut matrix, 0, 4, 1.0));
        assert_eq!(entry(&matrix, 1, 2), Some(4.0));
        assert_eq!(entry(&matrix, 0, 4), None);
    }

    #[test]
    fn sum_keeps_the_pattern() {
        let pattern = make_sparsity_pattern(&dofs(1)).unwrap();
        let mut a = zeros_on(&pattern).unwrap();
        let mut b = zeros_on(&pattern).unwrap();
        for i in 0..3 {
            add_to_entry(&mut a, i, i, 1.0);
            add_to_entry(&mut b, i, i, 2.0);
        }
        add_to_entry(&mut b, 0, 1, 1.0);
        let a = &a + &(&b * 0.5);
        assert_eq!(a.pattern(), &pattern);
        assert_eq!(diagonal(&a), DVector::from_vec(vec![2.0, 2.0, 2.0]));

        let y = &a * &DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(y, DVector::from_vec(vec![3.0, 4.0, 6.0]));
    }
}

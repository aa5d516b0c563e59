//! Linear constraints between degrees of freedom and their application to an
//! assembled system.
//!
//! A constraint line reads `x_c = Σ w_j x_j + g`. Hanging-node constraints are
//! condensed into the matrix before boundary values are applied, and
//! [`ConstraintSet::distribute`] restores the constrained entries after the
//! solve.

use std::collections::BTreeMap;

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintLine {
    pub dof: usize,
    pub entries: Vec<(usize, f64)>,
    pub inhomogeneity: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ConstraintSet {
    lines: BTreeMap<usize, ConstraintLine>,
    closed: bool,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, dof: usize) {
        self.closed = false;
        self.lines.entry(dof).or_insert_with(|| ConstraintLine {
            dof,
            entries: Vec::new(),
            inhomogeneity: 0.0,
        });
    }

    pub fn add_entry(&mut self, dof: usize, column: usize, weight: f64) {
        self.add_line(dof);
        if let Some(line) = self.lines.get_mut(&dof) {
            line.entries.push((column, weight));
        }
    }

    pub fn set_inhomogeneity(&mut self, dof: usize, value: f64) {
        self.add_line(dof);
        if let Some(line) = self.lines.get_mut(&dof) {
            line.inhomogeneity = value;
        }
    }

    /// Resolve chains so that no line refers to another constrained dof, and
    /// merge duplicate columns.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        // A chain can be at most as long as the number of lines.
        for _ in 0..=self.lines.len() {
            let snapshot = self.lines.clone();
            let mut changed = false;
            for line in self.lines.values_mut() {
                if !line.entries.iter().any(|(c, _)| snapshot.contains_key(c)) {
                    continue;
                }
                let mut expanded = Vec::with_capacity(line.entries.len());
                let mut inhomogeneity = line.inhomogeneity;
                for &(column, weight) in &line.entries {
                    match snapshot.get(&column) {
                        Some(inner) if inner.dof != line.dof => {
                            expanded.extend(inner.entries.iter().map(|&(c, w)| (c, weight * w)));
                            inhomogeneity += weight * inner.inhomogeneity;
                        }
                        _ => expanded.push((column, weight)),
                    }
                }
                line.entries = expanded;
                line.inhomogeneity = inhomogeneity;
                changed = true;
            }
            if !changed {
                break;
            }
        }
        for line in self.lines.values_mut() {
            line.entries = merge_columns(std::mem::take(&mut line.entries));
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.lines.contains_key(&dof)
    }

    pub fn n_constraints(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &ConstraintLine> {
        self.lines.values()
    }

    fn expansion(&self, dof: usize) -> Vec<(usize, f64)> {
        match self.lines.get(&dof) {
            Some(line) => line.entries.clone(),
            None => vec![(dof, 1.0)],
        }
    }

    /// Replace `matrix` and `rhs` by the condensed system `Cᵀ A C`,
    /// `Cᵀ (b - A g)`. Constrained rows keep an average diagonal entry and a
    /// zero right hand side so the condensed matrix stays regular.
    pub fn condense(&self, matrix: &mut CsrMatrix<f64>, rhs: &mut DVector<f64>) {
        debug_assert!(self.closed, "condense needs a closed constraint set");
        if self.lines.is_empty() {
            return;
        }

        let n = matrix.nrows();
        let mut coo = CooMatrix::new(n, n);
        let mut condensed_rhs = DVector::zeros(n);
        let mut diagonal_sum = 0.0;
        let mut diagonal_count = 0usize;

        let offsets = matrix.row_offsets();
        let columns = matrix.col_indices();
        let values = matrix.values();

        for row in 0..n {
            let row_expansion = self.expansion(row);
            for &(i, wi) in &row_expansion {
                condensed_rhs[i] += wi * rhs[row];
            }
            for idx in offsets[row]..offsets[row + 1] {
                let (column, a) = (columns[idx], values[idx]);
                if column == row && !self.is_constrained(row) {
                    diagonal_sum += a.abs();
                    diagonal_count += 1;
                }
                if let Some(line) = self.lines.get(&column) {
                    for &(i, wi) in &row_expansion {
                        condensed_rhs[i] -= wi * a * line.inhomogeneity;
                    }
                }
                let column_expansion = self.expansion(column);
                for &(i, wi) in &row_expansion {
                    for &(j, wj) in &column_expansion {
                        coo.push(i, j, wi * wj * a);
                    }
                }
            }
        }

        let diagonal = if diagonal_count > 0 && diagonal_sum > 0.0 {
            diagonal_sum / diagonal_count as f64
        } else {
            1.0
        };
        for &dof in self.lines.keys() {
            coo.push(dof, dof, diagonal);
            condensed_rhs[dof] = 0.0;
        }

        *matrix = CsrMatrix::from(&coo);
        *rhs = condensed_rhs;
    }

    /// Set every constrained entry from its masters.
    pub fn distribute(&self, x: &mut DVector<f64>) {
        debug_assert!(self.closed, "distribute needs a closed constraint set");
        for line in self.lines.values() {
            let value = line.entries.iter().map(|&(j, w)| w * x[j]).sum::<f64>() + line.inhomogeneity;
            x[line.dof] = value;
        }
    }
}

fn merge_columns(mut entries: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    entries.sort_by_key(|&(column, _)| column);
    let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
    for (column, weight) in entries {
        match merged.last_mut() {
            Some(last) if last.0 == column => last.1 += weight,
            _ => merged.push((column, weight)),
        }
    }
    merged.retain(|&(_, w)| w != 0.0);
    merged
}

/// Impose `x_d = g_d` on the assembled system.
///
/// Each constrained row keeps only its diagonal (an average diagonal is used
/// if it vanished) and gets `rhs_d = a_dd g_d`. Couplings from unconstrained
/// rows are moved to the right hand side, which keeps a symmetric matrix
/// symmetric. `solution_d` is set to `g_d` as the starting guess.
pub fn apply_boundary_values(
    values: &BTreeMap<usize, f64>,
    matrix: &mut CsrMatrix<f64>,
    solution: &mut DVector<f64>,
    rhs: &mut DVector<f64>,
) {
    if values.is_empty() {
        return;
    }
    let n = matrix.nrows();
    let fallback = average_diagonal(matrix);
    let (offsets, columns, entries) = matrix.csr_data_mut();

    for (&dof, &g) in values {
        let mut diagonal = 0.0;
        for idx in offsets[dof]..offsets[dof + 1] {
            if columns[idx] == dof {
                if entries[idx] == 0.0 {
                    entries[idx] = fallback;
                }
                diagonal = entries[idx];
            } else {
                entries[idx] = 0.0;
            }
        }
        debug_assert!(diagonal != 0.0, "row {dof} has no diagonal entry");
        rhs[dof] = diagonal * g;
        solution[dof] = g;
    }

    for row in 0..n {
        if values.contains_key(&row) {
            continue;
        }
        for idx in offsets[row]..offsets[row + 1] {
            if let Some(&g) = values.get(&columns[idx]) {
                rhs[row] -= entries[idx] * g;
                entries[idx] = 0.0;
            }
        }
    }
}

fn average_diagonal(matrix: &CsrMatrix<f64>) -> f64 {
    let (sum, count) = matrix
        .triplet_iter()
        .filter(|&(i, j, v)| i == j && *v != 0.0)
        .fold((0.0, 0usize), |(s, c), (_, _, v)| (s + v.abs(), c + 1));
    if count == 0 { 1.0 } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::sparse::dense_of;
    use nalgebra::DMatrix;

    fn tridiagonal(n: usize) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 2.0);
            if i > 0 {
                coo.push(i, i - 1, -1.0);
            }
            if i + 1 < n {
                coo.push(i, i + 1, -1.0);
            }
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn close_resolves_chains() {
        let mut constraints = ConstraintSet::new();
        constraints.add_entry(1, 2, 0.5);
        constraints.add_entry(1, 0, 0.5);
        constraints.add_entry(2, 3, 1.0);
        constraints.set_inhomogeneity(2, 2.0);
        constraints.close();

        let line = constraints.lines().find(|l| l.dof == 1).unwrap();
        assert_eq!(line.entries, vec![(0, 0.5), (3, 0.5)]);
        assert_eq!(line.inhomogeneity, 1.0);
    }

    #[test]
    fn distribute_sets_constrained_entries() {
        let mut constraints = ConstraintSet::new();
        constraints.add_entry(1, 0, 0.5);
        constraints.add_entry(1, 2, 0.5);
        constraints.close();
        let mut x = DVector::from_vec(vec![1.0, 100.0, 3.0]);
        constraints.distribute(&mut x);
        assert_eq!(x[1], 2.0);
    }

    #[test]
    fn condensed_solve_matches_reduced_system() {
        // x_1 = (x_0 + x_2) / 2 on a 4x4 tridiagonal system.
        let mut constraints = ConstraintSet::new();
        constraints.add_entry(1, 0, 0.5);
        constraints.add_entry(1, 2, 0.5);
        constraints.close();

        let mut matrix = tridiagonal(4);
        let mut rhs = DVector::from_vec(vec![1.0, 1.0, 1.0, 1.0]);
        constraints.condense(&mut matrix, &mut rhs);

        let dense = dense_of(&matrix);
        let mut x = dense.lu().solve(&rhs).unwrap();
        constraints.distribute(&mut x);

        // Reference: substitute C explicitly.
        let c = DMatrix::from_row_slice(4, 3, &[
            1.0, 0.0, 0.0, //
            0.5, 0.5, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ]);
        let a = dense_of(&tridiagonal(4));
        let b = DVector::from_vec(vec![1.0, 1.0, 1.0, 1.0]);
        let reduced = c.transpose() * &a * &c;
        let y = reduced.lu().solve(&(c.transpose() * b)).unwrap();
        let expected = &c * y;
        assert!((x - expected).amax() < 1e-12);
    }

    #[test]
    fn boundary_values_are_imposed_symmetrically() {
        let mut matrix = tridiagonal(5);
        let mut rhs = DVector::zeros(5);
        let mut solution = DVector::zeros(5);
        let values = BTreeMap::from([(0, 1.0), (4, 3.0)]);
        apply_boundary_values(&values, &mut matrix, &mut solution, &mut rhs);

        let dense = dense_of(&matrix);
        assert_eq!(dense, dense.transpose());
        assert_eq!(solution[0], 1.0);
        let x = dense.lu().solve(&rhs).unwrap();
        // Linear interpolation between the two boundary values.
        for (i, xi) in x.iter().enumerate() {
            assert!((xi - (1.0 + 0.5 * i as f64)).abs() < 1e-12);
        }
        let residual = (&matrix * &x) - rhs;
        assert!(residual.amax() < 1e-12);
    }
}

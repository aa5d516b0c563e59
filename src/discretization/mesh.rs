use thiserror::Error;

/// Index of a cell in a [`Mesh`]. Ids are renumbered by
/// [`Mesh::execute_coarsening_and_refinement`].
pub type CellId = usize;

/// Tag of a boundary point of the interval.
pub type BoundaryId = u32;

pub const LEFT_BOUNDARY: BoundaryId = 0;
pub const RIGHT_BOUNDARY: BoundaryId = 1;

#[derive(Debug, Error, PartialEq)]
pub enum MeshError {
    #[error("a mesh needs at least one cell")]
    Empty,
    #[error("cell [{left}, {right}] has non-positive length")]
    Degenerate { left: f64, right: f64 },
    #[error("cell {index} starts at {left} but its predecessor ends at {previous_right}")]
    NotContiguous {
        index: usize,
        left: f64,
        previous_right: f64,
    },
}

/// An interval of the refinement hierarchy. Active cells are the leaves.
#[derive(Clone, Debug)]
pub struct Cell {
    pub left: f64,
    pub right: f64,
    pub level: u32,
    pub parent: Option<CellId>,
    pub children: Option<[CellId; 2]>,
    refine_flag: bool,
    coarsen_flag: bool,
}

impl Cell {
    fn new(left: f64, right: f64, level: u32, parent: Option<CellId>) -> Self {
        Self {
            left,
            right,
            level,
            parent,
            children: None,
            refine_flag: false,
            coarsen_flag: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.children.is_none()
    }

    pub fn diameter(&self) -> f64 {
        self.right - self.left
    }

    pub fn center(&self) -> f64 {
        0.5 * (self.left + self.right)
    }

    pub fn refine_flag_set(&self) -> bool {
        self.refine_flag
    }

    pub fn coarsen_flag_set(&self) -> bool {
        self.coarsen_flag
    }
}

/// The complete computational grid: a row of coarse intervals, each the root
/// of a binary refinement tree. Roots are ordered left to right and touch.
#[derive(Clone, Debug)]
pub struct Mesh {
    cells: Vec<Cell>,
    roots: Vec<CellId>,
}

impl Mesh {
    /// Single coarse cell spanning `[left, right]`.
    pub fn interval(left: f64, right: f64) -> Result<Self, MeshError> {
        Self::from_cells(&[(left, right, 0)])
    }

    /// Rebuild a mesh from its active cells, given as `(left, right, level)`
    /// in ascending order. Each becomes a root that keeps its level.
    pub fn from_cells(cells: &[(f64, f64, u32)]) -> Result<Self, MeshError> {
        if cells.is_empty() {
            return Err(MeshError::Empty);
        }
        let mut arena = Vec::with_capacity(cells.len());
        for (index, &(left, right, level)) in cells.iter().enumerate() {
            if !(right > left) {
                return Err(MeshError::Degenerate { left, right });
            }
            if let Some(previous) = arena.last().map(|c: &Cell| c.right) {
                if left != previous {
                    return Err(MeshError::NotContiguous {
                        index,
                        left,
                        previous_right: previous,
                    });
                }
            }
            arena.push(Cell::new(left, right, level, None));
        }
        let roots = (0..arena.len()).collect();
        Ok(Self {
            cells: arena,
            roots,
        })
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    /// Leaves of the hierarchy, ordered left to right.
    pub fn active_cells(&self) -> Vec<CellId> {
        let mut active = Vec::new();
        let mut stack: Vec<CellId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            match self.cells[id].children {
                Some([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => active.push(id),
            }
        }
        active
    }

    pub fn n_active_cells(&self) -> usize {
        self.active_cells().len()
    }

    /// Vertices of the active cells, ordered left to right.
    pub fn vertices(&self) -> Vec<f64> {
        let active = self.active_cells();
        let mut vertices: Vec<f64> = active.iter().map(|&id| self.cells[id].left).collect();
        if let Some(&last) = active.last() {
            vertices.push(self.cells[last].right);
        }
        vertices
    }

    pub fn bounds(&self) -> (f64, f64) {
        let first = self.roots[0];
        let last = self.roots[self.roots.len() - 1];
        (self.cells[first].left, self.cells[last].right)
    }

    pub fn boundary_ids(&self) -> [BoundaryId; 2] {
        [LEFT_BOUNDARY, RIGHT_BOUNDARY]
    }

    pub fn max_active_level(&self) -> u32 {
        self.active_cells()
            .into_iter()
            .map(|id| self.cells[id].level)
            .max()
            .unwrap_or(0)
    }

    /// Smallest and largest active cell diameter.
    pub fn diameter_range(&self) -> (f64, f64) {
        self.active_cells()
            .into_iter()
            .map(|id| self.cells[id].diameter())
            .fold((f64::INFINITY, 0.0), |(lo, hi), h| (lo.min(h), hi.max(h)))
    }

    /// Rigid translation of every cell.
    pub fn shift(&mut self, dx: f64) {
        for cell in &mut self.cells {
            cell.left += dx;
            cell.right += dx;
        }
    }

    pub fn set_refine_flag(&mut self, id: CellId) {
        debug_assert!(self.cells[id].is_active());
        self.cells[id].refine_flag = true;
    }

    pub fn set_coarsen_flag(&mut self, id: CellId) {
        debug_assert!(self.cells[id].is_active());
        self.cells[id].coarsen_flag = true;
    }

    pub fn clear_flags(&mut self) {
        for cell in &mut self.cells {
            cell.refine_flag = false;
            cell.coarsen_flag = false;
        }
    }

    /// Parents that coarsening would turn back into active cells: both
    /// children are active, flagged for coarsening and not for refinement.
    pub fn coarsenable_parents(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(id, cell)| {
                let [a, b] = cell.children?;
                let pair = [&self.cells[a], &self.cells[b]];
                pair.iter()
                    .all(|c| c.is_active() && c.coarsen_flag && !c.refine_flag)
                    .then_some(id)
            })
            .collect()
    }

    /// Refine every active cell `times` times.
    pub fn refine_global(&mut self, times: u32) {
        for _ in 0..times {
            for id in self.active_cells() {
                self.cells[id].refine_flag = true;
            }
            self.execute_coarsening_and_refinement();
        }
    }

    /// Refine the cells touching the given boundaries, `cycles` times.
    pub fn refine_near_boundaries(&mut self, boundaries: &[BoundaryId], cycles: u32) {
        for _ in 0..cycles {
            let active = self.active_cells();
            if boundaries.contains(&LEFT_BOUNDARY) {
                self.cells[active[0]].refine_flag = true;
            }
            if boundaries.contains(&RIGHT_BOUNDARY) {
                self.cells[active[active.len() - 1]].refine_flag = true;
            }
            self.execute_coarsening_and_refinement();
        }
    }

    /// Apply the pending flags. Coarsening happens only for complete sibling
    /// pairs, after which every flag is cleared and ids are renumbered.
    pub fn execute_coarsening_and_refinement(&mut self) {
        for parent in self.coarsenable_parents() {
            self.cells[parent].children = None;
        }

        let flagged: Vec<CellId> = self
            .active_cells()
            .into_iter()
            .filter(|&id| self.cells[id].refine_flag)
            .collect();
        for id in flagged {
            self.split(id);
        }

        self.clear_flags();
        self.compact();
    }

    fn split(&mut self, id: CellId) {
        let (left, right, level) = {
            let cell = &self.cells[id];
            (cell.left, cell.right, cell.level)
        };
        let mid = 0.5 * (left + right);
        let first = self.cells.len();
        self.cells.push(Cell::new(left, mid, level + 1, Some(id)));
        self.cells.push(Cell::new(mid, right, level + 1, Some(id)));
        self.cells[id].children = Some([first, first + 1]);
    }

    /// Drop cells orphaned by coarsening and renumber depth first.
    fn compact(&mut self) {
        let mut cells = Vec::with_capacity(self.cells.len());
        let mut roots = Vec::with_capacity(self.roots.len());
        for &root in &self.roots {
            roots.push(self.copy_subtree(root, None, &mut cells));
        }
        self.cells = cells;
        self.roots = roots;
    }

    fn copy_subtree(&self, id: CellId, parent: Option<CellId>, out: &mut Vec<Cell>) -> CellId {
        let old = &self.cells[id];
        let new_id = out.len();
        out.push(Cell {
            parent,
            children: None,
            ..old.clone()
        });
        if let Some([a, b]) = old.children {
            let first = self.copy_subtree(a, Some(new_id), out);
            let second = self.copy_subtree(b, Some(new_id), out);
            out[new_id].children = Some([first, second]);
        }
        new_id
    }
}

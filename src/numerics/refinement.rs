//! Error indicators, cell flagging and the refinement schedule.

use log::debug;
use nalgebra::DVector;

use crate::config::AdaptiveRefinementParams;
use crate::discretization::dofs::DofMap;
use crate::discretization::mesh::Mesh;
use crate::physics::functions::{ExtrapolatedField, FieldError, FieldFunction};

/// One non-negative indicator per active cell.
pub trait ErrorEstimator {
    fn estimate(&self, mesh: &Mesh, dofs: &DofMap, solution: &DVector<f64>) -> Vec<f64>;
}

/// Gradient-jump indicator: every interior vertex contributes
/// `h/24 · (α [∂u/∂x])²` to both neighbouring cells.
#[derive(Debug)]
pub struct KellyEstimator {
    diffusivity: FieldFunction,
}

impl KellyEstimator {
    pub fn new(diffusivity: FieldFunction) -> Self {
        Self { diffusivity }
    }
}

impl Default for KellyEstimator {
    fn default() -> Self {
        Self::new(1.0.into())
    }
}

impl ErrorEstimator for KellyEstimator {
    fn estimate(&self, _mesh: &Mesh, dofs: &DofMap, solution: &DVector<f64>) -> Vec<f64> {
        let x = dofs.support_points();
        let n_cells = dofs.n_cells();
        let slope = |k: usize| (solution[k + 1] - solution[k]) / (x[k + 1] - x[k]);

        let mut squared = vec![0.0; n_cells];
        for vertex in 1..n_cells {
            let jump = self.diffusivity.value(x[vertex]) * (slope(vertex) - slope(vertex - 1));
            let jump2 = jump * jump;
            squared[vertex - 1] += (x[vertex] - x[vertex - 1]) / 24.0 * jump2;
            squared[vertex] += (x[vertex + 1] - x[vertex]) / 24.0 * jump2;
        }
        squared.into_iter().map(f64::sqrt).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagCounts {
    pub refine: usize,
    pub coarsen: usize,
}

/// Result of one refinement cycle.
#[derive(Debug)]
pub struct RefinedField {
    pub dofs: DofMap,
    pub field: DVector<f64>,
    pub flags: FlagCounts,
}

/// Fixed-fraction flagging with a level cap and a cell budget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefinementPolicy {
    pub max_level: u32,
    pub max_cells: usize,
    pub refine_fraction: f64,
    pub coarsen_fraction: f64,
}

impl RefinementPolicy {
    pub fn from_params(params: &AdaptiveRefinementParams) -> Self {
        Self {
            max_level: params.max_level,
            max_cells: params.max_cells,
            refine_fraction: params.refine_fraction,
            coarsen_fraction: params.coarsen_fraction,
        }
    }

    /// Flag the `refine_fraction` largest and `coarsen_fraction` smallest
    /// indicators.
    ///
    /// Cells already at `max_level` drop out of the refine set without being
    /// replaced. If the result would exceed `max_cells`, the lowest ranked
    /// refine flags are removed first.
    pub fn flag(&self, mesh: &mut Mesh, dofs: &DofMap, indicators: &[f64]) -> FlagCounts {
        let n = indicators.len();
        debug_assert_eq!(n, dofs.n_cells());
        mesh.clear_flags();

        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by(|&a, &b| indicators[b].total_cmp(&indicators[a]));

        let n_refine = ((self.refine_fraction * n as f64).floor() as usize).min(n);
        let n_coarsen = ((self.coarsen_fraction * n as f64).floor() as usize).min(n - n_refine);
        let cells = dofs.cell_ids();

        let mut refine: Vec<usize> = ranked[..n_refine]
            .iter()
            .copied()
            .filter(|&k| mesh.cell(cells[k]).level < self.max_level)
            .collect();
        let coarsen = &ranked[n - n_coarsen..];

        for &k in coarsen {
            mesh.set_coarsen_flag(cells[k]);
        }
        let merged = mesh.coarsenable_parents().len();
        while !refine.is_empty() && n + refine.len() > self.max_cells + merged {
            refine.pop();
        }
        for &k in &refine {
            mesh.set_refine_flag(cells[k]);
        }

        debug!(
            "Flagged {} of {} cells for refinement, {} for coarsening",
            refine.len(),
            n,
            coarsen.len()
        );
        FlagCounts {
            refine: refine.len(),
            coarsen: coarsen.len(),
        }
    }

    /// Flag, adapt the mesh and carry `field` over to the new cells.
    pub fn apply(
        &self,
        mesh: &mut Mesh,
        dofs: &DofMap,
        indicators: &[f64],
        field: &DVector<f64>,
    ) -> Result<RefinedField, FieldError> {
        let flags = self.flag(mesh, dofs, indicators);
        let interpolant = ExtrapolatedField::from_dofs(dofs, field)?;
        mesh.execute_coarsening_and_refinement();
        let dofs = DofMap::distribute(mesh);
        let field = dofs.interpolate(|x| interpolant.value(x));
        Ok(RefinedField { dofs, field, flags })
    }
}

/// When refinement happens during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefinementSchedule {
    pub initial_cycles: u32,
    pub interval: u32,
    pub cycles_at_interval: u32,
    cycles_completed: u32,
}

impl RefinementSchedule {
    pub fn new(initial_cycles: u32, interval: u32, cycles_at_interval: u32) -> Self {
        Self {
            initial_cycles,
            interval,
            cycles_at_interval,
            cycles_completed: 0,
        }
    }

    pub fn from_params(params: &AdaptiveRefinementParams) -> Self {
        Self::new(
            params.initial_cycles,
            params.interval,
            params.cycles_at_interval,
        )
    }

    /// Pre-refinement is checked after the first step of every attempt.
    pub fn pre_refinement_due(&self, step_index: u32) -> bool {
        step_index == 1 && self.cycles_completed < self.initial_cycles
    }

    pub fn complete_pre_refinement_cycle(&mut self) {
        self.cycles_completed += 1;
    }

    pub fn cycles_completed(&self) -> u32 {
        self.cycles_completed
    }

    pub fn periodic_due(&self, step_index: u32) -> bool {
        self.interval > 0 && step_index > 0 && step_index % self.interval == 0
    }
}

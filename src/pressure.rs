use crate::pcg::{psolve, solve, PcgWorkspace, Preconditioner, SolveParams, SolveReport};
use crate::sparse::{LinearOperator, SparseMatrix, SparseMatrixBuilder};
use crate::{GridField, Lattice, MacGrid};

/// MIC(0) factor of a symmetric matrix whose off-diagonal entries couple
/// lattice axis neighbours, swept in flat index order.
///
/// Returns one scalar per row (the inverse square root of the modified
/// pivot). Rows with an empty diagonal get `0` and drop out of the sweeps.
pub fn mic0_factor(matrix: &SparseMatrix, tuning: f64, safety: f64) -> Vec<f64> {
    let n = matrix.dim();
    let mut precon = vec![0.0; n];
    for index in 0..n {
        let diag = matrix.get(index, index);
        if diag == 0.0 {
            continue;
        }
        let mut e = diag;
        for (lower, coupling) in matrix.row(index).filter(|(col, _)| *col < index) {
            let p = precon[lower];
            // entries of the lower neighbour's row reaching past it, except toward us
            let fill: f64 = matrix
                .row(lower)
                .filter(|(col, _)| *col > lower && *col != index)
                .map(|(_, value)| value)
                .sum();
            e -= (coupling * p) * (coupling * p);
            e -= tuning * coupling * fill * p * p;
        }
        if e < safety * diag {
            e = diag;
        }
        precon[index] = 1.0 / e.sqrt();
    }
    precon
}

/// Applies a [`mic0_factor`] result: forward elimination, then back substitution.
#[derive(Clone, Copy, Debug)]
pub struct ModifiedIncompleteCholesky<'a> {
    matrix: &'a SparseMatrix,
    precon: &'a [f64],
}

impl<'a> ModifiedIncompleteCholesky<'a> {
    pub fn new(matrix: &'a SparseMatrix, precon: &'a [f64]) -> Self {
        assert_eq!(matrix.dim(), precon.len(), "preconditioner size mismatch");
        Self { matrix, precon }
    }
}

impl Preconditioner for ModifiedIncompleteCholesky<'_> {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        let n = self.precon.len();
        for index in 0..n {
            let p = self.precon[index];
            if p == 0.0 {
                z[index] = 0.0;
                continue;
            }
            let mut t = r[index];
            for (lower, value) in self.matrix.row(index).filter(|(col, _)| *col < index) {
                t -= value * self.precon[lower] * z[lower];
            }
            z[index] = t * p;
        }
        for index in (0..n).rev() {
            let p = self.precon[index];
            if p == 0.0 {
                continue;
            }
            let mut t = z[index];
            for (upper, value) in self.matrix.row(index).filter(|(col, _)| *col > index) {
                t -= value * p * z[upper];
            }
            z[index] = t * p;
        }
    }
}

/// Pressure Poisson system for one projection: `A p = b` over the cell lattice.
#[derive(Clone, Debug)]
pub struct PressureSystem<const D: usize> {
    lattice: Lattice<D>,
    matrix: SparseMatrix,
    rhs: Vec<f64>,
    precon: Vec<f64>,
    pressure: Vec<f64>,
    workspace: PcgWorkspace,
}

impl<const D: usize> PressureSystem<D> {
    pub fn new(lattice: Lattice<D>) -> Self {
        let n = lattice.size();
        Self {
            lattice,
            matrix: SparseMatrix::default(),
            rhs: vec![0.0; n],
            precon: Vec::new(),
            pressure: vec![0.0; n],
            workspace: PcgWorkspace::new(n),
        }
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    pub fn precon(&self) -> &[f64] {
        &self.precon
    }

    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    /// Rebuilds `A` from the grid's current solid mask. Solid cells keep
    /// their index but get an empty row.
    pub fn construct_a(&mut self, grid: &MacGrid<D>) {
        let lattice = self.lattice;
        let mut builder =
            SparseMatrixBuilder::with_capacity(lattice.size(), lattice.size() * (2 * D + 1));
        let mut entries = Vec::with_capacity(2 * D + 1);
        for index in 0..lattice.size() {
            let cell = lattice.coords(index).map(|c| c as i32);
            if grid.is_solid_cell(cell) {
                builder.push_empty_row();
                continue;
            }
            entries.clear();
            entries.push((index, grid.pressure_coeff_between_cells(cell, cell)));
            for axis in 0..D {
                for step in [-1, 1] {
                    let mut other = cell;
                    other[axis] += step;
                    if let Some(neighbor) = lattice.index_of(other) {
                        entries.push((neighbor, grid.pressure_coeff_between_cells(cell, other)));
                    }
                }
            }
            builder.push_row(entries.iter().copied());
        }
        self.matrix = builder.build();
        debug_assert!(self.matrix.is_symmetric(0.0), "pressure matrix lost symmetry");
    }

    /// `b = -div * rho * dx^2 / dt` on fluid cells, zero on solids.
    pub fn construct_b(&mut self, grid: &MacGrid<D>, dt: f64, fluid_density: f64) {
        let lattice = self.lattice;
        let scale = -fluid_density * grid.dx() * grid.dx() / dt;
        self.rhs.resize(lattice.size(), 0.0);
        for (index, value) in self.rhs.iter_mut().enumerate() {
            let cell = lattice.coords(index);
            *value = if grid.is_solid_cell(cell.map(|c| c as i32)) {
                0.0
            } else {
                scale * grid.get_divergence(cell)
            };
        }
    }

    pub fn construct_precon(&mut self, tuning: f64, safety: f64) {
        self.precon = mic0_factor(&self.matrix, tuning, safety);
    }

    /// Solves for pressure with MIC(0)-PCG, or plain CG when `preconditioned`
    /// is false. The preconditioner must have been built for the current `A`.
    pub fn solve(&mut self, params: SolveParams, preconditioned: bool) -> SolveReport {
        self.pressure.resize(self.lattice.size(), 0.0);
        if preconditioned {
            let mic = ModifiedIncompleteCholesky::new(&self.matrix, &self.precon);
            psolve(
                &self.matrix,
                &mic,
                &self.rhs,
                &mut self.pressure,
                params,
                &mut self.workspace,
            )
        } else {
            solve(
                &self.matrix,
                &self.rhs,
                &mut self.pressure,
                params,
                &mut self.workspace,
            )
        }
    }

    /// Writes the projected velocity into `out`:
    /// `u - dt / (rho * dx) * grad p` on open faces, zero on solid faces.
    pub fn apply_pressure_gradient(
        &self,
        grid: &MacGrid<D>,
        dt: f64,
        fluid_density: f64,
        out: &mut [GridField<D>; D],
    ) {
        let scale = dt / (fluid_density * grid.dx());
        let lattice = self.lattice;
        let pressure = &self.pressure;
        for (axis, target) in out.iter_mut().enumerate() {
            let velocity = grid.velocity_field(axis);
            debug_assert_eq!(target.lattice(), velocity.lattice(), "face lattice mismatch");
            target.fill_with_index(|face| {
                let coords = face.map(|c| c as i32);
                if grid.is_solid_face(axis, coords) {
                    return 0.0;
                }
                let hi = lattice.idx(face);
                let mut below = face;
                below[axis] -= 1;
                let lo = lattice.idx(below);
                velocity.get(face) - scale * (pressure[hi] - pressure[lo])
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CellType, Obstacle, SimConfig};

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    fn dirichlet_laplacian(n: usize) -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new(n * n);
        for j in 0..n {
            for i in 0..n {
                let row = i + n * j;
                let mut entries = vec![(row, 4.0)];
                if i > 0 {
                    entries.push((row - 1, -1.0));
                }
                if i + 1 < n {
                    entries.push((row + 1, -1.0));
                }
                if j > 0 {
                    entries.push((row - n, -1.0));
                }
                if j + 1 < n {
                    entries.push((row + n, -1.0));
                }
                builder.push_row(entries);
            }
        }
        builder.build()
    }

    fn grid_with_bar(n: usize) -> MacGrid<2> {
        let mut config = SimConfig::with_resolution(&[n, n]);
        config.cell_size = 1.0;
        config.obstacles.push(Obstacle::Box {
            min: vec![2, n / 2],
            max: vec![n - 3, n / 2],
        });
        MacGrid::new(&config).unwrap()
    }

    #[test]
    fn mic_factor_of_diagonal_matrix_is_inverse_sqrt() {
        let mut builder = SparseMatrixBuilder::new(3);
        builder.push_row([(0, 4.0)]);
        builder.push_empty_row();
        builder.push_row([(2, 9.0)]);
        let precon = mic0_factor(&builder.build(), 0.97, 0.25);
        assert_close(precon[0], 0.5, 1e-12);
        assert_eq!(precon[1], 0.0);
        assert_close(precon[2], 1.0 / 3.0, 1e-12);
    }

    #[test]
    fn cell_marked_solid_after_construction_drops_out_of_a() {
        let mut config = SimConfig::with_resolution(&[6, 6]);
        config.cell_size = 1.0;
        let mut grid: MacGrid<2> = MacGrid::new(&config).unwrap();
        grid.solid_mask_mut().set([3, 2], CellType::Solid);
        let mut system = PressureSystem::new(grid.cell_lattice());
        system.construct_a(&grid);
        let lattice = grid.cell_lattice();
        let (solid, fluid) = (lattice.idx([3, 2]), lattice.idx([2, 2]));
        assert_eq!(system.matrix().row(solid).count(), 0);
        assert_close(system.matrix().get(fluid, fluid), 3.0, 1e-12);
        assert_eq!(system.matrix().get(fluid, solid), 0.0);
        assert!(system.matrix().is_symmetric(1e-12));
    }

    #[test]
    fn pcg_matches_cg_in_fewer_iterations() {
        let a = dirichlet_laplacian(8);
        let b: Vec<f64> = (0..64).map(|i| (i as f64 * 0.37).sin()).collect();
        let params = SolveParams {
            max_iterations: 500,
            tolerance: 1e-10,
        };
        let mut ws = PcgWorkspace::default();
        let mut plain = vec![0.0; 64];
        let cg = solve(&a, &b, &mut plain, params, &mut ws);
        let precon = mic0_factor(&a, 0.97, 0.25);
        let mut pre = vec![0.0; 64];
        let pcg = psolve(
            &a,
            &ModifiedIncompleteCholesky::new(&a, &precon),
            &b,
            &mut pre,
            params,
            &mut ws,
        );
        assert!(cg.converged && pcg.converged);
        assert!(pcg.iterations <= cg.iterations, "{pcg:?} vs {cg:?}");
        for (p, q) in plain.iter().zip(pre.iter()) {
            assert_close(*p, *q, 1e-8);
        }
    }

    #[test]
    fn assembled_matrix_follows_coefficient_rule() {
        let grid = grid_with_bar(8);
        let mut system = PressureSystem::new(grid.cell_lattice());
        system.construct_a(&grid);
        let a = system.matrix();
        assert!(a.is_symmetric(0.0));
        let lattice = grid.cell_lattice();
        for index in 0..lattice.size() {
            let cell = lattice.coords(index).map(|c| c as i32);
            if grid.is_solid_cell(cell) {
                assert_eq!(a.row(index).count(), 0);
                continue;
            }
            let expected = 4.0 - grid.solid_neighbor_count(cell) as f64;
            assert_close(a.get(index, index), expected, 0.0);
            // rows sum to zero: the operator annihilates constants
            let row_sum: f64 = a.row(index).map(|(_, v)| v).sum();
            assert_close(row_sum, 0.0, 1e-12);
        }
    }

    #[test]
    fn rhs_is_scaled_negative_divergence() {
        let mut grid = grid_with_bar(6);
        grid.velocity_field_mut(0).set([2, 1], 1.0);
        let mut system = PressureSystem::new(grid.cell_lattice());
        system.construct_b(&grid, 0.5, 2.0);
        let lattice = grid.cell_lattice();
        // outflow from [1, 1], inflow into [2, 1]
        assert_close(system.rhs()[lattice.idx([1, 1])], -4.0, 1e-12);
        assert_close(system.rhs()[lattice.idx([2, 1])], 4.0, 1e-12);
        assert_close(system.rhs().iter().sum::<f64>(), 0.0, 1e-12);
    }

    #[test]
    fn projection_removes_divergence_around_obstacle() {
        let mut grid = grid_with_bar(12);
        let lattice = grid.face_lattice(1);
        grid.velocity_field_mut(1)
            .fill_with_index(|c| (lattice.index_position(c)[0] * 0.7).sin() + 0.5);
        let mut system = PressureSystem::new(grid.cell_lattice());
        system.construct_a(&grid);
        system.construct_b(&grid, 0.1, 1.0);
        system.construct_precon(0.97, 0.25);
        let report = system.solve(
            SolveParams {
                max_iterations: 300,
                tolerance: 1e-9,
            },
            true,
        );
        assert!(report.converged, "{report:?}");

        let mut out: [GridField<2>; 2] =
            std::array::from_fn(|axis| GridField::new(grid.face_lattice(axis), 0.0));
        system.apply_pressure_gradient(&grid, 0.1, 1.0, &mut out);
        for (axis, field) in out.iter_mut().enumerate() {
            std::mem::swap(grid.velocity_field_mut(axis), field);
        }
        assert!(grid.max_divergence() < 1e-6, "{}", grid.max_divergence());
        assert!(grid.check_divergence());
    }

    #[test]
    fn solve_without_preconditioner_uses_plain_cg() {
        let mut grid = grid_with_bar(6);
        grid.velocity_field_mut(0).set([3, 1], -1.0);
        let mut system = PressureSystem::new(grid.cell_lattice());
        system.construct_a(&grid);
        system.construct_b(&grid, 1.0, 1.0);
        let report = system.solve(
            SolveParams {
                max_iterations: 200,
                tolerance: 1e-10,
            },
            false,
        );
        assert!(report.converged);
        let mut ap = vec![0.0; system.rhs().len()];
        system.matrix().apply(system.pressure(), &mut ap);
        for (l, r) in ap.iter().zip(system.rhs().iter()) {
            assert_close(*l, *r, 1e-8);
        }
    }
}

use crate::field::should_parallel;
use crate::pcg::{SolveParams, SolveReport};
use crate::pressure::PressureSystem;
use crate::{CellVectorField, ConfigError, GridField, MacGrid, PressureConfig, SimConfig, Vector};
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub pressure: SolveReport,
    /// Largest |divergence| over fluid cells right after projection.
    pub max_divergence: f64,
}

/// Advances a [`MacGrid`] one frame at a time.
///
/// Owns the ping-pong buffers: every phase writes into scratch fields that
/// are then swapped with the grid's, so reads always see the previous state.
#[derive(Clone, Debug)]
pub struct Solver<const D: usize> {
    dt: f64,
    fluid_density: f64,
    pressure_config: PressureConfig,
    velocity_scratch: [GridField<D>; D],
    scalar_scratch: GridField<D>,
    forces: CellVectorField<D>,
    pressure: PressureSystem<D>,
}

impl<const D: usize> Solver<D> {
    pub fn new(grid: &MacGrid<D>, config: &SimConfig) -> Self {
        let cells = grid.cell_lattice();
        Self {
            dt: config.dt,
            fluid_density: config.fluid_density,
            pressure_config: config.pressure.clone(),
            velocity_scratch: std::array::from_fn(|axis| {
                GridField::new(grid.face_lattice(axis), 0.0)
            }),
            scalar_scratch: GridField::new(cells, 0.0),
            forces: CellVectorField::new(cells, Vector::zero()),
            pressure: PressureSystem::new(cells),
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn pressure_system(&self) -> &PressureSystem<D> {
        &self.pressure
    }

    /// One full step: advect velocity, add forces, project, then advect
    /// temperature and density through the divergence-free field.
    pub fn solve(&mut self, grid: &mut MacGrid<D>) -> StepReport {
        self.advect_velocity(grid);
        self.add_external_forces(grid);
        let pressure = self.project(grid);
        let max_divergence = grid.max_divergence();
        self.advect_temperature(grid);
        self.advect_density(grid);
        log::debug!(
            "step: {} pressure iterations, residual {:e}, max divergence {:e}",
            pressure.iterations,
            pressure.residual,
            max_divergence
        );
        StepReport {
            pressure,
            max_divergence,
        }
    }

    pub fn advect_velocity(&mut self, grid: &mut MacGrid<D>) {
        let dt = self.dt;
        {
            let grid: &MacGrid<D> = grid;
            for (axis, target) in self.velocity_scratch.iter_mut().enumerate() {
                let lattice = grid.face_lattice(axis);
                target.fill_with_index(|face| {
                    let back = grid.trace_back(lattice.index_position(face), dt);
                    grid.velocity_component(axis, back)
                });
            }
        }
        self.swap_velocity(grid);
    }

    /// Boussinesq lift on up-axis faces plus vorticity confinement on every face.
    pub fn add_external_forces(&mut self, grid: &mut MacGrid<D>) {
        let dt = self.dt;
        let confine = grid.params().vorticity_strength != 0.0;
        if confine {
            self.compute_confinement(grid);
        }
        {
            let grid: &MacGrid<D> = grid;
            let forces = &self.forces;
            let up = grid.up_axis();
            let dims = grid.dims();
            for (axis, target) in self.velocity_scratch.iter_mut().enumerate() {
                let lattice = grid.face_lattice(axis);
                let velocity = grid.velocity_field(axis);
                let cell_force = forces.component(axis);
                target.fill_with_index(|face| {
                    let mut value = velocity.get(face);
                    if axis == up {
                        value += dt * grid.boussinesq_force(lattice.index_position(face));
                    }
                    if confine {
                        let mut below = face;
                        below[axis] = face[axis].saturating_sub(1);
                        let mut above = face;
                        above[axis] = face[axis].min(dims[axis] - 1);
                        value += dt * 0.5 * (cell_force.get(below) + cell_force.get(above));
                    }
                    value
                });
            }
        }
        self.swap_velocity(grid);
    }

    fn compute_confinement(&mut self, grid: &MacGrid<D>) {
        let lattice = grid.cell_lattice();
        let force_at = |index: usize| {
            grid.confinement_force(lattice.coords(index).map(|c| c as i32))
        };
        let values: Vec<Vector<D>> = if should_parallel(lattice.size()) {
            (0..lattice.size()).into_par_iter().map(force_at).collect()
        } else {
            (0..lattice.size()).map(force_at).collect()
        };
        self.forces.assign(&values);
    }

    /// Pressure projection; leaves the velocity discretely divergence-free
    /// up to the solver tolerance.
    pub fn project(&mut self, grid: &mut MacGrid<D>) -> SolveReport {
        let config = &self.pressure_config;
        self.pressure.construct_a(grid);
        self.pressure.construct_b(grid, self.dt, self.fluid_density);
        if config.preconditioned {
            self.pressure
                .construct_precon(config.mic_tuning, config.mic_safety);
        }
        let report = self.pressure.solve(
            SolveParams {
                max_iterations: config.max_iterations,
                tolerance: config.tolerance,
            },
            config.preconditioned,
        );
        self.pressure
            .apply_pressure_gradient(grid, self.dt, self.fluid_density, &mut self.velocity_scratch);
        self.swap_velocity(grid);
        report
    }

    pub fn advect_temperature(&mut self, grid: &mut MacGrid<D>) {
        self.advect_scalar(grid, |grid, point| grid.temperature(point));
        std::mem::swap(grid.temperature_field_mut(), &mut self.scalar_scratch);
    }

    pub fn advect_density(&mut self, grid: &mut MacGrid<D>) {
        self.advect_scalar(grid, |grid, point| grid.density(point));
        std::mem::swap(grid.density_field_mut(), &mut self.scalar_scratch);
    }

    fn advect_scalar(
        &mut self,
        grid: &MacGrid<D>,
        sample: impl Fn(&MacGrid<D>, Vector<D>) -> f64 + Sync,
    ) {
        let dt = self.dt;
        let lattice = grid.cell_lattice();
        self.scalar_scratch.fill_with_index(|cell| {
            let back = grid.trace_back(lattice.index_position(cell), dt);
            sample(grid, back)
        });
    }

    fn swap_velocity(&mut self, grid: &mut MacGrid<D>) {
        for (axis, scratch) in self.velocity_scratch.iter_mut().enumerate() {
            std::mem::swap(grid.velocity_field_mut(axis), scratch);
        }
    }
}

/// One simulation run: the grid plus the solver that steps it.
#[derive(Clone, Debug)]
pub struct Simulation<const D: usize> {
    config: SimConfig,
    grid: MacGrid<D>,
    solver: Solver<D>,
    frame: usize,
}

impl<const D: usize> Simulation<D> {
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let grid = MacGrid::new(&config)?;
        let solver = Solver::new(&grid, &config);
        Ok(Self {
            config,
            grid,
            solver,
            frame: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn grid(&self) -> &MacGrid<D> {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut MacGrid<D> {
        &mut self.grid
    }

    pub fn solver(&self) -> &Solver<D> {
        &self.solver
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Injects sources, then advances one step.
    pub fn step(&mut self) -> StepReport {
        self.grid.update_sources();
        let report = self.solver.solve(&mut self.grid);
        self.frame += 1;
        report
    }

    pub fn restart(&mut self) {
        self.grid.reset();
        self.frame = 0;
        log::info!("simulation restarted");
    }
}

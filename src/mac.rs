use crate::{ConfigError, GridField, Lattice, Obstacle, SimConfig, Vec3, Vector};

/// Divergence magnitude tolerated by the startup sanity check.
pub const DIVERGENCE_CHECK_TOL: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellType {
    Fluid,
    Solid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolidMask<const D: usize> {
    lattice: Lattice<D>,
    data: Vec<CellType>,
}

impl<const D: usize> SolidMask<D> {
    pub fn new(lattice: Lattice<D>, fill: CellType) -> Self {
        let data = vec![fill; lattice.size()];
        Self { lattice, data }
    }

    pub fn lattice(&self) -> Lattice<D> {
        self.lattice
    }

    pub fn set(&mut self, coords: [usize; D], value: CellType) {
        let index = self.lattice.idx(coords);
        self.data[index] = value;
    }

    pub fn at(&self, index: usize) -> CellType {
        self.data[index]
    }

    pub fn fill(&mut self, value: CellType) {
        self.data.fill(value);
    }

    pub fn fill_with_index(&mut self, f: impl Fn([usize; D], CellType) -> CellType) {
        let lattice = self.lattice;
        for (i, value) in self.data.iter_mut().enumerate() {
            *value = f(lattice.coords(i), *value);
        }
    }

    pub fn count_solid(&self) -> usize {
        self.data
            .iter()
            .filter(|cell| **cell == CellType::Solid)
            .count()
    }
}

/// Physical constants and source settings the grid needs every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MacParams<const D: usize> {
    pub ambient_temperature: f64,
    pub boussinesq_alpha: f64,
    pub boussinesq_beta: f64,
    pub vorticity_strength: f64,
    pub source_cell: [usize; D],
    pub source_velocity: f64,
    pub source_density: f64,
    pub source_temperature: f64,
}

fn offset<const D: usize>(coords: [i32; D], axis: usize, step: i32) -> [i32; D] {
    let mut out = coords;
    out[axis] += step;
    out
}

fn signed<const D: usize>(coords: [usize; D]) -> [i32; D] {
    coords.map(|c| c as i32)
}

/// Staggered (marker-and-cell) grid holding the smoke state.
///
/// Velocity component `a` lives on the faces normal to axis `a`; density,
/// temperature and the solid mask live at cell centres. Axis `D - 1` points up.
#[derive(Clone, Debug)]
pub struct MacGrid<const D: usize> {
    dims: [usize; D],
    dx: f64,
    params: MacParams<D>,
    obstacles: Vec<Obstacle>,
    velocity: [GridField<D>; D],
    density: GridField<D>,
    temperature: GridField<D>,
    solid: SolidMask<D>,
}

impl<const D: usize> MacGrid<D> {
    pub fn new(config: &SimConfig) -> Result<Self, ConfigError> {
        let dims = config.dims::<D>()?;
        let dx = config.cell_size;
        let cells = Lattice::cell_centered(dims, dx);
        let params = MacParams {
            ambient_temperature: config.ambient_temperature,
            boussinesq_alpha: config.boussinesq_alpha,
            boussinesq_beta: config.boussinesq_beta,
            vorticity_strength: config.vorticity_strength,
            source_cell: config.source_cell(dims),
            source_velocity: config.source.velocity,
            source_density: config.source.density,
            source_temperature: config.source.temperature,
        };
        let mut grid = Self {
            dims,
            dx,
            params,
            obstacles: config.obstacles.clone(),
            velocity: std::array::from_fn(|axis| {
                GridField::new(Lattice::face_centered(dims, dx, axis), 0.0)
            }),
            density: GridField::new(cells, 0.0),
            temperature: GridField::new(cells, config.ambient_temperature),
            solid: SolidMask::new(cells, CellType::Fluid),
        };
        grid.reset();
        grid.create_solids();
        assert!(
            grid.check_divergence(),
            "freshly constructed grid is not divergence-free"
        );
        log::info!(
            "MAC grid {:?} dx={} ready ({} solid cells)",
            dims,
            dx,
            grid.num_solid_cells()
        );
        Ok(grid)
    }

    pub fn dims(&self) -> [usize; D] {
        self.dims
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn params(&self) -> &MacParams<D> {
        &self.params
    }

    pub fn up_axis(&self) -> usize {
        D - 1
    }

    pub fn num_cells(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn cell_lattice(&self) -> Lattice<D> {
        self.density.lattice()
    }

    pub fn face_lattice(&self, axis: usize) -> Lattice<D> {
        self.velocity[axis].lattice()
    }

    pub fn velocity_field(&self, axis: usize) -> &GridField<D> {
        &self.velocity[axis]
    }

    pub fn velocity_field_mut(&mut self, axis: usize) -> &mut GridField<D> {
        &mut self.velocity[axis]
    }

    pub fn density_field(&self) -> &GridField<D> {
        &self.density
    }

    pub fn density_field_mut(&mut self) -> &mut GridField<D> {
        &mut self.density
    }

    pub fn temperature_field(&self) -> &GridField<D> {
        &self.temperature
    }

    pub fn temperature_field_mut(&mut self) -> &mut GridField<D> {
        &mut self.temperature
    }

    pub fn solid_mask(&self) -> &SolidMask<D> {
        &self.solid
    }

    pub fn solid_mask_mut(&mut self) -> &mut SolidMask<D> {
        &mut self.solid
    }

    /// Zero velocity and smoke, ambient temperature everywhere.
    pub fn reset(&mut self) {
        for component in &mut self.velocity {
            component.initialize(0.0);
        }
        self.density.initialize(0.0);
        self.temperature.initialize(self.params.ambient_temperature);
    }

    /// Rasterises the configured obstacles into the solid mask.
    pub fn create_solids(&mut self) {
        let dx = self.dx;
        let obstacles = &self.obstacles;
        self.solid.fill(CellType::Fluid);
        self.solid.fill_with_index(|coords, current| {
            let hit = obstacles.iter().any(|obstacle| match obstacle {
                Obstacle::Box { min, max } => {
                    (0..D).all(|a| min[a] <= coords[a] && coords[a] <= max[a])
                }
                Obstacle::Sphere { center, radius } => {
                    let dist_sq: f64 = (0..D)
                        .map(|a| {
                            let d = (coords[a] as f64 + 0.5) * dx - center[a];
                            d * d
                        })
                        .sum();
                    dist_sq <= radius * radius
                }
            });
            if hit {
                CellType::Solid
            } else {
                current
            }
        });
    }

    /// Injects heat, smoke and upward speed at the source cell.
    pub fn update_sources(&mut self) {
        let cell = self.params.source_cell;
        let up = self.up_axis();
        self.temperature.set(cell, self.params.source_temperature);
        self.density.set(cell, self.params.source_density);
        self.velocity[up].set(cell, self.params.source_velocity);
    }

    /// Flat cell index, `None` outside the grid.
    pub fn get_index(&self, coords: [i32; D]) -> Option<usize> {
        self.cell_lattice().index_of(coords)
    }

    pub fn get_cell(&self, index: usize) -> [usize; D] {
        self.cell_lattice().coords(index)
    }

    pub fn cell_center(&self, coords: [i32; D]) -> Vector<D> {
        Vector::new(std::array::from_fn(|a| (coords[a] as f64 + 0.5) * self.dx))
    }

    /// Centre of the lower face of `coords` normal to `axis`; the upper face
    /// is the lower face of the next cell along `axis`.
    pub fn face_center(&self, axis: usize, coords: [i32; D]) -> Vector<D> {
        let mut pos = self.cell_center(coords);
        pos[axis] -= 0.5 * self.dx;
        pos
    }

    /// Outside the grid counts as solid.
    pub fn is_solid_cell(&self, coords: [i32; D]) -> bool {
        match self.get_index(coords) {
            Some(index) => self.solid.at(index) == CellType::Solid,
            None => true,
        }
    }

    pub fn is_fluid_cell(&self, coords: [i32; D]) -> bool {
        !self.is_solid_cell(coords)
    }

    pub fn is_face(&self, axis: usize, coords: [i32; D]) -> bool {
        self.face_lattice(axis).contains(coords)
    }

    /// Face `coords` normal to `axis` lies on the outer wall or touches a solid.
    pub fn is_solid_face(&self, axis: usize, coords: [i32; D]) -> bool {
        if coords[axis] <= 0 || coords[axis] >= self.dims[axis] as i32 {
            return true;
        }
        self.is_solid_cell(coords) || self.is_solid_cell(offset(coords, axis, -1))
    }

    pub fn is_neighbor(&self, a: [i32; D], b: [i32; D]) -> bool {
        let mut differing = 0;
        for axis in 0..D {
            match (a[axis] - b[axis]).abs() {
                0 => {}
                1 => differing += 1,
                _ => return false,
            }
        }
        differing == 1
    }

    pub fn solid_neighbor_count(&self, coords: [i32; D]) -> usize {
        (0..D)
            .flat_map(|axis| [-1, 1].map(|step| offset(coords, axis, step)))
            .filter(|neighbor| self.is_solid_cell(*neighbor))
            .count()
    }

    /// Pressure matrix entry between two cells.
    ///
    /// The diagonal is `2*D` minus the solid neighbour count, a fluid axis
    /// neighbour couples with `-1`, anything else is `0`.
    pub fn pressure_coeff_between_cells(&self, cell: [i32; D], other: [i32; D]) -> f64 {
        if cell == other {
            return (2 * D - self.solid_neighbor_count(cell)) as f64;
        }
        if self.is_neighbor(cell, other) && !self.is_solid_cell(other) {
            return -1.0;
        }
        0.0
    }

    /// Net outflow per unit volume with every solid-adjacent face treated as closed.
    pub fn get_divergence(&self, coords: [usize; D]) -> f64 {
        let c = signed(coords);
        let mut div = 0.0;
        for axis in 0..D {
            let hi = if self.is_solid_cell(offset(c, axis, 1)) {
                0.0
            } else {
                let mut face = coords;
                face[axis] += 1;
                self.velocity[axis].get(face)
            };
            let lo = if self.is_solid_cell(offset(c, axis, -1)) {
                0.0
            } else {
                self.velocity[axis].get(coords)
            };
            div += hi - lo;
        }
        div / self.dx
    }

    /// Raw face divergence, no solid handling.
    pub fn check_divergence_at(&self, coords: [usize; D]) -> f64 {
        let mut div = 0.0;
        for axis in 0..D {
            let mut face = coords;
            face[axis] += 1;
            div += self.velocity[axis].get(face) - self.velocity[axis].get(coords);
        }
        div / self.dx
    }

    pub fn check_divergence(&self) -> bool {
        let lattice = self.cell_lattice();
        for index in 0..lattice.size() {
            let coords = lattice.coords(index);
            let div = self.check_divergence_at(coords);
            if div.abs() > DIVERGENCE_CHECK_TOL {
                log::warn!("divergence at {:?} = {:.4}", coords, div);
                return false;
            }
        }
        true
    }

    /// Largest |divergence| over fluid cells.
    pub fn max_divergence(&self) -> f64 {
        let lattice = self.cell_lattice();
        (0..lattice.size())
            .filter(|index| self.solid.at(*index) == CellType::Fluid)
            .map(|index| self.get_divergence(lattice.coords(index)).abs())
            .fold(0.0, f64::max)
    }

    pub fn num_solid_cells(&self) -> usize {
        self.solid.count_solid()
    }

    /// Cell containing a world-space point, unclamped.
    pub fn containing_cell(&self, point: Vector<D>) -> [i32; D] {
        self.cell_lattice().locate(point)
    }

    pub fn in_solid(&self, point: Vector<D>) -> bool {
        self.is_solid_cell(self.containing_cell(point))
    }

    pub fn velocity_component(&self, axis: usize, point: Vector<D>) -> f64 {
        self.velocity[axis].interpolate(point)
    }

    /// Interpolated velocity; zero inside solids and outside the grid.
    pub fn velocity(&self, point: Vector<D>) -> Vector<D> {
        if self.in_solid(point) {
            return Vector::zero();
        }
        self.face_velocity(point)
    }

    /// Interpolated face velocities without any solid masking.
    pub fn face_velocity(&self, point: Vector<D>) -> Vector<D> {
        Vector::new(std::array::from_fn(|axis| {
            self.velocity_component(axis, point)
        }))
    }

    pub fn density(&self, point: Vector<D>) -> f64 {
        self.density.interpolate(point)
    }

    pub fn temperature(&self, point: Vector<D>) -> f64 {
        self.temperature.interpolate(point)
    }

    pub fn render_color(&self, coords: [usize; D]) -> [f64; 4] {
        [1.0, 1.0, 1.0, self.density.get(coords)]
    }

    pub fn render_color_at(&self, point: Vector<D>) -> [f64; 4] {
        let value = self.density(point);
        [value; 4]
    }

    /// Semi-Lagrangian departure point of `point` over `dt`.
    ///
    /// The result is clamped into the domain. A departure point landing
    /// inside an obstacle is pulled back to where the ray enters it. When
    /// `point` itself sits in an obstacle cell the departure point is where
    /// the backward ray leaves that cell.
    pub fn trace_back(&self, point: Vector<D>, dt: f64) -> Vector<D> {
        let start = self.containing_cell(point);
        if self.cell_lattice().contains(start) && self.is_solid_cell(start) {
            return self.trace_out_of_solid(point, dt, start);
        }
        let vel = self.velocity(point);
        if vel == Vector::zero() {
            return self.clamp_to_domain(point);
        }
        let mut pos = self.clamp_to_domain(point.sub(vel.scale(dt)));
        let landing = self.containing_cell(pos);
        if self.cell_lattice().contains(landing) && self.is_solid_cell(landing) {
            if let Some(t) = self.intersects(point, vel.scale(-1.0), landing) {
                pos = point.sub(vel.scale(t.clamp(0.0, dt)));
            }
        }
        pos
    }

    fn trace_out_of_solid(&self, point: Vector<D>, dt: f64, cell: [i32; D]) -> Vector<D> {
        let vel = self.face_velocity(point);
        if vel == Vector::zero() {
            return self.clamp_to_domain(point);
        }
        let t = match self.intersects(point, vel.scale(-1.0), cell) {
            Some(t) => t,
            None => {
                log::warn!("backtrace from {:?} never leaves solid cell {:?}", point, cell);
                dt
            }
        };
        self.clamp_to_domain(point.sub(vel.scale(t)))
    }

    /// Ray/cell intersection with the slabs test; the ray is `pos + t * dir`.
    ///
    /// Returns the entry time when it is ahead of the ray origin, otherwise
    /// the exit time. `None` when the ray misses the cell entirely.
    pub fn intersects(&self, pos: Vector<D>, dir: Vector<D>, cell: [i32; D]) -> Option<f64> {
        let start = pos.sub(self.cell_center(cell));
        let half = 0.5 * self.dx;
        let mut tmin = f64::NEG_INFINITY;
        let mut tmax = f64::INFINITY;
        for axis in 0..D {
            let e = start[axis];
            let f = dir[axis];
            if f.abs() > 1e-9 {
                let mut t1 = (-half - e) / f;
                let mut t2 = (half - e) / f;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                tmin = tmin.max(t1);
                tmax = tmax.min(t2);
                if tmin > tmax || tmax < 0.0 {
                    return None;
                }
            } else if e < -half || e > half {
                return None;
            }
        }
        if tmin >= 0.0 {
            Some(tmin)
        } else if tmax.is_finite() {
            Some(tmax)
        } else {
            None
        }
    }

    fn clamp_to_domain(&self, point: Vector<D>) -> Vector<D> {
        Vector::new(std::array::from_fn(|axis| {
            point[axis].clamp(0.0, self.dims[axis] as f64 * self.dx)
        }))
    }

    /// Velocity at the centre of a cell, zero for solid or outside cells.
    pub fn cell_velocity(&self, coords: [i32; D]) -> Vector<D> {
        if self.is_solid_cell(coords) {
            return Vector::zero();
        }
        let cell = coords.map(|c| c as usize);
        Vector::new(std::array::from_fn(|axis| {
            let mut upper = cell;
            upper[axis] += 1;
            0.5 * (self.velocity[axis].get(cell) + self.velocity[axis].get(upper))
        }))
    }

    /// Discrete curl at a cell centre by central differences; in 2D only the
    /// z component is non-zero.
    pub fn vorticity(&self, coords: [i32; D]) -> Vec3 {
        let scale = 1.0 / (2.0 * self.dx);
        let mut grad = [[0.0; 3]; 3];
        for axis in 0..D {
            let fwd = self.cell_velocity(offset(coords, axis, 1));
            let back = self.cell_velocity(offset(coords, axis, -1));
            for comp in 0..D {
                grad[comp][axis] = (fwd[comp] - back[comp]) * scale;
            }
        }
        Vec3::new([
            grad[2][1] - grad[1][2],
            grad[0][2] - grad[2][0],
            grad[1][0] - grad[0][1],
        ])
    }

    /// Normalised gradient of |vorticity|, zero where it is flat.
    pub fn vorticity_normal(&self, coords: [i32; D]) -> Vector<D> {
        let scale = 1.0 / (2.0 * self.dx);
        let grad = Vector::new(std::array::from_fn(|axis| {
            let fwd = self.vorticity(offset(coords, axis, 1)).length();
            let back = self.vorticity(offset(coords, axis, -1)).length();
            scale * (fwd - back)
        }));
        grad.normalize_or_zero()
    }

    pub fn confinement_force(&self, coords: [i32; D]) -> Vector<D> {
        let n = self.vorticity_normal(coords).embed3();
        let w = self.vorticity(coords);
        let force = n.cross(w).scale(self.params.vorticity_strength * self.dx);
        Vector::from_embedded3(force)
    }

    /// Boussinesq lift along the up axis: heavy smoke sinks, hot air rises.
    pub fn boussinesq_force(&self, point: Vector<D>) -> f64 {
        let temperature = self.temperature(point);
        let smoke = self.density(point);
        -self.params.boussinesq_alpha * smoke
            + self.params.boussinesq_beta * (temperature - self.params.ambient_temperature)
    }

    pub fn total_density(&self) -> f64 {
        self.density.sum()
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.velocity.iter().map(|c| c.sum_squares()).sum::<f64>()
    }
}

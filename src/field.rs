use crate::{Lattice, Vector};
use rayon::prelude::*;
use std::sync::OnceLock;

const PAR_THRESHOLD_DEFAULT: usize = 262_144;
const PAR_MIN_WORK_PER_THREAD: usize = 4096;

fn parallel_threshold() -> usize {
    static THRESHOLD: OnceLock<usize> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        std::env::var("SIM_PAR_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(PAR_THRESHOLD_DEFAULT)
    })
}

pub(crate) fn should_parallel(len: usize) -> bool {
    if len < parallel_threshold() {
        return false;
    }
    let threads = rayon::current_num_threads().max(1);
    len / threads >= PAR_MIN_WORK_PER_THREAD
}

/// Dense scalar samples on a [`Lattice`].
#[derive(Clone, Debug, PartialEq)]
pub struct GridField<const D: usize> {
    lattice: Lattice<D>,
    data: Vec<f64>,
}

impl<const D: usize> GridField<D> {
    pub fn new(lattice: Lattice<D>, fill: f64) -> Self {
        let data = vec![fill; lattice.size()];
        Self { lattice, data }
    }

    pub fn from_fn(lattice: Lattice<D>, f: impl Fn([usize; D]) -> f64 + Sync) -> Self {
        let mut field = Self::new(lattice, 0.0);
        field.fill_with_index(f);
        field
    }

    pub fn lattice(&self) -> Lattice<D> {
        self.lattice
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, coords: [usize; D]) -> f64 {
        self.data[self.lattice.idx(coords)]
    }

    pub fn set(&mut self, coords: [usize; D], value: f64) {
        let index = self.lattice.idx(coords);
        self.data[index] = value;
    }

    pub fn at(&self, index: usize) -> f64 {
        self.data[index]
    }

    pub fn sample_clamped(&self, coords: [i32; D]) -> f64 {
        self.get(self.lattice.clamp_coord(coords))
    }

    /// Uniform fill, used for resets.
    pub fn initialize(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Enclosing sample index of a world-space point, clamped onto the lattice.
    pub fn cell_of(&self, point: Vector<D>) -> [usize; D] {
        self.lattice.cell_of(point)
    }

    /// Multilinear interpolation; the point is clamped into the sampled box first.
    pub fn interpolate(&self, point: Vector<D>) -> f64 {
        let dx = self.lattice.dx();
        let (lo, hi) = self.lattice.sample_bounds();
        let mut base = [0i32; D];
        let mut frac = [0.0; D];
        for axis in 0..D {
            let p = point[axis].clamp(lo[axis], hi[axis]);
            let g = (p - lo[axis]) / dx;
            let g0 = g.floor();
            base[axis] = g0 as i32;
            frac[axis] = g - g0;
        }
        let mut value = 0.0;
        for corner in 0..(1usize << D) {
            let mut weight = 1.0;
            let mut coords = base;
            for axis in 0..D {
                if corner & (1 << axis) != 0 {
                    coords[axis] += 1;
                    weight *= frac[axis];
                } else {
                    weight *= 1.0 - frac[axis];
                }
            }
            if weight != 0.0 {
                value += weight * self.sample_clamped(coords);
            }
        }
        value
    }

    pub fn fill_with_index(&mut self, f: impl Fn([usize; D]) -> f64 + Sync) {
        let lattice = self.lattice;
        if should_parallel(self.data.len()) {
            self.data.par_iter_mut().enumerate().for_each(|(i, value)| {
                *value = f(lattice.coords(i));
            });
        } else {
            for (i, value) in self.data.iter_mut().enumerate() {
                *value = f(lattice.coords(i));
            }
        }
    }

    pub fn update_with_index(&mut self, f: impl Fn([usize; D], f64) -> f64 + Sync) {
        let lattice = self.lattice;
        if should_parallel(self.data.len()) {
            self.data.par_iter_mut().enumerate().for_each(|(i, value)| {
                *value = f(lattice.coords(i), *value);
            });
        } else {
            for (i, value) in self.data.iter_mut().enumerate() {
                *value = f(lattice.coords(i), *value);
            }
        }
    }

    pub fn sum(&self) -> f64 {
        if should_parallel(self.data.len()) {
            self.data.par_iter().sum()
        } else {
            self.data.iter().sum()
        }
    }

    pub fn max_abs(&self) -> f64 {
        if should_parallel(self.data.len()) {
            self.data
                .par_iter()
                .map(|value| value.abs())
                .reduce(|| 0.0_f64, f64::max)
        } else {
            self.data
                .iter()
                .map(|value| value.abs())
                .fold(0.0_f64, f64::max)
        }
    }

    pub fn sum_squares(&self) -> f64 {
        if should_parallel(self.data.len()) {
            self.data.par_iter().map(|value| value * value).sum()
        } else {
            self.data.iter().map(|value| value * value).sum()
        }
    }

    pub fn min_max(&self) -> (f64, f64) {
        let mut iter = self.data.iter().filter(|value| value.is_finite());
        let Some(first) = iter.next() else {
            return (0.0, 0.0);
        };
        iter.fold((*first, *first), |(lo, hi), value| {
            (lo.min(*value), hi.max(*value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    #[test]
    fn interpolate_hits_samples_exactly() {
        let lattice = Lattice::cell_centered([3, 2], 1.0);
        let field = GridField::from_fn(lattice, |[x, y]| (x + y * 10) as f64);
        let pos = lattice.index_position([2, 1]);
        assert_close(field.interpolate(pos), 12.0, 1e-12);
    }

    #[test]
    fn interpolate_is_linear_between_samples() {
        let lattice = Lattice::cell_centered([4, 4, 4], 0.5);
        let field = GridField::from_fn(lattice, |[x, y, z]| x as f64 + 2.0 * y as f64 - z as f64);
        let pos = Vector::new([0.5, 0.6, 0.9]);
        let g = |p: f64| (p - 0.25) / 0.5;
        let expected = g(0.5) + 2.0 * g(0.6) - g(0.9);
        assert_close(field.interpolate(pos), expected, 1e-12);
    }

    #[test]
    fn interpolate_clamps_outside_domain() {
        let lattice = Lattice::cell_centered([2, 2], 1.0);
        let field = GridField::from_fn(lattice, |[x, y]| (x + y * 2) as f64);
        assert_close(field.interpolate(Vector::new([-5.0, -5.0])), 0.0, 1e-12);
        assert_close(field.interpolate(Vector::new([50.0, 50.0])), 3.0, 1e-12);
    }

    #[test]
    fn initialize_fills_uniformly() {
        let lattice = Lattice::face_centered([3, 3], 1.0, 0);
        let mut field = GridField::from_fn(lattice, |[x, _]| x as f64);
        field.initialize(0.25);
        assert_close(field.sum(), 0.25 * lattice.size() as f64, 1e-12);
    }

    #[test]
    fn min_max_reports_bounds() {
        let lattice = Lattice::cell_centered([2, 2], 1.0);
        let field = GridField::from_fn(lattice, |[x, y]| (x + y * 2) as f64 - 1.0);
        assert_eq!(field.min_max(), (-1.0, 2.0));
        assert_close(field.max_abs(), 2.0, 1e-12);
    }
}

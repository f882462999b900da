use crate::Vector;

/// Regular lattice of samples spaced `dx` apart, sample zero sitting at `origin`.
///
/// Flat indices are row-major with axis 0 fastest, so every lower neighbour
/// along any axis has a smaller flat index than the sample itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lattice<const D: usize> {
    dims: [usize; D],
    dx: f64,
    origin: Vector<D>,
}

impl<const D: usize> Lattice<D> {
    pub fn new(dims: [usize; D], dx: f64, origin: Vector<D>) -> Self {
        assert!(dims.iter().all(|n| *n > 0), "every axis must be > 0");
        assert!(dx > 0.0, "dx must be > 0");
        Self { dims, dx, origin }
    }

    /// Samples at cell centres of a `dims` grid.
    pub fn cell_centered(dims: [usize; D], dx: f64) -> Self {
        Self::new(dims, dx, Vector::new([0.5 * dx; D]))
    }

    /// Samples on the faces normal to `axis`; one extra sample along that axis.
    pub fn face_centered(cell_dims: [usize; D], dx: f64, axis: usize) -> Self {
        let mut dims = cell_dims;
        dims[axis] += 1;
        let mut origin = Vector::new([0.5 * dx; D]);
        origin[axis] = 0.0;
        Self::new(dims, dx, origin)
    }

    pub fn dims(&self) -> [usize; D] {
        self.dims
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn origin(&self) -> Vector<D> {
        self.origin
    }

    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn idx(&self, coords: [usize; D]) -> usize {
        debug_assert!(
            coords.iter().zip(self.dims.iter()).all(|(c, n)| c < n),
            "coords {coords:?} outside {:?}",
            self.dims
        );
        let mut index = 0;
        for axis in (0..D).rev() {
            index = index * self.dims[axis] + coords[axis];
        }
        index
    }

    pub fn coords(&self, index: usize) -> [usize; D] {
        let mut rest = index;
        std::array::from_fn(|axis| {
            let c = rest % self.dims[axis];
            rest /= self.dims[axis];
            c
        })
    }

    pub fn contains(&self, coords: [i32; D]) -> bool {
        coords
            .iter()
            .zip(self.dims.iter())
            .all(|(c, n)| *c >= 0 && (*c as usize) < *n)
    }

    /// Flat index of signed coordinates, `None` outside the lattice.
    pub fn index_of(&self, coords: [i32; D]) -> Option<usize> {
        if !self.contains(coords) {
            return None;
        }
        Some(self.idx(coords.map(|c| c as usize)))
    }

    /// Flat index of the neighbour offset by `step` along `axis`.
    pub fn neighbor(&self, index: usize, axis: usize, step: i32) -> Option<usize> {
        let mut coords = self.coords(index).map(|c| c as i32);
        coords[axis] += step;
        self.index_of(coords)
    }

    pub fn clamp_coord(&self, coords: [i32; D]) -> [usize; D] {
        std::array::from_fn(|axis| {
            let max = self.dims[axis] as i32 - 1;
            coords[axis].clamp(0, max) as usize
        })
    }

    pub fn index_position(&self, coords: [usize; D]) -> Vector<D> {
        Vector::new(std::array::from_fn(|axis| {
            self.origin[axis] + coords[axis] as f64 * self.dx
        }))
    }

    /// Index of the sample whose cell of width `dx` contains `point`, unclamped.
    pub fn locate(&self, point: Vector<D>) -> [i32; D] {
        std::array::from_fn(|axis| {
            let offset = point[axis] - (self.origin[axis] - 0.5 * self.dx);
            (offset / self.dx).floor() as i32
        })
    }

    /// Same as [`Lattice::locate`], clamped onto the lattice.
    pub fn cell_of(&self, point: Vector<D>) -> [usize; D] {
        self.clamp_coord(self.locate(point))
    }

    /// World-space box `[lo, hi]` that interpolation is allowed to sample.
    pub fn sample_bounds(&self) -> (Vector<D>, Vector<D>) {
        let hi = Vector::new(std::array::from_fn(|axis| {
            self.origin[axis] + (self.dims[axis] - 1) as f64 * self.dx
        }));
        (self.origin, hi)
    }
}

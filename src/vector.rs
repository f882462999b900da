use std::ops::{Index, IndexMut};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vector<const D: usize>(pub [f64; D]);

pub type Vec2 = Vector<2>;
pub type Vec3 = Vector<3>;

impl<const D: usize> Vector<D> {
    pub const fn new(components: [f64; D]) -> Self {
        Self(components)
    }

    pub const fn zero() -> Self {
        Self([0.0; D])
    }

    pub fn add(self, other: Self) -> Self {
        Self(std::array::from_fn(|a| self.0[a] + other.0[a]))
    }

    pub fn sub(self, other: Self) -> Self {
        Self(std::array::from_fn(|a| self.0[a] - other.0[a]))
    }

    pub fn scale(self, s: f64) -> Self {
        Self(self.0.map(|value| value * s))
    }

    pub fn dot(self, other: Self) -> f64 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or zero when there is no direction.
    pub fn normalize_or_zero(self) -> Self {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            self.scale(1.0 / len)
        } else {
            Self::zero()
        }
    }

    /// Lifts into 3D, padding missing axes with zero.
    pub fn embed3(self) -> Vec3 {
        Vector(std::array::from_fn(|a| if a < D { self.0[a] } else { 0.0 }))
    }

    /// Keeps the first `D` components of a 3D vector.
    pub fn from_embedded3(v: Vec3) -> Self {
        Self(std::array::from_fn(|a| v.0[a]))
    }
}

impl Vec3 {
    pub fn cross(self, other: Self) -> Self {
        let [ax, ay, az] = self.0;
        let [bx, by, bz] = other.0;
        Self([ay * bz - az * by, az * bx - ax * bz, ax * by - ay * bx])
    }
}

impl<const D: usize> Default for Vector<D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const D: usize> Index<usize> for Vector<D> {
    type Output = f64;

    fn index(&self, axis: usize) -> &f64 {
        &self.0[axis]
    }
}

impl<const D: usize> IndexMut<usize> for Vector<D> {
    fn index_mut(&mut self, axis: usize) -> &mut f64 {
        &mut self.0[axis]
    }
}

use crate::{GridField, Lattice, Vector};

/// One [`GridField`] per component, all on the same lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct CellVectorField<const D: usize> {
    components: [GridField<D>; D],
}

impl<const D: usize> CellVectorField<D> {
    pub fn new(lattice: Lattice<D>, fill: Vector<D>) -> Self {
        let components = std::array::from_fn(|axis| GridField::new(lattice, fill[axis]));
        Self { components }
    }

    pub fn from_fn(lattice: Lattice<D>, f: impl Fn([usize; D]) -> Vector<D> + Sync) -> Self {
        let components = std::array::from_fn(|axis| GridField::from_fn(lattice, |c| f(c)[axis]));
        Self { components }
    }

    pub fn lattice(&self) -> Lattice<D> {
        self.components[0].lattice()
    }

    pub fn get(&self, coords: [usize; D]) -> Vector<D> {
        Vector::new(std::array::from_fn(|axis| self.components[axis].get(coords)))
    }

    pub fn component(&self, axis: usize) -> &GridField<D> {
        &self.components[axis]
    }

    /// Overwrites every sample; `values` is in flat lattice order.
    pub fn assign(&mut self, values: &[Vector<D>]) {
        assert_eq!(values.len(), self.lattice().size(), "vector field data mismatch");
        let lattice = self.lattice();
        for (axis, component) in self.components.iter_mut().enumerate() {
            component.fill_with_index(|c| values[lattice.idx(c)][axis]);
        }
    }

    pub fn interpolate(&self, point: Vector<D>) -> Vector<D> {
        Vector::new(std::array::from_fn(|axis| {
            self.components[axis].interpolate(point)
        }))
    }
}

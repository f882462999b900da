mod config;
mod field;
mod grid;
pub mod linalg;
mod mac;
pub mod pcg;
pub mod pressure;
mod solver;
pub mod sparse;
mod vec_field;
mod vector;

pub use config::{ConfigError, Obstacle, PressureConfig, SimConfig, SourceConfig};
pub use field::GridField;
pub use grid::Lattice;
pub use mac::{CellType, MacGrid, MacParams, SolidMask, DIVERGENCE_CHECK_TOL};
pub use pcg::{
    psolve, solve, IdentityPreconditioner, JacobiPreconditioner, PcgWorkspace, Preconditioner,
    SolveParams, SolveReport,
};
pub use pressure::{mic0_factor, ModifiedIncompleteCholesky, PressureSystem};
pub use solver::{Simulation, Solver, StepReport};
pub use sparse::{LinearOperator, SparseMatrix, SparseMatrixBuilder};
pub use vec_field::CellVectorField;
pub use vector::{Vec2, Vec3, Vector};

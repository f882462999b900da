use crate::linalg::{axpy, dot, norm2, xpay};
use crate::sparse::{LinearOperator, SparseMatrix};

/// Approximate inverse applied to the residual every PCG iteration.
pub trait Preconditioner {
    /// `z ~= M^-1 * r`.
    fn apply(&self, r: &[f64], z: &mut [f64]);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }
}

/// Diagonal scaling; rows with a zero diagonal are passed through as zero.
#[derive(Clone, Debug)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    pub fn from_matrix(matrix: &SparseMatrix) -> Self {
        let inv_diag = matrix
            .diagonal()
            .into_iter()
            .map(|d| if d != 0.0 { 1.0 / d } else { 0.0 })
            .collect();
        Self { inv_diag }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        for ((zi, ri), inv) in z.iter_mut().zip(r.iter()).zip(self.inv_diag.iter()) {
            *zi = ri * inv;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveParams {
    pub max_iterations: usize,
    /// Absolute bound on the residual 2-norm.
    pub tolerance: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    pub converged: bool,
    pub iterations: usize,
    /// Residual 2-norm of the iterate left in the solution vector.
    pub residual: f64,
}

/// Scratch vectors reused across solves of the same size.
#[derive(Clone, Debug, Default)]
pub struct PcgWorkspace {
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    q: Vec<f64>,
    best: Vec<f64>,
}

impl PcgWorkspace {
    pub fn new(n: usize) -> Self {
        let mut ws = Self::default();
        ws.resize(n);
        ws
    }

    fn resize(&mut self, n: usize) {
        for v in [
            &mut self.r,
            &mut self.z,
            &mut self.p,
            &mut self.q,
            &mut self.best,
        ] {
            v.clear();
            v.resize(n, 0.0);
        }
    }
}

/// Plain conjugate gradient, starting from `x = 0`.
pub fn solve<A: LinearOperator>(
    a: &A,
    b: &[f64],
    x: &mut [f64],
    params: SolveParams,
    ws: &mut PcgWorkspace,
) -> SolveReport {
    psolve(a, &IdentityPreconditioner, b, x, params, ws)
}

/// Preconditioned conjugate gradient, starting from `x = 0`.
///
/// Never fails hard: on hitting the iteration cap (or a breakdown) the best
/// iterate seen is left in `x` and the report says it did not converge.
pub fn psolve<A: LinearOperator, M: Preconditioner>(
    a: &A,
    precon: &M,
    b: &[f64],
    x: &mut [f64],
    params: SolveParams,
    ws: &mut PcgWorkspace,
) -> SolveReport {
    let n = a.dim();
    assert_eq!(b.len(), n, "rhs length mismatch");
    assert_eq!(x.len(), n, "solution length mismatch");
    ws.resize(n);
    x.fill(0.0);

    ws.r.copy_from_slice(b);
    let mut residual = norm2(&ws.r);
    if residual <= params.tolerance {
        return SolveReport {
            converged: true,
            iterations: 0,
            residual,
        };
    }
    let mut best_residual = residual;

    precon.apply(&ws.r, &mut ws.z);
    ws.p.copy_from_slice(&ws.z);
    let mut rz_old = dot(&ws.r, &ws.z);
    let mut iterations = 0;
    while iterations < params.max_iterations {
        a.apply(&ws.p, &mut ws.q);
        let denom = dot(&ws.p, &ws.q);
        if denom.is_nan() || denom <= f64::EPSILON * rz_old.abs() {
            break;
        }
        let alpha = rz_old / denom;
        axpy(alpha, &ws.p, x);
        axpy(-alpha, &ws.q, &mut ws.r);
        iterations += 1;
        residual = norm2(&ws.r);
        if residual <= params.tolerance {
            log::debug!("cg converged in {iterations} iterations, residual {residual:e}");
            return SolveReport {
                converged: true,
                iterations,
                residual,
            };
        }
        if residual < best_residual {
            best_residual = residual;
            ws.best.copy_from_slice(x);
        }
        precon.apply(&ws.r, &mut ws.z);
        let rz_new = dot(&ws.r, &ws.z);
        if rz_new.abs() < 1e-300 {
            break;
        }
        xpay(&ws.z, rz_new / rz_old, &mut ws.p);
        rz_old = rz_new;
    }

    if residual > best_residual {
        x.copy_from_slice(&ws.best);
    }
    let residual = residual.min(best_residual);
    log::warn!(
        "cg did not converge: {iterations} iterations, residual {residual:e} (tolerance {:e})",
        params.tolerance
    );
    SolveReport {
        converged: false,
        iterations,
        residual,
    }
}

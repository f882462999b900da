//! Dense vector kernels on `f64` slices, parallel above the field threshold.

use crate::field::should_parallel;
use rayon::prelude::*;

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "vector length mismatch");
    if should_parallel(a.len()) {
        a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
    } else {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}

pub fn norm2(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `y += alpha * x`
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len(), "vector length mismatch");
    if should_parallel(y.len()) {
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(yi, xi)| *yi += alpha * xi);
    } else {
        for (yi, xi) in y.iter_mut().zip(x.iter()) {
            *yi += alpha * xi;
        }
    }
}

/// `y = x + beta * y`
pub fn xpay(x: &[f64], beta: f64, y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len(), "vector length mismatch");
    if should_parallel(y.len()) {
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(yi, xi)| *yi = xi + beta * *yi);
    } else {
        for (yi, xi) in y.iter_mut().zip(x.iter()) {
            *yi = xi + beta * *yi;
        }
    }
}

use crate::field::should_parallel;
use rayon::prelude::*;

/// Square operator the conjugate-gradient solvers can multiply by.
pub trait LinearOperator {
    fn dim(&self) -> usize;

    /// `out = A * x`.
    fn apply(&self, x: &[f64], out: &mut [f64]);
}

/// Row-compressed sparse matrix with sorted column indices per row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseMatrix {
    n: usize,
    row_start: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    pub fn identity(n: usize) -> Self {
        let mut builder = SparseMatrixBuilder::new(n);
        for row in 0..n {
            builder.push_row([(row, 1.0)]);
        }
        builder.build()
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored `(column, value)` pairs of `row`, columns ascending.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_start[row]..self.row_start[row + 1];
        self.cols[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.row_start[row]..self.row_start[row + 1];
        match self.cols[range.clone()].binary_search(&col) {
            Ok(offset) => self.values[range.start + offset],
            Err(_) => 0.0,
        }
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n).map(|row| self.get(row, row)).collect()
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.n).all(|row| {
            self.row(row)
                .all(|(col, value)| (self.get(col, row) - value).abs() <= tol)
        })
    }
}

impl LinearOperator for SparseMatrix {
    fn dim(&self) -> usize {
        self.n
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n, "operand length mismatch");
        debug_assert_eq!(out.len(), self.n, "output length mismatch");
        let row_value = |row: usize| -> f64 { self.row(row).map(|(col, a)| a * x[col]).sum() };
        if should_parallel(self.n) {
            out.par_iter_mut()
                .enumerate()
                .for_each(|(row, value)| *value = row_value(row));
        } else {
            for (row, value) in out.iter_mut().enumerate() {
                *value = row_value(row);
            }
        }
    }
}

/// Assembles a [`SparseMatrix`] one row at a time, top to bottom.
#[derive(Clone, Debug)]
pub struct SparseMatrixBuilder {
    n: usize,
    row_start: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    scratch: Vec<(usize, f64)>,
}

impl SparseMatrixBuilder {
    pub fn new(n: usize) -> Self {
        let mut row_start = Vec::with_capacity(n + 1);
        row_start.push(0);
        Self {
            n,
            row_start,
            cols: Vec::new(),
            values: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Like [`SparseMatrixBuilder::new`], reserving room for `nnz` entries.
    pub fn with_capacity(n: usize, nnz: usize) -> Self {
        let mut builder = Self::new(n);
        builder.cols.reserve(nnz);
        builder.values.reserve(nnz);
        builder
    }

    pub fn rows_pushed(&self) -> usize {
        self.row_start.len() - 1
    }

    /// Appends the next row. Zero entries are dropped, repeated columns summed.
    pub fn push_row(&mut self, entries: impl IntoIterator<Item = (usize, f64)>) {
        assert!(self.rows_pushed() < self.n, "matrix already has {} rows", self.n);
        self.scratch.clear();
        self.scratch.extend(entries);
        self.scratch.sort_by_key(|(col, _)| *col);
        let mut last: Option<usize> = None;
        for &(col, value) in &self.scratch {
            assert!(col < self.n, "column {col} outside {}x{} matrix", self.n, self.n);
            if last == Some(col) {
                if let Some(tail) = self.values.last_mut() {
                    *tail += value;
                }
                continue;
            }
            if value != 0.0 {
                self.cols.push(col);
                self.values.push(value);
                last = Some(col);
            }
        }
        self.row_start.push(self.cols.len());
    }

    /// Appends a row with no stored entries.
    pub fn push_empty_row(&mut self) {
        self.push_row(std::iter::empty());
    }

    pub fn build(self) -> SparseMatrix {
        assert_eq!(
            self.rows_pushed(),
            self.n,
            "matrix built with missing rows"
        );
        SparseMatrix {
            n: self.n,
            row_start: self.row_start,
            cols: self.cols,
            values: self.values,
        }
    }
}

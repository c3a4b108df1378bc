//! Sparse matrix storage.

use crate::traits::LinearOperator;
use crate::types::{BridgeError, BridgeResult};
use rlst::RlstScalar;

/// Sparse matrix data in coordinate form.
pub struct SparseMatrixData<T: RlstScalar> {
    /// Values.
    pub data: Vec<T>,
    /// Row indices.
    pub rows: Vec<usize>,
    /// Column indices.
    pub cols: Vec<usize>,
    /// Matrix shape.
    pub shape: [usize; 2],
}

impl<T: RlstScalar> SparseMatrixData<T> {
    /// Create an empty matrix with a known capacity.
    pub fn new(shape: [usize; 2], capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            rows: Vec::with_capacity(capacity),
            cols: Vec::with_capacity(capacity),
            shape,
        }
    }

    /// Append one entry.
    pub fn push(&mut self, row: usize, col: usize, value: T) {
        self.rows.push(row);
        self.cols.push(col);
        self.data.push(value);
    }

    /// Compress into row storage, summing duplicate entries.
    pub fn into_csr(self) -> BridgeResult<CsrMatrix<T>> {
        CsrMatrix::from_aij(self.shape, &self.rows, &self.cols, &self.data)
    }
}

/// Compressed sparse row matrix.
pub struct CsrMatrix<T: RlstScalar> {
    shape: [usize; 2],
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<T>,
}

impl<T: RlstScalar> CsrMatrix<T> {
    /// Build from coordinate data, summing duplicates.
    pub fn from_aij(
        shape: [usize; 2],
        rows: &[usize],
        cols: &[usize],
        data: &[T],
    ) -> BridgeResult<Self> {
        if rows.len() != data.len() || cols.len() != data.len() {
            return Err(BridgeError::Shape {
                expected: data.len(),
                actual: rows.len().min(cols.len()),
            });
        }
        for (&r, &c) in rows.iter().zip(cols) {
            if r >= shape[0] || c >= shape[1] {
                return Err(BridgeError::Validation(format!(
                    "Entry ({r}, {c}) is outside a {} by {} matrix",
                    shape[0], shape[1]
                )));
            }
        }
        let mut order: Vec<usize> = (0..data.len()).collect();
        order.sort_unstable_by_key(|&i| (rows[i], cols[i]));

        let mut indptr = Vec::with_capacity(shape[0] + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        let mut current_row = 0;
        let mut last: Option<(usize, usize)> = None;
        for &i in &order {
            let (r, c) = (rows[i], cols[i]);
            while current_row < r {
                indptr.push(indices.len());
                current_row += 1;
            }
            if last == Some((r, c)) {
                *values.last_mut().unwrap() += data[i];
            } else {
                indices.push(c);
                values.push(data[i]);
                last = Some((r, c));
            }
        }
        while current_row < shape[0] {
            indptr.push(indices.len());
            current_row += 1;
        }
        Ok(Self {
            shape,
            indptr,
            indices,
            data: values,
        })
    }

    /// Matrix shape.
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Compute `y = A x`.
    pub fn matvec(&self, x: &[T], y: &mut [T]) -> BridgeResult<()> {
        if x.len() != self.shape[1] {
            return Err(BridgeError::Shape {
                expected: self.shape[1],
                actual: x.len(),
            });
        }
        if y.len() != self.shape[0] {
            return Err(BridgeError::Shape {
                expected: self.shape[0],
                actual: y.len(),
            });
        }
        for (row, out) in y.iter_mut().enumerate() {
            let mut sum = T::zero();
            for idx in self.indptr[row]..self.indptr[row + 1] {
                sum += self.data[idx] * x[self.indices[idx]];
            }
            *out = sum;
        }
        Ok(())
    }
}

impl<T: RlstScalar> LinearOperator for CsrMatrix<T> {
    type T = T;

    fn dim(&self) -> usize {
        self.shape[0]
    }

    fn apply(&self, x: &[T], y: &mut [T]) -> BridgeResult<()> {
        self.matvec(x, y)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_aij_sums_duplicates() {
        let matrix = CsrMatrix::<f64>::from_aij(
            [2, 2],
            &[0, 0, 1, 0],
            &[0, 1, 1, 0],
            &[1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        assert_eq!(matrix.nnz(), 3);
        let mut y = vec![0.0; 2];
        matrix.matvec(&[1.0, 1.0], &mut y).unwrap();
        assert_relative_eq!(y[0], 7.0, epsilon = 1e-14);
        assert_relative_eq!(y[1], 3.0, epsilon = 1e-14);
    }

    #[test]
    fn test_empty_rows() {
        let matrix = CsrMatrix::<f64>::from_aij([3, 3], &[2], &[0], &[5.0]).unwrap();
        let mut y = vec![0.0; 3];
        matrix.matvec(&[1.0, 0.0, 0.0], &mut y).unwrap();
        assert_relative_eq!(y[0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(y[2], 5.0, epsilon = 1e-14);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(CsrMatrix::<f64>::from_aij([2, 2], &[2], &[0], &[1.0]).is_err());
    }
}

//! Dense real-valued buffers
//!
//! Every signal is a [`Tensor`]: a dense row-major matrix of `f64`. Vectors
//! are `n x 1` and scalars `1 x 1`, so a single representation covers every
//! signal shape the operators touch. The extent of a tensor is fixed at
//! creation; operators never resize signal storage at run time.

use serde::{Deserialize, Serialize};

/// A dense row-major matrix. Vectors are `rows x 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Tensor {
    /// A `rows x cols` tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// A column vector with the given elements.
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    /// A `1 x 1` tensor holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            rows: 1,
            cols: 1,
            data: vec![value],
        }
    }

    /// A matrix from row-major data. Panics if the data length does not
    /// match `rows * cols`; construction happens at configuration time only.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "matrix data length mismatch");
        Self { rows, cols, data }
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when this tensor has more than one row and more than one
    /// column, i.e. must be treated as a genuine matrix.
    pub fn is_matrix(&self) -> bool {
        self.rows > 1 && self.cols > 1
    }

    /// Overwrite every element with `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Overwrite this tensor's contents with `src`'s. Extents must match.
    pub fn copy_from(&mut self, src: &Tensor) {
        debug_assert_eq!(self.len(), src.len(), "copy between mismatched extents");
        self.data.copy_from_slice(&src.data);
    }

    /// `y += self . x`, where the product form depends on self's shape:
    /// a genuine matrix multiplies `x` as a column vector; a `1 x 1`
    /// broadcasts as a scalar over `x`; otherwise the product is taken
    /// elementwise (with `x` itself allowed to be `1 x 1`).
    pub fn dot_inc(&self, x: &Tensor, y: &mut Tensor) {
        if self.is_matrix() {
            debug_assert_eq!(self.cols, x.len());
            debug_assert_eq!(self.rows, y.len());
            for r in 0..self.rows {
                let row = &self.data[r * self.cols..(r + 1) * self.cols];
                let mut acc = 0.0;
                for (a, b) in row.iter().zip(x.data.iter()) {
                    acc += a * b;
                }
                y.data[r] += acc;
            }
        } else if self.len() == 1 {
            for (yi, xi) in y.data.iter_mut().zip(x.data.iter()) {
                *yi += self.data[0] * xi;
            }
        } else if x.len() == 1 {
            for (yi, ai) in y.data.iter_mut().zip(self.data.iter()) {
                *yi += ai * x.data[0];
            }
        } else {
            debug_assert_eq!(self.len(), x.len());
            for ((yi, ai), xi) in y.data.iter_mut().zip(self.data.iter()).zip(x.data.iter()) {
                *yi += ai * xi;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_shape() {
        let t = Tensor::zeros(3, 2);
        assert_eq!(t.len(), 6);
        assert!(t.is_matrix());
        assert!(t.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_vector_is_not_matrix() {
        let t = Tensor::vector(vec![1.0, 2.0, 3.0]);
        assert!(!t.is_matrix());
        assert_eq!(t.rows, 3);
        assert_eq!(t.cols, 1);
    }

    #[test]
    fn test_fill_and_copy() {
        let mut a = Tensor::zeros(4, 1);
        a.fill(2.5);
        let mut b = Tensor::zeros(4, 1);
        b.copy_from(&a);
        assert_eq!(b.data, vec![2.5; 4]);
    }

    #[test]
    fn test_dot_inc_matvec() {
        let a = Tensor::matrix(2, 3, vec![1.0, 0.0, 2.0, 0.0, 1.0, 0.0]);
        let x = Tensor::vector(vec![3.0, 4.0, 5.0]);
        let mut y = Tensor::vector(vec![1.0, 1.0]);
        a.dot_inc(&x, &mut y);
        assert_eq!(y.data, vec![14.0, 5.0]);
    }

    #[test]
    fn test_dot_inc_elementwise() {
        let a = Tensor::vector(vec![2.0, 3.0]);
        let x = Tensor::vector(vec![5.0, 7.0]);
        let mut y = Tensor::vector(vec![0.0, 0.0]);
        a.dot_inc(&x, &mut y);
        assert_eq!(y.data, vec![10.0, 21.0]);
    }

    #[test]
    fn test_dot_inc_scalar_broadcast() {
        let a = Tensor::scalar(4.0);
        let x = Tensor::vector(vec![1.0, 2.0]);
        let mut y = Tensor::vector(vec![0.0, 1.0]);
        a.dot_inc(&x, &mut y);
        assert_eq!(y.data, vec![4.0, 9.0]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let t = Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let json = serde_json::to_string(&t).unwrap();
        let back: Tensor = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}

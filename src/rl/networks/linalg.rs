//! Dense matrix and activation helpers shared by the encoder and learner.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraderError};

/// Exponent bound keeping `exp` finite in f64
const SIGMOID_CLAMP: f64 = 709.0;

/// Row-major dense matrix, serialized as nested arrays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix(Vec<Vec<f64>>);

impl Matrix {
    /// All-zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix(vec![vec![0.0; cols]; rows])
    }

    /// Uniform init scaled by sqrt(2 / (rows + cols))
    pub fn xavier<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let scale = (2.0 / (rows + cols).max(1) as f64).sqrt();
        Matrix(
            (0..rows)
                .map(|_| {
                    (0..cols)
                        .map(|_| rng.gen_range(-1.0..1.0) * scale)
                        .collect()
                })
                .collect(),
        )
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Matrix(rows)
    }

    pub fn rows(&self) -> usize {
        self.0.len()
    }

    /// Width of the first row (0 for an empty matrix)
    pub fn cols(&self) -> usize {
        self.0.first().map_or(0, Vec::len)
    }

    /// Whether every row has the same width
    pub fn is_rectangular(&self) -> bool {
        let cols = self.cols();
        self.0.iter().all(|row| row.len() == cols)
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.0[i]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[i][j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.0[i][j] = value;
    }

    pub fn as_rows(&self) -> &[Vec<f64>] {
        &self.0
    }

    /// `self · v`
    pub fn mat_vec(&self, v: &[f64]) -> Result<Vec<f64>> {
        if self.cols() != v.len() {
            return Err(TraderError::shape("matrix-vector product", self.cols(), v.len()));
        }
        Ok(self
            .0
            .iter()
            .map(|row| row.iter().zip(v).map(|(w, x)| w * x).sum())
            .collect())
    }

    /// Apply `f` to every entry in place
    pub fn map_inplace(&mut self, mut f: impl FnMut(f64) -> f64) {
        for w in self.0.iter_mut().flatten() {
            *w = f(*w);
        }
    }

    /// `self -= lr * grad`, elementwise
    pub fn sgd_step(&mut self, grad: &Matrix, lr: f64) {
        for (row, grow) in self.0.iter_mut().zip(&grad.0) {
            for (w, g) in row.iter_mut().zip(grow) {
                *w -= lr * g;
            }
        }
    }

    /// `self ← (1 − tau)·self + tau·source`, elementwise
    pub fn blend_from(&mut self, source: &Matrix, tau: f64) {
        for (row, srow) in self.0.iter_mut().zip(&source.0) {
            for (t, s) in row.iter_mut().zip(srow) {
                *t = (1.0 - tau) * *t + tau * s;
            }
        }
    }

    pub fn same_shape(&self, other: &Matrix) -> bool {
        self.rows() == other.rows() && self.cols() == other.cols()
    }

    /// Whether any entry is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.0.iter().flatten().any(|w| !w.is_finite())
    }
}

/// `target ← (1 − tau)·target + tau·source`, elementwise
pub fn blend_vec(target: &mut [f64], source: &[f64], tau: f64) {
    for (t, s) in target.iter_mut().zip(source) {
        *t = (1.0 - tau) * *t + tau * s;
    }
}

/// Logistic sigmoid with the exponent clamped to ±709
pub fn sigmoid(x: f64) -> f64 {
    let clamped = x.clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP);
    1.0 / (1.0 + (-clamped).exp())
}

/// ReLU that lets NaN through so callers can detect it downstream
pub fn relu(x: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else {
        x
    }
}

pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// Hadamard product
pub fn hadamard(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

pub fn clip(x: f64, bound: f64) -> f64 {
    x.clamp(-bound, bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_mat_vec() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![0.0, -1.0]]);
        assert_eq!(m.mat_vec(&[1.0, 1.0]).unwrap(), vec![3.0, 7.0, -1.0]);
        assert!(m.mat_vec(&[1.0]).is_err());
    }

    #[test]
    fn test_xavier_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let m = Matrix::xavier(64, 32, &mut rng);
        let bound = (2.0f64 / 96.0).sqrt();

        assert_eq!(m.rows(), 64);
        assert_eq!(m.cols(), 32);
        assert!(m.as_rows().iter().flatten().all(|w| w.abs() <= bound));
    }

    #[test]
    fn test_sigmoid_extremes_finite() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(1e6).is_finite());
        assert!(sigmoid(-1e6) >= 0.0);
    }

    #[test]
    fn test_relu_propagates_nan() {
        assert_eq!(relu(-2.0), 0.0);
        assert_eq!(relu(3.0), 3.0);
        assert!(relu(f64::NAN).is_nan());
    }

    #[test]
    fn test_blend_extremes() {
        let source = Matrix::from_rows(vec![vec![1.0, -2.0]]);
        let mut target = Matrix::from_rows(vec![vec![0.3, 0.7]]);

        target.blend_from(&source, 1.0);
        assert_eq!(target, source);

        let before = Matrix::from_rows(vec![vec![0.3, 0.7]]);
        let mut target = before.clone();
        target.blend_from(&source, 0.0);
        assert_eq!(target, before);
    }
}

//! Dense symmetric matrices on top of `nalgebra`.
//!
//! Serialized as `{ "n": .., "data": [row-major] }`. Deserialization checks
//! shape, finiteness and symmetry, so a `SymMatrix` is always square,
//! finite and symmetric once it exists.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Entries closer than this (relative to the largest magnitude) count as equal.
const SYMMETRY_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq)]
pub enum MatrixError {
    Shape { n: usize, len: usize },
    NonFinite { row: usize, col: usize },
    Asymmetric { row: usize, col: usize },
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape { n, len } => write!(f, "matrix of dimension {n} needs {} entries, got {len}", n * n),
            Self::NonFinite { row, col } => write!(f, "matrix entry ({row}, {col}) is not finite"),
            Self::Asymmetric { row, col } => write!(f, "matrix entries ({row}, {col}) and ({col}, {row}) differ"),
        }
    }
}

impl std::error::Error for MatrixError {}

#[derive(Serialize, Deserialize)]
struct RawSymMatrix {
    n: usize,
    data: Vec<f64>,
}

/// Square symmetric matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSymMatrix", into = "RawSymMatrix")]
pub struct SymMatrix(DMatrix<f64>);

impl TryFrom<RawSymMatrix> for SymMatrix {
    type Error = MatrixError;

    fn try_from(raw: RawSymMatrix) -> Result<Self, Self::Error> {
        Self::from_row_major(raw.n, raw.data)
    }
}

impl From<SymMatrix> for RawSymMatrix {
    fn from(m: SymMatrix) -> Self {
        let n = m.dim();
        let data = (0..n).flat_map(|i| (0..n).map(move |j| (i, j))).map(|(i, j)| m.0[(i, j)]).collect();
        Self { n, data }
    }
}

impl SymMatrix {
    pub fn zeros(n: usize) -> Self {
        Self(DMatrix::zeros(n, n))
    }

    pub fn from_row_major(n: usize, data: Vec<f64>) -> Result<Self, MatrixError> {
        if data.len() != n * n {
            return Err(MatrixError::Shape { n, len: data.len() });
        }
        if let Some(k) = data.iter().position(|v| !v.is_finite()) {
            return Err(MatrixError::NonFinite { row: k / n, col: k % n });
        }
        let m = DMatrix::from_row_slice(n, n, &data);
        let scale = m.amax().max(1.0);
        for i in 0..n {
            for j in 0..i {
                if (m[(i, j)] - m[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(MatrixError::Asymmetric { row: i, col: j });
                }
            }
        }
        Ok(Self(m))
    }

    pub fn dim(&self) -> usize {
        self.0.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[(i, j)]
    }

    /// Sets (i, j) and its mirror (j, i).
    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        self.0[(i, j)] = v;
        self.0[(j, i)] = v;
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.0
    }

    /// xᵀ M x, or `None` when `x` has the wrong length.
    pub fn quad_form(&self, x: &[f64]) -> Option<f64> {
        if x.len() != self.dim() {
            return None;
        }
        let v = DVector::from_column_slice(x);
        Some(v.dot(&(&self.0 * &v)))
    }

    fn first_non_finite(&self) -> Option<(usize, usize)> {
        let n = self.dim();
        (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .find(|&(i, j)| !self.0[(i, j)].is_finite())
    }
}

/// Outcome of a semidefiniteness check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PsdVerdict {
    PositiveSemidefinite,
    /// Smallest eigenvalue below tolerance; `index` is the row its
    /// eigenvector loads on most.
    Indefinite { index: usize, eigenvalue: f64 },
    NonFinite { row: usize, col: usize },
}

impl PsdVerdict {
    pub fn is_psd(&self) -> bool {
        matches!(self, Self::PositiveSemidefinite)
    }
}

/// Symmetric eigendecomposition; the smallest eigenvalue must be at least
/// `-tol` times the largest diagonal magnitude (floor 1.0).
pub fn check_psd(m: &SymMatrix, tol: f64) -> PsdVerdict {
    if let Some((row, col)) = m.first_non_finite() {
        return PsdVerdict::NonFinite { row, col };
    }
    let scale = m.0.diagonal().iter().fold(1.0_f64, |acc, d| acc.max(d.abs()));

    let eig = m.0.clone().symmetric_eigen();
    let smallest = eig
        .eigenvalues
        .iter()
        .copied()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1));
    match smallest {
        Some((k, eigenvalue)) if eigenvalue < -tol * scale => PsdVerdict::Indefinite {
            index: eig.eigenvectors.column(k).iamax(),
            eigenvalue,
        },
        _ => PsdVerdict::PositiveSemidefinite,
    }
}

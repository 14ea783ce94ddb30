use crate::error::{LikelihoodError, Result};
use crate::structs::hubble::HubbleDiagram;
use faer::linalg::triangular_solve::solve_lower_triangular_in_place;
use faer::{Mat, Side};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Relative tolerance for the symmetry check, scaled by the largest diagonal entry
const SYMMETRY_TOL: f64 = 1e-8;

/// Smallest accepted squared pivot relative to the largest diagonal entry
const PIVOT_FLOOR: f64 = 1e-14;

/// How the covariance matrix is assembled from its inputs
///
/// `C = C_sys + [include_stat] diag(sigma_i^2) + intrinsic_scatter^2 I`,
/// where `sigma_i` are the per-entry errors of the [HubbleDiagram]. The default
/// treats the systematic matrix as the complete covariance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Composition {
    pub include_stat: bool,
    pub intrinsic_scatter: f64,
}

impl Default for Composition {
    fn default() -> Self {
        Composition {
            include_stat: false,
            intrinsic_scatter: 0.0,
        }
    }
}

impl Composition {
    /// Assemble the full covariance matrix for `diagram`
    pub fn compose(&self, systematic: &Array2<f64>, diagram: &HubbleDiagram) -> Result<Array2<f64>> {
        let n = diagram.len();
        if systematic.nrows() != n || systematic.ncols() != n {
            return Err(LikelihoodError::DimensionMismatch {
                what: "covariance matrix",
                expected: n,
                found: systematic.nrows().max(systematic.ncols()),
            });
        }
        if !self.intrinsic_scatter.is_finite() || self.intrinsic_scatter < 0.0 {
            return Err(LikelihoodError::InvalidSettings(format!(
                "intrinsic scatter must be finite and non-negative, got {}",
                self.intrinsic_scatter
            )));
        }

        let mut matrix = systematic.clone();
        if self.include_stat {
            let errors = diagram.errors().ok_or_else(|| {
                LikelihoodError::InvalidData(
                    "statistical errors were requested but the Hubble diagram has no error column"
                        .to_string(),
                )
            })?;
            for (i, e) in errors.iter().enumerate() {
                matrix[[i, i]] += e * e;
            }
        }
        let scatter = self.intrinsic_scatter * self.intrinsic_scatter;
        if scatter > 0.0 {
            matrix.diag_mut().mapv_inplace(|x| x + scatter);
        }
        Ok(matrix)
    }
}

/// Strategy used to factorize the covariance matrix
///
/// Loading a [Covariance] calls [Factorize::factorize] exactly once. The
/// resulting factor is the only thing evaluations ever read.
pub trait Factorize {
    /// Return the lower-triangular factor `L` with `C = L L^T`
    fn factorize(&self, matrix: &Mat<f64>) -> Result<Mat<f64>>;
}

/// Cholesky (LL^T) factorization
#[derive(Debug, Clone, Copy, Default)]
pub struct Cholesky;

impl Factorize for Cholesky {
    fn factorize(&self, matrix: &Mat<f64>) -> Result<Mat<f64>> {
        let llt = match matrix.llt(Side::Lower) {
            Ok(llt) => llt,
            Err(_) => {
                let pivot = first_bad_pivot(matrix).unwrap_or(0);
                return Err(LikelihoodError::SingularCovariance { pivot });
            }
        };
        Ok(llt.L().to_owned())
    }
}

/// Index of the first non-positive pivot of an unpivoted Cholesky sweep, used for diagnostics only
fn first_bad_pivot(matrix: &Mat<f64>) -> Option<usize> {
    let n = matrix.nrows();
    let mut l = Mat::<f64>::zeros(n, n);
    for j in 0..n {
        let mut d = matrix[(j, j)];
        for k in 0..j {
            d -= l[(j, k)] * l[(j, k)];
        }
        if !(d > 0.0) {
            return Some(j);
        }
        let d = d.sqrt();
        l[(j, j)] = d;
        for i in (j + 1)..n {
            let mut s = matrix[(i, j)];
            for k in 0..j {
                s -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = s / d;
        }
    }
    None
}

/// Sufficient statistics of a residual vector for the magnitude-offset algebra
///
/// With `r` the residual without offset: `a = r^T C^-1 r`, `b = 1^T C^-1 r`
/// and `e = 1^T C^-1 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetTerms {
    pub a: f64,
    pub b: f64,
    pub e: f64,
}

impl OffsetTerms {
    /// Offset minimizing `chi2(M) = a - 2 M b + M^2 e`
    pub fn best_offset(&self) -> f64 {
        self.b / self.e
    }

    /// `chi2` at the best offset
    pub fn profiled_chi2(&self) -> f64 {
        self.a - self.b * self.b / self.e
    }

    /// `chi2` at an arbitrary offset
    pub fn chi2_at(&self, offset: f64) -> f64 {
        self.a - 2.0 * offset * self.b + offset * offset * self.e
    }
}

/// Factorized covariance matrix
///
/// Created once per data set by [Covariance::load]; everything an evaluation
/// needs (the Cholesky factor, the log-determinant and the whitened unit
/// vector) is computed there and never mutated afterwards. Evaluations only
/// take `&self`, so one handle can be shared across threads behind an
/// [Arc](std::sync::Arc).
#[derive(Debug, Clone)]
pub struct Covariance {
    factor: Mat<f64>,
    log_det: f64,
    whitened_ones: Mat<f64>,
    ones_precision: f64,
}

impl Covariance {
    /// Validate and factorize a covariance matrix with the Cholesky decomposition
    pub fn load(matrix: &Array2<f64>) -> Result<Self> {
        Covariance::load_with(matrix, &Cholesky)
    }

    /// Validate and factorize a covariance matrix with the given strategy
    pub fn load_with<F: Factorize>(matrix: &Array2<f64>, factorizer: &F) -> Result<Self> {
        let n = matrix.nrows();
        if n == 0 || matrix.ncols() != n {
            return Err(LikelihoodError::InvalidCovariance(format!(
                "matrix must be square and non-empty, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if let Some(((i, j), x)) = matrix.indexed_iter().find(|(_, x)| !x.is_finite()) {
            return Err(LikelihoodError::InvalidCovariance(format!(
                "entry ({}, {}) is not finite ({})",
                i, j, x
            )));
        }

        let scale = matrix.diag().iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        if scale == 0.0 {
            return Err(LikelihoodError::SingularCovariance { pivot: 0 });
        }
        for i in 0..n {
            for j in 0..i {
                if (matrix[[i, j]] - matrix[[j, i]]).abs() > SYMMETRY_TOL * scale {
                    return Err(LikelihoodError::InvalidCovariance(format!(
                        "matrix is not symmetric: entry ({}, {}) = {} but ({}, {}) = {}",
                        i,
                        j,
                        matrix[[i, j]],
                        j,
                        i,
                        matrix[[j, i]]
                    )));
                }
            }
        }

        let symmetric = Mat::from_fn(n, n, |i, j| 0.5 * (matrix[[i, j]] + matrix[[j, i]]));
        let factor = factorizer.factorize(&symmetric)?;
        if factor.nrows() != n || factor.ncols() != n {
            return Err(LikelihoodError::DimensionMismatch {
                what: "Cholesky factor",
                expected: n,
                found: factor.nrows(),
            });
        }

        let mut log_det = 0.0;
        for i in 0..n {
            let d = factor[(i, i)];
            if !(d * d > PIVOT_FLOOR * scale) || !d.is_finite() {
                return Err(LikelihoodError::SingularCovariance { pivot: i });
            }
            log_det += (d * d).ln();
        }

        let mut whitened_ones = Mat::from_fn(n, 1, |_, _| 1.0);
        solve_lower_triangular_in_place(factor.as_ref(), whitened_ones.as_mut(), faer::Par::Seq);
        let ones_precision = squared_norm(&whitened_ones);

        tracing::info!(
            "Covariance matrix of dimension {} factorized, log-determinant {:.6}",
            n,
            log_det
        );

        Ok(Covariance {
            factor,
            log_det,
            whitened_ones,
            ones_precision,
        })
    }

    pub fn dim(&self) -> usize {
        self.factor.nrows()
    }

    /// The lower Cholesky factor `L`
    pub fn factor(&self) -> &Mat<f64> {
        &self.factor
    }

    /// `ln |C|`, computed once from the diagonal of the factor
    pub fn log_determinant(&self) -> f64 {
        self.log_det
    }

    /// `1^T C^-1 1`
    pub fn ones_precision(&self) -> f64 {
        self.ones_precision
    }

    /// Solve `L y = v` by forward substitution
    pub fn whiten(&self, v: &Array1<f64>) -> Result<Mat<f64>> {
        if v.len() != self.dim() {
            return Err(LikelihoodError::DimensionMismatch {
                what: "residual vector",
                expected: self.dim(),
                found: v.len(),
            });
        }
        let mut y = Mat::from_fn(v.len(), 1, |i, _| v[i]);
        solve_lower_triangular_in_place(self.factor.as_ref(), y.as_mut(), faer::Par::Seq);
        Ok(y)
    }

    /// `r^T C^-1 r`, computed as `|L^-1 r|^2`
    pub fn solve_quadratic_form(&self, residual: &Array1<f64>) -> Result<f64> {
        let y = self.whiten(residual)?;
        Ok(squared_norm(&y))
    }

    /// Quadratic-form terms needed to profile or marginalize an additive offset
    pub fn offset_terms(&self, residual: &Array1<f64>) -> Result<OffsetTerms> {
        let y = self.whiten(residual)?;
        let a = squared_norm(&y);
        let b: f64 = y
            .col(0)
            .iter()
            .zip(self.whitened_ones.col(0).iter())
            .map(|(x, u)| x * u)
            .sum();
        Ok(OffsetTerms {
            a,
            b,
            e: self.ones_precision,
        })
    }
}

fn squared_norm(m: &Mat<f64>) -> f64 {
    m.col(0).iter().map(|x| x * x).sum()
}

//! Small dense linear algebra used by the correlated generators.
//!
//! Matrices are row-major `Vec<Vec<f64>>` sized by the number of auctioned objects.
//! Jacobi rotations give the eigenvalues of a symmetric matrix and a plain Cholesky
//! factorisation drives multivariate normal sampling.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use crate::error::{Result, SimulationError};

pub type Matrix = Vec<Vec<f64>>;

/// Off-diagonal magnitude below which Jacobi rotation stops
const JACOBI_TOLERANCE: f64 = 1e-12;

/// Added on top of the negative eigenvalue when repairing a covariance matrix
pub const PSD_EPSILON: f64 = 1e-8;

/// Pivots this close to zero are treated as an exactly singular direction
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Eigenvalues of a symmetric matrix using cyclic Jacobi rotations
/// Returned in no particular order
pub fn symmetric_eigenvalues(matrix: &Matrix) -> Vec<f64> {
    let n = matrix.len();
    let mut a = matrix.clone();
    let max_rotations = 100 * n * n + 100;

    for _ in 0..max_rotations {
        // Largest off-diagonal element
        let mut max_val = 0.0_f64;
        let mut p = 0;
        let mut q = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                if a[i][j].abs() > max_val {
                    max_val = a[i][j].abs();
                    p = i;
                    q = j;
                }
            }
        }

        if max_val < JACOBI_TOLERANCE {
            break;
        }

        let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
        let t = if theta >= 0.0 {
            1.0 / (theta + (1.0 + theta * theta).sqrt())
        } else {
            -1.0 / (-theta + (1.0 + theta * theta).sqrt())
        };
        let c = 1.0 / (1.0 + t * t).sqrt();
        let s = t * c;
        apply_jacobi_rotation(&mut a, p, q, c, s, t);
    }

    (0..n).map(|i| a[i][i]).collect()
}

/// Zero a[p][q] with one rotation, keeping the matrix symmetric
fn apply_jacobi_rotation(a: &mut Matrix, p: usize, q: usize, c: f64, s: f64, t: f64) {
    let n = a.len();
    let apq = a[p][q];
    a[p][p] -= t * apq;
    a[q][q] += t * apq;
    a[p][q] = 0.0;
    a[q][p] = 0.0;

    for r in 0..n {
        if r == p || r == q {
            continue;
        }
        let arp = a[r][p];
        let arq = a[r][q];
        a[r][p] = c * arp - s * arq;
        a[p][r] = a[r][p];
        a[r][q] = s * arp + c * arq;
        a[q][r] = a[r][q];
    }
}

/// Smallest eigenvalue of a symmetric matrix (0.0 for an empty matrix)
pub fn min_eigenvalue(matrix: &Matrix) -> f64 {
    symmetric_eigenvalues(matrix)
        .into_iter()
        .reduce(f64::min)
        .unwrap_or(0.0)
}

/// Shift the diagonal so that the matrix becomes positive semi-definite
///
/// If the smallest eigenvalue is negative, `-min_eigenvalue + PSD_EPSILON` is added to every
/// diagonal entry. Returns the shift that was applied, if any.
pub fn ensure_positive_semidefinite(matrix: &mut Matrix) -> Option<f64> {
    let min_eig = min_eigenvalue(matrix);
    if min_eig < 0.0 {
        let shift = -min_eig + PSD_EPSILON;
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] += shift;
        }
        Some(shift)
    } else {
        None
    }
}

/// Lower triangular Cholesky factor L with L * L^T = matrix
///
/// Positive semi-definite matrices are accepted: a pivot within PIVOT_TOLERANCE of zero
/// (relative to its diagonal entry) is set to 0 and its column below the diagonal is zeroed.
pub fn cholesky(matrix: &Matrix) -> Result<Matrix> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        if matrix[i].len() != n {
            return Err(SimulationError::DegenerateCovariance(format!("row {} has {} entries, expected {}", i, matrix[i].len(), n)));
        }
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let pivot = matrix[i][i] - sum;
                let tolerance = PIVOT_TOLERANCE * matrix[i][i].abs().max(1.0);
                if !pivot.is_finite() || pivot < -tolerance {
                    return Err(SimulationError::DegenerateCovariance(format!("negative pivot {:.3e} at row {}", pivot, i)));
                }
                l[i][i] = if pivot <= tolerance { 0.0 } else { pivot.sqrt() };
            } else if l[j][j] == 0.0 {
                l[i][j] = 0.0;
            } else {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }

    Ok(l)
}

/// Multivariate normal distribution N(mean, cov) sampled through its Cholesky factor
#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    mean: Vec<f64>,
    factor: Matrix,
}

impl MultivariateNormal {
    pub fn new(mean: Vec<f64>, cov: &Matrix) -> Result<Self> {
        if mean.len() != cov.len() {
            return Err(SimulationError::DegenerateCovariance(format!(
                "mean has {} entries but covariance is {}x{}", mean.len(), cov.len(), cov.len()
            )));
        }
        let factor = cholesky(cov)?;
        Ok(Self { mean, factor })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

impl Distribution<Vec<f64>> for MultivariateNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let mut z = Vec::with_capacity(self.dim());
        for _ in 0..self.dim() {
            let draw: f64 = StandardNormal.sample(&mut *rng);
            z.push(draw);
        }
        self.mean
            .iter()
            .enumerate()
            .map(|(i, mu)| mu + (0..=i).map(|k| self.factor[i][k] * z[k]).sum::<f64>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_eigenvalues_of_known_matrix() {
        // [[2,1],[1,2]] has eigenvalues 1 and 3
        let m = vec![vec![2.0, 1.0], vec![1.0, 2.0]];
        let mut eig = symmetric_eigenvalues(&m);
        eig.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((eig[0] - 1.0).abs() < 1e-9);
        assert!((eig[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_psd_repair_shifts_diagonal() {
        // Eigenvalues -1 and 3
        let mut m = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let shift = ensure_positive_semidefinite(&mut m).expect("matrix should need a shift");
        assert!((shift - (1.0 + PSD_EPSILON)).abs() < 1e-9);
        assert!(min_eigenvalue(&m) > 0.0);
        // Already PSD matrices are left alone
        let mut identity = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(ensure_positive_semidefinite(&mut identity), None);
    }

    #[test]
    fn test_cholesky_reconstructs_matrix() {
        let m = vec![
            vec![4.0, 2.0, 0.4],
            vec![2.0, 3.0, 0.5],
            vec![0.4, 0.5, 1.0],
        ];
        let l = cholesky(&m).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v: f64 = (0..3).map(|k| l[i][k] * l[j][k]).sum();
                assert!((v - m[i][j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_accepts_singular_psd() {
        // Rank one: both coordinates are the same variable
        let m = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        let l = cholesky(&m).unwrap();
        assert_eq!(l, vec![vec![1.0, 0.0], vec![1.0, 0.0]]);

        let mvn = MultivariateNormal::new(vec![0.5, 0.5], &m).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let draw = mvn.sample(&mut rng);
            assert_eq!(draw[0], draw[1]);
        }
    }

    #[test]
    fn test_cholesky_singular_middle_row() {
        // Rows 0 and 1 identical, row 2 independent
        let m = vec![
            vec![2.0, 2.0, 0.0],
            vec![2.0, 2.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let l = cholesky(&m).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v: f64 = (0..3).map(|k| l[i][k] * l[j][k]).sum();
                assert!((v - m[i][j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite_and_nan() {
        // Eigenvalues -1 and 3
        let indefinite = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(matches!(cholesky(&indefinite), Err(SimulationError::DegenerateCovariance(_))));
        let nan = vec![vec![1.0, f64::NAN], vec![f64::NAN, 1.0]];
        assert!(matches!(cholesky(&nan), Err(SimulationError::DegenerateCovariance(_))));
    }

    #[test]
    fn test_multivariate_normal_sample_moments() {
        let cov = vec![vec![0.08, 0.05], vec![0.05, 0.08]];
        let mvn = MultivariateNormal::new(vec![0.5, 0.5], &cov).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<Vec<f64>> = (0..20000).map(|_| mvn.sample(&mut rng)).collect();
        let mean0 = draws.iter().map(|d| d[0]).sum::<f64>() / draws.len() as f64;
        let cov01 = draws.iter().map(|d| (d[0] - 0.5) * (d[1] - 0.5)).sum::<f64>() / draws.len() as f64;
        assert!((mean0 - 0.5).abs() < 0.01);
        assert!((cov01 - 0.05).abs() < 0.01);
    }
}

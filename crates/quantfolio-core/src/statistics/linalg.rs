use crate::error::QuantfolioError;
use crate::QuantfolioResult;

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Gauss-Jordan inversion with partial pivoting.
pub fn mat_inverse(m: &[Vec<f64>]) -> QuantfolioResult<Vec<Vec<f64>>> {
    let n = m.len();
    if n == 0 {
        return Err(QuantfolioError::invalid("matrix", "cannot invert an empty matrix"));
    }
    let scale = m
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return Err(QuantfolioError::invalid("matrix", "matrix is singular"));
    }
    let eps = scale * 1e-13;

    // Augmented [M | I]
    let mut aug: Vec<Vec<f64>> = m
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = Vec::with_capacity(2 * n);
            r.extend_from_slice(row);
            r.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for (row, r) in aug.iter().enumerate().skip(col + 1) {
            if r[col].abs() > max_val {
                max_val = r[col].abs();
                max_row = row;
            }
        }
        if max_val < eps {
            return Err(QuantfolioError::invalid(
                "matrix",
                "matrix is singular or near-singular",
            ));
        }
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= pivot;
        }
        let pivot_row = aug[col].clone();
        for (row, r) in aug.iter_mut().enumerate() {
            if row == col {
                continue;
            }
            let factor = r[col];
            if factor != 0.0 {
                for (v, p) in r.iter_mut().zip(&pivot_row) {
                    *v -= factor * p;
                }
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// Lower-triangular factor of a symmetric positive semi-definite matrix.
///
/// Zero pivots are accepted when the rest of their column is also zero, so
/// singular but valid covariance matrices (perfectly correlated assets,
/// zero-volatility assets) factor cleanly. Returns the offending row index
/// when the matrix is not PSD.
pub fn cholesky_psd(m: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, usize> {
    let n = m.len();
    let max_diag = (0..n).fold(0.0_f64, |acc, i| acc.max(m[i][i].abs()));
    let pivot_tol = 1e-10 * max_diag.max(f64::MIN_POSITIVE);
    let residual_tol = 1e-7 * max_diag.max(f64::MIN_POSITIVE);

    let mut l = vec![vec![0.0; n]; n];
    for j in 0..n {
        let d = m[j][j] - (0..j).map(|k| l[j][k] * l[j][k]).sum::<f64>();
        if d < -pivot_tol {
            return Err(j);
        }
        if d <= pivot_tol {
            for i in (j + 1)..n {
                let s = m[i][j] - (0..j).map(|k| l[i][k] * l[j][k]).sum::<f64>();
                if s.abs() > residual_tol {
                    return Err(j);
                }
            }
            continue;
        }
        let diag = d.sqrt();
        l[j][j] = diag;
        for i in (j + 1)..n {
            let s = m[i][j] - (0..j).map(|k| l[i][k] * l[j][k]).sum::<f64>();
            l[i][j] = s / diag;
        }
    }
    Ok(l)
}

/// Largest eigenvalue of a symmetric PSD matrix by power iteration from a
/// fixed start vector.
pub fn largest_eigenvalue(m: &[Vec<f64>], max_iterations: usize) -> f64 {
    let n = m.len();
    if n == 0 {
        return 0.0;
    }
    // Slightly asymmetric start so it is not orthogonal to the dominant vector
    let mut v: Vec<f64> = (0..n).map(|i| 1.0 + i as f64 * 1e-3).collect();
    let norm = dot(&v, &v).sqrt();
    v.iter_mut().for_each(|x| *x /= norm);

    let mut lambda = 0.0;
    for _ in 0..max_iterations {
        let w = mat_vec(m, &v);
        let w_norm = dot(&w, &w).sqrt();
        if w_norm == 0.0 {
            return 0.0;
        }
        let next = dot(&v, &w);
        v = w.into_iter().map(|x| x / w_norm).collect();
        if (next - lambda).abs() <= 1e-12 * next.abs().max(1e-300) {
            lambda = next;
            break;
        }
        lambda = next;
    }
    // Rayleigh quotient can undershoot slightly; the Gershgorin bound caps it
    let gershgorin = m
        .iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0_f64, f64::max);
    lambda.max(0.0).min(gershgorin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat_mul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let n = a.len();
        let m = b[0].len();
        let k = b.len();
        let mut result = vec![vec![0.0; m]; n];
        for i in 0..n {
            for j in 0..m {
                for p in 0..k {
                    result[i][j] += a[i][p] * b[p][j];
                }
            }
        }
        result
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = vec![
            vec![4.0, 1.0, 0.5],
            vec![1.0, 3.0, 0.2],
            vec![0.5, 0.2, 2.0],
        ];
        let inv = mat_inverse(&m).unwrap();
        let product = mat_mul(&m, &inv);
        for (i, row) in product.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_inverse_singular() {
        let m = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(matches!(
            mat_inverse(&m),
            Err(QuantfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let m = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let l = cholesky_psd(&m).unwrap();
        assert!((l[0][0] - 2.0).abs() < 1e-12);
        assert!((l[1][0] - 1.0).abs() < 1e-12);
        assert!((l[1][1] - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_accepts_singular_psd() {
        // Perfectly correlated pair
        let m = vec![vec![0.04, 0.06], vec![0.06, 0.09]];
        assert!(cholesky_psd(&m).is_ok());
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let m = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert_eq!(cholesky_psd(&m), Err(1));
    }

    #[test]
    fn test_largest_eigenvalue_diagonal() {
        let m = vec![
            vec![0.01, 0.0, 0.0],
            vec![0.0, 0.09, 0.0],
            vec![0.0, 0.0, 0.04],
        ];
        let lambda = largest_eigenvalue(&m, 1000);
        assert!((lambda - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_largest_eigenvalue_dense() {
        // eigenvalues 3 and 1
        let m = vec![vec![2.0, 1.0], vec![1.0, 2.0]];
        assert!((largest_eigenvalue(&m, 1000) - 3.0).abs() < 1e-9);
    }
}

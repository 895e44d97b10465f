//! Dense LU solver used for the damped normal equations.
//!
//! This is Crout's method with implicit row scaling. The pivoting rule and
//! the substitution of machine epsilon for an exact zero pivot are kept
//! stable on purpose, since the optimizer's iterates depend on them bit for
//! bit.
use nalgebra::{SMatrix, SVector};

/// Solve `$\mathbf{A}\vec{x} = \vec{b}$`.
///
/// Returns `None` if a row of `$\mathbf{A}$` is identically zero, or if the
/// solution is not finite.
pub fn solve<const N: usize>(a: &SMatrix<f64, N, N>, b: &SVector<f64, N>) -> Option<SVector<f64, N>> {
    let mut a = *a;
    let mut x = *b;
    let mut scale = SVector::<f64, N>::zeros();
    let mut pivots = [0usize; N];

    for i in 0..N {
        let max = a.row(i).iter().fold(0.0f64, |max, v| max.max(v.abs()));
        if max == 0.0 {
            return None;
        }
        scale[i] = 1.0 / max;
    }

    for j in 0..N {
        for i in 0..j {
            let mut sum = a[(i, j)];
            for k in 0..i {
                sum -= a[(i, k)] * a[(k, j)];
            }
            a[(i, j)] = sum;
        }
        let mut max = 0.0;
        let mut max_i = j;
        for i in j..N {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= a[(i, k)] * a[(k, j)];
            }
            a[(i, j)] = sum;
            let weighted = scale[i] * sum.abs();
            if weighted >= max {
                max = weighted;
                max_i = i;
            }
        }
        if j != max_i {
            a.swap_rows(max_i, j);
            scale[max_i] = scale[j];
        }
        pivots[j] = max_i;
        if a[(j, j)] == 0.0 {
            a[(j, j)] = f64::EPSILON;
        }
        if j != N - 1 {
            let rec = 1.0 / a[(j, j)];
            for i in j + 1..N {
                a[(i, j)] *= rec;
            }
        }
    }

    // forward substitution, skipping the leading zeros of the right-hand side
    let mut first_nonzero = 0;
    for i in 0..N {
        let p = pivots[i];
        let mut sum = x[p];
        x[p] = x[i];
        if first_nonzero != 0 {
            for j in first_nonzero - 1..i {
                sum -= a[(i, j)] * x[j];
            }
        } else if sum != 0.0 {
            first_nonzero = i + 1;
        }
        x[i] = sum;
    }
    for i in (0..N).rev() {
        let mut sum = x[i];
        for j in i + 1..N {
            sum -= a[(i, j)] * x[j];
        }
        x[i] = sum / a[(i, i)];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

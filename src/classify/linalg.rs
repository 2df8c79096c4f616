use ndarray::prelude::*;
use ndarray::{Data, RemoveAxis};

/// Euclidean norm of every row, squared when asked to.
pub fn row_norms<S, D>(x: &ArrayBase<S, D>, squared: bool) -> Array<f64, D::Smaller>
where
    S: Data<Elem = f64>,
    D: Dimension + RemoveAxis,
{
    let sum = x.mapv(|v| v * v).sum_axis(Axis(1));
    if squared { sum } else { sum.sqrt() }
}

/// Squared distances between every row of `a` and every row of `b`,
/// computed as `|a|^2 - 2ab + |b|^2` and clamped at zero.
pub fn squared_distances(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    // (n_a, 1) and (1, n_b) so both broadcast over (n_a, n_b)
    let aa = row_norms(a, true).insert_axis(Axis(1));
    let bb = row_norms(b, true).insert_axis(Axis(0));
    let mut dist = a.dot(&b.t()) * -2.0;
    dist += &aa;
    dist += &bb;
    dist.mapv_inplace(|d| d.max(0.0));
    dist
}

/// Index of the smallest value; the first one wins on ties.
pub fn argmin(row: ArrayView1<f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best_i, best), (i, &v)| {
            if v < best { (i, v) } else { (best_i, best) }
        })
        .0
}

/// Average per-feature variance, used to scale the convergence tolerance.
pub fn mean_variance(x: &Array2<f64>) -> f64 {
    if x.nrows() == 0 {
        return 0.0;
    }
    x.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_norms_squared_and_unsquared() {
        let x = array![[3.0, 4.0], [1.0, 2.0]];
        assert_eq!(row_norms(&x, true), arr1(&[25.0, 5.0]));
        let unsquared = row_norms(&x, false);
        assert!((unsquared[0] - 5.0).abs() < 1e-10);
        assert!((unsquared[1] - 5.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn squared_distances_match_direct_computation() {
        let a = array![[0.0, 0.0], [1.0, 1.0], [3.0, -1.0]];
        let b = array![[1.0, 0.0], [-2.0, 2.0]];
        let d = squared_distances(&a, &b);
        assert_eq!(d.dim(), (3, 2));
        for i in 0..3 {
            for j in 0..2 {
                let diff = &a.row(i) - &b.row(j);
                let direct = diff.dot(&diff);
                assert!((d[(i, j)] - direct).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn argmin_prefers_first_on_ties() {
        assert_eq!(argmin(arr1(&[2.0, 1.0, 1.0]).view()), 1);
        assert_eq!(argmin(arr1(&[0.0, 0.0]).view()), 0);
    }

    #[test]
    fn mean_variance_of_constant_data_is_zero() {
        assert_eq!(mean_variance(&array![[1.0, 2.0], [1.0, 2.0]]), 0.0);
        assert!((mean_variance(&array![[0.0], [2.0]]) - 1.0).abs() < 1e-12);
    }
}

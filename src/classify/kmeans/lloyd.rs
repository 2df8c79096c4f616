use ndarray::prelude::*;

use crate::classify::linalg::{argmin, squared_distances};

/// Outcome of one k-means run from a fixed set of starting centers.
#[derive(Debug, Clone)]
pub(super) struct LloydRun {
    pub labels: Vec<usize>,
    pub centers: Array2<f64>, // (k, n_features)
    pub inertia: f64,
    pub n_iter: usize,
}

/// Nearest center for every sample, plus the summed squared distance.
fn assign(x: &Array2<f64>, centers: &Array2<f64>) -> (Vec<usize>, f64) {
    let dist = squared_distances(x, centers); // (n_samples, k)
    let mut inertia = 0.0;
    let labels = dist
        .rows()
        .into_iter()
        .map(|row| {
            let label = argmin(row);
            inertia += row[label];
            label
        })
        .collect();
    (labels, inertia)
}

/// Mean of each cluster's members. A cluster that lost all its members
/// keeps its previous center.
fn update_centers(x: &Array2<f64>, labels: &[usize], old: &Array2<f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(old.dim());
    let mut counts = vec![0usize; old.nrows()];
    for (row, &label) in x.rows().into_iter().zip(labels) {
        let mut acc = sums.row_mut(label);
        acc += &row;
        counts[label] += 1;
    }
    for (c, mut center) in sums.rows_mut().into_iter().enumerate() {
        if counts[c] == 0 {
            center.assign(&old.row(c));
        } else {
            center /= counts[c] as f64;
        }
    }
    sums
}

/// Alternate assignment and update until labels stop changing, the total
/// squared center shift drops to `tol`, or `max_iter` updates have run.
pub(super) fn run_lloyd(
    x: &Array2<f64>,
    centers_init: &Array2<f64>,
    max_iter: usize,
    tol: f64,
) -> LloydRun {
    let mut centers = centers_init.clone();
    let (mut labels, _) = assign(x, &centers);
    let mut n_iter = 0;

    for i in 0..max_iter {
        n_iter = i + 1;
        let updated = update_centers(x, &labels, &centers);
        let shift = (&centers - &updated).mapv(|v| v * v).sum();
        centers = updated;

        let (relabeled, _) = assign(x, &centers);
        if relabeled == labels || shift <= tol {
            break;
        }
        labels = relabeled;
    }

    let (labels, inertia) = assign(x, &centers);
    LloydRun {
        labels,
        centers,
        inertia,
        n_iter,
    }
}

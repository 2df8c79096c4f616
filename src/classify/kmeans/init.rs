use ndarray::prelude::*;
use ndarray_rand::RandomExt;
use ndarray_rand::rand::Rng;
use ndarray_rand::rand::seq::index;
use ndarray_rand::rand_distr::Uniform;
use serde::{Deserialize, Serialize};

use crate::classify::linalg::squared_distances;
use crate::{AppError, AppResult};

/// How the starting centers of a k-means run are picked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KMeansInit {
    /// `k` distinct rows drawn uniformly.
    Random,
    /// Greedy k-means++: each new center is the best of a few candidates
    /// drawn proportionally to their squared distance from the chosen ones.
    #[default]
    KMeansPlusPlus,
}

impl KMeansInit {
    /// Runs needed for a stable result when the caller does not say.
    pub fn default_n_init(self) -> usize {
        match self {
            KMeansInit::Random => 10,
            KMeansInit::KMeansPlusPlus => 1,
        }
    }

    /// Pick `k` starting centers from the rows of `x` (requires `k <= n_samples`).
    pub(super) fn centers<R: Rng + ?Sized>(
        self,
        x: &Array2<f64>,
        k: usize,
        rng: &mut R,
    ) -> AppResult<Array2<f64>> {
        match self {
            KMeansInit::Random => {
                let picked = index::sample(rng, x.nrows(), k).into_vec();
                Ok(x.select(Axis(0), &picked))
            }
            KMeansInit::KMeansPlusPlus => kmeans_plus_plus(x, k, rng),
        }
    }
}

fn kmeans_plus_plus<R: Rng + ?Sized>(
    x: &Array2<f64>, // (n_samples, n_features)
    k: usize,
    rng: &mut R,
) -> AppResult<Array2<f64>> {
    let n_samples = x.nrows();
    let n_local_trials = 2 + (k as f64).ln() as usize;
    let unit = Uniform::new(0.0, 1.0).map_err(|e| AppError::Other(e.to_string()))?;

    let mut centers = Array2::<f64>::zeros((k, x.ncols()));
    let first = rng.random_range(0..n_samples);
    centers.row_mut(0).assign(&x.row(first));

    // squared distance of every sample to its closest chosen center, (n_samples,)
    let mut closest = squared_distances(&x.select(Axis(0), &[first]), x).row(0).to_owned();
    let mut potential = closest.sum();

    for c in 1..k {
        let targets = Array1::<f64>::random_using(n_local_trials, &unit, &mut *rng) * potential;
        let cumulative: Vec<f64> = closest
            .iter()
            .scan(0.0, |acc, &d| {
                *acc += d;
                Some(*acc)
            })
            .collect();
        let candidates: Vec<usize> = targets
            .iter()
            .map(|&t| cumulative.partition_point(|&c| c < t).min(n_samples - 1))
            .collect();

        // (n_candidates, n_samples)
        let mut candidate_dist = squared_distances(&x.select(Axis(0), &candidates), x);
        for mut row in candidate_dist.rows_mut() {
            row.zip_mut_with(&closest, |d, &best| *d = d.min(best));
        }
        let (best, best_potential) = candidate_dist
            .rows()
            .into_iter()
            .map(|row| row.sum())
            .enumerate()
            .fold((0, f64::INFINITY), |acc, (i, pot)| if pot < acc.1 { (i, pot) } else { acc });

        closest = candidate_dist.row(best).to_owned();
        potential = best_potential;
        centers.row_mut(c).assign(&x.row(candidates[best]));
    }
    Ok(centers)
}

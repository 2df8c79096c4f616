mod init;
mod lloyd;

use std::collections::{BTreeMap, HashSet};

use ndarray::prelude::*;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::{self, SeedableRng};
use tracing::{debug, warn};

pub use init::KMeansInit;

use crate::classify::linalg::mean_variance;
use crate::classify::traits::Clusterer;
use crate::{AppError, AppResult};

pub const DEFAULT_MAX_ITERATIONS: usize = 300;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Result of the last successful `cluster` call.
#[derive(Debug, Clone)]
pub struct Fit {
    pub k: usize,
    pub data: Array2<f64>,    // (n_samples, n_features), as passed in
    pub labels: Vec<usize>,   // (n_samples,)
    pub centers: Array2<f64>, // (k, n_features)
    pub inertia: f64,
    pub n_iter: usize,
}

#[derive(Debug, Clone, Default)]
pub enum ClusterState {
    #[default]
    Unclustered,
    Clustered(Box<Fit>),
}

/// K-means with explicit seeding. The same seed on the same data always
/// yields the same labels.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub init: KMeansInit,
    pub n_init: Option<usize>,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: Option<u64>,
    state: ClusterState,
}

impl Default for KMeans {
    fn default() -> Self {
        KMeans {
            init: KMeansInit::default(),
            n_init: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            seed: None,
            state: ClusterState::Unclustered,
        }
    }
}

impl KMeans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_init(&mut self, init: KMeansInit) -> &mut Self {
        self.init = init;
        self
    }

    /// `None` lets the init strategy decide.
    pub fn set_n_init(&mut self, n_init: Option<usize>) -> &mut Self {
        self.n_init = n_init;
        self
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> &mut Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn set_tolerance(&mut self, tolerance: f64) -> &mut Self {
        self.tolerance = tolerance;
        self
    }

    /// `None` seeds from the thread RNG, so repeated runs may number clusters differently.
    pub fn set_seed(&mut self, seed: Option<u64>) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    fn fit(&self) -> AppResult<&Fit> {
        match &self.state {
            ClusterState::Clustered(fit) => Ok(fit),
            ClusterState::Unclustered => Err(AppError::NotClustered),
        }
    }

    /// Whether the current labels were computed for exactly this input.
    pub fn is_current_for(&self, data: &Array2<f64>, k: usize) -> bool {
        self.fit().is_ok_and(|fit| fit.k == k && fit.data == data)
    }

    pub fn inertia(&self) -> AppResult<f64> {
        Ok(self.fit()?.inertia)
    }

    pub fn centers(&self) -> AppResult<&Array2<f64>> {
        Ok(&self.fit()?.centers)
    }

    fn n_init(&self) -> usize {
        self.n_init
            .filter(|&n| n > 0)
            .unwrap_or_else(|| self.init.default_n_init())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    fn fit_new(&self, data: &Array2<f64>, k: usize) -> AppResult<Fit> {
        if k < 2 {
            return Err(AppError::Config(format!("need at least 2 clusters, got {k}")));
        }
        if data.nrows() < k {
            return Err(AppError::NotEnoughSamples {
                samples: data.nrows(),
                required: k,
            });
        }

        // Centering keeps the distance expansion in `squared_distances` accurate.
        let mean = data
            .mean_axis(Axis(0))
            .ok_or(AppError::NotEnoughSamples { samples: 0, required: k })?;
        let x: Array2<f64> = data - &mean;
        let tol = self.tolerance * mean_variance(&x);
        let mut rng = self.rng();

        let mut best: Option<lloyd::LloydRun> = None;
        for _ in 0..self.n_init() {
            let centers_init = self.init.centers(&x, k, &mut rng)?;
            let run = lloyd::run_lloyd(&x, &centers_init, self.max_iterations, tol);
            debug!(inertia = run.inertia, n_iter = run.n_iter, "k-means run finished");
            if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.ok_or_else(|| AppError::Other("k-means ran zero times".into()))?;

        let distinct = best.labels.iter().collect::<HashSet<_>>().len();
        if distinct < k {
            warn!(
                "Number of distinct clusters ({}) found smaller than n_clusters ({}). Possibly due to duplicate points.",
                distinct, k
            );
        }

        Ok(Fit {
            k,
            data: data.clone(),
            labels: best.labels,
            centers: best.centers + &mean,
            inertia: best.inertia,
            n_iter: best.n_iter,
        })
    }
}

impl Clusterer for KMeans {
    #[tracing::instrument(name = "Clustering resources", level = "info", skip(self, data), fields(n_samples = data.nrows()))]
    fn cluster(&mut self, data: &Array2<f64>, k: usize) -> AppResult<Vec<usize>> {
        self.state = ClusterState::Unclustered;
        let fit = self.fit_new(data, k)?;
        let labels = fit.labels.clone();
        self.state = ClusterState::Clustered(Box::new(fit));
        Ok(labels)
    }

    fn is_clustered(&self) -> bool {
        matches!(self.state, ClusterState::Clustered(_))
    }

    fn n_clusters(&self) -> AppResult<usize> {
        Ok(self.fit()?.k)
    }

    fn labels(&self) -> AppResult<&[usize]> {
        Ok(&self.fit()?.labels)
    }

    fn centroids(&self) -> AppResult<BTreeMap<usize, Array1<f64>>> {
        let fit = self.fit()?;
        let mut sums: BTreeMap<usize, (Array1<f64>, usize)> = BTreeMap::new();
        for (row, &label) in fit.data.rows().into_iter().zip(&fit.labels) {
            let (sum, count) = sums
                .entry(label)
                .or_insert_with(|| (Array1::zeros(fit.data.ncols()), 0));
            *sum += &row;
            *count += 1;
        }
        Ok(sums
            .into_iter()
            .map(|(label, (sum, count))| (label, sum / count as f64))
            .collect())
    }
}

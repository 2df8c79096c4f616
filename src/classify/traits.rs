use std::collections::BTreeMap;

use futures::future::BoxFuture;
use ndarray::{Array1, Array2};

use crate::AppResult;
use crate::classify::palette::{self, Rgba};

/// Trait for converting text into vector embeddings.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per text, in input order.
    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>>;
}

/// Trait for projecting embeddings down to a plottable number of dimensions.
pub trait Reducer: Send + Sync {
    fn n_components(&self) -> usize;

    /// Fit on `embeddings` and return one reduced row per input row.
    fn reduce(&self, embeddings: &Array2<f64>) -> AppResult<Array2<f64>>;
}

/// Trait for partitioning vectors into `k` groups.
///
/// Everything except `cluster` fails with `AppError::NotClustered` until a
/// call to `cluster` has succeeded.
pub trait Clusterer: Send + Sync {
    /// Assign every row of `data` a label in `0..k`.
    fn cluster(&mut self, data: &Array2<f64>, k: usize) -> AppResult<Vec<usize>>;

    fn is_clustered(&self) -> bool;

    fn n_clusters(&self) -> AppResult<usize>;

    fn labels(&self) -> AppResult<&[usize]>;

    /// Mean of the points carrying each label. Labels without members are absent.
    fn centroids(&self) -> AppResult<BTreeMap<usize, Array1<f64>>>;

    /// Display color of a cluster label.
    fn color_for(&self, label: usize) -> AppResult<Rgba> {
        Ok(palette::color_for_label(label, self.n_clusters()?))
    }
}

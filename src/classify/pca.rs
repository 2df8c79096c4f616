use ndarray::prelude::*;
use ndarray_linalg::SVD;
use tracing::debug;

use crate::classify::traits::Reducer;
use crate::{AppError, AppResult};

/// Linear projection onto the leading principal components. Nothing is
/// kept between calls: every batch gets its own fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcaReducer {
    n_components: usize,
}

impl PcaReducer {
    /// Only 2-D and 3-D projections are plottable.
    pub fn new(n_components: usize) -> AppResult<Self> {
        if !(2..=3).contains(&n_components) {
            return Err(AppError::Config(format!(
                "n_components must be 2 or 3, got {n_components}"
            )));
        }
        Ok(Self { n_components })
    }
}

impl Reducer for PcaReducer {
    fn n_components(&self) -> usize {
        self.n_components
    }

    fn reduce(&self, embeddings: &Array2<f64>) -> AppResult<Array2<f64>> {
        pca_reduce(embeddings, self.n_components)
    }
}

/// Center the columns, take the SVD and project onto the first
/// `n_components` right singular vectors. Each component is sign-flipped so
/// its largest-magnitude loading is positive.
#[tracing::instrument(name = "Performing PCA", level = "info", skip(data))]
pub fn pca_reduce(data: &Array2<f64>, n_components: usize) -> AppResult<Array2<f64>> {
    let (n_samples, n_features) = data.dim();
    if n_samples < n_components {
        return Err(AppError::NotEnoughSamples {
            samples: n_samples,
            required: n_components,
        });
    }
    if n_features < n_components {
        return Err(AppError::DimensionMismatch {
            expected: n_components,
            found: n_features,
        });
    }

    let mean = data
        .mean_axis(Axis(0))
        .ok_or(AppError::NotEnoughSamples { samples: 0, required: 1 })?;
    let centered: Array2<f64> = data - &mean;

    let (_, singular_values, vt) = centered.svd(false, true)?;
    let vt = vt.ok_or_else(|| AppError::Other("SVD returned no right singular vectors".into()))?;
    debug!("Leading singular values: {:?}", singular_values.slice(s![..n_components]));

    // (n_features, n_components)
    let mut components: Array2<f64> = vt.slice(s![..n_components, ..]).t().to_owned();
    for mut col in components.axis_iter_mut(Axis(1)) {
        let pivot = col
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            col.mapv_inplace(|v| -v);
        }
    }

    Ok(centered.dot(&components))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-8, "expected {b}, got {a}");
    }

    #[test]
    fn projects_points_on_a_line_onto_the_first_component() {
        // all variance along (1, 1, 0)
        let data = array![[0.0, 0.0, 5.0], [1.0, 1.0, 5.0], [2.0, 2.0, 5.0], [3.0, 3.0, 5.0]];
        let reduced = pca_reduce(&data, 2).unwrap();
        assert_eq!(reduced.dim(), (4, 2));

        let step = 2.0_f64.sqrt();
        for (i, row) in reduced.axis_iter(Axis(0)).enumerate() {
            assert_close(row[0], (i as f64 - 1.5) * step);
            assert_close(row[1], 0.0);
        }
    }

    #[test]
    fn output_is_centered_and_row_aligned() {
        let data = array![
            [2.0, 0.0, 1.0, 4.0],
            [0.0, 1.0, 3.0, 1.0],
            [5.0, 2.0, 0.0, 0.0],
            [1.0, 4.0, 2.0, 2.0],
            [3.0, 3.0, 3.0, 3.0]
        ];
        let reduced = pca_reduce(&data, 3).unwrap();
        assert_eq!(reduced.dim(), (5, 3));
        for mean in reduced.mean_axis(Axis(0)).unwrap() {
            assert_close(mean, 0.0);
        }
        // the first component carries at least as much variance as the second
        let var = reduced.var_axis(Axis(0), 0.0);
        assert!(var[0] + 1e-12 >= var[1]);
        assert!(var[1] + 1e-12 >= var[2]);
    }

    #[test]
    fn fewer_samples_than_components_is_an_error() {
        let data = array![[1.0, 2.0, 3.0]];
        assert!(matches!(
            pca_reduce(&data, 2),
            Err(AppError::NotEnoughSamples { samples: 1, required: 2 })
        ));
    }

    #[test]
    fn reducer_only_accepts_two_or_three_components() {
        assert!(PcaReducer::new(2).is_ok());
        assert!(PcaReducer::new(3).is_ok());
        assert!(matches!(PcaReducer::new(4), Err(AppError::Config(_))));
        assert!(matches!(PcaReducer::new(1), Err(AppError::Config(_))));
    }
}

use ndarray::prelude::*;
use tracing::trace;

use crate::{AppError, AppResult};

/// Stack equally long `f32` vectors into an `f64` matrix, one row each.
pub fn embeddings_to_ndarray<T: AsRef<[f32]>>(embs: &[T]) -> AppResult<Array2<f64>> {
    stack_rows::<T, f32>(embs, f64::from)
}

/// Stack equally long `f64` vectors into a matrix, one row each.
pub fn rows_to_ndarray<T: AsRef<[f64]>>(rows: &[T]) -> AppResult<Array2<f64>> {
    stack_rows::<T, f64>(rows, |v| v)
}

fn stack_rows<T, V>(rows: &[T], to_f64: impl Fn(V) -> f64) -> AppResult<Array2<f64>>
where
    T: AsRef<[V]>,
    V: Copy,
{
    let cols = match rows.first() {
        Some(first) if !first.as_ref().is_empty() => first.as_ref().len(),
        _ => return Err(AppError::NotEnoughSamples { samples: 0, required: 1 }),
    };
    let mut arr = Array2::<f64>::zeros((rows.len(), cols));
    trace!("Initialized ndarray with shape: {:?}", arr.dim());
    for (mut dst, src) in arr.axis_iter_mut(Axis(0)).zip(rows) {
        let src = src.as_ref();
        if src.len() != cols {
            return Err(AppError::DimensionMismatch {
                expected: cols,
                found: src.len(),
            });
        }
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = to_f64(s);
        }
    }
    Ok(arr)
}

/// Split a matrix back into one vector per row.
pub fn ndarray_to_rows(arr: &Array2<f64>) -> Vec<Vec<f64>> {
    arr.axis_iter(Axis(0)).map(|row| row.to_vec()).collect()
}

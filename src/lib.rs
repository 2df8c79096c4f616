//! Cluster learning resources by the meaning of their descriptions and
//! describe the result as an interactive scatter plot.
//!
//! Documents are loaded from a folder of markdown notes or a CSV table,
//! cleaned, embedded, projected to two or three principal components,
//! grouped with k-means and turned into a Plotly-compatible [`plot::Figure`].

pub mod classify;
pub mod clean;
pub mod config;
mod error;
pub mod extract;
pub mod loader;
pub mod pipeline;
pub mod plot;
pub mod resource;
pub mod table;
pub mod topics;

pub use error::{AppError, AppResult};

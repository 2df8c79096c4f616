#[cfg(feature = "local-ml")]
pub mod bert;
pub mod convert;
pub mod hashing;
pub mod kmeans;
pub(crate) mod linalg;
pub mod palette;
pub mod pca;
pub mod traits;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

#[cfg(feature = "local-ml")]
pub use bert::BertEmbedder;
pub use hashing::HashingEmbedder;
pub use kmeans::{KMeans, KMeansInit};
pub use palette::{PALETTE, Rgba, color_for_label};
pub use pca::PcaReducer;
pub use traits::{Clusterer, Embedder, Reducer};

use crate::AppResult;
#[cfg(not(feature = "local-ml"))]
use crate::AppError;

/// Which text encoder the pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Pretrained encoder from Hugging Face. Needs the `local-ml` feature.
    Bert {
        #[serde(default = "default_model")]
        model: String,
    },
    Hashing {
        #[serde(default = "default_dimensions")]
        dimensions: usize,
    },
}

/// Sentence encoder used when no model is named.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

fn default_model() -> String {
    String::from(DEFAULT_MODEL)
}

fn default_dimensions() -> usize {
    hashing::DEFAULT_DIMENSIONS
}

impl Default for EmbedderKind {
    fn default() -> Self {
        if cfg!(feature = "local-ml") {
            EmbedderKind::Bert {
                model: default_model(),
            }
        } else {
            EmbedderKind::Hashing {
                dimensions: default_dimensions(),
            }
        }
    }
}

/// Closed set of embedders selectable from configuration.
#[derive(Clone)]
pub enum AnyEmbedder {
    #[cfg(feature = "local-ml")]
    Bert(BertEmbedder),
    Hashing(HashingEmbedder),
}

impl AnyEmbedder {
    pub async fn from_kind(kind: &EmbedderKind) -> AppResult<Self> {
        match kind {
            #[cfg(feature = "local-ml")]
            EmbedderKind::Bert { model } => {
                Ok(AnyEmbedder::Bert(BertEmbedder::new_from_pretrained(model).await?))
            }
            #[cfg(not(feature = "local-ml"))]
            EmbedderKind::Bert { model } => Err(AppError::Config(format!(
                "model {model} needs a build with the `local-ml` feature"
            ))),
            EmbedderKind::Hashing { dimensions } => {
                Ok(AnyEmbedder::Hashing(HashingEmbedder::new(*dimensions)))
            }
        }
    }
}

impl Embedder for AnyEmbedder {
    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        match self {
            #[cfg(feature = "local-ml")]
            AnyEmbedder::Bert(e) => e.embed(texts),
            AnyEmbedder::Hashing(e) => e.embed(texts),
        }
    }
}

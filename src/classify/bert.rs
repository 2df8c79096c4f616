use futures::FutureExt;
use futures::future::BoxFuture;
use vigilant_dev_local_embedder::BertEmbedder as LocalBertEmbedder;

use crate::classify::traits::Embedder;
use crate::{AppError, AppResult};

/// Sentence embeddings from a local BERT-family encoder.
#[derive(Clone)]
pub struct BertEmbedder {
    inner: LocalBertEmbedder,
}

impl Embedder for BertEmbedder {
    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        async move {
            self.inner
                .embed_texts(texts)
                .await
                .map_err(|e| AppError::Embedding(e.to_string()))
        }
        .boxed()
    }
}

impl BertEmbedder {
    #[tracing::instrument(name = "Downloading embedding model from Hugging Face", level = "info")]
    pub async fn new_from_pretrained<S: AsRef<str> + std::fmt::Debug>(
        model_name: S,
    ) -> AppResult<Self> {
        let inner = LocalBertEmbedder::new_from_pretrained(model_name)
            .await
            .map_err(|e| AppError::Embedding(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

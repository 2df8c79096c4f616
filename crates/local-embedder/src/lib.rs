use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use futures::StreamExt;
use murmur3::murmur3_x86_128;
use tokenizers::tokenizer::{Tokenizer, TruncationParams};
use tokio::io::AsyncWriteExt;
use tracing::{Instrument, Span, debug, info_span, trace, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

/// Longest token sequence fed to the encoder; longer inputs are truncated.
pub const MAX_TOKENS: usize = 512;

/// Encoder used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

const MODEL_FILES: [&str; 3] = ["config.json", "model.safetensors", "tokenizer.json"];

#[derive(thiserror::Error, Debug)]
pub enum EmbedderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("Invalid model config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Download failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Download of {file} failed with HTTP {status}")]
    Download { file: String, status: u16 },
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Embedding cache decode error: {0}")]
    CacheDecode(#[from] bincode::error::DecodeError),
    #[error("Embedding cache encode error: {0}")]
    CacheEncode(#[from] bincode::error::EncodeError),
    #[error("Invalid Content-Length header: {0}")]
    ContentLength(String),
    #[error("Embedding worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Dir(#[from] vigilant_dev_dirs::DirError),
}

pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Pretrained BERT-family encoder producing mean-pooled sentence embeddings.
#[derive(Clone)]
pub struct BertEmbedder {
    model_id: String,
    device: Device,
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    hidden_size: usize,
    cache_dir: PathBuf,
}

impl std::fmt::Debug for BertEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEmbedder")
            .field("model_id", &self.model_id)
            .field("hidden_size", &self.hidden_size)
            .finish_non_exhaustive()
    }
}

impl BertEmbedder {
    fn create_device() -> Result<Device> {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            Ok(Device::new_metal(0)?)
        }

        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            Ok(Device::Cpu)
        }
    }

    /// Fetch the encoder files from Hugging Face into the cache directory
    /// (skipping files already present) and load them.
    #[tracing::instrument(name = "Downloading embedding model from Hugging Face", level = "info")]
    pub async fn new_from_pretrained<S: AsRef<str> + std::fmt::Debug>(
        model_id: S,
    ) -> Result<Self> {
        let model_id = model_id.as_ref();
        let model_dir = vigilant_dev_dirs::DirType::Cache
            .ensure_dir_async()
            .await?
            .join("huggingface")
            .join("transformers")
            .join(model_id.replace('/', "_"));
        tokio::fs::create_dir_all(&model_dir).await?;

        let base_url = format!("https://huggingface.co/{model_id}/resolve/main/");
        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!("vigilant-dev/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        for file in MODEL_FILES {
            let file_path = model_dir.join(file);
            if file_path.exists() {
                trace!("{} already cached", file);
                continue;
            }
            download_file(&client, &format!("{base_url}{file}"), &file_path, file).await?;
        }

        Self::new_from_dir(model_id, model_dir)
    }

    /// Load an encoder from a directory holding `config.json`,
    /// `model.safetensors` and `tokenizer.json`.
    #[tracing::instrument(
        name = "Loading embedding model from directory",
        level = "info",
        skip(model_dir)
    )]
    pub fn new_from_dir<P: AsRef<Path>>(model_id: &str, model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let cache_dir = vigilant_dev_dirs::DirType::Cache
            .ensure_dir()?
            .join("embeddings");
        std::fs::create_dir_all(&cache_dir)?;

        let mut tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;
        tokenizer.with_padding(None);

        let config_bytes = std::fs::read(model_dir.join("config.json"))?;
        let raw: serde_json::Value = serde_json::from_slice(&config_bytes)?;
        let hidden_size = raw
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or_default() as usize;
        let config: BertConfig = serde_json::from_value(raw)?;

        let device = Self::create_device()?;
        let weights = std::fs::read(model_dir.join("model.safetensors"))?;
        let vb = VarBuilder::from_slice_safetensors(&weights, DType::F32, &device)?;
        let model = BertModel::load(vb, &config)?;
        debug!(hidden_size, "Loaded encoder {}", model_id);

        Ok(Self {
            model_id: model_id.to_string(),
            device,
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            hidden_size,
            cache_dir,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Length of every vector this encoder produces.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn cache_path(&self, text: &str) -> Result<PathBuf> {
        let key = format!("{}\n{}", self.model_id, text);
        let hash = murmur3_x86_128(&mut Cursor::new(key), 0)?;
        Ok(self.cache_dir.join(format!("{hash:032x}.bin")))
    }

    /// Embed one text with a batch-of-one forward pass, mean-pooling the
    /// last hidden state over the attended tokens.
    pub fn embed_text_blocking(&self, text: &str) -> Result<Vec<f32>> {
        let cache_path = self.cache_path(text)?;
        if cache_path.exists() {
            let reader = std::io::BufReader::new(std::fs::File::open(&cache_path)?);
            match bincode::decode_from_reader::<Vec<f32>, _, _>(reader, bincode::config::standard())
            {
                Ok(vec) if self.hidden_size == 0 || vec.len() == self.hidden_size => {
                    return Ok(vec);
                }
                Ok(vec) => warn!(
                    "Discarding cached embedding of length {} (expected {})",
                    vec.len(),
                    self.hidden_size
                ),
                Err(e) => warn!("Discarding unreadable cached embedding: {}", e),
            }
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;
        let seq_len = encoding.get_ids().len();

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.reshape((1, seq_len))?;
        let token_type_ids =
            Tensor::new(encoding.get_type_ids(), &self.device)?.reshape((1, seq_len))?;
        let attention_mask =
            Tensor::new(encoding.get_attention_mask(), &self.device)?.reshape((1, seq_len))?;

        // (1, seq_len, hidden)
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?;
        let embedding = summed
            .broadcast_div(&counts)?
            .squeeze(0)?
            .to_vec1::<f32>()?;

        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&cache_path)?;
        bincode::encode_into_std_write(&embedding, &mut f, bincode::config::standard())?;

        Ok(embedding)
    }

    /// Embed `texts` in order on a blocking worker thread.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = self.clone();
        let texts: Vec<String> = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let span = info_span!("Embedding resource descriptions");
            span.pb_set_message("Embedding...");
            span.pb_set_finish_message("Embedding complete");
            span.pb_set_length(texts.len() as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            {
                span.pb_set_style(&style);
            }
            let _enter = span.enter();

            let mut embeddings = Vec::with_capacity(texts.len());
            for text in &texts {
                embeddings.push(embedder.embed_text_blocking(text)?);
                span.pb_inc(1);
            }
            Ok(embeddings)
        })
        .await?
    }
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    file_path: &Path,
    file: &str,
) -> Result<()> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(EmbedderError::Download {
            file: file.to_string(),
            status: resp.status().as_u16(),
        });
    }

    let span = info_span!("Downloading model file", file = %file);
    span.pb_set_message("Downloading...");
    span.pb_set_finish_message("Download complete");
    if let Some(content_length) = resp.headers().get(reqwest::header::CONTENT_LENGTH) {
        let file_size: u64 = content_length
            .to_str()
            .map_err(|e| EmbedderError::ContentLength(e.to_string()))?
            .parse()
            .map_err(|e: std::num::ParseIntError| EmbedderError::ContentLength(e.to_string()))?;
        debug!("Expected file size: {} bytes", file_size);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            span.pb_set_style(&style);
        }
        span.pb_set_length(file_size);
    } else {
        warn!("Content-Length header not found for {}", file);
        if let Ok(style) = ProgressStyle::default_spinner().template("{msg} {spinner}") {
            span.pb_set_style(&style);
        }
    }

    // Write to a partial file so an interrupted download is never mistaken
    // for a complete one on the next run.
    let partial = file_path.with_extension("part");
    async {
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            Span::current().pb_inc(chunk.len() as u64);
        }
        out.flush().await?;
        out.sync_all().await?;
        Result::<()>::Ok(())
    }
    .instrument(span)
    .await?;
    tokio::fs::rename(&partial, file_path).await?;
    Ok(())
}

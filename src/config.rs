use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigilant_dev_dirs::DirType;

use crate::classify::kmeans::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, KMeans, KMeansInit};
use crate::classify::{EmbedderKind, PcaReducer};
use crate::extract::ExtractorKind;
use crate::loader::ResourceSource;
use crate::plot::PlotOptions;
use crate::{AppError, AppResult};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Everything needed to build and run a pipeline.
///
/// Every field has a default, so a config file only needs the keys it changes:
///
/// ```json
/// { "source": { "kind": "directory", "path": "notes" }, "n_clusters": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: Option<ResourceSource>,
    pub extractor: ExtractorKind,
    pub embedder: EmbedderKind,
    pub n_components: usize,
    pub n_clusters: usize,
    /// `null` draws a fresh seed per run.
    pub seed: Option<u64>,
    pub init: KMeansInit,
    pub n_init: Option<usize>,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub plot: PlotOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: None,
            extractor: ExtractorKind::default(),
            embedder: EmbedderKind::default(),
            n_components: 2,
            n_clusters: 3,
            seed: Some(42),
            init: KMeansInit::default(),
            n_init: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            plot: PlotOptions::default(),
        }
    }
}

impl PipelineConfig {
    #[tracing::instrument(name = "Reading config file", level = "debug")]
    pub fn from_file<P: AsRef<Path> + std::fmt::Debug>(path: P) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!("{}: {e}", path.as_ref().display()))
        })
    }

    /// `$XDG_CONFIG_HOME/vigilant-dev/config.json`.
    pub fn default_path() -> AppResult<PathBuf> {
        Ok(DirType::Config.file(CONFIG_FILE_NAME)?)
    }

    /// Read `explicit` if given, otherwise the default config file when it
    /// exists, otherwise fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Ok(path) if path.is_file() => {
                info!("Using config file {}", path.display());
                Self::from_file(path)
            }
            Ok(path) => {
                debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => {
                debug!("Config directory unavailable ({e}), using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn source(&self) -> AppResult<&ResourceSource> {
        self.source
            .as_ref()
            .ok_or_else(|| AppError::Config("no resource directory or CSV file given".into()))
    }

    pub fn reducer(&self) -> AppResult<PcaReducer> {
        PcaReducer::new(self.n_components)
    }

    pub fn clusterer(&self) -> KMeans {
        let mut km = KMeans::new();
        km.set_init(self.init)
            .set_n_init(self.n_init)
            .set_max_iterations(self.max_iterations)
            .set_tolerance(self.tolerance)
            .set_seed(self.seed);
        km
    }
}

use std::fmt::Display;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::classify::convert::ndarray_to_rows;
use crate::classify::traits::{Clusterer, Embedder, Reducer};
use crate::classify::{AnyEmbedder, KMeans};
use crate::clean::clean_text;
use crate::config::PipelineConfig;
use crate::extract::Extractor;
use crate::loader::ResourceSource;
use crate::plot::{Figure, PlotBuilder, PlotOptions};
use crate::table::{Record, RecordTable, RowId, Stage};
use crate::{AppError, AppResult};

/// One unit of pipeline work, as reported to a [`PipelineObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Load,
    Clean,
    Embed,
    Reduce,
    Cluster,
    Plot,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Step::Load => "load",
            Step::Clean => "clean",
            Step::Embed => "embed",
            Step::Reduce => "reduce",
            Step::Cluster => "cluster",
            Step::Plot => "plot",
        };
        write!(f, "{s}")
    }
}

/// Hooks called around every step. All methods default to doing nothing.
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _step: Step, _rows: usize) {}

    fn stage_finished(&self, _step: Step, _rows: usize, _elapsed: Duration) {}

    fn stage_failed(&self, _step: Step, _error: &AppError) {}
}

/// Emits one `tracing` event per step boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn stage_started(&self, step: Step, rows: usize) {
        info!(%step, rows, "Stage started");
    }

    fn stage_finished(&self, step: Step, rows: usize, elapsed: Duration) {
        info!(%step, rows, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
    }

    fn stage_failed(&self, step: Step, error: &AppError) {
        warn!(%step, %error, "Stage failed");
    }
}

/// The table at `stage`'s prerequisite or later.
fn table_at(table: &mut Option<RecordTable>, stage: Stage) -> AppResult<&mut RecordTable> {
    match table {
        Some(table) => {
            stage.check(table.stage())?;
            Ok(table)
        }
        None => Err(AppError::InvalidStage {
            attempted: stage,
            required: stage.prerequisite(),
            found: Stage::Unloaded,
        }),
    }
}

/// Load → clean → embed → reduce → cluster → plot over one in-memory table.
///
/// Each step requires the previous one. `cluster` can be repeated with a
/// different `k` without redoing the earlier steps.
pub struct ClusteringPipeline<E: Embedder = AnyEmbedder, C: Clusterer = KMeans> {
    source: ResourceSource,
    extractor: Box<dyn Extractor>,
    embedder: E,
    reducer: Box<dyn Reducer>,
    clusterer: C,
    observer: Option<Box<dyn PipelineObserver>>,
    table: Option<RecordTable>,
}

impl<E: Embedder, C: Clusterer> ClusteringPipeline<E, C> {
    pub fn new(
        source: ResourceSource,
        extractor: impl Extractor + 'static,
        embedder: E,
        reducer: impl Reducer + 'static,
        clusterer: C,
    ) -> Self {
        Self {
            source,
            extractor: Box::new(extractor),
            embedder,
            reducer: Box::new(reducer),
            clusterer,
            observer: None,
            table: None,
        }
    }

    pub fn with_observer(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn table(&self) -> Option<&RecordTable> {
        self.table.as_ref()
    }

    pub fn clusterer(&self) -> &C {
        &self.clusterer
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Record behind the marker the presentation layer reported as selected.
    pub fn resolve_selection(&self, index: usize) -> AppResult<&Record> {
        self.table
            .as_ref()
            .ok_or(AppError::UnknownRow(index))?
            .resolve_selection(index)
    }

    fn rows(&self) -> usize {
        self.table.as_ref().map_or(0, RecordTable::len)
    }

    fn begin(&self, step: Step) -> Instant {
        if let Some(observer) = &self.observer {
            observer.stage_started(step, self.rows());
        }
        Instant::now()
    }

    fn end<T>(&self, step: Step, started: Instant, result: AppResult<T>) -> AppResult<T> {
        if let Some(observer) = &self.observer {
            match &result {
                Ok(_) => observer.stage_finished(step, self.rows(), started.elapsed()),
                Err(e) => observer.stage_failed(step, e),
            }
        }
        result
    }

    /// Read the source into a fresh table, discarding any previous one.
    #[tracing::instrument(name = "Loading", level = "debug", skip(self))]
    pub fn load(&mut self) -> AppResult<()> {
        let started = self.begin(Step::Load);
        let result = self.source.load(self.extractor.as_ref()).map(|collection| {
            if collection.is_empty() {
                warn!("No resources found in {:?}", self.source);
            }
            self.table = Some(collection.into_table());
        });
        self.end(Step::Load, started, result)
    }

    #[tracing::instrument(name = "Cleaning", level = "debug", skip(self))]
    pub fn clean(&mut self) -> AppResult<()> {
        let started = self.begin(Step::Clean);
        let result = self.clean_inner();
        self.end(Step::Clean, started, result)
    }

    fn clean_inner(&mut self) -> AppResult<()> {
        let table = table_at(&mut self.table, Stage::Cleaned)?;
        let cleaned: Vec<(RowId, String)> = table
            .rows()
            .iter()
            .map(|r| (r.id, clean_text(&r.description)))
            .collect();
        table.set_cleaned(cleaned)
    }

    #[tracing::instrument(name = "Embedding", level = "debug", skip(self))]
    pub async fn embed(&mut self) -> AppResult<()> {
        let started = self.begin(Step::Embed);
        let result = self.embed_inner().await;
        self.end(Step::Embed, started, result)
    }

    async fn embed_inner(&mut self) -> AppResult<()> {
        let table = table_at(&mut self.table, Stage::Embedded)?;
        let (ids, texts): (Vec<RowId>, Vec<String>) = table
            .rows()
            .iter()
            .map(|r| (r.id, r.embedding_text().to_string()))
            .unzip();
        let vectors = self.embedder.embed(&texts).await?;
        table.set_embeddings(ids.into_iter().zip(vectors))
    }

    #[tracing::instrument(name = "Reducing", level = "debug", skip(self))]
    pub fn reduce(&mut self) -> AppResult<()> {
        let started = self.begin(Step::Reduce);
        let result = self.reduce_inner();
        self.end(Step::Reduce, started, result)
    }

    fn reduce_inner(&mut self) -> AppResult<()> {
        let table = table_at(&mut self.table, Stage::Reduced)?;
        let reduced = self.reducer.reduce(&table.embedding_matrix()?)?;
        let ids: Vec<RowId> = table.ids().collect();
        table.set_reduced(ids.into_iter().zip(ndarray_to_rows(&reduced)))
    }

    /// Cluster the reduced vectors into `k` groups. A failed call leaves the
    /// table at the reduced stage.
    #[tracing::instrument(name = "Clustering", level = "debug", skip(self))]
    pub fn cluster(&mut self, k: usize) -> AppResult<()> {
        let started = self.begin(Step::Cluster);
        let result = self.cluster_inner(k);
        self.end(Step::Cluster, started, result)
    }

    fn cluster_inner(&mut self, k: usize) -> AppResult<()> {
        let table = table_at(&mut self.table, Stage::Clustered)?;
        let data = table.reduced_matrix()?;
        table.rewind(Stage::Reduced);
        let labels = self.clusterer.cluster(&data, k)?;
        let ids: Vec<RowId> = table.ids().collect();
        table.set_labels(ids.into_iter().zip(labels))
    }

    #[tracing::instrument(name = "Plotting", level = "debug", skip_all)]
    pub fn plot(&self, options: &PlotOptions) -> AppResult<Figure> {
        let started = self.begin(Step::Plot);
        let result = match &self.table {
            Some(table) => PlotBuilder::new(options.clone()).build(table, &self.clusterer),
            None => Err(AppError::Plot("nothing has been loaded".into())),
        };
        self.end(Step::Plot, started, result)
    }

    /// Every step in order, ending with the figure for `k` clusters.
    pub async fn run(&mut self, k: usize, options: &PlotOptions) -> AppResult<Figure> {
        self.load()?;
        self.clean()?;
        self.embed().await?;
        self.reduce()?;
        self.cluster(k)?;
        self.plot(options)
    }
}

impl ClusteringPipeline<AnyEmbedder, KMeans> {
    /// Build the configured extractor, embedder, reducer and clusterer.
    pub async fn from_config(config: &PipelineConfig) -> AppResult<Self> {
        let source = config.source()?.clone();
        let extractor = config.extractor.build()?;
        let reducer = config.reducer()?;
        let embedder = AnyEmbedder::from_kind(&config.embedder).await?;
        Ok(Self::new(
            source,
            extractor,
            embedder,
            reducer,
            config.clusterer(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::classify::{EmbedderKind, HashingEmbedder, PcaReducer};
    use crate::extract::ExtractorKind;
    use crate::plot::Trace;

    const DOCS: [(&str, &str, &str, &str); 5] = [
        ("a.md", "Linear Algebra", "Matrices, vectors and eigenvalues.", "https://example.com/linalg"),
        ("b.md", "Matrix Calculus", "Derivatives of matrices and vectors!", "https://example.com/matcalc"),
        ("c.md", "Rust Ownership", "Borrowing, lifetimes and ownership in Rust.", "https://example.com/rust"),
        ("d.md", "Async Rust", "Futures, executors and async Rust.", "https://example.com/async"),
        ("e.md", "Eigen Decomposition", "Eigenvalues of symmetric matrices.", "https://example.com/eigen"),
    ];

    fn write_docs(dir: &Path) {
        for (file, title, description, link) in DOCS {
            let body = format!(
                "## {title}\n\nIntro paragraph.\n\n### Description:\n{description}\n\n[Link]({link})\n"
            );
            fs::write(dir.join(file), body).unwrap();
        }
        fs::write(dir.join("notes.txt"), "## Not a resource").unwrap();
        fs::create_dir(dir.join("drafts")).unwrap();
        fs::write(dir.join("drafts").join("f.md"), "## Nested").unwrap();
    }

    fn pipeline(dir: &Path) -> ClusteringPipeline<HashingEmbedder, KMeans> {
        let mut km = KMeans::new();
        km.set_seed(Some(42));
        ClusteringPipeline::new(
            ResourceSource::Directory(dir.to_path_buf()),
            ExtractorKind::Heading.build().unwrap(),
            HashingEmbedder::new(64),
            PcaReducer::new(2).unwrap(),
            km,
        )
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl PipelineObserver for Recorder {
        fn stage_started(&self, step: Step, _rows: usize) {
            self.0.lock().unwrap().push(format!("start {step}"));
        }

        fn stage_finished(&self, step: Step, rows: usize, _elapsed: Duration) {
            self.0.lock().unwrap().push(format!("finish {step} {rows}"));
        }

        fn stage_failed(&self, step: Step, _error: &AppError) {
            self.0.lock().unwrap().push(format!("fail {step}"));
        }
    }

    #[tokio::test]
    async fn five_documents_become_five_markers() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(dir.path());

        let mut p = pipeline(dir.path());
        let fig = p.run(2, &PlotOptions::default()).await.unwrap();

        assert_eq!(fig.data.len(), 5);
        for (trace, (_, title, _, link)) in fig.data.iter().zip(DOCS) {
            let Trace::Scatter(t) = trace else {
                panic!("expected a 2-D trace")
            };
            assert_eq!(t.hovertext, vec![title.to_string()]);
            assert!(!t.hovertext[0].is_empty());
            assert_eq!(t.customdata, vec![link.to_string()]);
        }

        let table = p.table().unwrap();
        assert_eq!(table.stage(), Stage::Clustered);
        assert!(table.rows().iter().all(|r| r.cluster_label.is_some_and(|l| l < 2)));
        assert_eq!(
            table.rows()[2].cleaned_description.as_deref(),
            Some("borrowing lifetimes and ownership in rust")
        );
    }

    #[tokio::test]
    async fn selection_resolves_to_the_source_document() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(dir.path());
        let mut p = pipeline(dir.path());
        p.run(2, &PlotOptions::default()).await.unwrap();

        let record = p.resolve_selection(3).unwrap();
        assert_eq!(record.title, "Async Rust");
        assert_eq!(record.url, "https://example.com/async");
        assert!(matches!(p.resolve_selection(5), Err(AppError::UnknownRow(5))));
    }

    #[tokio::test]
    async fn steps_must_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(dir.path());
        let mut p = pipeline(dir.path());

        assert!(matches!(
            p.embed().await,
            Err(AppError::InvalidStage { found: Stage::Unloaded, .. })
        ));
        p.load().unwrap();
        assert!(matches!(
            p.cluster(2),
            Err(AppError::InvalidStage {
                attempted: Stage::Clustered,
                required: Stage::Reduced,
                found: Stage::Loaded
            })
        ));
        assert!(matches!(p.plot(&PlotOptions::default()), Err(AppError::Plot(_))));
    }

    #[tokio::test]
    async fn reclustering_with_another_k() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(dir.path());
        let mut p = pipeline(dir.path());
        p.run(2, &PlotOptions::default()).await.unwrap();

        p.cluster(3).unwrap();
        assert_eq!(p.clusterer().n_clusters().unwrap(), 3);
        let fig = p.plot(&PlotOptions::default()).unwrap();
        assert_eq!(fig.markers().count(), 5);
        let labels = p.clusterer().labels().unwrap();
        assert!(labels.iter().all(|&l| l < 3));
    }

    #[tokio::test]
    async fn failed_clustering_cannot_be_plotted() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(dir.path());
        let recorder = Recorder::default();
        let mut p = pipeline(dir.path()).with_observer(recorder.clone());
        p.run(2, &PlotOptions::default()).await.unwrap();

        assert!(matches!(
            p.cluster(6),
            Err(AppError::NotEnoughSamples { samples: 5, required: 6 })
        ));
        assert!(!p.clusterer().is_clustered());
        assert_eq!(p.table().unwrap().stage(), Stage::Reduced);
        assert!(p.plot(&PlotOptions::default()).is_err());

        let events = recorder.0.lock().unwrap();
        assert!(events.contains(&"fail cluster".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("fail plot"));
    }

    #[tokio::test]
    async fn observer_sees_every_step_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(dir.path());
        let recorder = Recorder::default();
        let mut p = pipeline(dir.path()).with_observer(recorder.clone());
        p.run(2, &PlotOptions::default()).await.unwrap();

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start load",
                "finish load 5",
                "start clean",
                "finish clean 5",
                "start embed",
                "finish embed 5",
                "start reduce",
                "finish reduce 5",
                "start cluster",
                "finish cluster 5",
                "start plot",
                "finish plot 5",
            ]
        );
    }

    #[tokio::test]
    async fn builds_from_config() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(dir.path());
        let config = PipelineConfig {
            source: Some(ResourceSource::Directory(dir.path().to_path_buf())),
            embedder: EmbedderKind::Hashing { dimensions: 32 },
            n_components: 3,
            ..PipelineConfig::default()
        };

        let mut p = ClusteringPipeline::<AnyEmbedder, KMeans>::from_config(&config)
            .await
            .unwrap();
        let fig = p.run(config.n_clusters, &config.plot).await.unwrap();
        assert_eq!(fig.markers().count(), 5);
        assert!(matches!(fig.data[0], Trace::Scatter3d(_)));
    }

    #[tokio::test]
    async fn csv_ratings_drive_marker_opacity() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("resources.csv");
        fs::write(
            &csv,
            "title,description,rating,link\n\
             Linear Algebra,Matrices and eigenvalues,1,https://example.com/linalg\n\
             Matrix Calculus,Derivatives of matrices,5,https://example.com/matcalc\n\
             Rust Ownership,Borrowing and lifetimes,3,https://example.com/rust\n\
             Async Rust,Futures and executors,,https://example.com/async\n\
             ,Eigenvalues of symmetric matrices,2,https://example.com/eigen\n",
        )
        .unwrap();

        let mut km = KMeans::new();
        km.set_seed(Some(42));
        let mut p = ClusteringPipeline::new(
            ResourceSource::Csv(csv),
            ExtractorKind::Heading.build().unwrap(),
            HashingEmbedder::new(64),
            PcaReducer::new(2).unwrap(),
            km,
        );
        let options = PlotOptions {
            rating_opacity: true,
            ..PlotOptions::default()
        };
        let fig = p.run(2, &options).await.unwrap();

        let opacities: Vec<f64> = fig
            .markers()
            .map(|t| t.marker.as_ref().unwrap().opacity)
            .collect();
        let expected = [0.2, 1.0, 0.6, 0.7, 0.4];
        assert_eq!(opacities.len(), expected.len());
        for (got, want) in opacities.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }

        let table = p.table().unwrap();
        assert_eq!(table.rows()[3].rating, None);
        assert_eq!(table.rows()[4].title, "Eigenvalues of symmetric matrices");
        assert_eq!(
            fig.data[1].scatter().customdata,
            vec!["https://example.com/matcalc".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&dir.path().join("missing"));
        assert!(matches!(p.load(), Err(AppError::Io(_))));
        assert!(p.table().is_none());
    }
}

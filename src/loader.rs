use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::AppResult;
use crate::extract::Extractor;
use crate::resource::{LearningResource, LearningResourceCollection};

/// File extension of documents picked up in directory mode.
pub const DOCUMENT_EXTENSION: &str = "md";

const CSV_TITLE_CHARS: usize = 60;

/// Where the resources come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ResourceSource {
    /// A flat directory of markdown documents.
    Directory(PathBuf),
    /// A CSV table with `description`, `rating` and `link` columns.
    Csv(PathBuf),
}

impl ResourceSource {
    pub fn load(&self, extractor: &dyn Extractor) -> AppResult<LearningResourceCollection> {
        match self {
            ResourceSource::Directory(dir) => ResourceLoader::new(dir, extractor).load(),
            ResourceSource::Csv(path) => load_csv(path),
        }
    }
}

/// Loads every markdown document of a directory through an extractor.
pub struct ResourceLoader<'a> {
    folder: &'a Path,
    extractor: &'a dyn Extractor,
}

impl<'a> ResourceLoader<'a> {
    pub fn new(folder: &'a Path, extractor: &'a dyn Extractor) -> Self {
        Self { folder, extractor }
    }

    /// Documents are visited in file-name order; subdirectories and files
    /// with other extensions are skipped.
    #[tracing::instrument(name = "Loading learning resources", level = "info", skip(self), fields(folder = %self.folder.display()))]
    pub fn load(&self) -> AppResult<LearningResourceCollection> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(self.folder)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() {
                trace!("Skipping non-file {}", path.display());
                continue;
            }
            if is_document(&path) {
                paths.push(path);
            } else {
                trace!("Skipping {}", path.display());
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut collection = LearningResourceCollection::new();
        for path in paths {
            let content = fs::read_to_string(&path)?;
            collection.add_resource(self.extractor.extract(&content)?);
        }
        debug!("Loaded {} resources", collection.len());
        Ok(collection)
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    title: Option<String>,
    description: String,
    // Required column; blank or unparsable cells become `None`.
    #[serde(deserialize_with = "csv::invalid_option")]
    rating: Option<f64>,
    link: String,
}

/// Load one resource per CSV row. `title` is optional; without it the
/// start of the description stands in.
#[tracing::instrument(name = "Loading learning resources from CSV", level = "info")]
pub fn load_csv(path: &Path) -> AppResult<LearningResourceCollection> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut collection = LearningResourceCollection::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        let title = match row.title.filter(|t| !t.is_empty()) {
            Some(title) => title,
            None => {
                warn!("CSV row without a title; using the description instead");
                row.description.chars().take(CSV_TITLE_CHARS).collect::<String>()
            }
        };
        collection.add_resource(
            LearningResource::new(title.trim(), row.description, row.link).with_rating(row.rating),
        );
    }
    debug!("Loaded {} resources", collection.len());
    Ok(collection)
}

use std::fmt::Display;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::classify::convert::{embeddings_to_ndarray, rows_to_ndarray};
use crate::resource::LearningResource;
use crate::{AppError, AppResult};

/// Explicit row identifier, assigned in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub usize);

impl Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How far the table has progressed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Unloaded,
    Loaded,
    Cleaned,
    Embedded,
    Reduced,
    Clustered,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Unloaded => "unloaded",
            Stage::Loaded => "loaded",
            Stage::Cleaned => "cleaned",
            Stage::Embedded => "embedded",
            Stage::Reduced => "reduced",
            Stage::Clustered => "clustered",
        };
        write!(f, "{s}")
    }
}

impl Stage {
    /// The stage a table must have reached before moving to `self`.
    pub fn prerequisite(self) -> Stage {
        match self {
            Stage::Unloaded | Stage::Loaded => Stage::Unloaded,
            Stage::Cleaned => Stage::Loaded,
            Stage::Embedded => Stage::Cleaned,
            Stage::Reduced => Stage::Embedded,
            Stage::Clustered => Stage::Reduced,
        }
    }

    pub(crate) fn check(self, found: Stage) -> AppResult<()> {
        let required = self.prerequisite();
        if found < required {
            return Err(AppError::InvalidStage {
                attempted: self,
                required,
                found,
            });
        }
        Ok(())
    }
}

/// One resource plus every column derived from it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RowId,
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_description: Option<String>,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_label: Option<usize>,
}

impl Record {
    fn from_resource(id: RowId, resource: LearningResource) -> Self {
        Self {
            id,
            title: resource.title,
            description: resource.description,
            url: resource.url,
            rating: resource.rating,
            cleaned_description: None,
            embedding: None,
            reduced: None,
            cluster_label: None,
        }
    }

    /// The text fed to the encoder: the cleaned description when present.
    pub fn embedding_text(&self) -> &str {
        self.cleaned_description.as_deref().unwrap_or(&self.description)
    }
}

/// The working table shared by every stage. Rows never move; each stage
/// fills one column keyed by `RowId` and discards the columns after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTable {
    stage: Stage,
    rows: Vec<Record>,
}

impl RecordTable {
    pub fn from_resources(resources: impl IntoIterator<Item = LearningResource>) -> Self {
        let rows = resources
            .into_iter()
            .enumerate()
            .map(|(i, res)| Record::from_resource(RowId(i), res))
            .collect();
        Self {
            stage: Stage::Loaded,
            rows,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.iter().map(|r| r.id)
    }

    pub fn get(&self, id: RowId) -> AppResult<&Record> {
        self.rows.get(id.0).ok_or(AppError::UnknownRow(id.0))
    }

    /// Map an index reported by the presentation layer (the marker's trace
    /// number) back to its record.
    pub fn resolve_selection(&self, index: usize) -> AppResult<&Record> {
        self.get(RowId(index))
    }

    /// Order a keyed column by row id, requiring exactly one value per row.
    fn align<T>(&self, values: impl IntoIterator<Item = (RowId, T)>) -> AppResult<Vec<T>> {
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(self.len()).collect();
        let mut found = 0;
        for (id, value) in values {
            let slot = slots.get_mut(id.0).ok_or(AppError::UnknownRow(id.0))?;
            if slot.replace(value).is_some() {
                return Err(AppError::DuplicateRow(id.0));
            }
            found += 1;
        }
        if found != self.len() {
            return Err(AppError::DimensionMismatch {
                expected: self.len(),
                found,
            });
        }
        Ok(slots.into_iter().flatten().collect())
    }

    fn rewind_to(&mut self, stage: Stage) {
        for row in &mut self.rows {
            if stage < Stage::Clustered {
                row.cluster_label = None;
            }
            if stage < Stage::Reduced {
                row.reduced = None;
            }
            if stage < Stage::Embedded {
                row.embedding = None;
            }
            if stage < Stage::Cleaned {
                row.cleaned_description = None;
            }
        }
        self.stage = stage;
    }

    /// Drop every column past `stage`. Moving forward is a no-op.
    pub fn rewind(&mut self, stage: Stage) {
        if stage < self.stage {
            self.rewind_to(stage);
        }
    }

    fn set_column<T>(
        &mut self,
        stage: Stage,
        values: impl IntoIterator<Item = (RowId, T)>,
        assign: impl Fn(&mut Record, T),
    ) -> AppResult<()> {
        stage.check(self.stage)?;
        let aligned = self.align(values)?;
        self.rewind_to(stage.prerequisite());
        for (row, value) in self.rows.iter_mut().zip(aligned) {
            assign(row, value);
        }
        self.stage = stage;
        Ok(())
    }

    pub fn set_cleaned(&mut self, values: impl IntoIterator<Item = (RowId, String)>) -> AppResult<()> {
        self.set_column(Stage::Cleaned, values, |row, v| row.cleaned_description = Some(v))
    }

    pub fn set_embeddings(
        &mut self,
        values: impl IntoIterator<Item = (RowId, Vec<f32>)>,
    ) -> AppResult<()> {
        self.set_column(Stage::Embedded, values, |row, v| row.embedding = Some(v))
    }

    pub fn set_reduced(&mut self, values: impl IntoIterator<Item = (RowId, Vec<f64>)>) -> AppResult<()> {
        self.set_column(Stage::Reduced, values, |row, v| row.reduced = Some(v))
    }

    pub fn set_labels(&mut self, values: impl IntoIterator<Item = (RowId, usize)>) -> AppResult<()> {
        self.set_column(Stage::Clustered, values, |row, v| row.cluster_label = Some(v))
    }

    /// Embedding column as a `(rows, dims)` matrix, in row order.
    pub fn embedding_matrix(&self) -> AppResult<Array2<f64>> {
        Stage::Reduced.check(self.stage)?;
        let embs: Vec<&[f32]> = self
            .rows
            .iter()
            .map(|r| r.embedding.as_deref().unwrap_or_default())
            .collect();
        embeddings_to_ndarray(&embs)
    }

    /// Reduced column as a `(rows, components)` matrix, in row order.
    pub fn reduced_matrix(&self) -> AppResult<Array2<f64>> {
        Stage::Clustered.check(self.stage)?;
        let rows: Vec<&[f64]> = self
            .rows
            .iter()
            .map(|r| r.reduced.as_deref().unwrap_or_default())
            .collect();
        rows_to_ndarray(&rows)
    }
}

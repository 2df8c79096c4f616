use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::classify::palette::Rgba;
use crate::classify::traits::Clusterer;
use crate::table::{Record, RecordTable, Stage};
use crate::topics::top_terms;
use crate::{AppError, AppResult};

const DEFAULT_OPACITY: f64 = 0.7;
const MIN_RATED_OPACITY: f64 = 0.2;

/// A Plotly-compatible figure: `{"data": [...], "layout": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

impl Figure {
    /// Marker traces only, in row order.
    pub fn markers(&self) -> impl Iterator<Item = &ScatterTrace> {
        self.data
            .iter()
            .map(Trace::scatter)
            .filter(|t| t.mode == Mode::Markers)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Scatter(ScatterTrace),
    Scatter3d(ScatterTrace),
}

impl Trace {
    fn new(dims: usize, trace: ScatterTrace) -> Self {
        if dims == 3 {
            Trace::Scatter3d(trace)
        } else {
            Trace::Scatter(trace)
        }
    }

    pub fn scatter(&self) -> &ScatterTrace {
        match self {
            Trace::Scatter(t) | Trace::Scatter3d(t) => t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Markers,
    Lines,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterTrace {
    pub mode: Mode,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Line>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hovertext: Vec<String>,
    pub hoverinfo: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub customdata: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub textposition: Option<&'static str>,
}

impl ScatterTrace {
    fn at(mode: Mode, points: &[&[f64]]) -> Self {
        let coord = |i: usize| points.iter().map(|p| p[i]).collect::<Vec<_>>();
        Self {
            mode,
            x: coord(0),
            y: coord(1),
            z: points.first().filter(|p| p.len() == 3).map(|_| coord(2)),
            marker: None,
            line: None,
            hovertext: Vec::new(),
            hoverinfo: "skip",
            customdata: Vec::new(),
            text: Vec::new(),
            textposition: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub size: f64,
    pub opacity: f64,
    pub color: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub color: Rgba,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub showlegend: bool,
    pub autosize: bool,
    pub width: u32,
    pub height: u32,
    pub clickmode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<Scene>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub visible: bool,
    pub showgrid: bool,
    pub zeroline: bool,
    pub showticklabels: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaleanchor: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaleratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constrain: Option<&'static str>,
}

impl Axis {
    fn hidden() -> Self {
        Self {
            visible: false,
            showgrid: false,
            zeroline: false,
            showticklabels: false,
            scaleanchor: None,
            scaleratio: None,
            constrain: None,
        }
    }

    /// Hidden axis locked to a 1:1 ratio with the y axis.
    fn square() -> Self {
        Self {
            scaleanchor: Some("y"),
            scaleratio: Some(1.0),
            constrain: Some("domain"),
            ..Self::hidden()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub zaxis: Axis,
    pub aspectmode: &'static str,
}

/// Presentation switches for [`PlotBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotOptions {
    /// Draw a line from the origin to every marker. 3-D plots only.
    pub origin_lines: bool,
    /// Label each centroid with its cluster's most frequent terms.
    pub centroid_annotations: bool,
    pub annotation_terms: usize,
    /// Fade markers by their min-max normalized rating.
    pub rating_opacity: bool,
    pub marker_size: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            origin_lines: false,
            centroid_annotations: false,
            annotation_terms: 3,
            rating_opacity: false,
            marker_size: 16.0,
            width: 600,
            height: 600,
        }
    }
}

fn plot_error(reason: impl std::fmt::Display) -> AppError {
    AppError::Plot(reason.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct PlotBuilder {
    pub options: PlotOptions,
}

impl PlotBuilder {
    pub fn new(options: PlotOptions) -> Self {
        Self { options }
    }

    /// One marker trace per row (trace index == row id), then origin lines,
    /// then centroid annotations.
    #[instrument(name = "Building plot", level = "info", skip_all, fields(rows = table.len()))]
    pub fn build(&self, table: &RecordTable, clusterer: &dyn Clusterer) -> AppResult<Figure> {
        if table.stage() != Stage::Clustered {
            return Err(plot_error(format!("table is {}, not clustered", table.stage())));
        }
        let labels = clusterer.labels().map_err(plot_error)?;
        let points = reduced_points(table)?;
        let dims = points.first().map_or(2, |p| p.len());

        if labels.len() != table.len() {
            return Err(plot_error(format!(
                "clusterer holds {} labels for {} rows",
                labels.len(),
                table.len()
            )));
        }

        for (row, &label) in table.rows().iter().zip(labels) {
            if row.cluster_label != Some(label) {
                return Err(plot_error(format!(
                    "row {} is labeled {:?} in the table but {label} by the clusterer",
                    row.id, row.cluster_label
                )));
            }
        }

        let opacities = self.opacities(table.rows());
        let mut data = Vec::with_capacity(table.len() * 2);

        for ((row, point), opacity) in table.rows().iter().zip(&points).zip(&opacities) {
            let label = row.cluster_label.unwrap_or_default();
            let color = clusterer.color_for(label).map_err(plot_error)?;
            let mut trace = ScatterTrace::at(Mode::Markers, &[*point]);
            trace.marker = Some(Marker {
                size: self.options.marker_size,
                opacity: *opacity,
                color,
            });
            trace.hovertext = vec![row.title.clone()];
            trace.hoverinfo = "text";
            trace.customdata = vec![row.url.clone()];
            data.push(Trace::new(dims, trace));
        }

        if self.options.origin_lines {
            if dims == 3 {
                for (row, point) in table.rows().iter().zip(&points) {
                    let label = row.cluster_label.unwrap_or_default();
                    let color = clusterer.color_for(label).map_err(plot_error)?;
                    let origin = [0.0; 3];
                    let mut trace = ScatterTrace::at(Mode::Lines, &[&origin[..], *point]);
                    trace.line = Some(Line { color, width: 2.0 });
                    data.push(Trace::new(dims, trace));
                }
            } else {
                debug!("Origin lines are only drawn in 3-D plots");
            }
        }

        if self.options.centroid_annotations {
            data.extend(self.annotations(table, clusterer, dims)?);
        }

        Ok(Figure {
            data,
            layout: self.layout(dims),
        })
    }

    fn opacities(&self, rows: &[Record]) -> Vec<f64> {
        let fallback = vec![DEFAULT_OPACITY; rows.len()];
        if !self.options.rating_opacity {
            return fallback;
        }
        let rated = rows.iter().filter_map(|r| r.rating);
        let (min, max) = rated.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(r), hi.max(r))
        });
        if max <= min {
            return fallback;
        }
        rows.iter()
            .map(|r| match r.rating {
                Some(rating) => {
                    MIN_RATED_OPACITY + (1.0 - MIN_RATED_OPACITY) * (rating - min) / (max - min)
                }
                None => DEFAULT_OPACITY,
            })
            .collect()
    }

    fn annotations(
        &self,
        table: &RecordTable,
        clusterer: &dyn Clusterer,
        dims: usize,
    ) -> AppResult<Vec<Trace>> {
        let centroids = clusterer.centroids().map_err(plot_error)?;
        let mut traces = Vec::with_capacity(centroids.len());
        for (label, centroid) in centroids {
            if centroid.len() != dims {
                return Err(plot_error(format!(
                    "centroid of cluster {label} has {} components, expected {dims}",
                    centroid.len()
                )));
            }
            let texts: Vec<&str> = table
                .rows()
                .iter()
                .filter(|r| r.cluster_label == Some(label))
                .map(Record::embedding_text)
                .collect();
            let terms = top_terms(&texts, self.options.annotation_terms);
            if terms.is_empty() {
                continue;
            }
            let center = centroid.to_vec();
            let mut trace = ScatterTrace::at(Mode::Text, &[center.as_slice()]);
            trace.text = vec![terms.join(", ")];
            trace.textposition = Some("middle center");
            traces.push(Trace::new(dims, trace));
        }
        Ok(traces)
    }

    fn layout(&self, dims: usize) -> Layout {
        let mut layout = Layout {
            showlegend: false,
            autosize: false,
            width: self.options.width,
            height: self.options.height,
            clickmode: "event+select",
            xaxis: None,
            yaxis: None,
            scene: None,
        };
        if dims == 3 {
            layout.scene = Some(Scene {
                xaxis: Axis::hidden(),
                yaxis: Axis::hidden(),
                zaxis: Axis::hidden(),
                aspectmode: "cube",
            });
        } else {
            layout.xaxis = Some(Axis::square());
            layout.yaxis = Some(Axis::hidden());
        }
        layout
    }
}

fn reduced_points(table: &RecordTable) -> AppResult<Vec<&[f64]>> {
    let points: Vec<&[f64]> = table
        .rows()
        .iter()
        .map(|r| {
            r.reduced
                .as_deref()
                .ok_or_else(|| plot_error(format!("row {} has no reduced vector", r.id)))
        })
        .collect::<AppResult<_>>()?;
    let dims = points.first().map_or(2, |p| p.len());
    if !(2..=3).contains(&dims) || points.iter().any(|p| p.len() != dims) {
        return Err(plot_error(format!(
            "reduced vectors must all have 2 or 3 components, first row has {dims}"
        )));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::kmeans::KMeans;
    use crate::clean::clean_text;
    use crate::resource::LearningResource;
    use crate::table::RowId;

    fn clustered(points: &[Vec<f64>], ratings: &[Option<f64>]) -> (RecordTable, KMeans) {
        let resources = points.iter().enumerate().map(|(i, _)| {
            LearningResource::new(
                format!("Resource {i}"),
                if i % 2 == 0 { "Eigenvalue matrix tensor" } else { "Ownership borrowck lifetimes" },
                format!("https://example.com/{i}"),
            )
            .with_rating(ratings.get(i).copied().flatten())
        });
        let mut table = RecordTable::from_resources(resources);
        let ids: Vec<RowId> = table.ids().collect();
        let cleaned: Vec<(RowId, String)> = table
            .rows()
            .iter()
            .map(|r| (r.id, clean_text(&r.description)))
            .collect();
        table.set_cleaned(cleaned).unwrap();
        table
            .set_embeddings(ids.iter().map(|&id| (id, vec![0.0f32; 4])))
            .unwrap();
        table
            .set_reduced(ids.iter().copied().zip(points.iter().cloned()))
            .unwrap();

        let mut km = KMeans::new();
        km.set_seed(Some(7));
        let labels = km.cluster(&table.reduced_matrix().unwrap(), 2).unwrap();
        table.set_labels(ids.into_iter().zip(labels)).unwrap();
        (table, km)
    }

    fn square_2d() -> Vec<Vec<f64>> {
        vec![
            vec![-5.0, -5.0],
            vec![5.0, 5.0],
            vec![-5.2, -4.8],
            vec![5.1, 4.9],
        ]
    }

    #[test]
    fn one_marker_per_row_in_row_order() {
        let (table, km) = clustered(&square_2d(), &[]);
        let fig = PlotBuilder::default().build(&table, &km).unwrap();

        assert_eq!(fig.data.len(), 4);
        for (i, trace) in fig.data.iter().enumerate() {
            let Trace::Scatter(t) = trace else {
                panic!("expected a 2-D trace")
            };
            assert_eq!(t.mode, Mode::Markers);
            assert_eq!(t.hovertext, vec![format!("Resource {i}")]);
            assert_eq!(t.customdata, vec![format!("https://example.com/{i}")]);
            assert_eq!(t.x, vec![table.rows()[i].reduced.as_ref().unwrap()[0]]);
            let label = table.rows()[i].cluster_label.unwrap();
            assert_eq!(t.marker.as_ref().unwrap().color, km.color_for(label).unwrap());
        }
    }

    #[test]
    fn layout_is_square_and_axis_free() {
        let (table, km) = clustered(&square_2d(), &[]);
        let fig = PlotBuilder::default().build(&table, &km).unwrap();
        let json = serde_json::to_value(&fig).unwrap();

        assert_eq!(json["data"][0]["type"], "scatter");
        assert_eq!(json["data"][0]["hoverinfo"], "text");
        assert_eq!(json["layout"]["showlegend"], false);
        assert_eq!(json["layout"]["clickmode"], "event+select");
        assert_eq!(json["layout"]["xaxis"]["scaleanchor"], "y");
        assert_eq!(json["layout"]["xaxis"]["showgrid"], false);
        assert_eq!(json["layout"]["width"], 600);
        assert!(json["data"][0].get("z").is_none());
    }

    #[test]
    fn origin_lines_follow_markers_in_3d() {
        let points = vec![
            vec![-5.0, -5.0, 1.0],
            vec![5.0, 5.0, 1.0],
            vec![-5.2, -4.8, 0.0],
            vec![5.1, 4.9, 0.0],
        ];
        let (table, km) = clustered(&points, &[]);
        let builder = PlotBuilder::new(PlotOptions {
            origin_lines: true,
            ..PlotOptions::default()
        });
        let fig = builder.build(&table, &km).unwrap();

        assert_eq!(fig.data.len(), 8);
        assert_eq!(fig.markers().count(), 4);
        let Trace::Scatter3d(line) = &fig.data[5] else {
            panic!("expected a 3-D trace")
        };
        assert_eq!(line.mode, Mode::Lines);
        assert_eq!(line.x, vec![0.0, 5.0]);
        assert_eq!(line.z, Some(vec![0.0, 1.0]));
        assert_eq!(fig.layout.scene.as_ref().unwrap().aspectmode, "cube");
        assert!(fig.layout.xaxis.is_none());
    }

    #[test]
    fn origin_lines_are_skipped_in_2d() {
        let (table, km) = clustered(&square_2d(), &[]);
        let builder = PlotBuilder::new(PlotOptions {
            origin_lines: true,
            ..PlotOptions::default()
        });
        assert_eq!(builder.build(&table, &km).unwrap().data.len(), 4);
    }

    #[test]
    fn ratings_scale_marker_opacity() {
        let ratings = [Some(1.0), Some(5.0), Some(3.0), None];
        let (table, km) = clustered(&square_2d(), &ratings);
        let builder = PlotBuilder::new(PlotOptions {
            rating_opacity: true,
            ..PlotOptions::default()
        });
        let fig = builder.build(&table, &km).unwrap();
        let opacities: Vec<f64> = fig
            .markers()
            .map(|t| t.marker.as_ref().unwrap().opacity)
            .collect();
        let expected = [0.2, 1.0, 0.6, 0.7];
        for (got, want) in opacities.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    #[test]
    fn equal_ratings_use_the_default_opacity() {
        let ratings = [Some(4.0); 4];
        let (table, km) = clustered(&square_2d(), &ratings);
        let builder = PlotBuilder::new(PlotOptions {
            rating_opacity: true,
            ..PlotOptions::default()
        });
        let fig = builder.build(&table, &km).unwrap();
        assert!(fig.markers().all(|t| t.marker.as_ref().unwrap().opacity == 0.7));
    }

    #[test]
    fn centroid_annotations_name_each_cluster() {
        let (table, km) = clustered(&square_2d(), &[]);
        let builder = PlotBuilder::new(PlotOptions {
            centroid_annotations: true,
            annotation_terms: 2,
            ..PlotOptions::default()
        });
        let fig = builder.build(&table, &km).unwrap();

        assert_eq!(fig.data.len(), 6);
        let texts: Vec<&str> = fig.data[4..]
            .iter()
            .map(|t| t.scatter().text[0].as_str())
            .collect();
        assert!(texts.contains(&"eigenvalue, matrix"));
        assert!(texts.contains(&"borrowck, lifetimes"));
    }

    #[test]
    fn unclustered_table_cannot_be_plotted() {
        let table = RecordTable::from_resources(vec![LearningResource::new(
            "A",
            "a",
            "https://a",
        )]);
        let err = PlotBuilder::default().build(&table, &KMeans::new());
        assert!(matches!(err, Err(AppError::Plot(_))));
    }

    #[test]
    fn stale_clusterer_is_rejected() {
        let (table, mut km) = clustered(&square_2d(), &[]);
        let other = ndarray::array![[0.0, 0.0], [1.0, 1.0], [9.0, 9.0]];
        km.cluster(&other, 2).unwrap();
        let err = PlotBuilder::default().build(&table, &km);
        assert!(matches!(err, Err(AppError::Plot(_))));
    }
}

use std::path::Path;

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use vigilant_dev::AppResult;
use vigilant_dev::plot::Figure;
use vigilant_dev::table::RecordTable;

use crate::cli::OutputFormat;

pub const FIGURE_FILE: &str = "figure.json";
pub const RECORDS_FILE: &str = "records.json";

/// Figure and records in one JSON document.
#[derive(Serialize)]
struct PlotOutput<'a> {
    figure: &'a Figure,
    records: &'a RecordTable,
}

/// Write output in the requested format (json or directory layout).
#[tracing::instrument(name = "Saving output to disk", level = "debug", skip(figure, table))]
pub async fn write_output<P: AsRef<Path> + std::fmt::Debug>(
    output: P,
    format: &OutputFormat,
    figure: &Figure,
    table: &RecordTable,
) -> AppResult<()> {
    match format {
        OutputFormat::Json => {
            write_json_output(output, &PlotOutput { figure, records: table }).await
        }
        OutputFormat::Dir => write_dir_output(output, figure, table).await,
    }
}

/// Print the combined JSON document to stdout.
pub async fn print_output(figure: &Figure, table: &RecordTable) -> AppResult<()> {
    let data = serde_json::to_string_pretty(&PlotOutput { figure, records: table })?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(data.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

#[tracing::instrument(
    name = "Creating directories and writing output",
    level = "debug",
    skip(figure, table)
)]
async fn write_dir_output<P: AsRef<Path> + std::fmt::Debug>(
    output: P,
    figure: &Figure,
    table: &RecordTable,
) -> AppResult<()> {
    fs::create_dir_all(&output).await?;
    write_json_output(output.as_ref().join(FIGURE_FILE), figure).await?;
    write_json_output(output.as_ref().join(RECORDS_FILE), table).await?;
    Ok(())
}

/// Serialize an object to pretty JSON and write it to disk.
#[tracing::instrument(name = "Writing JSON file", level = "trace", skip(obj))]
async fn write_json_output<P: AsRef<Path> + std::fmt::Debug, S: Serialize>(
    output: P,
    obj: &S,
) -> AppResult<()> {
    let data = serde_json::to_string_pretty(obj)?;
    write_file(output, data).await
}

/// Write raw string data to a file, overwriting any existing content.
async fn write_file<P: AsRef<Path> + std::fmt::Debug>(output: P, data: String) -> AppResult<()> {
    if let Some(parent) = output.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)
        .await?;
    file.write_all(data.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigilant_dev::classify::{Clusterer, KMeans};
    use vigilant_dev::plot::PlotBuilder;
    use vigilant_dev::resource::LearningResource;
    use vigilant_dev::table::RowId;

    fn clustered() -> (Figure, RecordTable) {
        let mut table = RecordTable::from_resources(vec![
            LearningResource::new("A", "alpha", "https://a"),
            LearningResource::new("B", "beta", "https://b"),
            LearningResource::new("C", "gamma", "https://c"),
        ]);
        let ids: Vec<RowId> = table.ids().collect();
        table.set_cleaned(ids.iter().map(|&id| (id, "x".to_string()))).unwrap();
        table.set_embeddings(ids.iter().map(|&id| (id, vec![id.0 as f32]))).unwrap();
        table
            .set_reduced(ids.iter().map(|&id| (id, vec![id.0 as f64 * 10.0, 0.0])))
            .unwrap();
        let mut km = KMeans::new();
        km.set_seed(Some(1));
        let labels = km.cluster(&table.reduced_matrix().unwrap(), 2).unwrap();
        table.set_labels(ids.into_iter().zip(labels)).unwrap();
        let figure = PlotBuilder::default().build(&table, &km).unwrap();
        (figure, table)
    }

    #[tokio::test]
    async fn dir_format_writes_figure_and_records() {
        let (figure, table) = clustered();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("plot");
        write_output(&out, &OutputFormat::Dir, &figure, &table).await.unwrap();

        let fig: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(FIGURE_FILE)).unwrap()).unwrap();
        assert_eq!(fig["data"].as_array().unwrap().len(), 3);

        let records: RecordTable =
            serde_json::from_str(&std::fs::read_to_string(out.join(RECORDS_FILE)).unwrap()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records.resolve_selection(1).unwrap().url, "https://b");
    }

    #[tokio::test]
    async fn json_format_writes_one_document() {
        let (figure, table) = clustered();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("plot.json");
        write_output(&out, &OutputFormat::Json, &figure, &table).await.unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(doc["figure"]["layout"]["showlegend"], false);
        assert_eq!(doc["records"]["rows"][2]["title"], "C");
    }
}

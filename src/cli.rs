use std::fmt::Display;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Color, Style, Styles};
use clap::{ArgAction, Args, ColorChoice, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::{Generator, Shell, generate};
use clap_complete_nushell::Nushell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;

use vigilant_dev::classify::{AnyEmbedder, DEFAULT_MODEL, EmbedderKind, KMeans};
use vigilant_dev::config::PipelineConfig;
use vigilant_dev::extract::ExtractorKind;
use vigilant_dev::loader::ResourceSource;
use vigilant_dev::pipeline::{ClusteringPipeline, TracingObserver};
use vigilant_dev::{AppError, AppResult};

use crate::io_utils;

const BIN_NAME: &str = "vigilant-dev";

const STYLES: Styles = Styles::styled()
    .header(Style::new().bold())
    .usage(Style::new().bold())
    .error(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))))
    .literal(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
    .valid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
    .invalid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightRed))))
    .context(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta))))
    .context_value(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
    );

/// Long-form CLI description shown in `--help`.
const LONG_ABOUT: &str = "Vigilant Dev - Map your learning resources by topic

Reads a folder of markdown notes (one resource per file, with a `## Title`,
a `### Description:` section and a `[Link](url)`) or a CSV table with
`description`, `rating` and `link` columns, groups the resources by what their
descriptions are about and writes a Plotly-compatible scatter plot.

Defaults come from $XDG_CONFIG_HOME/vigilant-dev/config.json when it exists.
Flags override the file.";

/// Vigilant Dev - Map your learning resources by topic.
#[derive(Parser, Debug, Clone)]
#[command(author, version, propagate_version = true, about, long_about = Some(LONG_ABOUT), styles = STYLES)]
pub struct Cli {
    /// Color choice for the log output
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Subcommand to run
    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Cli {
    pub fn ansi(&self) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        }
    }
}

/// Output layout for the figure and the record table.
#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// One JSON document with `figure` and `records` keys
    Json,

    /// A directory holding `figure.json` and `records.json`
    Dir,
}

/// Text encoder choice on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedderChoice {
    /// Pretrained sentence encoder (needs the `local-ml` build feature)
    Bert,
    /// Offline feature hashing
    Hashing,
}

/// Top-level commands supported by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Cluster the resources and write the plot description
    Plot {
        #[command(flatten)]
        args: PlotArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Generate shell completion for a given shell
    Completion {
        /// Output file to write the completion script to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The shell to generate the completion for
        #[arg(value_enum)]
        shell: CompletionShell,

        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },
}

/// Supported completion targets for shell auto-completion.
#[derive(ValueEnum, Clone, Debug)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
    Nushell,
}

impl Display for CompletionShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionShell::Bash => "bash",
            CompletionShell::Zsh => "zsh",
            CompletionShell::Fish => "fish",
            CompletionShell::PowerShell => "powershell",
            CompletionShell::Elvish => "elvish",
            CompletionShell::Nushell => "nushell",
        };
        write!(f, "{}", s)
    }
}

impl Generator for &CompletionShell {
    fn generate(&self, cmd: &clap::builder::Command, buf: &mut dyn Write) {
        match self {
            CompletionShell::Bash => Shell::Bash.generate(cmd, buf),
            CompletionShell::Zsh => Shell::Zsh.generate(cmd, buf),
            CompletionShell::Fish => Shell::Fish.generate(cmd, buf),
            CompletionShell::PowerShell => Shell::PowerShell.generate(cmd, buf),
            CompletionShell::Elvish => Shell::Elvish.generate(cmd, buf),
            CompletionShell::Nushell => Nushell.generate(cmd, buf),
        }
    }

    fn file_name(&self, name: &str) -> String {
        match self {
            CompletionShell::Bash => Shell::Bash.file_name(name),
            CompletionShell::Zsh => Shell::Zsh.file_name(name),
            CompletionShell::Fish => Shell::Fish.file_name(name),
            CompletionShell::PowerShell => Shell::PowerShell.file_name(name),
            CompletionShell::Elvish => Shell::Elvish.file_name(name),
            CompletionShell::Nushell => Nushell.file_name(name),
        }
    }
}

/// Options for the `plot` command. Unset options keep the config file value.
#[derive(Args, Debug, Clone)]
pub struct PlotArgs {
    /// Folder of markdown resources (not searched recursively)
    #[arg(long, conflicts_with = "csv")]
    pub dir: Option<PathBuf>,

    /// CSV file with `description`, `rating` and `link` columns
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Number of clusters
    #[arg(short = 'k', long = "clusters", value_parser = clap::value_parser!(u8).range(2..=8))]
    pub clusters: Option<u8>,

    /// Number of principal components to plot
    #[arg(long, value_parser = clap::value_parser!(u8).range(2..=3))]
    pub components: Option<u8>,

    /// Seed for the k-means initialization
    #[arg(long, conflicts_with = "random_seed")]
    pub seed: Option<u64>,

    /// Draw a fresh seed for every run
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub random_seed: bool,

    /// Text encoder
    #[arg(long, value_enum)]
    pub embedder: Option<EmbedderChoice>,

    /// Hugging Face model id for the `bert` encoder
    #[arg(long)]
    pub model: Option<String>,

    /// Reject resources whose link is not http(s)
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub validate_urls: bool,

    /// Config file to read instead of the default one
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Draw a line from the origin to every marker (3-D only)
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub origin_lines: bool,

    /// Label each cluster with its most frequent terms
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub annotate: bool,

    /// Fade markers by rating (CSV input)
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub rating_opacity: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Output file or directory
    /// If not provided, prints to stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl PlotArgs {
    /// Layer the flags that were given over `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.dir {
            config.source = Some(ResourceSource::Directory(dir.clone()));
        }
        if let Some(csv) = &self.csv {
            config.source = Some(ResourceSource::Csv(csv.clone()));
        }
        if let Some(k) = self.clusters {
            config.n_clusters = usize::from(k);
        }
        if let Some(n) = self.components {
            config.n_components = usize::from(n);
        }
        if self.random_seed {
            config.seed = None;
        } else if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if self.validate_urls {
            config.extractor = ExtractorKind::ValidatedHeading;
        }
        match (self.embedder, &self.model) {
            (Some(EmbedderChoice::Hashing), _) => {
                if !matches!(config.embedder, EmbedderKind::Hashing { .. }) {
                    config.embedder = EmbedderKind::Hashing {
                        dimensions: vigilant_dev::classify::hashing::DEFAULT_DIMENSIONS,
                    };
                }
            }
            (Some(EmbedderChoice::Bert), model) => {
                let model = model.clone().or_else(|| match &config.embedder {
                    EmbedderKind::Bert { model } => Some(model.clone()),
                    EmbedderKind::Hashing { .. } => None,
                });
                config.embedder = EmbedderKind::Bert {
                    model: model.unwrap_or_else(|| String::from(DEFAULT_MODEL)),
                };
            }
            (None, Some(model)) => {
                config.embedder = EmbedderKind::Bert {
                    model: model.clone(),
                };
            }
            (None, None) => {}
        }
        config.plot.origin_lines |= self.origin_lines;
        config.plot.centroid_annotations |= self.annotate;
        config.plot.rating_opacity |= self.rating_opacity;
    }
}

/// Helper trait for accessing verbosity flags on commands.
pub trait GetVerbosity {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel>;
}

impl GetVerbosity for Cmd {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel> {
        match self {
            Cmd::Plot { verbosity, .. } => verbosity,
            Cmd::Completion { verbosity, .. } => verbosity,
        }
    }
}

impl Cmd {
    pub async fn run(&self) -> AppResult<()> {
        match self {
            Cmd::Plot { args, .. } => run_plot(args).await,
            Cmd::Completion { shell, output, .. } => {
                let mut cmd = Cli::command();
                if let Some(output_path) = output {
                    let mut file = std::fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .create(true)
                        .open(output_path)?;
                    generate(shell, &mut cmd, BIN_NAME, &mut file);
                    info!(
                        "Generated completion script for {} at {}",
                        shell,
                        output_path.display()
                    );
                } else {
                    generate(shell, &mut cmd, BIN_NAME, &mut std::io::stdout());
                }
                Ok(())
            }
        }
    }
}

#[tracing::instrument(name = "Mapping learning resources", level = "info", skip(args))]
async fn run_plot(args: &PlotArgs) -> AppResult<()> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let mut pipeline = ClusteringPipeline::<AnyEmbedder, KMeans>::from_config(&config)
        .await?
        .with_observer(TracingObserver);
    let figure = pipeline.run(config.n_clusters, &config.plot).await?;
    let table = pipeline
        .table()
        .ok_or_else(|| AppError::Other("pipeline finished without a record table".into()))?;

    match &args.output {
        Some(output) => {
            io_utils::write_output(output, &args.format, &figure, table).await?;
            info!("Wrote {} resources to {}", table.len(), output.display());
        }
        None => io_utils::print_output(&figure, table).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> PlotArgs {
        let cli = Cli::try_parse_from([&[BIN_NAME, "plot"][..], args].concat()).unwrap();
        match cli.cmd {
            Cmd::Plot { args, .. } => args,
            Cmd::Completion { .. } => panic!("expected the plot command"),
        }
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "--csv",
            "res.csv",
            "-k",
            "4",
            "--components",
            "3",
            "--seed",
            "9",
            "--embedder",
            "hashing",
            "--origin-lines",
        ]);
        let mut config = PipelineConfig::default();
        args.apply(&mut config);

        assert_eq!(config.source, Some(ResourceSource::Csv("res.csv".into())));
        assert_eq!(config.n_clusters, 4);
        assert_eq!(config.n_components, 3);
        assert_eq!(config.seed, Some(9));
        assert!(matches!(config.embedder, EmbedderKind::Hashing { .. }));
        assert!(config.plot.origin_lines);
        assert!(!config.plot.centroid_annotations);
    }

    #[test]
    fn unset_flags_keep_config_values() {
        let args = parse(&[]);
        let mut config = PipelineConfig {
            n_clusters: 5,
            seed: Some(3),
            ..PipelineConfig::default()
        };
        args.apply(&mut config);
        assert_eq!(config.n_clusters, 5);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.source, None);
    }

    #[test]
    fn model_flag_selects_bert() {
        let args = parse(&["--model", "org/encoder", "--random-seed"]);
        let mut config = PipelineConfig::default();
        args.apply(&mut config);
        assert_eq!(
            config.embedder,
            EmbedderKind::Bert {
                model: "org/encoder".into()
            }
        );
        assert_eq!(config.seed, None);
    }

    #[test]
    fn cluster_count_is_range_checked() {
        let parse_k = |k: &str| Cli::try_parse_from([BIN_NAME, "plot", "--dir", ".", "-k", k]);
        assert!(parse_k("1").is_err());
        assert!(parse_k("9").is_err());
        assert!(parse_k("8").is_ok());
    }

    #[test]
    fn dir_and_csv_conflict() {
        assert!(Cli::try_parse_from([BIN_NAME, "plot", "--dir", ".", "--csv", "x.csv"]).is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }
}

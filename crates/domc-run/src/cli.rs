use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use domc_core::{
    Alignment, CLUSTER_CUTOFF, Cluster, ClusterOptions, CorpusOptions, MAX_DOM_DEPTH, MergeOptions,
    Merger, Node, Page, TEMPLATE_CUTOFF, TailCost, build_template, cluster_pages, load_corpus_with,
    pairwise_distances, read_corpus_with,
};
use miette::IntoDiagnostic;
use serde::Serialize;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "domc")]
#[command(version)]
#[command(after_help = "Examples:\n\n\
    To cluster the pages of a corpus file:\n\
    $ domc cluster pages.jsonl\n\n\
    To list the ten closest page pairs:\n\
    $ domc pairs --top 10 pages.jsonl\n\n\
    To print one merged template per cluster as JSON:\n\
    $ cat pages.jsonl | domc template -F json")]
#[command(
    about = "domc groups HTML pages that share the structure of their DOM trees.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Option<Commands>,

    #[clap(flatten)]
    merge: MergeArgs,

    #[clap(flatten)]
    output: OutputArgs,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Debug, Default, clap::ValueEnum)]
enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum TailCostArg {
    /// Charge the extra children of whichever side has them
    #[default]
    Unmatched,
    /// Charge the first page's extra children twice (historical scoring)
    Legacy,
}

impl From<TailCostArg> for TailCost {
    fn from(value: TailCostArg) -> Self {
        match value {
            TailCostArg::Unmatched => TailCost::Unmatched,
            TailCostArg::Legacy => TailCost::Legacy,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum AlignmentArg {
    /// Pair children by their index
    #[default]
    Positional,
    /// Pair children along the cheapest insert, delete and substitute edits
    EditDistance,
}

impl From<AlignmentArg> for Alignment {
    fn from(value: AlignmentArg) -> Self {
        match value {
            AlignmentArg::Positional => Alignment::Positional,
            AlignmentArg::EditDistance => Alignment::EditDistance,
        }
    }
}

#[derive(Clone, Debug, clap::Args, Default)]
struct MergeArgs {
    /// How children without a positional counterpart are charged
    #[arg(long, value_enum, default_value_t, global = true)]
    tail_cost: TailCostArg,

    /// How the children of matching elements are paired up
    #[arg(long, value_enum, default_value_t, global = true)]
    align: AlignmentArg,
}

impl From<&MergeArgs> for MergeOptions {
    fn from(args: &MergeArgs) -> Self {
        MergeOptions {
            tail_cost: args.tail_cost.into(),
            alignment: args.align.into(),
        }
    }
}

#[derive(Clone, Debug, clap::Args, Default)]
struct OutputArgs {
    /// Output format
    #[arg(short = 'F', long, value_enum, default_value_t, global = true)]
    output_format: Format,
}

#[derive(Clone, Debug, clap::Args)]
struct InputArgs {
    /// Line-delimited JSON corpus, one `{"url": ..., "dom": ...}` record per line. Reads stdin when omitted
    file: Option<PathBuf>,

    /// Reject pages whose DOM is nested deeper than this
    #[arg(long, default_value_t = MAX_DOM_DEPTH)]
    max_depth: usize,
}

#[derive(Clone, Debug, clap::Args)]
struct ClusterArgs {
    /// Maximum distance between a page and its cluster's representative
    #[arg(short, long, default_value_t = CLUSTER_CUTOFF, value_parser = parse_cutoff)]
    cutoff: f64,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Group pages that lie within the cutoff of a representative page
    Cluster {
        #[clap(flatten)]
        input: InputArgs,
        #[clap(flatten)]
        cluster: ClusterArgs,
    },
    /// List the distance of every pair of pages, closest first
    Pairs {
        #[clap(flatten)]
        input: InputArgs,
        /// Only print the N closest pairs
        #[arg(long, value_name = "N")]
        top: Option<usize>,
    },
    /// Cluster pages, then merge each cluster into a template tree
    Template {
        #[clap(flatten)]
        input: InputArgs,
        #[clap(flatten)]
        cluster: ClusterArgs,
        /// Pages at this distance from the template or further are left out of it
        #[arg(long, default_value_t = TEMPLATE_CUTOFF, value_parser = parse_cutoff)]
        template_cutoff: f64,
    },
}

fn parse_cutoff(value: &str) -> Result<f64, String> {
    let cutoff = value.parse::<f64>().map_err(|e| e.to_string())?;

    if cutoff.is_finite() && cutoff >= 0.0 {
        Ok(cutoff)
    } else {
        Err(format!("expected a non-negative number, got {value}"))
    }
}

impl InputArgs {
    fn read_pages(&self) -> miette::Result<Vec<Page>> {
        let options = CorpusOptions {
            max_depth: self.max_depth,
        };
        let pages = match &self.file {
            Some(path) => load_corpus_with(path, &options)?,
            None => read_corpus_with(io::stdin().lock(), &options)?,
        };

        tracing::info!(pages = pages.len(), "corpus loaded");
        Ok(pages)
    }
}

#[derive(Serialize)]
struct ClusterOutput<'a> {
    representative: &'a str,
    members: Vec<&'a str>,
}

#[derive(Serialize)]
struct PairOutput<'a> {
    i: usize,
    j: usize,
    a: &'a str,
    b: &'a str,
    distance: f64,
}

#[derive(Serialize)]
struct TemplateOutput<'a> {
    representative: &'a str,
    members: Vec<&'a str>,
    pages: usize,
    template: &'a Node,
}

impl Cli {
    pub fn init_tracing(&self) {
        let level = match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, 2) => "debug",
            _ => "trace",
        };

        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .with_writer(io::stderr)
            .init();
    }

    pub fn run(&self) -> miette::Result<()> {
        let Some(command) = &self.commands else {
            return Cli::command().print_help().into_diagnostic();
        };

        let merger = Merger::new(MergeOptions::from(&self.merge));

        let stdout = io::stdout();
        if !stdout.is_terminal() {
            colored::control::set_override(false);
        }
        let mut handle = BufWriter::new(stdout.lock());

        match command {
            Commands::Cluster { input, cluster } => {
                let pages = input.read_pages()?;
                let clusters = cluster_by_index(&merger, &pages, cluster);
                self.write_clusters(&mut handle, &pages, &clusters)?;
            }
            Commands::Pairs { input, top } => {
                let pages = input.read_pages()?;
                self.write_pairs(&mut handle, &merger, &pages, *top)?;
            }
            Commands::Template {
                input,
                cluster,
                template_cutoff,
            } => {
                let pages = input.read_pages()?;
                let clusters = cluster_by_index(&merger, &pages, cluster);
                self.write_templates(&mut handle, &merger, &pages, &clusters, *template_cutoff)?;
            }
        }

        handle.flush().into_diagnostic()?;

        let stats = merger.stats();
        tracing::debug!(
            cache_hits = stats.cache_hits,
            computed = stats.computed,
            cached_pairs = stats.cached_pairs,
            "merge cache statistics"
        );

        Ok(())
    }

    fn write_clusters(
        &self,
        handle: &mut impl Write,
        pages: &[Page],
        clusters: &[Cluster<usize>],
    ) -> miette::Result<()> {
        match self.output.output_format {
            Format::Json => {
                let output = clusters
                    .iter()
                    .map(|cluster| ClusterOutput {
                        representative: &pages[cluster.representative].url,
                        members: urls(pages, &cluster.members),
                    })
                    .collect::<Vec<_>>();
                write_json(handle, &output)
            }
            Format::Text => {
                for (n, cluster) in clusters.iter().enumerate() {
                    writeln!(
                        handle,
                        "{} {}: {} pages",
                        "Cluster".bold(),
                        n + 1,
                        cluster.len()
                    )
                    .into_diagnostic()?;

                    for &member in &cluster.members {
                        let marker = if member == cluster.representative {
                            "*"
                        } else {
                            " "
                        };
                        writeln!(handle, "  {} {}", marker, pages[member].url).into_diagnostic()?;
                    }
                }
                Ok(())
            }
        }
    }

    fn write_pairs(
        &self,
        handle: &mut impl Write,
        merger: &Merger,
        pages: &[Page],
        top: Option<usize>,
    ) -> miette::Result<()> {
        let report = pairwise_distances(merger, pages);
        let shown = report.iter().take(top.unwrap_or(usize::MAX));

        match self.output.output_format {
            Format::Json => {
                let output = shown
                    .map(|pair| PairOutput {
                        i: pair.i,
                        j: pair.j,
                        a: &pages[pair.i].url,
                        b: &pages[pair.j].url,
                        distance: pair.distance,
                    })
                    .collect::<Vec<_>>();
                write_json(handle, &output)
            }
            Format::Text => {
                let mut builder = Builder::default();
                builder.push_record(["i", "j", "page a", "page b", "distance"]);
                for pair in shown {
                    builder.push_record([
                        pair.i.to_string(),
                        pair.j.to_string(),
                        pages[pair.i].url.clone(),
                        pages[pair.j].url.clone(),
                        format!("{:.6}", pair.distance),
                    ]);
                }

                let mut table = builder.build();
                table.with(Style::markdown());
                writeln!(handle, "{}", table).into_diagnostic()
            }
        }
    }

    fn write_templates(
        &self,
        handle: &mut impl Write,
        merger: &Merger,
        pages: &[Page],
        clusters: &[Cluster<usize>],
        template_cutoff: f64,
    ) -> miette::Result<()> {
        let templates = clusters
            .iter()
            .filter_map(|cluster| {
                let members = cluster.members.iter().map(|&i| &pages[i].dom);
                build_template(merger, members, template_cutoff).map(|t| (cluster, t))
            })
            .collect::<Vec<_>>();

        match self.output.output_format {
            Format::Json => {
                let output = templates
                    .iter()
                    .map(|(cluster, template)| TemplateOutput {
                        representative: &pages[cluster.representative].url,
                        members: urls(pages, &cluster.members),
                        pages: template.pages(),
                        template: template.node(),
                    })
                    .collect::<Vec<_>>();
                write_json(handle, &output)
            }
            Format::Text => {
                for (n, (cluster, template)) in templates.iter().enumerate() {
                    writeln!(
                        handle,
                        "{} {}: {} of {} pages, representative {}",
                        "Template".bold(),
                        n + 1,
                        template.pages(),
                        cluster.len(),
                        pages[cluster.representative].url
                    )
                    .into_diagnostic()?;
                    write!(handle, "{}", template.node().outline()).into_diagnostic()?;
                }
                Ok(())
            }
        }
    }
}

fn cluster_by_index(merger: &Merger, pages: &[Page], args: &ClusterArgs) -> Vec<Cluster<usize>> {
    let keyed = pages
        .iter()
        .enumerate()
        .map(|(i, page)| (i, &page.dom))
        .collect::<Vec<_>>();

    cluster_pages(merger, &keyed, &ClusterOptions { cutoff: args.cutoff })
}

fn urls<'a>(pages: &'a [Page], members: &[usize]) -> Vec<&'a str> {
    members.iter().map(|&i| pages[i].url.as_str()).collect()
}

fn write_json(handle: &mut impl Write, value: &impl Serialize) -> miette::Result<()> {
    serde_json::to_writer_pretty(&mut *handle, value).into_diagnostic()?;
    writeln!(handle).into_diagnostic()
}

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, error::ErrorKind};

use crate::catalog::compute_catalog_statistics;
use crate::config::{GraphStatsConfig, PassMode, SourceConfig, StatsConfig};
use crate::constants::graph::DEFAULT_HOP_SOURCES;
use crate::constants::stats::{DEFAULT_GRAPH_TOP_N, DEFAULT_TITLE, DEFAULT_TOP_K};
use crate::errors::StatsError;
use crate::graph::{SimilarityGraph, build_graph, graph_name};
use crate::graph_stats::{ScoreFileProvider, compute_graph_statistics, top_packages};
use crate::orchestrator::{GroupState, RunReport};
use crate::source::{JsonLinesSource, PackageFilter, RetryingSource};

#[derive(Debug, Parser)]
#[command(
    name = "appstats",
    disable_help_subcommand = true,
    about = "Play Store catalog and similarity graph statistics",
    long_about = "Build the app similarity graph from a catalog dump, compute graph statistics from precomputed centrality tables, or compute catalog statistics directly from the records.",
    after_help = "Statistics already present in the output cache are skipped unless --overwrite is given."
)]
struct AppStatsCli {
    #[arg(
        long = "create-graph",
        value_name = "OUTPUT_GRAPH_PATH",
        group = "mode",
        help = "Build the similarity graph; the path must not include an extension"
    )]
    create_graph: Option<PathBuf>,
    #[arg(
        long = "compute-statistics",
        value_name = "GRAPH_PATH",
        group = "mode",
        help = "Compute statistics for a .graph.json file"
    )]
    compute_statistics: Option<PathBuf>,
    #[arg(
        long = "compute-db-statistics",
        value_name = "OUTPUT_STATS_PATH",
        group = "mode",
        help = "Compute catalog statistics; the path is a prefix (several files are created)"
    )]
    compute_db_statistics: Option<PathBuf>,
    #[arg(
        long = "get-top-packages",
        num_args = 2,
        value_names = ["N_PACKAGES", "GRAPH_PATH"],
        group = "mode",
        help = "Print the top N_PACKAGES packages by PageRank"
    )]
    get_top_packages: Option<Vec<String>>,
    #[arg(long, help = "Recompute statistics that are already cached")]
    overwrite: bool,
    #[arg(
        long,
        num_args = 1..,
        value_name = "PACKAGE",
        help = "Consider only the given package ids"
    )]
    packages: Vec<String>,
    #[arg(long, default_value = DEFAULT_TITLE, help = "Title used to label histogram artifacts")]
    title: String,
    #[arg(long, value_name = "PATH", help = "JSON-lines catalog dump (overrides the source config)")]
    records: Option<PathBuf>,
    #[arg(
        long = "source-config",
        value_name = "PATH",
        default_value = "dbconfig.json",
        help = "Record source configuration file"
    )]
    source_config: PathBuf,
    #[arg(
        long = "scores-dir",
        value_name = "DIR",
        help = "Directory holding <graph>_<metric>.json score tables (defaults to the graph directory)"
    )]
    scores_dir: Option<PathBuf>,
    #[arg(long, help = "Also report the top betweenness nodes")]
    betweenness: bool,
    #[arg(
        long = "per-group-passes",
        help = "Traverse the records once per stale group instead of once overall"
    )]
    per_group_passes: bool,
    #[arg(
        long = "top-k",
        default_value_t = DEFAULT_TOP_K,
        value_parser = parse_positive_usize,
        help = "Size of catalog rankings"
    )]
    top_k: usize,
    #[arg(
        long = "top-n",
        default_value_t = DEFAULT_GRAPH_TOP_N,
        value_parser = parse_positive_usize,
        help = "Size of graph centrality rankings"
    )]
    top_n: usize,
    #[arg(
        long = "hop-sources",
        default_value_t = DEFAULT_HOP_SOURCES,
        value_parser = parse_positive_usize,
        help = "BFS sources sampled for the hop distribution"
    )]
    hop_sources: usize,
}

/// Run the `appstats` command line with `args_iter` (program name excluded).
pub fn run<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<AppStatsCli, _>(std::iter::once("appstats".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    if let Some(out) = &cli.create_graph {
        let source = record_source(&cli)?;
        let graph = build_graph(&source, package_filter(&cli).as_ref())?;
        let files = graph.save(out)?;
        println!(
            "Graph with {} nodes and {} edges saved to {}",
            graph.node_count(),
            graph.edge_count(),
            files.graph.display()
        );
        return Ok(());
    }

    if let Some(graph_path) = &cli.compute_statistics {
        let provider = score_provider(&cli, graph_path);
        let config = GraphStatsConfig::default()
            .with_top_n(cli.top_n)
            .with_betweenness(cli.betweenness)
            .with_hop_sources(cli.hop_sources)
            .with_overwrite(cli.overwrite);
        let report = compute_graph_statistics(graph_path, &provider, &config)?;
        print_report(&report);
        return Ok(());
    }

    if let Some(values) = &cli.get_top_packages {
        let [count, graph_path] = values.as_slice() else {
            return Err("--get-top-packages expects N_PACKAGES and GRAPH_PATH".into());
        };
        let n = parse_positive_usize(count)?;
        let graph_path = PathBuf::from(graph_path);
        let graph = SimilarityGraph::load(&graph_path)?;
        let provider = score_provider(&cli, &graph_path);
        println!("{}", top_packages(&graph, &provider, n)?.join(" "));
        return Ok(());
    }

    if let Some(prefix) = &cli.compute_db_statistics {
        let source = record_source(&cli)?;
        let mut config = StatsConfig::new(prefix)
            .with_title(cli.title.clone())
            .with_overwrite(cli.overwrite)
            .with_top_k(cli.top_k);
        if !cli.packages.is_empty() {
            config = config.with_packages(cli.packages.clone());
        }
        if cli.per_group_passes {
            config = config.with_pass_mode(PassMode::PerGroup);
        }
        let report = compute_catalog_statistics(&source, &config)?;
        print_report(&report);
        return Ok(());
    }

    AppStatsCli::command().print_help()?;
    Ok(())
}

fn record_source(cli: &AppStatsCli) -> Result<RetryingSource<JsonLinesSource>, StatsError> {
    let mut config = SourceConfig::load(&cli.source_config)?;
    if let Some(records) = &cli.records {
        config = config.with_records_path(records);
    }
    Ok(RetryingSource::new(
        JsonLinesSource::from_config(&config),
        config.retry_policy(),
    ))
}

fn package_filter(cli: &AppStatsCli) -> Option<PackageFilter> {
    if cli.packages.is_empty() {
        None
    } else {
        Some(PackageFilter::new(cli.packages.iter().cloned()))
    }
}

fn score_provider(cli: &AppStatsCli, graph_path: &Path) -> ScoreFileProvider {
    let dir = cli
        .scores_dir
        .clone()
        .or_else(|| graph_path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    ScoreFileProvider::new(dir, graph_name(graph_path))
}

fn print_report(report: &RunReport) {
    for (group, state) in &report.outcomes {
        match state {
            GroupState::Failed(reason) => println!("  {group:<24} failed: {reason}"),
            other => println!("  {group:<24} {other:?}"),
        }
    }
    println!(
        "{} passes, {} records scanned",
        report.passes, report.records_scanned
    );
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        let parsed = parse_cli::<AppStatsCli, _>([
            "appstats",
            "--create-graph",
            "out",
            "--compute-db-statistics",
            "stats",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn help_is_not_an_error() {
        assert!(parse_cli::<AppStatsCli, _>(["appstats", "--help"]).unwrap().is_none());
    }

    #[test]
    fn top_packages_takes_count_and_path() {
        let cli = parse_cli::<AppStatsCli, _>(["appstats", "--get-top-packages", "5", "g.graph.json"])
            .unwrap()
            .unwrap();
        assert_eq!(
            cli.get_top_packages,
            Some(vec!["5".to_string(), "g.graph.json".to_string()])
        );
        assert_eq!(cli.title, DEFAULT_TITLE);
    }

    #[test]
    fn graph_build_and_top_packages_end_to_end() {
        let temp = tempdir().unwrap();
        let records = temp.path().join("records.jsonl");
        fs::write(
            &records,
            "{\"docid\": \"com.a\", \"similarTo\": [\"com.b\"]}\n{\"docid\": \"com.b\", \"similarTo\": [\"com.a\"]}\n",
        )
        .unwrap();
        let out = temp.path().join("play");
        let config = temp.path().join("dbconfig.json");
        run(args(&[
            "--create-graph",
            out.to_str().unwrap(),
            "--records",
            records.to_str().unwrap(),
            "--source-config",
            config.to_str().unwrap(),
        ]))
        .unwrap();
        let graph_path = temp.path().join("play.graph.json");
        assert!(graph_path.is_file());

        fs::write(temp.path().join("play_pageranks.json"), r#"{"0": 0.4, "1": 0.6}"#).unwrap();
        run(args(&["--get-top-packages", "1", graph_path.to_str().unwrap()])).unwrap();
        let all = usize::MAX.to_string();
        run(args(&["--get-top-packages", &all, graph_path.to_str().unwrap()])).unwrap();
    }
}

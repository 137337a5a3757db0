//! One-shot loader CLI: materialize preprocessor output into shared memory
//! and publish it atomically for the query servers.

use anyhow::{Context, Result};
use clap::Parser;
use dataset_layout::Namespace;
use datastore::Store;
use shm_barrier::RegistryView;
use source_import::SourcePaths;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Publish a routing dataset into shared memory.
#[derive(Parser, Debug)]
#[command(author, version, about = "Load routing data into shared memory", long_about = None)]
struct Cli {
    /// Graph topology file (fingerprint, checksum, node and edge arrays).
    #[arg(long, value_name = "FILE")]
    graph: Option<PathBuf>,

    /// Node coordinate file.
    #[arg(long, value_name = "FILE")]
    nodes: Option<PathBuf>,

    /// Per-edge annotation file (via node, name id, turn, travel mode).
    #[arg(long, value_name = "FILE")]
    edges: Option<PathBuf>,

    /// Street-name dictionary file (offsets, delta blocks, characters).
    #[arg(long, value_name = "FILE")]
    names: Option<PathBuf>,

    /// Geometry file (prefix-summed index, segment list, indicator bitset).
    #[arg(long, value_name = "FILE")]
    geometry: Option<PathBuf>,

    /// R-tree node file.
    #[arg(long, value_name = "FILE")]
    rtree: Option<PathBuf>,

    /// R-tree leaf file; readers open it lazily by the stored path.
    #[arg(long, value_name = "FILE")]
    leaf_index: Option<PathBuf>,

    /// Core-node marker bitset file.
    #[arg(long, value_name = "FILE")]
    core: Option<PathBuf>,

    /// Timestamp text file; when omitted a fallback marker is stored.
    #[arg(long, value_name = "FILE")]
    timestamp: Option<PathBuf>,

    /// Shared-memory namespace prefix.
    #[arg(long, default_value = Namespace::DEFAULT_PREFIX)]
    namespace: String,

    /// Print the currently published registry record and exit.
    #[arg(long)]
    list: bool,
}

fn source_paths(cli: &Cli) -> Result<SourcePaths> {
    Ok(SourcePaths {
        graph: cli.graph.clone().context("--graph is required")?,
        nodes: cli.nodes.clone().context("--nodes is required")?,
        edges: cli.edges.clone().context("--edges is required")?,
        names: cli.names.clone().context("--names is required")?,
        geometry: cli.geometry.clone().context("--geometry is required")?,
        rtree: cli.rtree.clone().context("--rtree is required")?,
        leaf_index: cli.leaf_index.clone().context("--leaf-index is required")?,
        core: cli.core.clone().context("--core is required")?,
        timestamp: cli.timestamp.clone(),
    })
}

fn list_registry(namespace: &Namespace) -> Result<()> {
    match RegistryView::open(namespace)? {
        Some(view) => {
            let record = view.record();
            match record.active_slot()? {
                Some(slot) => {
                    println!("active slot {slot:?}, timestamp {}", record.timestamp);
                }
                None => println!("registry present, nothing published yet"),
            }
        }
        None => println!("no registry: nothing has ever been published"),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let namespace = match Namespace::try_new(cli.namespace.clone()) {
        Ok(namespace) => namespace,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(2);
        }
    };

    if cli.list {
        return match list_registry(&namespace) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err:#}");
                ExitCode::from(2)
            }
        };
    }

    let paths = match source_paths(&cli) {
        Ok(paths) => paths,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::from(1);
        }
    };

    match Store::new(namespace, paths).run() {
        Ok(report) => {
            info!(
                slot = ?report.slot,
                timestamp = report.timestamp,
                reclaimed = ?report.reclaimed,
                "dataset published"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

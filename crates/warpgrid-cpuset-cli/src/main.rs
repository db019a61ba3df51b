use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cpuset",
    about = "WarpGrid topology-aware CPU placement for a node",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place workloads with the greedy packer (no solver)
    Greedy {
        #[command(flatten)]
        node: NodeArgs,
    },
    /// Place workloads by solving the integer program
    Exact {
        #[command(flatten)]
        node: NodeArgs,
        /// JSON file with the previous allocation (one bool vector per workload)
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Log model size and objective
        #[arg(short, long)]
        verbose: bool,
        /// Give up on the solver after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run the configured planner over named workloads.
    ///
    /// Workloads are read from a JSON array of {"id": ..., "request": ...}.
    /// A previous plan (JSON output of an earlier `plan`) is matched by id.
    Plan {
        /// Planner config (TOML). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Workloads JSON file
        #[arg(short, long)]
        workloads: PathBuf,
        /// Total hardware threads on the node
        #[arg(short, long)]
        threads: usize,
        /// Socket (package) count
        #[arg(short, long, default_value = "1")]
        sockets: usize,
        /// Previous plan JSON file
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Args, Debug, Clone)]
struct NodeArgs {
    /// Compute units per workload, comma separated (e.g. 3,3,2)
    #[arg(short, long, required = true, value_delimiter = ',', num_args = 1..)]
    requests: Vec<usize>,
    /// Total hardware threads on the node
    #[arg(short, long)]
    threads: usize,
    /// Socket (package) count
    #[arg(short, long, default_value = "1")]
    sockets: usize,
    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warpgrid_cpuset=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Greedy { node } => commands::allocate::greedy(
            &node.requests,
            node.threads,
            node.sockets,
            &node.format,
        ),
        Commands::Exact {
            node,
            previous,
            verbose,
            timeout_secs,
        } => commands::allocate::exact(
            &node.requests,
            node.threads,
            node.sockets,
            previous.as_deref(),
            verbose,
            timeout_secs,
            &node.format,
        ),
        Commands::Plan {
            config,
            workloads,
            threads,
            sockets,
            previous,
            format,
        } => commands::plan::plan(
            config.as_deref(),
            &workloads,
            threads,
            sockets,
            previous.as_deref(),
            &format,
        ),
    }
}

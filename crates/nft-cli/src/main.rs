mod report;

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use nft_analysis::classify::ParseFailurePolicy;
use nft_analysis::group::{group_by, order_by_time, GroupKey};
use nft_analysis::pipeline::{build_graph, run_query, AnalysisConfig, Query};
use nft_analysis::runtime::{batch_sizes, measure_batches, Workload};
use nft_analysis::sort::SortAlgorithm;
use nft_data::currency::CurrencyTable;
use nft_data::ingest::load_path;
use nft_data::Transaction;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct AppContext {
    config: AnalysisConfig,
}

#[derive(Parser, Debug)]
#[command(name = "nft-analyzer")]
#[command(about = "Rank, classify and link NFT marketplace transactions")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// JSON file with analysis settings; flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank buyers by number of purchases.
    RankBuyers(QueryArgs),
    /// Rank tokens by number of distinct buyers.
    RankTokens(QueryArgs),
    /// Classify tokens with the ratio/time-window fraud heuristic.
    Fraud(FraudArgs),
    /// Build the buyer-to-buyer hand-off graph.
    Graph(GraphArgs),
    /// Time a workload on growing batches of the input.
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// CSV export, or a directory of CSV exports.
    #[arg(long, short = 'i')]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output format: table (default), json or text.
    #[arg(long, default_value = "table")]
    output: String,

    /// Write the text report to this file as well.
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Maximum rows shown in table output.
    #[arg(long, default_value_t = 25)]
    limit: usize,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Sort algorithm: merge or radix.
    #[arg(long)]
    algorithm: Option<String>,
}

#[derive(Args, Debug)]
struct FraudArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Transactions per unique buyer above which a token may be fraudulent.
    #[arg(long)]
    ratio_threshold: Option<f64>,

    /// Window, in hours, after the first sale that counts as rapid resale.
    #[arg(long)]
    window_hours: Option<f64>,

    /// chrono format of the `Date Time (UTC)` column.
    #[arg(long)]
    time_format: Option<String>,

    /// Use unix timestamps when a display time fails to parse.
    #[arg(long)]
    unix_fallback: bool,
}

#[derive(Args, Debug)]
struct GraphArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Entity the hand-offs chain on: token or nft.
    #[arg(long)]
    entity: Option<String>,
}

#[derive(Args, Debug)]
struct BenchArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Workload to time: query or graph.
    #[arg(long, default_value = "query")]
    workload: String,

    /// Query to time: buyer-activity, token-popularity or token-fraud.
    #[arg(long)]
    query: Option<String>,

    /// Sort algorithm: merge or radix.
    #[arg(long)]
    algorithm: Option<String>,

    /// Repetitions per batch.
    #[arg(long)]
    runs: Option<usize>,

    /// Batch size increment.
    #[arg(long)]
    step: Option<usize>,

    /// Output format: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let config = match &cli.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };
    let ctx = AppContext { config };

    match cli.command {
        Commands::RankBuyers(args) => handle_query(&ctx, Query::BuyerActivity, args),
        Commands::RankTokens(args) => handle_query(&ctx, Query::TokenPopularity, args),
        Commands::Fraud(args) => handle_fraud(&ctx, args),
        Commands::Graph(args) => handle_graph(&ctx, args),
        Commands::Bench(args) => handle_bench(&ctx, args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Load, normalize prices and order by sale time.
fn load_transactions(input: &Path) -> Result<Vec<Transaction>> {
    let (mut txs, stats) = load_path(input)
        .wrap_err_with(|| format!("failed to load transactions from {}", input.display()))?;
    if txs.is_empty() {
        return Err(eyre!("no usable transactions in {}", input.display()));
    }

    let unpriced = CurrencyTable::default().normalize(&mut txs);
    order_by_time(&mut txs);

    info!(
        rows_read = stats.rows_read,
        kept = txs.len(),
        null_rows = stats.null_rows,
        duplicate_rows = stats.duplicate_rows,
        unpriced,
        "transactions loaded"
    );
    Ok(txs)
}

fn parse_algorithm(value: Option<&str>, fallback: SortAlgorithm) -> Result<SortAlgorithm> {
    match value {
        Some(raw) => raw.parse().map_err(|e: String| eyre!(e)),
        None => Ok(fallback),
    }
}

fn parse_entity(value: Option<&str>, fallback: GroupKey) -> Result<GroupKey> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(fallback),
        Some("token") => Ok(GroupKey::Token),
        Some("nft") => Ok(GroupKey::Nft),
        Some(other) => Err(eyre!("unsupported graph entity: {other} (expected token or nft)")),
    }
}

fn handle_query(ctx: &AppContext, query: Query, args: QueryArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    config.query = query;
    config.algorithm = parse_algorithm(args.algorithm.as_deref(), config.algorithm)?;
    run_and_print(&config, &args.input, &args.output)
}

fn handle_fraud(ctx: &AppContext, args: FraudArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    config.query = Query::TokenFraud;
    config.algorithm = parse_algorithm(args.query.algorithm.as_deref(), config.algorithm)?;

    if let Some(ratio) = args.ratio_threshold {
        config.classifier.ratio_threshold = ratio;
    }
    if let Some(hours) = args.window_hours {
        config.classifier.window_hours = hours;
    }
    if let Some(format) = args.time_format {
        config.classifier.time_format = format;
    }
    if args.unix_fallback {
        config.classifier.on_parse_failure = ParseFailurePolicy::UseUnixTime;
    }

    run_and_print(&config, &args.query.input, &args.query.output)
}

fn run_and_print(config: &AnalysisConfig, input: &InputArgs, output: &OutputArgs) -> Result<()> {
    let txs = load_transactions(&input.input)?;
    let report = run_query(&txs, config)
        .wrap_err_with(|| format!("{} query failed", config.query.as_str()))?;

    if output.output == "text" || output.out_file.is_some() {
        let groups = group_by(&txs, config.query.group_key())?;
        let text = report::query_text(&report, &groups);
        write_or_print(&text, output)?;
    }

    match output.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&report.records)
                .wrap_err("failed to serialize records to JSON")?;
            println!("{json}");
        }
        "text" => {}
        _ => {
            println!("\n{}\n", report::query_table(&report, output.limit));
            println!(
                "{} entities ranked with {} sort in {} ns\n",
                report.records.len(),
                report.algorithm.as_str(),
                report.sort_elapsed.as_nanos()
            );
        }
    }

    Ok(())
}

fn handle_graph(ctx: &AppContext, args: GraphArgs) -> Result<()> {
    let entity = parse_entity(args.entity.as_deref(), ctx.config.graph_entity)?;
    let txs = load_transactions(&args.input.input)?;
    let (graph, elapsed) = build_graph(&txs, entity).wrap_err("failed to build hand-off graph")?;

    if args.output.output == "text" || args.output.out_file.is_some() {
        write_or_print(&report::graph_text(&graph), &args.output)?;
    }

    match args.output.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&graph.edges())
                .wrap_err("failed to serialize edges to JSON")?;
            println!("{json}");
        }
        "text" => {}
        _ => {
            println!("\n{}\n", report::graph_table(&graph, args.output.limit));
            println!(
                "{} buyers, {} hand-offs, built in {} ns\n",
                graph.node_count(),
                graph.edge_count(),
                elapsed.as_nanos()
            );
        }
    }

    Ok(())
}

fn handle_bench(ctx: &AppContext, args: BenchArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(query) = args.query.as_deref() {
        config.query = query.parse().map_err(|e: String| eyre!(e))?;
    }
    config.algorithm = parse_algorithm(args.algorithm.as_deref(), config.algorithm)?;
    if let Some(runs) = args.runs {
        config.runs = runs;
    }
    if let Some(step) = args.step {
        config.batch_step = step;
    }

    let workload = match args.workload.as_str() {
        "query" => Workload::Query,
        "graph" => Workload::Graph,
        other => return Err(eyre!("unknown workload: {other} (expected query or graph)")),
    };

    let txs = load_transactions(&args.input.input)?;
    let batches = batch_sizes(txs.len(), config.batch_step).len() as u64;

    let pb = ProgressBar::new(batches);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
            .wrap_err("failed to create progress style")?
            .progress_chars("#>-"),
    );

    let timings = measure_batches(&txs, &config, workload, |timing| {
        pb.set_message(format!("{} txs", timing.batch_size));
        pb.inc(1);
    })
    .wrap_err("benchmark run failed")?;
    pb.finish_and_clear();

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&timings)
                .wrap_err("failed to serialize timings to JSON")?;
            println!("{json}");
        }
        _ => println!("\n{}\n", report::bench_table(&timings)),
    }

    info!(
        workload = ?workload,
        query = config.query.as_str(),
        algorithm = config.algorithm.as_str(),
        batches = timings.len(),
        runs = config.runs,
        "bench command completed"
    );
    Ok(())
}

fn write_or_print(text: &str, output: &OutputArgs) -> Result<()> {
    match &output.out_file {
        Some(path) => {
            ensure_parent_dir(path)?;
            std::fs::write(path, text)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create output directory {}", parent.display()))?;
    }
    Ok(())
}

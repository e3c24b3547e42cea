//! fedsearch CLI - federated search from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use fedsearch::keywords::Feature;
use fedsearch::{
    ChannelSink, FilterPipeline, HttpFetcher, RankedResult, SearchEvent, SearchMediator, Settings,
};

/// fedsearch - federated multi-engine search CLI
#[derive(Parser)]
#[command(name = "fedsearch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every configured engine
    Search(SearchArgs),

    /// List configured search engines
    Engines(EnginesArgs),
}

#[derive(Parser)]
struct SearchArgs {
    /// Search query
    query: String,

    /// Settings file describing the engines
    #[arg(short, long)]
    config: PathBuf,

    /// Keyword filters, e.g. "+:keyword:1080p -:keyword:cam"
    #[arg(long)]
    filter: Option<String>,

    /// Maximum number of results to display
    #[arg(short, long, default_value = "20")]
    limit: usize,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Parser)]
struct EnginesArgs {
    /// Settings file describing the engines
    #[arg(short, long)]
    config: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Results as they arrive, human readable
    Text,
    /// Final ranked list as JSON
    Json,
    /// Final ranked list, one line per result
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Search(args) => run_search(args).await,
        Commands::Engines(args) => list_engines(args),
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    Settings::from_file(path).with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn list_engines(args: EnginesArgs) -> Result<()> {
    let settings = load_settings(&args.config)?;
    if settings.engines.is_empty() {
        println!("No engines configured in {}", args.config.display());
        return Ok(());
    }

    println!("Configured search engines:\n");
    for engine in &settings.engines {
        let mut traits = vec![if engine.config.enabled { "enabled" } else { "disabled" }];
        if engine.crawler.is_some() {
            traits.push("crawls");
        }
        if engine.config.accepts_urls {
            traits.push("urls");
        }
        println!(
            "  {:<12} - {} [{}] timeout {}ms",
            engine.config.id,
            engine.config.name,
            traits.join(", "),
            engine.config.timeout_ms
        );
    }
    Ok(())
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let settings = load_settings(&args.config)?;
    let registry = settings.build_registry(Arc::new(HttpFetcher::new()?))?;
    if registry.is_empty() {
        anyhow::bail!("No engines configured in {}", args.config.display());
    }

    let pipeline = args
        .filter
        .as_deref()
        .map(FilterPipeline::parse)
        .unwrap_or_default();

    let (sink, mut events) = ChannelSink::new();
    let mediator = SearchMediator::new(Arc::new(registry), settings.search, Arc::new(sink));

    let start = Instant::now();
    let token = mediator.trigger_search_with_filters(&args.query, pipeline)?;

    let streaming = matches!(args.format, OutputFormat::Text);
    if streaming {
        println!("\nSearching for \"{}\"...\n", args.query);
    }

    let mut shown = 0;
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                mediator.stop_search(token);
                continue;
            }
        };
        let Some(event) = event else { break };
        match event {
            SearchEvent::Results { results, .. } if streaming => {
                for ranked in &results {
                    if shown < args.limit {
                        shown += 1;
                        print_result(shown, ranked);
                    }
                }
            }
            SearchEvent::EngineError { engine, message, .. } => {
                eprintln!("Warning: {} failed: {}", engine, message);
            }
            SearchEvent::Finished { token: finished } if finished == token => break,
            _ => {}
        }
    }

    let results = mediator.results(token);
    let elapsed = start.elapsed().as_millis();
    match args.format {
        OutputFormat::Text => {
            println!("{} results in {}ms, best matches:\n", results.len(), elapsed);
            for (i, ranked) in results.iter().take(args.limit.min(5)).enumerate() {
                println!("{}. {} ({:.2})", i + 1, ranked.result.display_name, ranked.relevance());
            }
            let suggestions: Vec<String> = mediator
                .keyword_suggestions(token, Feature::FileName)
                .into_iter()
                .take(8)
                .map(|(term, _)| format!("+:keyword:{}", term))
                .collect();
            if !suggestions.is_empty() {
                println!("\nRefine with --filter: {}", suggestions.join(" "));
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = results.iter().take(args.limit).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Compact => {
            for ranked in results.iter().take(args.limit) {
                println!(
                    "{:.3}\t{}\t{}\t{}",
                    ranked.relevance(),
                    ranked.engine,
                    ranked.result.display_name,
                    ranked.result.details_url
                );
            }
        }
    }

    Ok(())
}

fn print_result(index: usize, ranked: &RankedResult) {
    let result = &ranked.result;
    println!("{}. {}", index, result.display_name);
    if !result.details_url.is_empty() {
        println!("   URL: {}", result.details_url);
    }
    let mut details = vec![format!("Source: {}", ranked.engine)];
    if !ranked.seeds_label.is_empty() {
        details.push(format!("Seeds: {}", ranked.seeds_label));
    }
    if result.size >= 0 {
        details.push(format!("Size: {}", format_size(result.size)));
    }
    if let Some(ext) = &ranked.extension {
        details.push(format!("Type: {}", ext));
    }
    details.push(format!("Score: {:.2}", ranked.relevance()));
    println!("   {}", details.join(" | "));
    println!();
}

fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

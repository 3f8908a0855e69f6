//! parsitweet command-line front end.
//!
//! Usage:
//!   parsitweet preprocess --input tweets.txt --features --filter
//!   parsitweet keywords --text "..." --top 10
//!   parsitweet filter --text "..." --method censor
//!   parsitweet collect --user jack --max-items 200
//!   parsitweet collect --search "#خبر" --query-type top --max-pages 3
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use parsitweet::{
    ApiClient, BatchOptions, BatchProcessor, ClientConfig, Pagination, ProcessingConfig,
    QueryType, ReplacementMethod, TextProcessor, UserRef,
};

#[derive(Parser, Debug)]
#[command(name = "parsitweet", version, about = "Persian tweet preprocessing and collection")]
struct Args {
    /// JSON processing config; defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a file of texts, one per line, printing JSON lines
    Preprocess {
        #[arg(long)]
        input: PathBuf,
        /// Attach extracted features
        #[arg(long)]
        features: bool,
        /// Attach appropriateness check and censored text
        #[arg(long)]
        filter: bool,
    },
    /// Top-N keywords by term frequency
    Keywords {
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value = "10")]
        top: usize,
    },
    /// Check a text against the content filter and print the filtered text
    Filter {
        #[arg(long)]
        text: String,
        /// censor, remove or custom
        #[arg(long, default_value = "censor")]
        method: String,
    },
    /// Collect tweets from the API (TWITTER_* environment variables)
    Collect {
        /// Timeline of this user name
        #[arg(long, conflicts_with = "search")]
        user: Option<String>,
        /// Advanced-search query
        #[arg(long)]
        search: Option<String>,
        /// latest or top
        #[arg(long, default_value = "latest")]
        query_type: String,
        #[arg(long)]
        include_replies: bool,
        #[arg(long, default_value = "10")]
        max_pages: usize,
        #[arg(long)]
        max_items: Option<usize>,
    },
}

fn load_processor(path: Option<&PathBuf>) -> anyhow::Result<TextProcessor> {
    let config = match path {
        Some(p) => ProcessingConfig::from_json_file(p)
            .with_context(|| format!("loading config {}", p.display()))?,
        None => ProcessingConfig::default(),
    };
    config.validate().context("invalid processing config")?;
    Ok(TextProcessor::new(config))
}

fn read_lines(path: &PathBuf) -> anyhow::Result<Vec<String>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(raw.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match args.command {
        Command::Preprocess { input, features, filter } => {
            let processor = Arc::new(load_processor(args.config.as_ref())?);
            let texts = read_lines(&input)?;
            let batch_config = processor.config().batch.clone();
            let mut batch = BatchProcessor::new(processor, batch_config);
            batch.set_progress_callback(|done, total| {
                if done == total || done % 1000 == 0 {
                    info!(done, total, "progress");
                }
            });

            let opts = BatchOptions { preprocess: true, extract_features: features, filter_inappropriate: filter };
            for result in batch.process_texts(&texts, &opts) {
                serde_json::to_writer(&mut out, &result)?;
                writeln!(out)?;
            }
            let stats = batch.get_stats();
            info!(
                items = stats.total_items,
                errors = stats.error_count,
                per_second = stats.items_per_second,
                "preprocess finished"
            );
        }

        Command::Keywords { text, input, top } => {
            let processor = load_processor(args.config.as_ref())?;
            let text = match (text, input) {
                (Some(t), _) => t,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("either --text or --input is required"),
            };
            for (word, score) in processor.get_keywords(&text, top) {
                writeln!(out, "{word}\t{score:.4}")?;
            }
        }

        Command::Filter { text, method } => {
            let processor = load_processor(args.config.as_ref())?;
            let method: ReplacementMethod = method.parse()?;
            let report = serde_json::json!({
                "is_appropriate": processor.is_appropriate(&text),
                "score": processor.get_inappropriate_score(&text),
                "words": processor.get_inappropriate_words(&text),
                "filtered": processor.filter_with(&text, method),
            });
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }

        Command::Collect { user, search, query_type, include_replies, max_pages, max_items } => {
            let client = ApiClient::new(ClientConfig::from_env());
            let limits = Pagination { max_pages: Some(max_pages), max_items };
            let raw = match (user, search) {
                (Some(name), _) => client
                    .get_all_user_tweets(&UserRef::Name(name), include_replies, &limits)
                    .map_err(|e| anyhow::anyhow!(e.message()))?,
                (None, Some(query)) => {
                    let qt: QueryType = query_type.parse().map_err(anyhow::Error::msg)?;
                    client
                        .get_all_search_tweets(&query, qt, &limits)
                        .map_err(|e| anyhow::anyhow!(e.message()))?
                }
                (None, None) => bail!("either --user or --search is required"),
            };
            let tweets: Vec<_> = raw.iter().map(|t| client.transformer().transform_tweet(t)).collect();
            info!(count = tweets.len(), "collected tweets");
            serde_json::to_writer_pretty(&mut out, &tweets)?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    Ok(())
}

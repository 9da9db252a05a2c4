//! Command-line interface for capflow.
//!
//! Provides commands for running request batches through a
//! command-backed pipeline, inspecting the result log and showing the
//! resolved configuration.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::adapters::CommandAnalyzer;
use crate::core::{Pipeline, PipelineError, ResultLog};
use crate::domain::{AnalysisResult, Priority, Request};

/// capflow - Bounded-concurrency, priority-ordered, cached request pipeline
#[derive(Parser, Debug)]
#[command(name = "capflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run JSONL requests through a pipeline backed by an external command
    Run {
        /// Program that analyzes one request (input on stdin, output on stdout)
        #[arg(short, long)]
        command: String,

        /// Arguments passed to the program on every request
        #[arg(last = true)]
        args: Vec<String>,

        /// Request file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Override the concurrency ceiling
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Override the per-request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Do not append results to the result log
        #[arg(long)]
        no_log: bool,
    },

    /// Show results recorded in the result log
    History {
        /// Result log file (defaults to the configured log)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Only results completed at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<String>,

        /// Only failed results
        #[arg(long)]
        failed: bool,

        /// Show at most this many of the most recent results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                command,
                args,
                input,
                max_concurrent,
                timeout_ms,
                no_log,
            } => run_requests(command, args, input, max_concurrent, timeout_ms, no_log).await,
            Commands::History {
                log,
                since,
                failed,
                limit,
            } => show_history(log, since, failed, limit).await,
            Commands::Config => show_config().await,
        }
    }
}

/// One line of a request file
#[derive(Debug, Deserialize)]
struct RequestSpec {
    input: String,
    #[serde(default)]
    options: BTreeMap<String, String>,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    metadata: HashMap<String, String>,
    timeout_ms: Option<u64>,
}

impl RequestSpec {
    fn into_request(self) -> Request<String, BTreeMap<String, String>> {
        let mut request = Request::new(self.input, self.options).with_priority(self.priority);
        request.metadata = self.metadata;
        if let Some(ms) = self.timeout_ms {
            request = request.with_timeout(Duration::from_millis(ms));
        }
        request
    }
}

/// Parse a JSONL request file, skipping blank lines
fn parse_requests(content: &str) -> Result<Vec<RequestSpec>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid request on line {}", idx + 1))
        })
        .collect()
}

/// Read the request file or stdin
fn read_input(input_file: Option<PathBuf>) -> Result<String> {
    if let Some(path) = input_file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No input provided. Use --input <file> or pipe requests to stdin");
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

fn print_result<P: serde::Serialize>(result: &AnalysisResult<P>) -> Result<()> {
    let json = serde_json::to_string(result).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

/// Submit every request concurrently and print each result once
async fn run_requests(
    command: String,
    args: Vec<String>,
    input_file: Option<PathBuf>,
    max_concurrent: Option<usize>,
    timeout_ms: Option<u64>,
    no_log: bool,
) -> Result<()> {
    let cfg = crate::config::config()?;

    let mut settings = cfg.pipeline.clone();
    if let Some(n) = max_concurrent {
        settings.max_concurrent = n;
    }
    if let Some(ms) = timeout_ms {
        settings.request_timeout_ms = ms;
    }
    settings.validate().context("Invalid pipeline settings")?;

    let specs = parse_requests(&read_input(input_file)?)?;
    if specs.is_empty() {
        anyhow::bail!("Input contains no requests");
    }

    let analyzer = CommandAnalyzer::new(command).with_args(args);
    let pipeline = if no_log {
        Pipeline::new(analyzer, settings)
    } else {
        let log = ResultLog::open(&cfg.results_log)
            .await
            .with_context(|| format!("Failed to open result log: {}", cfg.results_log.display()))?;
        Pipeline::with_result_log(analyzer, settings, log)
    };

    // Queued requests only surface through the stream
    let mut stream = pipeline.subscribe().await;
    let collector = tokio::spawn(async move {
        let mut streamed = Vec::new();
        while let Some(result) = stream.recv().await {
            streamed.push(result);
        }
        streamed
    });

    info!(requests = specs.len(), "Submitting requests");
    let mut submissions = JoinSet::new();
    for spec in specs {
        let pipeline = pipeline.clone();
        submissions.spawn(async move { pipeline.submit(spec.into_request()).await });
    }

    let mut printed = HashSet::new();
    let mut queued = 0usize;
    while let Some(joined) = submissions.join_next().await {
        match joined.context("Submission task failed")? {
            Ok(result) => {
                print_result(&result)?;
                printed.insert(result.id);
            }
            Err(PipelineError::Queued(_)) => queued += 1,
            Err(e) => warn!(error = %e, "Request failed"),
        }
    }

    // Every submit waits for the drain it triggered, so the queue is empty
    pipeline.finish().await;
    let streamed = collector.await.context("Result collector failed")?;
    for result in streamed.iter().filter(|r| !printed.contains(&r.id)) {
        print_result(result)?;
    }

    let metrics = pipeline.metrics().await;
    eprintln!();
    eprintln!("Analyses:    {}", metrics.total_analyses);
    eprintln!("  succeeded: {}", metrics.successful_analyses);
    eprintln!("  failed:    {}", metrics.failed_analyses);
    eprintln!("  timeouts:  {}", metrics.timeouts);
    eprintln!("Cache hits:  {} ({:.0}%)", metrics.cache_hits, metrics.cache_hit_rate * 100.0);
    eprintln!("Queued:      {}", queued);
    eprintln!("Avg time:    {:?}", metrics.average_processing_time);

    if metrics.failed_analyses > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Print results from the result log
async fn show_history(
    log_path: Option<PathBuf>,
    since: Option<String>,
    failed_only: bool,
    limit: Option<usize>,
) -> Result<()> {
    let path = match log_path {
        Some(path) => path,
        None => crate::config::results_log_path()?,
    };

    let since = since
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|ts| ts.with_timezone(&Utc))
                .with_context(|| format!("Invalid timestamp: {}", s))
        })
        .transpose()?;

    let log = ResultLog::open(&path).await?;
    let results: Vec<AnalysisResult<serde_json::Value>> = match since {
        Some(ts) => log.since(ts).await?,
        None => log.replay().await?,
    };

    let mut selected: Vec<_> = results
        .into_iter()
        .filter(|r| !failed_only || !r.success)
        .collect();
    if let Some(limit) = limit {
        let skip = selected.len().saturating_sub(limit);
        selected.drain(..skip);
    }

    if selected.is_empty() {
        eprintln!("No results found in {}", path.display());
        return Ok(());
    }

    for result in &selected {
        print_result(result)?;
    }

    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = crate::config::config()?;

    println!("capflow configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:        {}", cfg.home.display());
    println!("  Result log:  {}", cfg.results_log.display());
    println!();
    println!("Pipeline:");
    let settings = serde_yaml::to_string(&cfg.pipeline).context("Failed to render settings")?;
    for line in settings.lines() {
        println!("  {}", line);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        let content = r#"
{"input": "hello"}

{"input": "world", "priority": "critical", "options": {"lang": "en"}, "metadata": {"src": "mic"}, "timeout_ms": 500}
"#;
        let specs = parse_requests(content).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].priority, Priority::Normal);

        let request = specs.into_iter().nth(1).unwrap().into_request();
        assert_eq!(request.input, "world");
        assert_eq!(request.priority, Priority::Critical);
        assert_eq!(request.options.get("lang"), Some(&"en".to_string()));
        assert_eq!(request.metadata.get("src"), Some(&"mic".to_string()));
        assert_eq!(request.timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_parse_requests_reports_line() {
        let content = "{\"input\": \"ok\"}\n{broken";
        let err = parse_requests(content).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_cli_parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "capflow",
            "run",
            "--command",
            "wc",
            "--max-concurrent",
            "2",
            "--",
            "-c",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                command,
                args,
                max_concurrent,
                no_log,
                ..
            } => {
                assert_eq!(command, "wc");
                assert_eq!(args, vec!["-c".to_string()]);
                assert_eq!(max_concurrent, Some(2));
                assert!(!no_log);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

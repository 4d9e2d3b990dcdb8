mod config;
mod db;
mod dom;
mod error;
mod highlight;
mod history;
mod page;
mod report;
mod scan;
mod text;
mod verify;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::error::ScanError;
use crate::highlight::MatchStrategy;
use crate::history::ResultStore;
use crate::page::HtmlPage;
use crate::scan::Scanner;
use crate::verify::http::HttpBackend;
use crate::verify::strategy::ScanMode;

#[derive(Parser)]
#[command(name = "factscan", about = "Flag questionable claims on a web page via a fact-checking backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a page (URL or local HTML file) and highlight flagged sentences
    Scan {
        /// http(s) URL or path to an HTML file
        target: String,
        /// Send the page in chunks to /verify-page instead of per sentence
        #[arg(long)]
        batch: bool,
        /// Loose first-five-words matching, highlighting whole text nodes
        #[arg(long)]
        fuzzy: bool,
        /// Write the highlighted HTML here
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Verification service base URL (overrides FACTSCAN_BACKEND_URL)
        #[arg(long)]
        backend: Option<String>,
    },
    /// List past scans, newest first
    History {
        /// Max rows to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show the flagged claims of one past scan
    Show {
        /// Row number from `history` (0 is newest)
        index: usize,
    },
    /// Aggregate counts and average confidence across history
    Stats,
    /// Delete all scan history
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    let result = match cli.command {
        Commands::Scan {
            target,
            batch,
            fuzzy,
            out,
            backend,
        } => {
            if let Some(url) = backend {
                settings.backend_url = url;
                settings = settings.sanitized();
            }
            let mode = if batch { ScanMode::Batch } else { ScanMode::PerSentence };
            let strategy = if fuzzy { MatchStrategy::Fuzzy } else { MatchStrategy::Precise };

            let store = ResultStore::open(&settings.db_path)?;
            let mut page = HtmlPage::load(&target).await?;
            let backend = Arc::new(HttpBackend::new(&settings.backend_url));
            println!("Scanning {} via {}...", target, backend.base_url());

            let scanner = Scanner::new(backend, settings).with_progress(true);
            match scanner.scan(&mut page, &store, mode, strategy).await {
                Ok(report) => {
                    println!("{}\n", report.status);
                    print!("{}", report::render_results(&report.results));
                    if let Some(path) = out {
                        page.write_to(&path)?;
                        println!(
                            "\nWrote {} highlight(s) to {}",
                            report.highlight.marks,
                            path.display()
                        );
                    }
                    Ok(())
                }
                Err(ScanError::NoText) => {
                    println!("{}", ScanError::NoText);
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::new(e)),
            }
        }
        Commands::History { limit } => {
            let store = ResultStore::open(&settings.db_path)?;
            let history = store.read()?;
            print!("{}", report::render_history(&history, limit));
            Ok(())
        }
        Commands::Show { index } => {
            let store = ResultStore::open(&settings.db_path)?;
            let history = store.read()?;
            let record = history
                .get(index)
                .with_context(|| format!("No scan #{} ({} in history)", index, history.len()))?;
            print!("{}", report::render_record(record));
            Ok(())
        }
        Commands::Stats => {
            let store = ResultStore::open(&settings.db_path)?;
            print!("{}", report::render_stats(&store.stats()?));
            Ok(())
        }
        Commands::Clear => {
            let store = ResultStore::open(&settings.db_path)?;
            store.clear()?;
            println!("History cleared.");
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

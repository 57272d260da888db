use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sundown::{discover, retire, Declaration, DiscoverOptions, Project, RetireOutcome};

#[derive(Parser)]
#[command(name = "sundown")]
#[command(about = "Kill-switch retirement for JS/TS projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover graduated kill-switch declarations.
    Scan {
        /// Project root to analyse.
        path: PathBuf,
        /// Graduation cutoff (YYYY-MM-DD). Default: 180 days ago.
        #[arg(long, value_parser = parse_date)]
        threshold: Option<NaiveDate>,
        /// Target a single flag id exactly, skipping date checks.
        #[arg(long)]
        flag: Option<String>,
        /// Restrict the scan to one file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Discover declarations and neutralize their call sites.
    ///
    /// Reports the in-memory result; modified source is never written back.
    Retire {
        /// Project root to analyse.
        path: PathBuf,
        /// Graduation cutoff (YYYY-MM-DD). Default: 180 days ago.
        #[arg(long, value_parser = parse_date)]
        threshold: Option<NaiveDate>,
        /// Target a single flag id exactly, skipping date checks.
        #[arg(long)]
        flag: Option<String>,
        /// Restrict discovery to one file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date {s:?}: {e}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan {
            path,
            threshold,
            flag,
            file,
            json,
        } => cmd_scan(&path, build_opts(threshold, flag, file), json),
        Commands::Retire {
            path,
            threshold,
            flag,
            file,
            json,
        } => cmd_retire(&path, build_opts(threshold, flag, file), json),
    }
}

fn build_opts(
    threshold: Option<NaiveDate>,
    flag: Option<String>,
    file: Option<PathBuf>,
) -> DiscoverOptions {
    let mut opts = DiscoverOptions {
        target_id: flag,
        file_hint: file,
        ..DiscoverOptions::default()
    };
    if let Some(threshold) = threshold {
        opts.threshold = threshold;
    }
    opts
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ScanReport<'a> {
    declarations: &'a [Declaration],
    identifiers: &'a [String],
}

fn cmd_scan(root: &Path, opts: DiscoverOptions, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root)?;
    let file_count = project.keys().count();
    let discovery = discover(&project, &opts);

    if json {
        let report = ScanReport {
            declarations: &discovery.declarations,
            identifiers: &discovery.identifiers,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("+------------------------------------------+");
    println!("| SUNDOWN SCAN                             |");
    println!("+------------------------------------------+");
    println!("| Files loaded   : {:>22} |", file_count);
    println!("| Eligible flags : {:>22} |", discovery.declarations.len());
    println!("+------------------------------------------+");

    if discovery.declarations.is_empty() {
        println!("No eligible kill switches found.");
    } else {
        println!("\nELIGIBLE DECLARATIONS:");
        for decl in &discovery.declarations {
            let date = decl
                .graduation_date()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {}:{} - {} [{}] graduated {}",
                decl.file, decl.start_line, decl.name, decl.flag_id, date
            );
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// retire
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RetireReport {
    flag_id: String,
    name: String,
    outcome: RetireOutcome,
}

fn cmd_retire(root: &Path, opts: DiscoverOptions, json: bool) -> anyhow::Result<()> {
    let mut project = Project::load(root)?;
    let discovery = discover(&project, &opts);

    let mut reports = Vec::new();
    for decl in &discovery.declarations {
        let outcome = retire(&mut project, decl);
        reports.push(RetireReport {
            flag_id: decl.flag_id.clone(),
            name: decl.name.clone(),
            outcome,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let node_total: usize = reports.iter().map(|r| r.outcome.modified_nodes.len()).sum();
    let file_total = distinct_file_count(&reports);

    println!("+------------------------------------------+");
    println!("| SUNDOWN RETIRE                           |");
    println!("+------------------------------------------+");
    println!("| Flags retired  : {:>22} |", reports.len());
    println!("| Nodes rewritten: {:>22} |", node_total);
    println!("| Files touched  : {:>22} |", file_total);
    println!("+------------------------------------------+");

    if reports.is_empty() {
        println!("No eligible kill switches found.");
    } else {
        for report in &reports {
            println!("\n{} [{}]:", report.name, report.flag_id);
            if report.outcome.modified_files.is_empty() {
                println!("  no remaining call sites");
            }
            for file in &report.outcome.modified_files {
                let count = report
                    .outcome
                    .modified_nodes
                    .iter()
                    .filter(|n| &n.file == file)
                    .count();
                println!("  {} ({} node{})", file, count, if count == 1 { "" } else { "s" });
            }
        }
        println!("\nChanges are in-memory only; write-back is up to the caller.");
    }

    Ok(())
}

/// Distinct files touched across all retired flags. A file rewritten for two
/// different flags counts once.
fn distinct_file_count(reports: &[RetireReport]) -> usize {
    reports
        .iter()
        .flat_map(|r| r.outcome.modified_files.iter())
        .collect::<std::collections::HashSet<_>>()
        .len()
}

#[cfg(test)]
mod test {
    use super::*;

    fn report(flag_id: &str, files: &[&str]) -> RetireReport {
        RetireReport {
            flag_id: flag_id.to_string(),
            name: format!("check_{flag_id}"),
            outcome: RetireOutcome {
                modified_nodes: Vec::new(),
                modified_files: files.iter().map(|f| f.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_distinct_file_count_shared_file_counts_once() {
        let reports = vec![
            report("a", &["src/app.ts", "src/util.ts"]),
            report("b", &["src/app.ts"]),
        ];
        assert_eq!(distinct_file_count(&reports), 2);
    }
}

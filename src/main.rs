use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process;

use quay_usage::api::QuayClient;
use quay_usage::config::Config;
use quay_usage::export::{export_store, ExportFormat};
use quay_usage::logging::init_logging;
use quay_usage::pipeline::{run_growth_fetch, run_ingest, IngestSettings};
use quay_usage::stats::{build_growth_summary, compile_stats, display_growth, display_stats, write_growth_summary};
use quay_usage::store::LogStore;
use quay_usage::window::{FetchWindow, WindowOverrides, WindowPlanner};

#[derive(Parser)]
#[command(name = "quay-usage")]
#[command(about = "Incremental usage-log ingestion and pull-activity reporting for Quay repositories")]
#[command(version)]
struct Cli {
    /// Path to the store database (overrides configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch raw usage logs incrementally into the store
    Fetch {
        /// Repository to ingest (repeatable; defaults to configuration)
        #[arg(long = "repo")]
        repos: Vec<String>,
        /// Window start override (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Window end override (YYYY-MM-DD, inclusive of the whole day)
        #[arg(long)]
        end_date: Option<String>,
        /// Output the run summary in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show statistics over the stored log records
    Stats {
        /// Restrict to one repository
        #[arg(long)]
        repo: Option<String>,
        /// Start date filter (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// End date filter (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
        /// Number of top items to display per ranking
        #[arg(long, default_value_t = 10)]
        top_n: usize,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Dump all stored records
    Export {
        /// Output format
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fetch aggregated daily counts and report monthly pull growth
    Growth {
        /// Repository to fetch (repeatable; defaults to configuration)
        #[arg(long = "repo")]
        repos: Vec<String>,
        /// Number of days to fetch when no explicit dates are given
        #[arg(long, default_value_t = 7)]
        days: i64,
        /// Window start override (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Window end override (YYYY-MM-DD, inclusive of the whole day)
        #[arg(long)]
        end_date: Option<String>,
        /// Write the machine-readable monthly summary to this file
        #[arg(long)]
        summary_file: Option<PathBuf>,
        /// Skip fetching, only report on already-stored data
        #[arg(long)]
        report_only: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    init_logging(&config.logging);
    if let Some(db) = &cli.db {
        config.store.db_path = db.clone();
    }
    let store = LogStore::new(&config.store.db_path);

    match cli.command {
        Commands::Fetch {
            repos,
            start_date,
            end_date,
            json,
        } => {
            let overrides = WindowOverrides {
                start_date: start_date.as_deref().map(|s| parse_date_arg(s, json)),
                end_date: end_date.as_deref().map(|s| parse_date_arg(s, json)),
            };
            let repositories = pick_repositories(repos, &config);
            let token = require_token(json);
            let client = QuayClient::new(&config.api.base_url, &token, config.fetch.page_size);
            let settings = IngestSettings {
                planner: WindowPlanner::new(config.fetch.overlap_hours, config.fetch.lookback_days),
                tag_page_size: config.fetch.tag_page_size,
            };

            let outcomes =
                match run_ingest(&client, &store, &repositories, &overrides, &settings).await {
                    Ok(outcomes) => outcomes,
                    Err(e) => return handle_error(e, json),
                };

            if json {
                let summary: Vec<_> = outcomes
                    .iter()
                    .map(|o| match &o.result {
                        Ok(report) => serde_json::json!({
                            "repository": o.repository,
                            "window": report.window,
                            "fetched": report.fetched,
                            "inserted": report.inserted,
                            "duplicates": report.duplicates,
                            "enriched": report.enriched,
                        }),
                        Err(err) => serde_json::json!({
                            "repository": o.repository,
                            "error": err.to_string(),
                        }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for outcome in &outcomes {
                    match &outcome.result {
                        Ok(report) => println!(
                            "{} {}: {} fetched, {} new, {} duplicates ({})",
                            "✅".bright_green(),
                            outcome.repository.bright_white().bold(),
                            report.fetched.to_string().bright_white(),
                            report.inserted.to_string().bright_green().bold(),
                            report.duplicates.to_string().bright_yellow(),
                            report.window,
                        ),
                        Err(err) => println!(
                            "{} {}: {}",
                            "❌".bright_red(),
                            outcome.repository.bright_white().bold(),
                            err.to_string().bright_red()
                        ),
                    }
                }
            }

            if !outcomes.is_empty() && outcomes.iter().all(|o| o.result.is_err()) {
                process::exit(1);
            }
            Ok(())
        }
        Commands::Stats {
            repo,
            since,
            until,
            top_n,
            json,
        } => {
            let since_ts = since
                .as_deref()
                .map(|s| day_start_epoch(parse_date_arg(s, json)));
            let until_ts = until
                .as_deref()
                .map(|s| day_end_epoch(parse_date_arg(s, json)));

            let records = match store.records_between(repo.as_deref(), since_ts, until_ts) {
                Ok(records) => records,
                Err(e) => return handle_error(e, json),
            };
            let stats = compile_stats(&records, top_n);
            display_stats(&stats, json);
            Ok(())
        }
        Commands::Export { format, output } => {
            match export_store(&store, format, output.as_deref()) {
                Ok(()) => Ok(()),
                Err(e) => handle_error(e, false),
            }
        }
        Commands::Growth {
            repos,
            days,
            start_date,
            end_date,
            summary_file,
            report_only,
            json,
        } => {
            if !report_only {
                let now = Utc::now();
                let window = match (
                    start_date.as_deref().map(|s| parse_date_arg(s, json)),
                    end_date.as_deref().map(|s| parse_date_arg(s, json)),
                ) {
                    (Some(start), end) => {
                        let overrides = WindowOverrides {
                            start_date: Some(start),
                            end_date: end,
                        };
                        WindowPlanner::new(config.fetch.overlap_hours, days)
                            .plan(None, &overrides, now)
                    }
                    (None, _) => FetchWindow {
                        start: now - Duration::days(days),
                        end: now,
                    },
                };

                let repositories = pick_repositories(repos, &config);
                let token = require_token(json);
                let client = QuayClient::new(&config.api.base_url, &token, config.fetch.page_size);

                let outcomes =
                    match run_growth_fetch(&client, &store, &repositories, &window).await {
                        Ok(outcomes) => outcomes,
                        Err(e) => return handle_error(e, json),
                    };

                if !json {
                    for outcome in &outcomes {
                        match &outcome.result {
                            Ok(report) => println!(
                                "{} {}: {} entries, {} new days, {} pulls in window",
                                "✅".bright_green(),
                                outcome.repository.bright_white().bold(),
                                report.fetched.to_string().bright_white(),
                                report.merged.to_string().bright_green(),
                                report.total_pulls.to_string().bright_green().bold(),
                            ),
                            Err(err) => println!(
                                "{} {}: {}",
                                "❌".bright_red(),
                                outcome.repository.bright_white().bold(),
                                err.to_string().bright_red()
                            ),
                        }
                    }
                }
                if !outcomes.is_empty() && outcomes.iter().all(|o| o.result.is_err()) {
                    process::exit(1);
                }
            }

            let summary = match build_growth_summary(&store, Utc::now()) {
                Ok(summary) => summary,
                Err(e) => return handle_error(e, json),
            };
            display_growth(&summary, json);
            if let Some(path) = summary_file {
                if let Err(e) = write_growth_summary(&summary, &path) {
                    return handle_error(e, json);
                }
            }
            Ok(())
        }
    }
}

/// Explicit --repo flags win over the configured repository list.
fn pick_repositories(cli_repos: Vec<String>, config: &Config) -> Vec<String> {
    if cli_repos.is_empty() {
        config.repositories.clone()
    } else {
        cli_repos
    }
}

fn require_token(json: bool) -> String {
    match std::env::var("QUAY_API_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => {
            if json {
                println!("{{\"error\": \"QUAY_API_TOKEN environment variable not set\"}}");
            } else {
                eprintln!("❌ Error: QUAY_API_TOKEN environment variable not set");
                eprintln!("Set it to a registry OAuth2 access token with log read permission");
            }
            process::exit(1);
        }
    }
}

fn parse_date_arg(value: &str, json: bool) -> NaiveDate {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            if !json {
                eprintln!("❌ Invalid date format: {}. Use YYYY-MM-DD", value);
            }
            process::exit(1);
        }
    }
}

fn day_start_epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp()
}

fn day_end_epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp()
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<()> {
    if json {
        println!("{{\"error\": \"{}\"}}", e);
    } else {
        eprintln!("Error: {}", e);
    }
    process::exit(1);
}

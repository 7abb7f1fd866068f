//! Alert context CLI
//!
//! Resolves alert rule definitions and investigates pod resets from the
//! command line. Configuration comes from the environment (see `Config`).

use alert_context::config::validate_repository;
use alert_context::logs::{error_lines, format_logs};
use alert_context::{
    AlertContext, Config, ConfigError, ResetInvestigationResult, ResetSettings, SearchResult,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

/// Alert enrichment - rule definitions and reset timelines
#[derive(Parser)]
#[command(name = "alert-context")]
#[command(about = "Alert enrichment - rule definitions and reset timelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (json or text)
    #[arg(long, default_value = "json", global = true)]
    format: OutputFormat,

    /// Log format on stderr (text or json)
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the rule definition for an alert
    Resolve {
        /// Alert name (e.g. KubePodCrashLooping)
        alert_name: String,
    },
    /// Reconstruct the latest restart timeline of a workload
    Investigate {
        /// Workload identifier (pod / hostname)
        #[arg(long)]
        workload: String,

        /// Minutes to look back for commit marker lines (1 to 10080)
        #[arg(long, default_value = "60")]
        window_minutes: u32,

        /// Maximum log lines after the anchor (1 to 10000)
        #[arg(long, default_value = "500")]
        log_limit: usize,

        /// Repository for commit lookups (owner/repo), overrides DEFAULT_CODE_REPO
        #[arg(long, value_parser = parse_repository)]
        repo: Option<String>,
    },
}

fn parse_repository(value: &str) -> Result<String, ConfigError> {
    validate_repository("--repo", value)?;
    Ok(value.to_string())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "alert_context=debug"
    } else {
        "alert_context=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = Config::from_env();
    let context = AlertContext::from_config(&config)?;

    match cli.command {
        Commands::Resolve { alert_name } => {
            let result = context.resolve_alert_rule(&alert_name).await;
            match cli.format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Text => print_search_result(&alert_name, &result),
            }
        }
        Commands::Investigate {
            workload,
            window_minutes,
            log_limit,
            repo,
        } => {
            let settings = ResetSettings {
                search_window_minutes: window_minutes,
                log_limit,
            };
            let result = context
                .investigate_reset(&workload, &settings, repo.as_deref())
                .await;
            match cli.format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Text => print_investigation(&result),
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{json}");
    Ok(())
}

fn print_search_result(alert_name: &str, result: &SearchResult) {
    println!("{} {}", "Alert:".bold(), alert_name);
    println!("{} {}", "Source:".bold(), result.source.as_str());

    let Some(rule) = &result.rule else {
        println!("{}", "Rule not found".red());
        if let Some(message) = &result.message {
            println!("  {message}");
        }
        if let Some(error) = &result.error {
            println!("  {} {error}", "Error:".red());
        }
        for file in &result.searched_files {
            println!("  searched {file}");
        }
        for file in &result.failed_files {
            println!("  {} {file}", "could not fetch".yellow());
        }
        return;
    };

    if let Some(file) = &result.file {
        println!("{} {file}", "File:".bold());
    }
    if let Some(url) = &result.url {
        println!("{} {url}", "URL:".bold());
    }
    println!("{} {}", "Severity:".bold(), rule.severity);
    println!("{} {}", "For:".bold(), rule.duration);
    println!("{}\n  {}", "Expression:".bold(), rule.expression);
    if !rule.summary.is_empty() {
        println!("{} {}", "Summary:".bold(), rule.summary);
    }
    if !rule.description.is_empty() {
        println!("{} {}", "Description:".bold(), rule.description);
    }
}

fn print_investigation(result: &ResetInvestigationResult) {
    println!("{} {}", "Workload:".bold(), result.workload);

    if !result.found {
        println!("{}", "No reset anchor found".yellow());
        if let Some(message) = &result.message {
            println!("  {message}");
        }
        return;
    }

    if let Some(hash) = &result.commit_hash {
        println!("{} {hash}", "Commit:".bold());
    }
    if let Some(start) = result.start_timestamp {
        println!("{} {}", "Since:".bold(), start.to_rfc3339());
    }
    if let Some(commit) = &result.commit_info {
        println!("  {} ({}) {}", commit.title, commit.author, commit.url);
    }
    if let Some(pr) = &result.pr_info {
        println!("{} #{} {} {}", "Pull request:".bold(), pr.number, pr.title, pr.url);
    }
    if let Some(message) = &result.message {
        println!("{}", message.yellow());
    }

    let errors = error_lines(&result.logs);
    println!(
        "{} {} lines, {} errors",
        "Logs:".bold(),
        result.log_count,
        errors.len()
    );
    println!("{}", format_logs(&result.logs, 200).trim_end());
}

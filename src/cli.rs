//! Command-line interface definitions for Tech News Digest.
//!
//! Every global option can also come from the environment. Without a
//! subcommand the binary performs a pipeline `run` with default settings.

use crate::config::DEFAULT_TIMEOUT;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Tech News Digest application.
///
/// # Examples
///
/// ```sh
/// # Scrape, score, store and summarize with defaults
/// tech_news_digest
///
/// # Use another database and a custom site table
/// tech_news_digest -d /var/lib/news/news.db --sites sites.yaml run --per-source 5
///
/// # Show the newest relevant articles as JSON
/// tech_news_digest list --min-relevance 7 --limit 10
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite database file
    #[arg(short, long, env = "NEWS_DB", default_value = "news.db", global = true)]
    pub database: PathBuf,

    /// Path to the awful_aj config.yaml (defaults to the awful_aj config dir)
    #[arg(short, long, env = "AWFUL_AJ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// YAML file with site extraction rules (defaults to TechCrunch and Wired)
    #[arg(long, env = "NEWS_SITES", global = true)]
    pub sites: Option<PathBuf>,

    /// Per-request network timeout in seconds
    #[arg(long, env = "NEWS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs(), global = true)]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Scrape, classify, persist and backfill summaries
    Run(RunArgs),
    /// Print stored articles, newest first, as JSON
    List(ListArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Run(RunArgs::default())
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Minimum relevance (0-10) for an article to be summarized
    #[arg(long, default_value_t = 5.0)]
    pub threshold: f64,

    /// Headlines per source sent to the relevance model
    #[arg(long, default_value_t = 10)]
    pub per_source: usize,

    /// Retries for failed model calls
    #[arg(long, default_value_t = 2)]
    pub max_retries: usize,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            per_source: 10,
            max_retries: 2,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ListArgs {
    #[arg(long, default_value_t = 5.0)]
    pub min_relevance: f64,

    #[arg(long, default_value_t = 20)]
    pub limit: i64,

    #[arg(long, default_value_t = 0)]
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::parse_from(["tech_news_digest"]);

        assert_eq!(cli.database, PathBuf::from("news.db"));
        assert_eq!(cli.timeout_secs, DEFAULT_TIMEOUT.as_secs());
        assert_eq!(cli.timeout_secs, 15);
        assert_eq!(cli.command.unwrap_or_default(), Command::Run(RunArgs::default()));
    }

    #[test]
    fn test_cli_run_options() {
        let cli = Cli::parse_from([
            "tech_news_digest",
            "-d",
            "/tmp/news.db",
            "run",
            "--threshold",
            "7.5",
            "--per-source",
            "3",
        ]);

        assert_eq!(cli.database, PathBuf::from("/tmp/news.db"));
        let Some(Command::Run(run)) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(run.threshold, 7.5);
        assert_eq!(run.per_source, 3);
        assert_eq!(run.max_retries, 2);
    }

    #[test]
    fn test_cli_list_with_global_flag_after_subcommand() {
        let cli = Cli::parse_from([
            "tech_news_digest",
            "list",
            "--limit",
            "5",
            "--offset",
            "10",
            "--database",
            "other.db",
        ]);

        assert_eq!(cli.database, PathBuf::from("other.db"));
        assert_eq!(
            cli.command,
            Some(Command::List(ListArgs {
                min_relevance: 5.0,
                limit: 5,
                offset: 10,
            }))
        );
    }
}

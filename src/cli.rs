//! Command-line interface definitions for the news collector.
//!
//! Every option can also be supplied through an environment variable, which
//! is how scheduled CI jobs pass credentials.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the news collector.
///
/// # Examples
///
/// ```sh
/// # Routine run with credentials from the environment
/// GOOGLE_CREDENTIALS="$(cat sa.json)" GOOGLE_SHEETS_ID=1AbC brand_news_collector
///
/// # First-time backfill ignoring the lookback window
/// brand_news_collector --initial --config collector.yaml --sheets-id 1AbC
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Service-account JSON key (the file contents, not a path)
    #[arg(long, env = "GOOGLE_CREDENTIALS", hide_env_values = true)]
    pub credentials: Option<String>,

    /// Pre-issued OAuth access token, used when no service-account key is given
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Spreadsheet id of the record store
    #[arg(long, env = "GOOGLE_SHEETS_ID")]
    pub sheets_id: String,

    /// Collect everything the feeds return instead of only the last days
    #[arg(long, env = "INITIAL_COLLECTION", default_value_t = false)]
    pub initial: bool,

    /// Incoming webhook receiving the run summary
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Attempts for the whole run when the store is unavailable
    #[arg(long, default_value_t = 3)]
    pub run_attempts: usize,

    /// Seconds to wait between run attempts
    #[arg(long, default_value_t = 30)]
    pub run_retry_delay_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "brand_news_collector",
            "--sheets-id",
            "1AbC",
            "--config",
            "./collector.yaml",
            "--initial",
        ]);

        assert_eq!(cli.sheets_id, "1AbC");
        assert_eq!(cli.config, Some(PathBuf::from("./collector.yaml")));
        assert!(cli.initial);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["brand_news_collector", "--sheets-id", "1AbC"]);

        assert_eq!(cli.run_attempts, 3);
        assert_eq!(cli.run_retry_delay_secs, 30);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_requires_sheets_id() {
        assert!(Cli::try_parse_from(["brand_news_collector", "--initial"]).is_err());
    }
}

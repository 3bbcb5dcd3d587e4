//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use mailprobe_core::{BatchConfig, BatchConfigBuilder, Protocol, StopCondition};

/// Verify SMTP/IMAP accounts or SOCKS proxies in bulk.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Input list: `email:password[|host[:port]]` lines, or proxies for `--protocol socks`
    pub input: PathBuf,

    /// What to verify (smtp, imap, socks)
    #[arg(short, long)]
    pub protocol: Option<Protocol>,

    /// Proxy list to route account checks through
    #[arg(long)]
    pub proxies: Option<PathBuf>,

    /// JSON batch configuration; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database for results (in-memory when omitted)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Maximum concurrent checks
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Per-candidate connect and auth timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Stop after this many checks
    #[arg(long)]
    pub max_attempts: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub max_duration: Option<u64>,

    /// Stop when the failure percentage rises above this
    #[arg(long)]
    pub max_error_rate: Option<f64>,

    /// Stop when the success percentage falls below this
    #[arg(long)]
    pub min_success_rate: Option<f64>,

    /// Checks completed before rate rules apply
    #[arg(long)]
    pub min_sample: Option<u64>,

    /// Use the recommended stop thresholds
    #[arg(long)]
    pub recommended: bool,

    /// Reachability target for proxy checks (repeatable, `host:port`)
    #[arg(long = "socks-target", action = ArgAction::Append)]
    pub socks_targets: Vec<String>,

    /// Name announced in EHLO
    #[arg(long)]
    pub ehlo_name: Option<String>,

    /// Progress refresh interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub progress_ms: u64,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Number of results to list in the final report
    #[arg(long, default_value_t = 20)]
    pub show: usize,
}

impl Cli {
    /// Applies flags on top of `base`.
    pub fn batch_config(&self, base: BatchConfig) -> mailprobe_core::Result<BatchConfig> {
        let mut builder = BatchConfigBuilder::from(base);

        if self.recommended {
            builder = builder.stop_condition(StopCondition::recommended());
        }
        if let Some(protocol) = self.protocol {
            builder = builder.protocol(protocol);
        }
        if let Some(workers) = self.concurrency {
            builder = builder.max_concurrent(workers);
        }
        if let Some(seconds) = self.timeout {
            builder = builder.timeout_seconds(seconds);
        }
        if let Some(attempts) = self.max_attempts {
            builder = builder.max_attempts(attempts);
        }
        if let Some(seconds) = self.max_duration {
            builder = builder.max_duration_seconds(seconds);
        }
        if let Some(pct) = self.max_error_rate {
            builder = builder.max_error_rate_pct(pct);
        }
        if let Some(pct) = self.min_success_rate {
            builder = builder.min_success_rate_pct(pct);
        }
        if let Some(size) = self.min_sample {
            builder = builder.min_sample_size(size);
        }
        if !self.socks_targets.is_empty() {
            builder = builder.socks_targets(self.socks_targets.clone());
        }
        if let Some(name) = &self.ehlo_name {
            builder = builder.ehlo_name(name.clone());
        }

        builder.build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from([
            "mailprobe",
            "combos.txt",
            "--protocol",
            "imap",
            "-j",
            "25",
            "--max-error-rate",
            "30",
        ]);
        let base = BatchConfig::from_json(r#"{"max_concurrent": 5, "timeout_seconds": 7}"#).unwrap();
        let config = cli.batch_config(base).unwrap();

        assert_eq!(config.protocol, Protocol::Imap);
        assert_eq!(config.max_concurrent, Some(25));
        assert_eq!(config.timeout_seconds, 7);
        assert_eq!(config.max_error_rate_pct, Some(30.0));
    }

    #[test]
    fn recommended_then_explicit() {
        let cli = Cli::parse_from(["mailprobe", "in.txt", "--recommended", "--min-sample", "50"]);
        let config = cli.batch_config(BatchConfig::default()).unwrap();
        assert_eq!(config.max_error_rate_pct, Some(10.0));
        assert_eq!(config.min_success_rate_pct, Some(50.0));
        assert_eq!(config.min_sample_size, 50);
    }

    #[test]
    fn socks_targets_repeatable() {
        let cli = Cli::parse_from([
            "mailprobe",
            "proxies.txt",
            "-p",
            "socks",
            "--socks-target",
            "mx.example.com:25",
            "--socks-target",
            "smtp.example.com:587",
        ]);
        let config = cli.batch_config(BatchConfig::default()).unwrap();
        assert_eq!(config.protocol, Protocol::Socks);
        assert_eq!(config.socks_targets.len(), 2);
    }

    #[test]
    fn invalid_values_rejected() {
        let cli = Cli::parse_from(["mailprobe", "in.txt", "--max-error-rate", "150"]);
        assert!(cli.batch_config(BatchConfig::default()).is_err());
        assert!(Cli::try_parse_from(["mailprobe", "in.txt", "-p", "pop3"]).is_err());
    }
}

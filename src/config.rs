use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;

use crate::app::ThemePreset;

const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

#[derive(Debug, Parser)]
#[command(name = "localchat")]
#[command(version)]
#[command(about = "Terminal chat client for a local multi-agent coding assistant")]
pub(crate) struct Cli {
    /// Base URL of the local agent backend
    #[arg(long, env = "LOCALCHAT_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub(crate) backend_url: String,

    /// Colour theme (graphite, fjord, ember)
    #[arg(long, env = "LOCALCHAT_THEME", default_value = "graphite")]
    pub(crate) theme: String,

    /// Log file, defaults to ~/.localchat/localchat.log
    #[arg(long, env = "LOCALCHAT_LOG_FILE")]
    pub(crate) log_file: Option<PathBuf>,

    /// Play relay messages from a JSON-lines file instead of calling the backend
    #[arg(long, value_name = "JSONL")]
    pub(crate) replay: Option<PathBuf>,

    /// Delay between replayed messages
    #[arg(long, default_value_t = 25)]
    pub(crate) replay_delay_ms: u64,

    /// Do not show the greeting message on start
    #[arg(long)]
    pub(crate) no_greeting: bool,

    /// Upper bound for one chat request, including the streamed body
    #[arg(long, env = "LOCALCHAT_REQUEST_TIMEOUT_SECS", default_value_t = 600)]
    pub(crate) request_timeout_secs: u64,
}

/// Resolved settings the app runs with.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) backend_url: String,
    pub(crate) theme: ThemePreset,
    pub(crate) log_file: Option<PathBuf>,
    pub(crate) replay: Option<PathBuf>,
    pub(crate) replay_delay: Duration,
    pub(crate) greeting: bool,
    pub(crate) request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            theme: ThemePreset::Graphite,
            log_file: None,
            replay: None,
            replay_delay: Duration::from_millis(25),
            greeting: true,
            request_timeout: Duration::from_secs(600),
        }
    }
}

impl Config {
    pub(crate) fn from_cli(cli: Cli) -> Result<Self> {
        let backend_url = cli.backend_url.trim().trim_end_matches('/').to_string();
        if backend_url.is_empty() {
            return Err(anyhow!("backend url must not be empty"));
        }
        let theme = ThemePreset::parse(&cli.theme).ok_or_else(|| {
            anyhow!(
                "unknown theme '{}' (expected one of: {})",
                cli.theme,
                ThemePreset::names().join(", ")
            )
        })?;
        if cli.request_timeout_secs == 0 {
            return Err(anyhow!("request timeout must be at least one second"));
        }
        Ok(Self {
            backend_url,
            theme,
            log_file: cli.log_file,
            replay: cli.replay,
            replay_delay: Duration::from_millis(cli.replay_delay_ms),
            greeting: !cli.no_greeting,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("localchat").chain(args.iter().copied()))
            .expect("parse args")
    }

    #[test]
    fn explicit_flags_are_resolved() {
        let config = Config::from_cli(parse(&[
            "--backend-url",
            "http://127.0.0.1:8080/",
            "--theme",
            "ember",
            "--no-greeting",
            "--replay-delay-ms",
            "0",
            "--request-timeout-secs",
            "30",
        ]))
        .expect("config");
        assert_eq!(config.backend_url, "http://127.0.0.1:8080");
        assert_eq!(config.theme, ThemePreset::Ember);
        assert!(!config.greeting);
        assert_eq!(config.replay_delay, Duration::ZERO);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn unknown_theme_is_an_error() {
        let err = Config::from_cli(parse(&["--theme", "neon", "--backend-url", "http://x"]))
            .expect_err("bad theme");
        assert!(err.to_string().contains("neon"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Config::from_cli(parse(&[
            "--backend-url",
            "http://x",
            "--theme",
            "fjord",
            "--request-timeout-secs",
            "0"
        ]))
        .is_err());
    }
}

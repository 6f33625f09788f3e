//! Log output for the daemon.
//!
//! Copies run inside a `copy` span carrying `volume` and `job_id`, so every
//! line a copy emits can be traced back to its drive. JSON output also
//! records when each span closes, which gives per-copy durations.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::AppConfig;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogConfig {
    /// One JSON object per line
    pub json: bool,
    /// Debug output from driveseed, including copy progress
    pub verbose: bool,
}

impl From<&AppConfig> for LogConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            json: config.json_logs,
            verbose: config.verbose,
        }
    }
}

/// Filter used when `RUST_LOG` is unset. Dependencies only get to warn.
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,driveseed={level}")
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config.verbose)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
    };

    installed.map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
}

/// Rate limit for per-file copy progress lines.
///
/// A tree of small files would otherwise write one debug line per file.
/// Each line that does get through reports how many were held back.
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(held_back)` when a progress line should be written now.
    pub fn tick(&mut self) -> Option<u64> {
        let now = Instant::now();
        let due = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.interval);

        if due {
            self.last = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_progress_line_is_written() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(1));
        assert_eq!(throttle.tick(), Some(0));
        assert_eq!(throttle.tick(), None);
    }

    #[test]
    fn test_held_back_lines_are_counted() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50));
        assert_eq!(throttle.tick(), Some(0));
        assert_eq!(throttle.tick(), None);
        assert_eq!(throttle.tick(), None);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(throttle.tick(), Some(2));
        assert_eq!(throttle.tick(), None);
    }

    #[test]
    fn test_default_filter_follows_verbose() {
        assert_eq!(default_filter(false), "warn,driveseed=info");
        assert_eq!(default_filter(true), "warn,driveseed=debug");
    }

    #[test]
    fn test_log_config_from_app_config() {
        let config = AppConfig {
            json_logs: true,
            ..Default::default()
        };
        let log = LogConfig::from(&config);
        assert!(log.json);
        assert!(!log.verbose);
    }
}

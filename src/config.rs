//! Configuration and CLI argument handling

use std::time::Duration;

use clap::Parser;

use crate::{
    realtime::DEFAULT_SEND_TIMEOUT, services::DEFAULT_SNAPSHOT_TTL, tasks::DEFAULT_TICK_INTERVAL,
};

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "countdown-hub")]
#[command(about = "Real-time countdown timers pushed to owners and supervisors")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// SQLite file holding the durable timer rows (`:memory:` for none)
    #[arg(long, env = "DATABASE_PATH", default_value = "timers.db")]
    pub database: String,

    /// SQLite file holding the countdown snapshots (`:memory:` for none)
    #[arg(long, env = "CACHE_PATH", default_value = "snapshots.db")]
    pub cache_path: String,

    /// Countdown tick period in milliseconds
    #[arg(long, env = "TICK_INTERVAL_MS", default_value_t = (DEFAULT_TICK_INTERVAL.as_millis() as u64), value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_interval_ms: u64,

    /// Lifetime of a countdown snapshot in seconds
    #[arg(long, env = "SNAPSHOT_TTL_SECS", default_value_t = DEFAULT_SNAPSHOT_TTL.as_secs())]
    pub snapshot_ttl_secs: u64,

    /// Upper bound on delivering one message to one channel, in milliseconds
    #[arg(long, env = "BROADCAST_TIMEOUT_MS", default_value_t = (DEFAULT_SEND_TIMEOUT.as_millis() as u64))]
    pub broadcast_timeout_ms: u64,

    /// Outbound queue depth per push channel
    #[arg(long, env = "CHANNEL_BUFFER", default_value = "64", value_parser = clap::value_parser!(u64).range(1..))]
    pub channel_buffer: u64,

    /// Also send TIMER_STOP to the owner channels of the stopped timer's session
    #[arg(long, env = "NOTIFY_OWNER_ON_STOP")]
    pub notify_owner_on_stop: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments and environment
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn channel_buffer(&self) -> usize {
        usize::try_from(self.channel_buffer).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["countdown-hub"]).unwrap();
        assert_eq!(config.database, "timers.db");
        assert_eq!(config.cache_path, "snapshots.db");
        assert_eq!(config.tick_interval(), DEFAULT_TICK_INTERVAL);
        assert_eq!(config.snapshot_ttl(), DEFAULT_SNAPSHOT_TTL);
        assert_eq!(config.broadcast_timeout(), DEFAULT_SEND_TIMEOUT);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.channel_buffer(), 64);
        assert!(!config.notify_owner_on_stop);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "countdown-hub",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--database",
            ":memory:",
            "--tick-interval-ms",
            "250",
            "--notify-owner-on-stop",
            "-v",
        ])
        .unwrap();
        assert_eq!(config.address(), "127.0.0.1:9000");
        assert_eq!(config.database, ":memory:");
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert!(config.notify_owner_on_stop);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        assert!(Config::try_parse_from(["countdown-hub", "--tick-interval-ms", "0"]).is_err());
    }
}

//! Ambient logging: a `tracing-appender` rolling file writer backing
//! `script.cheatlog`, with a four-level tag scheme mapped onto
//! `tracing::Level`.
//!
//! The interpreter never decides where logs are *displayed* to the player
//! (that stays host-owned) — it only emits `tracing` events at call sites
//! throughout the crate. This module is a convenience default subscriber
//! construction helper for standalone/test use.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Maps the config's `log_level` (0-3) onto a `[CRIT]/[WARN]/[INFO]/[DEBG]`
/// tag scheme. `tracing` itself uses `ERROR/WARN/INFO/DEBUG`; this is purely
/// a display-label concern for anyone formatting the rolling log by hand.
pub fn level_tag(level: &tracing::Level) -> &'static str {
    match *level {
        tracing::Level::ERROR => "[CRIT]",
        tracing::Level::WARN => "[WARN]",
        tracing::Level::INFO => "[INFO]",
        _ => "[DEBG]",
    }
}

/// Builds a non-blocking rolling-file subscriber writing to
/// `<log_dir>/script.cheatlog`, filtered per `config.log_level`, and installs
/// it as the process default. Returns the `WorkerGuard` the caller must keep
/// alive for the life of the process (dropping it stops the background
/// writer thread).
pub fn init_file_logging(log_dir: impl AsRef<Path>, config: &Config) -> WorkerGuard {
    let appender = RollingFileAppender::new(Rotation::NEVER, log_dir, "script.cheatlog");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.env_filter_directive()));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tag_mapping() {
        assert_eq!(level_tag(&tracing::Level::ERROR), "[CRIT]");
        assert_eq!(level_tag(&tracing::Level::WARN), "[WARN]");
        assert_eq!(level_tag(&tracing::Level::INFO), "[INFO]");
        assert_eq!(level_tag(&tracing::Level::DEBUG), "[DEBG]");
        assert_eq!(level_tag(&tracing::Level::TRACE), "[DEBG]");
    }

    #[test]
    fn config_log_level_maps_to_filter_directive() {
        let mut c = Config::default();
        c.log_level = 0;
        assert_eq!(c.env_filter_directive(), "error");
        c.log_level = 1;
        assert_eq!(c.env_filter_directive(), "warn");
        c.log_level = 2;
        assert_eq!(c.env_filter_directive(), "info");
        c.log_level = 3;
        assert_eq!(c.env_filter_directive(), "debug");
    }
}

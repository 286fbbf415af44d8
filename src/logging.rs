//! Tracing subscriber setup for the `vix` binary.
//!
//! Logs go to stderr so stdout stays parseable for scripts. `RUST_LOG`
//! overrides the configured level.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;

pub fn init(cfg: &LoggingConfig) {
    let level = level_filter(&cfg.level);

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .with_filter(filter);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

/// Unknown level names fall back to `info`.
fn level_filter(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(level_filter("error"), LevelFilter::ERROR);
        assert_eq!(level_filter("WARN"), LevelFilter::WARN);
        assert_eq!(level_filter("Debug"), LevelFilter::DEBUG);
        assert_eq!(level_filter("off"), LevelFilter::OFF);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(level_filter("verbose"), LevelFilter::INFO);
    }
}

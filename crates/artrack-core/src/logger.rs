//! Process-wide log sinks.
//!
//! Two installers are offered. [`init_with_level`] sets up a small stderr
//! logger for the `log` facade that prints `[elapsed LEVEL target] message`,
//! optionally restricted to the `artrack*` crates. With the `tracing` feature,
//! [`init_tracing`] installs a `tracing-subscriber` formatter and bridges the
//! `log` records emitted by the pipeline into it.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const CRATE_PREFIX: &str = "artrack";

struct TrackerLogger {
    level: LevelFilter,
    only_tracker: bool,
    started: Instant,
}

impl TrackerLogger {
    fn accepts_target(&self, target: &str) -> bool {
        !self.only_tracker || target.starts_with(CRATE_PREFIX)
    }
}

impl Log for TrackerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && self.accepts_target(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let target = record.target();
        let short = target.rsplit("::").next().unwrap_or(target);
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{elapsed:8.3}s {:>5} {short}] {}",
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<TrackerLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Records from every crate are printed. Use [`init_tracker_only`] to drop
/// records that do not originate in this workspace. Repeated calls are no-ops.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    install(level, false)
}

/// Like [`init_with_level`] but only `artrack*` targets are printed.
pub fn init_tracker_only(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    install(level, true)
}

fn install(level: LevelFilter, only_tracker: bool) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| TrackerLogger {
        level,
        only_tracker,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Output layout for [`init_tracing`].
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraceFormat {
    /// Human-readable lines with an uptime timer.
    #[default]
    Pretty,
    /// One flattened JSON object per event.
    Json,
}

/// Install a global `tracing` subscriber honouring `RUST_LOG`
/// (default `artrack=info`), and forward `log` records into it.
///
/// Span close events are emitted so per-stage timings of the frame pipeline
/// show up. Repeated calls are no-ops.
#[cfg(feature = "tracing")]
pub fn init_tracing(format: TraceFormat) {
    let _ = tracing_log::LogTracer::init();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("artrack=info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);
    match format {
        TraceFormat::Json => {
            let _ = builder.json().flatten_event(true).finish().try_init();
        }
        TraceFormat::Pretty => {
            let _ = builder
                .with_timer(fmt::time::Uptime::default())
                .finish()
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_filter_only_admits_workspace_crates() {
        let logger = TrackerLogger {
            level: LevelFilter::Debug,
            only_tracker: true,
            started: Instant::now(),
        };
        assert!(logger.accepts_target("artrack_square::detector"));
        assert!(!logger.accepts_target("image::codecs::png"));

        let open = TrackerLogger {
            only_tracker: false,
            ..logger
        };
        assert!(open.accepts_target("image::codecs::png"));
    }

    #[test]
    fn repeated_installation_is_a_no_op() {
        init_with_level(LevelFilter::Warn).expect("first install");
        init_with_level(LevelFilter::Trace).expect("second install");
        assert_eq!(log::max_level(), LevelFilter::Warn);
    }
}

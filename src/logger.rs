//! Logging setup for the factor-gn binary and tests
//!
//! Installs a `tracing-subscriber` formatter that prints one bracketed prefix per
//! event, `[LEVEL HH:MM:SS.mmm component]`, where the component is the emitting
//! module with the crate prefix removed (`linalg::multifrontal`,
//! `optimizer::gauss_newton`). Optimizer diagnostics are emitted at debug level and
//! elimination details at trace level, so `RUST_LOG=debug` shows per-iteration output.

use chrono::Local;
use tracing::Level;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, format::Writer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

const CRATE_PREFIX: &str = "factor_gn::";

/// Install the subscriber at INFO, overridable with `RUST_LOG`.
///
/// ```no_run
/// factor_gn::init_logger().expect("no other subscriber is installed");
/// tracing::info!("Application started");
/// ```
pub fn init_logger() -> Result<(), TryInitError> {
    init_logger_with_level(Level::INFO)
}

/// Install the subscriber with a custom default level, overridable with `RUST_LOG`.
///
/// Fails if a global subscriber is already installed, for example by an earlier call
/// in the same test binary. The installed subscriber stays in place in that case.
///
/// ```bash
/// RUST_LOG=factor_gn::linalg=trace cargo run --bin optimize_pose_chain
/// ```
pub fn init_logger_with_level(default_level: Level) -> Result<(), TryInitError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .event_format(ComponentFormatter)
        .finish()
        .try_init()
}

/// Module path of an event relative to this crate.
fn component(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

fn level_label(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::ERROR => ("ERROR", "\x1b[31m"),
        Level::WARN => ("WARN", "\x1b[33m"),
        Level::INFO => ("INFO", "\x1b[32m"),
        Level::DEBUG => ("DEBUG", "\x1b[34m"),
        Level::TRACE => ("TRACE", "\x1b[35m"),
    }
}

struct ComponentFormatter;

impl<S, N> FormatEvent<S, N> for ComponentFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let (label, color) = level_label(*metadata.level());

        if writer.has_ansi_escapes() {
            write!(writer, "[{color}{label}\x1b[0m ")?;
        } else {
            write!(writer, "[{label} ")?;
        }
        write!(
            writer,
            "{} {}] ",
            Local::now().format("%H:%M:%S%.3f"),
            component(metadata.target())
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

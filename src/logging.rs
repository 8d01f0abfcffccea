// Logging setup: console output, optional JSON log file, and timing for flagged spans
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Instant;

use eyre::{Result, WrapErr};
use tracing::field::{Field, Visit};
use tracing::{Id, Subscriber, debug, span};
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Context, Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const CRATE_TARGET: &str = "portfolio_optimizer";

/// Initialise the global subscriber. Levels come from `CONSOLE_LOG_LEVEL` / `FILE_LOG_LEVEL`,
/// file output is enabled with `LOG_TO_FILE=true` and lands in `LOG_DIR` (default `logs`).
pub fn init_logging(app_name: &str) -> Result<()> {
    let console_log_level = env::var("CONSOLE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let file_log_level = env::var("FILE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_to_file = env::var("LOG_TO_FILE").map(|v| v == "true").unwrap_or(false);

    let console_layer = fmt::Layer::new()
        .pretty()
        .with_filter(crate_filter(&console_log_level, app_name));

    if log_to_file {
        let log_dir = PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()));
        fs::create_dir_all(&log_dir)
            .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let file_name = format!("{}_{}.log", app_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));

        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        FILE_GUARD.set(guard).ok();

        let file_layer = fmt::Layer::new()
            .json()
            .with_writer(non_blocking)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_filter(crate_filter(&file_log_level, app_name));

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .with(SpanTimingLayer)
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(console_layer)
            .with(SpanTimingLayer)
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    }

    Ok(())
}

/// Everything else at warn, our library and the running binary at `level`
fn crate_filter(level: &str, app_name: &str) -> EnvFilter {
    EnvFilter::try_new(format!("warn,{CRATE_TARGET}={level},{app_name}={level}"))
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{CRATE_TARGET}=info")))
}

/// Logs how long spans created with `timed = true` stayed open
struct SpanTimingLayer;

struct OpenedAt(Instant);

struct TimedVisitor {
    timed: bool,
}

impl Visit for TimedVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "timed" {
            self.timed = value;
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

impl<S> Layer<S> for SpanTimingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = TimedVisitor { timed: false };
        attrs.record(&mut visitor);
        if !visitor.timed {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(OpenedAt(Instant::now()));
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        if let Some(OpenedAt(opened)) = span.extensions_mut().remove::<OpenedAt>() {
            debug!(span = span.name(), elapsed = ?opened.elapsed(), "span closed");
        }
    }
}

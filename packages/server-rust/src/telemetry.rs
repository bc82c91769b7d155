//! Logging initialisation and context-enriched event formatters.
//!
//! Log statements never mention the request context themselves; the
//! formatters here read the current thread's context store and attach it to
//! every line.

use std::fmt;

use reqctx_core::{keys, store};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Context keys shown in the text prefix, in display order.
pub const PREFIX_KEYS: [&str; 4] = [
    keys::REQUEST_ID,
    keys::USER_ID,
    keys::TRANSACTION_ID,
    keys::OPERATION,
];

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines prefixed with the key context fields.
    #[default]
    Text,
    /// One JSON object per line including the full context.
    Json,
}

/// Installs the global subscriber.
///
/// `filter` uses `EnvFilter` directive syntax, e.g. `info,reqctx_server=debug`.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init(format: LogFormat, filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter)?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer().event_format(ContextFormat::new(
                    tracing_subscriber::fmt::format().with_thread_names(true),
                )),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().event_format(JsonContextFormat))
            .try_init()?,
    }
    Ok(())
}

/// Renders `[requestId=… userId=… transactionId=… operation=…]` for the keys
/// present in the current context, or `None` if none are.
#[must_use]
pub fn context_prefix() -> Option<String> {
    let snapshot = store::try_snapshot()?;
    let parts: Vec<String> = PREFIX_KEYS
        .iter()
        .filter_map(|key| snapshot.get(key).map(|value| format!("{key}={value}")))
        .collect();
    (!parts.is_empty()).then(|| format!("[{}]", parts.join(" ")))
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Wraps another event formatter, prefixing each line with [`context_prefix`].
#[derive(Debug, Clone)]
pub struct ContextFormat<F> {
    inner: F,
}

impl<F> ContextFormat<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for ContextFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if let Some(prefix) = context_prefix() {
            write!(writer, "{prefix} ")?;
        }
        self.inner.format_event(ctx, writer, event)
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Formats each event as a single JSON object.
///
/// Keys: `timestamp`, `level`, `target`, `thread`, `span`, `fields` and
/// `context` (the whole context store, `{}` when empty).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContextFormat;

impl<S, N> FormatEvent<S, N> for JsonContextFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut timestamp = String::new();
        SystemTime.format_time(&mut Writer::new(&mut timestamp))?;

        let mut fields = JsonVisitor::default();
        event.record(&mut fields);

        let context = store::try_snapshot()
            .map(|snapshot| {
                snapshot
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from(v)))
                    .collect::<Map<String, Value>>()
            })
            .unwrap_or_default();

        let line = serde_json::json!({
            "timestamp": timestamp,
            "level": metadata.level().as_str(),
            "target": metadata.target(),
            "thread": std::thread::current().name(),
            "span": ctx.lookup_current().map(|span| span.name()),
            "fields": fields.into_map(),
            "context": context,
        });
        writeln!(writer, "{line}")
    }
}

/// Collects event fields into a JSON map.
#[derive(Debug, Default)]
pub struct JsonVisitor {
    fields: Map<String, Value>,
}

impl JsonVisitor {
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::from(format!("{value:?}")));
    }
}

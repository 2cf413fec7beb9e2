//! Tracing layer that writes one JSON object per event.
//!
//! Output goes to stderr so stdout stays free for prompts and payloads.
//! Correlation fields (`run_id`, `session_id`, `stage`) are lifted to the top
//! level, either from the event itself or from the nearest enclosing span.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

const CONTEXT_KEYS: [&str; 3] = ["run_id", "session_id", "stage"];

/// Correlation fields recorded on a span.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    values: Map<String, Value>,
}

/// Collects event or span fields into JSON.
#[derive(Default)]
struct JsonFieldVisitor {
    context: Map<String, Value>,
    fields: Map<String, Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else if CONTEXT_KEYS.contains(&name) {
            // `log_event!` records an absent session as an empty string.
            if value != Value::String(String::new()) {
                self.context.insert(name.to_string(), value);
            }
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }
}

impl Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.insert(field, Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}

/// JSONL tracing layer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer::new(io::stderr())
    }
}

impl<W: Write> JsonlLayer<W> {
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = JsonFieldVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanContext {
                values: visitor.context,
            });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = JsonFieldVisitor::default();
        event.record(&mut visitor);

        let level: Level = (*event.metadata().level()).into();
        let mut obj = Map::new();
        obj.insert("ts".to_string(), Value::String(Utc::now().to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            Value::String(event.metadata().target().to_string()),
        );

        let mut context = visitor.context;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    for (k, v) in &span_ctx.values {
                        context.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
            }
        }
        for key in CONTEXT_KEYS {
            if let Some(v) = context.remove(key) {
                obj.insert(key.to_string(), v);
            }
        }

        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), Value::String(msg));
        }
        if !visitor.fields.is_empty() {
            obj.insert("fields".to_string(), Value::Object(visitor.fields));
        }

        let json = serde_json::to_string(&Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(SharedBuf(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        let output = buffer.lock().unwrap();
        String::from_utf8_lossy(&output)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_event_fields_and_target() {
        let lines = capture(|| {
            tracing::info!(target: "row.written", index = 2u64, ok = true, message = "saved");
        });
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["event"], "row.written");
        assert_eq!(line["level"], "info");
        assert_eq!(line["message"], "saved");
        assert_eq!(line["fields"]["index"], 2);
        assert_eq!(line["fields"]["ok"], true);
        assert!(line["ts"].is_string());
    }

    #[test]
    fn test_context_lifted_from_event() {
        let lines = capture(|| {
            tracing::warn!(target: "x", run_id = "run-1", session_id = "al-20260101-000000-abcd", stage = "collect", message = "a");
            tracing::warn!(target: "x", run_id = "run-1", session_id = "", message = "b");
        });
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[0]["session_id"], "al-20260101-000000-abcd");
        assert_eq!(lines[0]["stage"], "collect");
        assert!(lines[0].get("fields").is_none());
        assert!(lines[1].get("session_id").is_none());
    }

    #[test]
    fn test_context_inherited_from_span() {
        let lines = capture(|| {
            let span = tracing::info_span!("session", run_id = "run-9");
            let _g = span.enter();
            tracing::error!(target: "internal_error", message = "boom");
        });
        assert_eq!(lines[0]["run_id"], "run-9");
        assert_eq!(lines[0]["level"], "error");
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// One event recorded by [`EventCapture`].
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    /// The event's message, if it had one.
    pub message: Option<String>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl CapturedEvent {
    /// A field as an unsigned integer, if it was recorded as one.
    pub fn u64_field(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(serde_json::Value::as_u64)
    }

    /// A field rendered as text.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(serde_json::Value::as_str)
    }
}

/// A tracing layer that keeps every event in memory.
///
/// Clones share the same buffer, so a test can keep one handle and hand the
/// other to a subscriber.
///
/// ```rust,ignore
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let capture = EventCapture::default();
/// let subscriber = tracing_subscriber::registry().with(capture.clone());
/// let _guard = tracing::subscriber::set_default(subscriber);
/// tracing::info!(chunks = 3, "processed document");
/// assert_eq!(capture.with_message("processed document").len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything captured so far, in emission order.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    /// Captured events whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.message.as_deref() == Some(message)).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = fields.remove("message").map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        let metadata = event.metadata();
        let captured = CapturedEvent {
            level: level_name(*metadata.level()).to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        };
        if let Ok(mut events) = self.events.write() {
            events.push(captured);
        }
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

#[derive(Default)]
struct JsonVisitor(BTreeMap<String, serde_json::Value>);

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

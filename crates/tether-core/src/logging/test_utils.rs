//! Log capture for session tests.
//!
//! Session code reports close failures, unexpected closures and redacted
//! handler errors only through `tracing`, so tests assert on what was logged.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug)]
struct Record {
    level: Level,
    message: String,
    fields: BTreeMap<&'static str, String>,
}

/// Events recorded since [`capture_logs`] was called.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    records: Arc<Mutex<Vec<Record>>>,
}

impl CapturedLogs {
    /// Whether an event at `level` has a message containing `message`.
    pub fn has_event(&self, level: Level, message: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.level == level && r.message.contains(message))
    }

    /// Number of events at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.records.lock().iter().filter(|r| r.level == level).count()
    }

    /// Every value logged for field `name`, in emission order.
    pub fn field_values(&self, name: &str) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| r.fields.get(name).cloned())
            .collect()
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: BTreeMap<&'static str, String>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.store(field, format!("{value:?}"));
    }
}

impl RecordVisitor {
    fn store(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            let _ = self.fields.insert(field.name(), value);
        }
    }
}

struct RecordLayer(CapturedLogs);

impl<S: Subscriber> Layer<S> for RecordLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        self.0.records.lock().push(Record {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Capture every event on the current thread until the guard is dropped.
///
/// Spawned tasks are only seen on a current-thread runtime.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(RecordLayer(logs.clone()))
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}

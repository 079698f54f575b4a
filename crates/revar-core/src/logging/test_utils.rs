//! Recording subscriber for tests that assert on what the runtime logged.
//!
//! [`capture_logs`] installs a recorder for the calling thread only, so tests
//! running in parallel never see each other's events.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level the event was emitted at.
    pub level: Level,
    /// Emitting module path.
    pub target: String,
    /// The `message` field, empty if the event had none.
    pub message: String,
    /// Every other field, in emission order, rendered as text.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Rendered value of field `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value.as_str()))
    }
}

/// Shared handle to the events recorded so far.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Copy of everything recorded.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// True if some `level` event's message includes `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|event| event.level == level && event.message.contains(needle))
    }

    /// Number of events recorded at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == level)
            .count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn record(&self, event: CapturedEvent) {
        self.events.lock().push(event);
    }
}

struct Recorder {
    logs: CapturedLogs,
}

#[derive(Default)]
struct EventFields {
    message: String,
    fields: Vec<(String, String)>,
}

impl EventFields {
    fn put(&mut self, field: &Field, rendered: String) {
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.push((field.name().to_owned(), rendered));
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }

    // Strings would otherwise come through `record_debug` quoted.
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }
}

impl<S> Layer<S> for Recorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visited = EventFields::default();
        event.record(&mut visited);

        let metadata = event.metadata();
        self.logs.record(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visited.message,
            fields: visited.fields,
        });
    }
}

/// Record every event emitted on this thread until the guard drops.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(Recorder { logs: logs.clone() })
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_warn_with_fields() {
        let (logs, _guard) = capture_logs();
        tracing::warn!(name = "x", requested = 3_u64, "prehistoric read");

        assert!(logs.has_event(Level::WARN, "prehistoric"));
        let events = logs.events();
        assert_eq!(events[0].field("name"), Some("x"));
        assert_eq!(events[0].field("requested"), Some("3"));
        assert_eq!(events[0].field("missing"), None);
    }

    #[test]
    fn counts_by_level() {
        let (logs, _guard) = capture_logs();
        tracing::debug!("one");
        tracing::debug!("two");
        tracing::info!("three");

        assert_eq!(logs.count_at_level(Level::DEBUG), 2);
        assert_eq!(logs.count_at_level(Level::INFO), 1);
    }

    #[test]
    fn other_threads_are_not_recorded() {
        let (logs, _guard) = capture_logs();
        std::thread::spawn(|| tracing::error!("elsewhere"))
            .join()
            .unwrap();
        assert_eq!(logs.count_at_level(Level::ERROR), 0);
    }

    #[test]
    fn clear_empties() {
        let (logs, _guard) = capture_logs();
        tracing::info!("event");
        logs.clear();
        assert!(logs.events().is_empty());
    }
}

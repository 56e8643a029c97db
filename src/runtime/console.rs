// src/runtime/console.rs
//! Console relay: logging from inside a runtime, forwarded to the host

use crate::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

/// One console call, with its arguments already formatted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub runtime: String,
    pub level: LogLevel,
    pub args: Vec<String>,
}

impl ConsoleEntry {
    /// Arguments joined the way `console.log` prints them
    pub fn message(&self) -> String {
        self.args.join(" ")
    }
}

/// Host-side destination of console output. Called on the runtime's
/// thread, in the order the runtime issued the calls.
pub trait OutputSink: Send + Sync {
    fn write(&self, entry: ConsoleEntry);
}

impl<F> OutputSink for F
where
    F: Fn(ConsoleEntry) + Send + Sync,
{
    fn write(&self, entry: ConsoleEntry) {
        self(entry)
    }
}

/// Default sink: emits `tracing` events under `worklet_runtime::console`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn write(&self, entry: ConsoleEntry) {
        let message = entry.message();
        let runtime = entry.runtime.as_str();
        match entry.level {
            LogLevel::Error => {
                tracing::error!(target: "worklet_runtime::console", runtime, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(target: "worklet_runtime::console", runtime, "{}", message)
            }
            LogLevel::Debug => {
                tracing::debug!(target: "worklet_runtime::console", runtime, "{}", message)
            }
            LogLevel::Log | LogLevel::Info => {
                tracing::info!(target: "worklet_runtime::console", runtime, "{}", message)
            }
        }
    }
}

/// `console` object of a runtime
pub struct ConsoleRelay {
    runtime: String,
    sink: Arc<dyn OutputSink>,
    enabled: bool,
}

impl ConsoleRelay {
    pub(crate) fn install(runtime: &str, sink: Arc<dyn OutputSink>, enabled: bool) -> Self {
        Self {
            runtime: runtime.to_string(),
            sink,
            enabled,
        }
    }

    pub fn log(&self, args: &[Value]) {
        self.forward(LogLevel::Log, args);
    }

    pub fn info(&self, args: &[Value]) {
        self.forward(LogLevel::Info, args);
    }

    pub fn warn(&self, args: &[Value]) {
        self.forward(LogLevel::Warn, args);
    }

    pub fn error(&self, args: &[Value]) {
        self.forward(LogLevel::Error, args);
    }

    pub fn debug(&self, args: &[Value]) {
        self.forward(LogLevel::Debug, args);
    }

    fn forward(&self, level: LogLevel, args: &[Value]) {
        if !self.enabled {
            return;
        }
        self.sink.write(ConsoleEntry {
            runtime: self.runtime.clone(),
            level,
            args: args.iter().map(Value::as_string).collect(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording() -> (Arc<Mutex<Vec<ConsoleEntry>>>, Arc<dyn OutputSink>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let sink_entries = entries.clone();
        let sink: Arc<dyn OutputSink> =
            Arc::new(move |entry: ConsoleEntry| sink_entries.lock().push(entry));
        (entries, sink)
    }

    #[test]
    fn test_forwarded_in_order() {
        let (entries, sink) = recording();
        let console = ConsoleRelay::install("ui", sink, true);

        console.log(&[Value::from("x")]);
        console.warn(&[Value::from("y"), Value::Int(2), Value::from(vec![1, 2])]);

        let entries = entries.lock();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].args, vec!["x"]);
        assert_eq!(entries[0].level, LogLevel::Log);
        assert_eq!(entries[1].message(), "y 2 [1, 2]");
        assert_eq!(entries[1].runtime, "ui");
    }

    #[test]
    fn test_disabled_relay_drops_entries() {
        let (entries, sink) = recording();
        let console = ConsoleRelay::install("ui", sink, false);
        console.error(&[Value::from("ignored")]);
        assert!(entries.lock().is_empty());
    }

    #[test]
    fn test_entry_serialization() {
        let entry = ConsoleEntry {
            runtime: "ui".into(),
            level: LogLevel::Warn,
            args: vec!["a".into()],
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""level":"warn""#));
        let back: ConsoleEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}

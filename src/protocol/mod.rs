//! Singer Export Protocol
//!
//! Three message kinds, one JSON object per line:
//!
//! ```text
//! {"type":"SCHEMA","stream":"matches","schema":{...},"key_properties":["matchId"]}
//! {"type":"RECORD","stream":"matches","record":{...}}
//! {"type":"STATE","value":{"matches":{"Faker#KR1":"2024-06-01"}}}
//! ```
//!
//! `Emitter` serializes each message fully before taking the sink lock and
//! writes it with a single `write_all`, so concurrent emitters never
//! interleave bytes. During a sync all emission goes through the export actor
//! (`exporter`), which also orders checkpoints.

pub mod catalog;
pub mod exporter;

pub use catalog::{Catalog, CatalogStream, StreamMetadata};
pub use exporter::{spawn_exporter, ExportHandle, ExportSummary};

use crate::state::StateValue;
use crate::streams::StreamKind;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

/// Error type for export operations
#[derive(Debug)]
pub enum ExportError {
    /// Writing to the sink failed
    Io(std::io::Error),
    /// A record could not be serialized
    Serialization(String),
    /// The export actor is gone
    Closed,
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "sink I/O error: {}", e),
            ExportError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            ExportError::Closed => write!(f, "export actor unavailable"),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Serialization(e.to_string())
    }
}

/// Wire form of one protocol message
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message<'a> {
    Schema {
        stream: &'a str,
        schema: &'a Value,
        key_properties: &'a [&'a str],
    },
    Record {
        stream: &'a str,
        record: &'a Value,
    },
    State {
        value: &'a StateValue,
    },
}

impl Message<'_> {
    /// One newline-terminated JSON line
    pub fn encode(&self) -> Result<Vec<u8>, ExportError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Writes protocol messages to a sink
pub struct Emitter {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Emitter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Emitter {
            sink: Mutex::new(sink),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write_line(&self, line: &[u8]) -> Result<(), ExportError> {
        let mut sink = self.sink.lock();
        sink.write_all(line)?;
        sink.flush()?;
        Ok(())
    }

    pub fn emit(&self, message: &Message<'_>) -> Result<(), ExportError> {
        let line = message.encode()?;
        self.write_line(&line)
    }

    pub fn emit_schema(&self, stream: StreamKind) -> Result<(), ExportError> {
        let schema = stream.schema();
        self.emit(&Message::Schema {
            stream: stream.name(),
            schema: &schema,
            key_properties: stream.key_properties(),
        })
    }

    pub fn emit_record(&self, stream: StreamKind, record: &Value) -> Result<(), ExportError> {
        self.emit(&Message::Record {
            stream: stream.name(),
            record,
        })
    }

    pub fn emit_state(&self, value: &StateValue) -> Result<(), ExportError> {
        self.emit(&Message::State { value })
    }

    /// Discovery output: the catalog as a single JSON document
    pub fn emit_catalog(&self, catalog: &Catalog) -> Result<(), ExportError> {
        let mut line = serde_json::to_vec(catalog)?;
        line.push(b'\n');
        self.write_line(&line)
    }
}

/// In-memory sink whose contents stay readable after the emitter took it
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: std::sync::Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Every line parsed as JSON
    pub fn messages(&self) -> Vec<Value> {
        self.contents()
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_slice(line).ok())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn test_message_shapes() {
        let buffer = SharedBuffer::new();
        let emitter = Emitter::new(Box::new(buffer.clone()));

        emitter.emit_schema(StreamKind::Elos).unwrap();
        emitter
            .emit_record(StreamKind::Elos, &json!({"puuid": "p", "date": "2024-01-01"}))
            .unwrap();
        let mut value = StateValue::new();
        value
            .entry("elos".to_string())
            .or_insert_with(BTreeMap::new)
            .insert("A#1".to_string(), "2024-01-01".to_string());
        emitter.emit_state(&value).unwrap();

        let messages = buffer.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["type"], "SCHEMA");
        assert_eq!(messages[0]["stream"], "elos");
        assert_eq!(messages[0]["key_properties"], json!(["puuid", "date"]));
        assert_eq!(messages[1]["type"], "RECORD");
        assert_eq!(messages[1]["record"]["puuid"], "p");
        assert_eq!(messages[2], json!({"type": "STATE", "value": {"elos": {"A#1": "2024-01-01"}}}));
    }

    #[test]
    fn test_concurrent_emission_never_interleaves() {
        let buffer = SharedBuffer::new();
        let emitter = Arc::new(Emitter::new(Box::new(buffer.clone())));
        let payload = "x".repeat(4096);

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let emitter = emitter.clone();
                let payload = payload.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let record = json!({"matchId": format!("{}-{}", t, i), "blob": payload});
                        emitter.emit_record(StreamKind::Matches, &record).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let contents = buffer.contents();
        let lines: Vec<&[u8]> = contents
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let value: Value =
                serde_json::from_slice(line).expect("every line is one whole message");
            assert_eq!(value["record"]["blob"].as_str().map(str::len), Some(4096));
        }
    }
}

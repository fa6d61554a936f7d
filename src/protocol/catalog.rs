//! Singer catalog: discovery output and stream selection input

use crate::error::TapError;
use crate::streams::StreamKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub streams: Vec<CatalogStream>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStream {
    #[serde(default)]
    pub tap_stream_id: String,
    pub stream: String,
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub metadata: Vec<StreamMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub breadcrumb: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Catalog {
    /// Catalog describing every stream the tap can sync
    pub fn discover() -> Self {
        let streams = StreamKind::ALL
            .into_iter()
            .map(|kind| {
                let mut metadata = Map::new();
                metadata.insert("inclusion".to_string(), json!("available"));
                metadata.insert("key-properties".to_string(), json!(kind.key_properties()));
                CatalogStream {
                    tap_stream_id: kind.name().to_string(),
                    stream: kind.name().to_string(),
                    schema: kind.schema(),
                    metadata: vec![StreamMetadata {
                        breadcrumb: Vec::new(),
                        metadata,
                    }],
                }
            })
            .collect();
        Catalog { streams }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TapError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TapError::Catalog(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents).map_err(|e| TapError::Catalog(e.to_string()))
    }

    /// Streams to sync, in catalog order.
    ///
    /// Streams marked `selected: true` in their top-level metadata win; when
    /// nothing is selected every stream listed in the catalog is synced.
    /// Unknown stream names are an error.
    pub fn selected_streams(&self) -> Result<Vec<StreamKind>, TapError> {
        let is_selected = |stream: &CatalogStream| {
            stream.metadata.iter().any(|m| {
                m.breadcrumb.is_empty()
                    && m.metadata.get("selected").and_then(Value::as_bool) == Some(true)
            })
        };

        let mut names: Vec<&str> = self
            .streams
            .iter()
            .filter(|s| is_selected(*s))
            .map(|s| s.stream.as_str())
            .collect();
        if names.is_empty() {
            names = self.streams.iter().map(|s| s.stream.as_str()).collect();
        }

        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let kind: StreamKind = name.parse().map_err(TapError::Catalog)?;
            if !selected.contains(&kind) {
                selected.push(kind);
            }
        }
        Ok(selected)
    }
}

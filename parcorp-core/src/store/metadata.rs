use std::{collections::HashMap, path::Path};

use serde::Deserialize;
use snafu::ResultExt;
use tracing::warn;

use crate::{error::*, utils::image::Corners};

/// Page normalization resolved for one scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetadata {
    /// Clockwise rotation in degrees.
    pub rotation: f32,
    pub corners: Corners,
}

/// Source of per-image rotation and corner metadata.
pub trait MetadataStore {
    /// `None` when the image is unknown or its record cannot be resolved.
    fn lookup(&self, filename: &str) -> Option<PageMetadata>;
}

#[derive(Debug, Deserialize)]
struct Document {
    blob_filename: String,
    best_metadata: BestMetadata,
    #[serde(default)]
    detections_history: HashMap<String, HistoryEntry>,
}

/// Keys into `detections_history` for the preferred detections.
#[derive(Debug, Deserialize)]
struct BestMetadata {
    rotation: String,
    corners: String,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryEntry {
    rotation: Option<f32>,
    corners: Option<RawCorners>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCorners {
    List(Vec<f32>),
    Object(Corners),
}

impl RawCorners {
    fn resolve(&self) -> Option<Corners> {
        match self {
            RawCorners::List(values) => Corners::from_slice(values),
            RawCorners::Object(corners) => Some(*corners),
        }
    }
}

impl Document {
    fn resolve(&self) -> Option<PageMetadata> {
        let rotation = self
            .detections_history
            .get(&self.best_metadata.rotation)
            .and_then(|entry| entry.rotation)?;
        let corners = self
            .detections_history
            .get(&self.best_metadata.corners)
            .and_then(|entry| entry.corners.as_ref())
            .and_then(RawCorners::resolve)?;

        Some(PageMetadata { rotation, corners })
    }
}

/// Metadata documents exported to a JSON file, keyed by `blob_filename`.
#[derive(Debug, Default)]
pub struct JsonMetadataStore {
    documents: HashMap<String, Document>,
}

impl JsonMetadataStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(IoReadSnafu {
            path: path.to_string_lossy(),
        })?;
        Self::from_json(&content).context(JsonSnafu {
            path: path.to_string_lossy(),
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let documents: Vec<Document> = serde_json::from_str(content)?;
        Ok(Self {
            documents: documents
                .into_iter()
                .map(|doc| (doc.blob_filename.clone(), doc))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl MetadataStore for JsonMetadataStore {
    fn lookup(&self, filename: &str) -> Option<PageMetadata> {
        let document = self.documents.get(filename)?;
        let metadata = document.resolve();
        if metadata.is_none() {
            warn!(
                image = filename,
                rotation_key = %document.best_metadata.rotation,
                corners_key = %document.best_metadata.corners,
                "metadata record does not resolve"
            );
        }
        metadata
    }
}

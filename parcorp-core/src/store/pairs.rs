use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use tracing::debug;

use crate::error::*;

/// Key of the Spanish side in every stored pair.
pub const SOURCE_KEY: &str = "spanish";

/// A Spanish sentence and its counterpart in the target language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPair {
    pub source: String,
    pub target: String,
}

type StoredPair = BTreeMap<String, String>;

/// Extracted pairs per image file, checkpointed to a JSON file after every
/// finished page:
///
/// ```json
/// { "page_001.jpg": [ { "spanish": "...", "rapanui": "..." } ] }
/// ```
#[derive(Debug)]
pub struct PairStore {
    path: PathBuf,
    target_key: String,
    records: BTreeMap<String, Vec<TextPair>>,
}

impl PairStore {
    /// Loads the file at `path` if it exists, else starts empty.
    pub fn open<P: AsRef<Path>>(path: P, target_key: &str) -> Result<Self, CorpusError> {
        let path = path.as_ref().to_path_buf();
        let mut records = BTreeMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path).context(IoReadSnafu {
                path: path.to_string_lossy(),
            })?;
            if !content.trim().is_empty() {
                let stored: BTreeMap<String, Vec<StoredPair>> = serde_json::from_str(&content)
                    .context(JsonSnafu {
                        path: path.to_string_lossy(),
                    })?;
                for (name, pairs) in stored {
                    let pairs = pairs
                        .into_iter()
                        .map(|mut pair| TextPair {
                            source: pair.remove(SOURCE_KEY).unwrap_or_default(),
                            target: pair.remove(target_key).unwrap_or_default(),
                        })
                        .collect();
                    records.insert(name, pairs);
                }
            }
            debug!(path = %path.display(), records = records.len(), "pair store loaded");
        }

        Ok(Self {
            path,
            target_key: target_key.to_string(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn record(&self, name: &str) -> Option<&[TextPair]> {
        self.records.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records the finished page `name` with all of its pairs, and persists.
    ///
    /// A page is written once, so presence in the store means the page is done.
    pub fn commit(&mut self, name: &str, pairs: Vec<TextPair>) -> Result<(), CorpusError> {
        self.records.insert(name.to_string(), pairs);
        self.persist()
    }

    /// Writes the whole store to a sibling temp file and renames it over the
    /// target.
    fn persist(&self) -> Result<(), CorpusError> {
        let stored = self
            .records
            .iter()
            .map(|(name, pairs)| {
                let pairs = pairs
                    .iter()
                    .map(|pair| {
                        StoredPair::from([
                            (SOURCE_KEY.to_string(), pair.source.clone()),
                            (self.target_key.clone(), pair.target.clone()),
                        ])
                    })
                    .collect::<Vec<_>>();
                (name, pairs)
            })
            .collect::<BTreeMap<_, _>>();

        let content = serde_json::to_string_pretty(&stored).context(JsonSnafu {
            path: self.path.to_string_lossy(),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content).context(IoWriteSnafu {
            path: tmp.to_string_lossy(),
        })?;
        std::fs::rename(&tmp, &self.path).context(IoWriteSnafu {
            path: self.path.to_string_lossy(),
        })?;

        Ok(())
    }
}

use std::{
    collections::HashSet,
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::*;

/// One visited page in the triage CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageRecord {
    pub image: String,
    pub candidate_label: String,
    /// Cleaned extractor output, empty when extraction was skipped or failed.
    pub extracted_json: String,
    /// Worklist source the page came from.
    #[serde(rename = "type")]
    pub source: String,
}

/// Append-only CSV of triage results. Rows are flushed one at a time so an
/// interrupted run keeps everything already written.
#[derive(Debug)]
pub struct TriageStore {
    path: PathBuf,
    seen: HashSet<String>,
}

impl TriageStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref().to_path_buf();
        let seen = if has_content(&path) {
            read_records(&path)?
                .into_iter()
                .map(|record| record.image)
                .collect()
        } else {
            HashSet::new()
        };

        Ok(Self { path, seen })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, image: &str) -> bool {
        self.seen.contains(image)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn append(&mut self, record: &TriageRecord) -> Result<(), CorpusError> {
        let write_header = !has_content(&self.path);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(IoWriteSnafu {
                path: self.path.to_string_lossy(),
            })?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(record).context(CsvSnafu {
            path: self.path.to_string_lossy(),
        })?;
        writer.flush().context(IoWriteSnafu {
            path: self.path.to_string_lossy(),
        })?;

        self.seen.insert(record.image.clone());
        Ok(())
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.len() > 0)
}

/// Reads every row of a triage CSV.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<TriageRecord>, CorpusError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).context(CsvSnafu {
        path: path.to_string_lossy(),
    })?;

    reader
        .deserialize()
        .map(|row| {
            row.context(CsvSnafu {
                path: path.to_string_lossy(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(image: &str, label: &str, json: &str) -> TriageRecord {
        TriageRecord {
            image: image.to_string(),
            candidate_label: label.to_string(),
            extracted_json: json.to_string(),
            source: "sources_traductor".to_string(),
        }
    }

    #[test]
    fn test_triage_store_appends_with_single_header() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("triage.csv");

        let mut store = TriageStore::open(&path)?;
        store.append(&record("a.png", "Candidate", r#"[{"spanish":"a, b"}]"#))?;
        store.append(&record("b.png", "No Candidate", ""))?;

        let content = std::fs::read_to_string(&path)?;
        assert!(content.starts_with("image,candidate_label,extracted_json,type\n"));
        assert_eq!(content.matches("candidate_label").count(), 1);

        let rows = read_records(&path)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].extracted_json, r#"[{"spanish":"a, b"}]"#);
        assert_eq!(rows[1].candidate_label, "No Candidate");
        Ok(())
    }

    #[test]
    fn test_triage_store_reload_resumes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("triage.csv");

        TriageStore::open(&path)?.append(&record("a.png", "Candidate", "[]"))?;

        let mut store = TriageStore::open(&path)?;
        assert!(store.contains("a.png"));
        assert!(!store.contains("b.png"));

        store.append(&record("b.png", "No Candidate", ""))?;
        assert_eq!(read_records(&path)?.len(), 2);
        assert_eq!(store.len(), 2);
        Ok(())
    }
}

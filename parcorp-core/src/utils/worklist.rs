use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use snafu::{ResultExt, ensure};

use crate::{
    consts::{GROUND_TRUTH_SOURCE, IMAGE_EXTENSIONS, SAMPLED_SOURCE},
    error::*,
};

/// One page to process and the folder it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    /// Source tag, e.g. `pairs_candidates` or `sources_traductor`.
    pub source: String,
}

impl WorkItem {
    pub fn new<P: AsRef<Path>>(path: P, source: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    /// File name used as the resume key in every result store.
    pub fn name(&self) -> String {
        file_name(&self.path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Lists image files directly inside `folder`, sorted by path.
///
/// A missing folder is a configuration error.
pub fn list_images<P: AsRef<Path>>(folder: P) -> Result<Vec<PathBuf>, CorpusError> {
    let folder = folder.as_ref();
    ensure!(
        folder.is_dir(),
        MissingImageSourceSnafu {
            path: folder.to_string_lossy(),
        }
    );

    let entries = std::fs::read_dir(folder).context(IoReadSnafu {
        path: folder.to_string_lossy(),
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let path = entry
            .context(IoReadSnafu {
                path: folder.to_string_lossy(),
            })?
            .path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();

    Ok(images)
}

#[derive(Debug, Deserialize)]
struct GroundTruthRow {
    image: String,
}

/// Reads the `image` column of a ground-truth CSV, resolving each entry
/// against `root`.
pub fn read_ground_truth<P: AsRef<Path>, R: AsRef<Path>>(
    csv_path: P,
    root: R,
) -> Result<Vec<PathBuf>, CorpusError> {
    let csv_path = csv_path.as_ref();
    ensure!(
        csv_path.is_file(),
        MissingImageSourceSnafu {
            path: csv_path.to_string_lossy(),
        }
    );

    let mut reader = csv::Reader::from_path(csv_path).context(CsvSnafu {
        path: csv_path.to_string_lossy(),
    })?;

    reader
        .deserialize::<GroundTruthRow>()
        .map(|row| {
            row.map(|row| root.as_ref().join(row.image))
                .context(CsvSnafu {
                    path: csv_path.to_string_lossy(),
                })
        })
        .collect()
}

/// Ground-truth positives first, then source images whose file name is not
/// already among them, truncated to `limit` source images.
pub fn assemble(
    ground_truth: Vec<PathBuf>,
    sources: Vec<PathBuf>,
    limit: Option<usize>,
) -> Vec<WorkItem> {
    let known = ground_truth
        .iter()
        .map(|path| file_name(path))
        .collect::<HashSet<_>>();

    let sampled = sources
        .into_iter()
        .filter(|path| !known.contains(&file_name(path)))
        .take(limit.unwrap_or(usize::MAX));

    ground_truth
        .into_iter()
        .map(|path| WorkItem::new(path, GROUND_TRUTH_SOURCE))
        .chain(sampled.map(|path| WorkItem::new(path, SAMPLED_SOURCE)))
        .collect()
}

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::CorpusError;

/// DocLayNet layout classes, in the order the detector emits class ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Label {
    Caption,
    Footnote,
    Formula,
    #[serde(rename = "List-item")]
    ListItem,
    #[serde(rename = "Page-footer")]
    PageFooter,
    #[serde(rename = "Page-header")]
    PageHeader,
    Picture,
    #[serde(rename = "Section-header")]
    SectionHeader,
    Table,
    Text,
    Title,
}

impl Label {
    pub const ALL: [Label; 11] = [
        Label::Caption,
        Label::Footnote,
        Label::Formula,
        Label::ListItem,
        Label::PageFooter,
        Label::PageHeader,
        Label::Picture,
        Label::SectionHeader,
        Label::Table,
        Label::Text,
        Label::Title,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Label::Caption => "Caption",
            Label::Footnote => "Footnote",
            Label::Formula => "Formula",
            Label::ListItem => "List-item",
            Label::PageFooter => "Page-footer",
            Label::PageHeader => "Page-header",
            Label::Picture => "Picture",
            Label::SectionHeader => "Section-header",
            Label::Table => "Table",
            Label::Text => "Text",
            Label::Title => "Title",
        }
    }

    pub const fn idx(&self) -> usize {
        match self {
            Label::Caption => 0,
            Label::Footnote => 1,
            Label::Formula => 2,
            Label::ListItem => 3,
            Label::PageFooter => 4,
            Label::PageHeader => 5,
            Label::Picture => 6,
            Label::SectionHeader => 7,
            Label::Table => 8,
            Label::Text => 9,
            Label::Title => 10,
        }
    }

    pub const fn color(&self) -> [u8; 3] {
        match self {
            Label::Caption => [255, 0, 0],        // Red
            Label::Footnote => [0, 255, 0],       // Green
            Label::Formula => [0, 0, 255],        // Blue
            Label::ListItem => [255, 255, 0],     // Yellow
            Label::PageFooter => [255, 0, 255],   // Magenta
            Label::PageHeader => [0, 255, 255],   // Cyan
            Label::Picture => [128, 0, 128],      // Purple
            Label::SectionHeader => [128, 128, 0], // Olive
            Label::Table => [128, 128, 128],      // Gray
            Label::Text => [0, 128, 128],         // Teal
            Label::Title => [128, 0, 0],          // Maroon
        }
    }

    pub const fn label_size() -> usize {
        11
    }

    /// Maps a raw class id from the model output; ids outside the taxonomy
    /// yield `None` instead of panicking.
    pub fn from_idx(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Label {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['_', ' '], "-").to_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| label.name().to_lowercase() == wanted)
            .ok_or_else(|| CorpusError::UnknownLabel {
                name: s.to_string(),
            })
    }
}

/// A set of labels resolved once at startup, used to drop whole classes
/// from detector output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeSet<Label>);

impl LabelSet {
    pub fn new<I: IntoIterator<Item = Label>>(labels: I) -> Self {
        Self(labels.into_iter().collect())
    }

    pub fn contains(&self, label: Label) -> bool {
        self.0.contains(&label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Label> + '_ {
        self.0.iter().copied()
    }
}

impl FromStr for LabelSet {
    type Err = CorpusError;

    /// Parses a comma separated list such as `Picture,Page-header`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Label::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.iter().map(|l| l.name()).collect::<Vec<_>>();
        f.write_str(&names.join(","))
    }
}

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Serialize;
use serde_json::json;

use crate::error::CorpusError;

pub const CLASSIFIER_PROMPT: &str = "Classifier";
pub const JSON_EXTRACTOR_PROMPT: &str = "JSON_extractor";
pub const SPANISH_TEXT_PROMPT: &str = "Spanish_text";
pub const TARGET_TEXT_PROMPT: &str = "Target_text";
pub const EXTRACT_JSON_TOOL: &str = "extract_json";

/// How a prompt's raw answer is cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// One of `Candidate` / `No Candidate`.
    Classification,
    /// A JSON array of text pairs.
    JsonArray,
    /// Free text returned as is.
    PlainText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub name: String,
    pub text: String,
    pub kind: PromptKind,
}

/// The language paired with Spanish in a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptSet {
    #[default]
    Rapanui,
    Nahuatl,
}

impl PromptSet {
    /// Key of the target language in result records and tool schemas.
    pub const fn target_key(&self) -> &'static str {
        match self {
            PromptSet::Rapanui => "rapanui",
            PromptSet::Nahuatl => "nahuatl",
        }
    }

    pub const fn language(&self) -> &'static str {
        match self {
            PromptSet::Rapanui => "Rapa Nui",
            PromptSet::Nahuatl => "Nahuatl",
        }
    }
}

impl fmt::Display for PromptSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target_key())
    }
}

impl FromStr for PromptSet {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rapanui" | "rapa_nui" | "rapa-nui" => Ok(PromptSet::Rapanui),
            "nahuatl" => Ok(PromptSet::Nahuatl),
            _ => Err(CorpusError::UnknownPrompt {
                name: s.to_string(),
                available: "rapanui, nahuatl".to_string(),
            }),
        }
    }
}

/// Named prompts available to an inference client.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    set: PromptSet,
    prompts: BTreeMap<String, Prompt>,
}

impl PromptRegistry {
    pub fn new(set: PromptSet) -> Self {
        let language = set.language();
        let key = set.target_key();

        let entries = [
            (
                CLASSIFIER_PROMPT,
                PromptKind::Classification,
                classifier_text(language),
            ),
            (
                JSON_EXTRACTOR_PROMPT,
                PromptKind::JsonArray,
                extractor_text(language, key),
            ),
            (
                SPANISH_TEXT_PROMPT,
                PromptKind::PlainText,
                raw_text("Spanish"),
            ),
            (TARGET_TEXT_PROMPT, PromptKind::PlainText, raw_text(language)),
            (
                "parallel",
                PromptKind::JsonArray,
                "Extract the parallel data".to_string(),
            ),
            (
                "single",
                PromptKind::PlainText,
                "Extract the single data".to_string(),
            ),
            (
                "test",
                PromptKind::PlainText,
                "What do you see in this image?".to_string(),
            ),
        ];

        let prompts = entries
            .into_iter()
            .map(|(name, kind, text)| {
                (
                    name.to_string(),
                    Prompt {
                        name: name.to_string(),
                        text,
                        kind,
                    },
                )
            })
            .collect();

        Self { set, prompts }
    }

    pub fn set(&self) -> PromptSet {
        self.set
    }

    /// Looks a prompt up by name; unknown names list the available ones.
    pub fn get(&self, name: &str) -> Result<&Prompt, CorpusError> {
        self.prompts
            .get(name)
            .ok_or_else(|| CorpusError::UnknownPrompt {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.prompts.keys().map(String::as_str).collect()
    }

    /// Adds or replaces a prompt.
    pub fn insert(&mut self, prompt: Prompt) {
        self.prompts.insert(prompt.name.clone(), prompt);
    }
}

fn classifier_text(language: &str) -> String {
    format!(
        r#"Classify the given image of a book page based on whether it is a candidate for containing parallel data (e.g., text in {language} and Spanish presented side by side or one above the other).

Output a single-word response:
- "Candidate": If the image shows a structured parallel text layout (e.g., left-right or top-bottom alignment of text in {language} and Spanish).
- "No Candidate": If the image does not show such a layout (e.g., text is mixed combining both languages, diagrams dominate, or no clear structure is evident, or just pure plain text).

Follow these criteria:
1. Look for clear separation of text regions, indicating distinct sections for each language.
2. Detect the languages in the image to confirm the presence of {language} and Spanish text in separate blocks.
3. Avoid classifying pages with a dominance of diagrams, captions, or images as "Candidate".
4. Ensure the text layout suggests a parallel structure (left-right, top-bottom, etc.) for translation.
"#
    )
}

fn extractor_text(language: &str, key: &str) -> String {
    format!(
        r#"Carefully analyze the provided image. Extract all text pairs where a phrase is in Spanish and its equivalent in {language}. The texts may appear side by side, one above the other, or in separate sections of the image.

Ignore any text that is not in Spanish or {language}, or that does not form part of a translated pair.

Use the `print_pairs` tool exactly once. Without the tool, answer with a strictly valid JSON array and nothing else:

[
  {{"spanish": "text in Spanish", "{key}": "text in {language}"}}
]

If no pairs are found, return an empty array: []
"#
    )
}

fn raw_text(language: &str) -> String {
    format!(
        "Transcribe the {language} text in this image exactly as written. \
         Output only the transcription, without commentary."
    )
}

/// A tool definition sent alongside JSON-array prompts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Named tools available to an inference client.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new(set: PromptSet) -> Self {
        let key = set.target_key();
        let language = set.language();

        let print_pairs = ToolDefinition {
            name: "print_pairs".to_string(),
            description: format!(
                "Prints the extracted {language}-Spanish text pairs in a structured JSON format."
            ),
            // the tool input must be an object, so the pair list sits under `pairs`
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pairs": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "spanish": {"type": "string", "description": "The Spanish text segment."},
                                key: {"type": "string", "description": format!("The {language} text segment.")}
                            },
                            "required": ["spanish", key]
                        }
                    }
                },
                "required": ["pairs"]
            }),
        };

        Self {
            tools: BTreeMap::from([(EXTRACT_JSON_TOOL.to_string(), print_pairs)]),
        }
    }

    pub fn get(&self, name: &str) -> Result<&ToolDefinition, CorpusError> {
        self.tools.get(name).ok_or_else(|| CorpusError::UnknownTool {
            name: name.to_string(),
            available: self
                .tools
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

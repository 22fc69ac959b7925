//! SOAP note generation from a transcript

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::chunking::split_by_chars;
use crate::config::AssistantConfig;
use crate::document::{EvidenceLink, SoapSection, SummarizedSegment};
use crate::providers::TextGenerator;

pub const GENERATION_FAILED: &str = "Failed to generate summary. Please check logs.";
pub const UNPARSEABLE: &str = "Unable to parse structured response";

const CANONICAL_SECTIONS: [&str; 4] = ["SUBJECTIVE", "OBJECTIVE", "ASSESSMENT", "PLAN"];
const ERROR_KEY: &str = "Error";
const LOG_PREVIEW_CHARS: usize = 200;

/// Subjective / Objective / Assessment / Plan note
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SoapNote {
    #[serde(default)]
    pub subjective: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub plan: String,
    /// Set only when the model could not be called
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional categories the model chose to return
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl SoapNote {
    pub fn failed() -> Self {
        Self {
            error: Some(GENERATION_FAILED.to_string()),
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Canonical fields first, extras after, in SOAP order
    fn fields(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        [
            ("Subjective", self.subjective.as_str()),
            ("Objective", self.objective.as_str()),
            ("Assessment", self.assessment.as_str()),
            ("Plan", self.plan.as_str()),
        ]
        .into_iter()
        .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    fn set(&mut self, key: &str, value: String) {
        match key.to_lowercase().as_str() {
            "subjective" => self.subjective = value,
            "objective" => self.objective = value,
            "assessment" => self.assessment = value,
            "plan" => self.plan = value,
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }
}

/// Remove ```json / ``` fences anywhere in the text
fn strip_fences(text: &str) -> String {
    let mut parts = text.split("```");
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let rest = match part.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => part.get(4..).unwrap_or_default(),
            _ => part,
        };
        out.push_str(rest);
    }
    out
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Turn free-form model output into a note
///
/// Never fails: text without a readable JSON object becomes a degraded note
/// holding the cleaned text under `Subjective`.
pub fn parse_model_output(text: &str) -> SoapNote {
    let stripped = strip_fences(text);
    let cleaned = stripped.trim();

    let object = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => cleaned
            .get(start..=end)
            .and_then(|json| serde_json::from_str::<serde_json::Map<String, Value>>(json).ok()),
        _ => None,
    };

    match object {
        Some(object) => {
            let mut note = SoapNote::default();
            for (key, value) in &object {
                note.set(key, value_text(value));
            }
            note
        }
        None => {
            warn!(
                excerpt = %logger_redacted::preview(cleaned, LOG_PREVIEW_CHARS),
                "Model output is not a JSON object, keeping raw text"
            );
            SoapNote {
                subjective: cleaned.to_string(),
                objective: UNPARSEABLE.to_string(),
                assessment: UNPARSEABLE.to_string(),
                plan: UNPARSEABLE.to_string(),
                ..SoapNote::default()
            }
        }
    }
}

/// Merge per-chunk notes in chunk order, joining non-empty values with `\n`
pub fn merge_notes(notes: Vec<SoapNote>) -> SoapNote {
    if notes.iter().any(SoapNote::is_failed) {
        return SoapNote::failed();
    }

    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    for note in &notes {
        for (key, value) in note.fields() {
            let entry = merged.entry(key.to_string()).or_insert_with(|| {
                order.push(key.to_string());
                Vec::new()
            });
            if !value.trim().is_empty() {
                entry.push(value.to_string());
            }
        }
    }

    let mut note = SoapNote::default();
    for key in order {
        let joined = merged.remove(&key).unwrap_or_default().join("\n");
        note.set(&key, joined);
    }
    note
}

fn section(name: String, text: &str, segment_id: &str) -> SoapSection {
    SoapSection {
        section_name: name,
        summary: text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| SummarizedSegment {
                summarized_segment: line.to_string(),
                evidence_links: vec![EvidenceLink {
                    segment_id: segment_id.to_string(),
                }],
            })
            .collect(),
    }
}

/// Display sections: the four SOAP sections in order, then any extra categories
///
/// Only sections with at least one fragment are returned, and a failed note
/// has none. Every fragment links back to `first_segment_id`.
pub fn to_sections(note: &SoapNote, first_segment_id: &str) -> Vec<SoapSection> {
    if note.is_failed() {
        return Vec::new();
    }

    let canonical = [&note.subjective, &note.objective, &note.assessment, &note.plan];
    let mut sections: Vec<SoapSection> = CANONICAL_SECTIONS
        .iter()
        .zip(canonical)
        .map(|(name, text)| section((*name).to_string(), text, first_segment_id))
        .collect();

    sections.extend(
        note.extra
            .iter()
            .filter(|(key, _)| !key.eq_ignore_ascii_case(ERROR_KEY))
            .map(|(key, text)| section(key.to_uppercase().replace(' ', "_"), text, first_segment_id)),
    );
    sections.retain(|s| !s.summary.is_empty());
    sections
}

pub fn build_prompt(transcript: &str) -> String {
    format!(
        "You are an expert medical scribe. Read the following conversation between a clinician \
         and a patient and write a concise clinical note in SOAP format.\n\n\
         <transcript>\n{}\n</transcript>\n\n\
         Return only a JSON object with exactly these keys: \"Subjective\", \"Objective\", \
         \"Assessment\", \"Plan\". Each value is a string; put separate points on separate lines. \
         Do not add any text before or after the JSON object.",
        transcript
    )
}

/// Summarizes transcripts with a foundation model
pub struct SummarizationAdapter {
    generator: Arc<dyn TextGenerator>,
    chunk_chars: usize,
}

impl SummarizationAdapter {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &AssistantConfig) -> Self {
        Self {
            generator,
            chunk_chars: config.summary_chunk_chars,
        }
    }

    /// Summarize `text`; never returns an error
    ///
    /// Long transcripts are summarized chunk by chunk, concurrently, and
    /// merged. If any model call fails the whole note is the failed note.
    pub async fn summarize(&self, text: &str) -> SoapNote {
        if text.trim().is_empty() {
            return SoapNote::default();
        }

        let chunks = split_by_chars(text, self.chunk_chars);
        debug!(chunks = chunks.len(), chars = text.chars().count(), "Summarizing transcript");

        let prompts: Vec<String> = chunks.iter().map(|(_, piece)| build_prompt(piece)).collect();
        let responses = join_all(prompts.iter().map(|prompt| self.generator.generate(prompt))).await;

        let mut notes = Vec::with_capacity(responses.len());
        for (index, response) in responses.into_iter().enumerate() {
            match response {
                Ok(output) => notes.push(parse_model_output(&output)),
                Err(e) => {
                    error!(chunk = index, error = %e, "Summary generation failed");
                    return SoapNote::failed();
                }
            }
        }

        if notes.len() == 1 {
            return notes.pop().unwrap_or_default();
        }
        merge_notes(notes)
    }
}

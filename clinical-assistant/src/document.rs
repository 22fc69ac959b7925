//! Normalized conversation document consumed by presentation components
//!
//! Field names serialize in PascalCase so existing HealthScribe-style
//! components can render the document unchanged.

use serde::{Deserialize, Serialize};

use crate::entities::Ontology;

pub const TRANSCRIPT_SECTION: &str = "Transcript";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Pronunciation,
    Punctuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantRole {
    Clinician,
    Patient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Alternative {
    pub content: String,
    pub confidence: f64,
}

/// One recognized token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranscriptItem {
    pub begin_audio_time: f64,
    pub end_audio_time: f64,
    #[serde(rename = "Type")]
    pub item_type: ItemType,
    pub content: String,
    pub confidence: f64,
    pub alternatives: Vec<Alternative>,
}

impl TranscriptItem {
    pub fn is_punctuation(&self) -> bool {
        self.item_type == ItemType::Punctuation
    }

    /// Closed containment: the whole item lies inside `[begin, end]`
    pub fn within(&self, begin: f64, end: f64) -> bool {
        self.begin_audio_time >= begin && self.end_audio_time <= end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParticipantDetails {
    pub participant_role: ParticipantRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectionDetails {
    pub section_name: String,
}

/// A contiguous span of the conversation attributed to one speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranscriptSegment {
    pub segment_id: String,
    pub begin_audio_time: f64,
    pub end_audio_time: f64,
    pub content: String,
    pub participant_details: ParticipantDetails,
    pub section_details: SectionDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_label: Option<String>,
}

impl TranscriptSegment {
    pub fn role(&self) -> ParticipantRole {
        self.participant_details.participant_role
    }
}

/// Location of extracted text inside a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Span {
    pub begin_character_offset: i64,
    pub end_character_offset: i64,
    pub content: String,
    pub segment_id: String,
}

/// Ontology code attached to an entity (ICD-10-CM, RxNorm, SNOMED CT)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Concept {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InsightAttribute {
    pub attribute_id: String,
    #[serde(rename = "Type")]
    pub attribute_type: String,
    pub score: Option<f64>,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClinicalInsight {
    pub insight_id: String,
    pub category: String,
    #[serde(rename = "Type")]
    pub insight_type: String,
    pub ontology: Ontology,
    pub score: Option<f64>,
    pub spans: Vec<Span>,
    pub attributes: Vec<InsightAttribute>,
    pub concepts: Vec<Concept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub session_id: String,
    pub language_code: String,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub transcript_items: Vec<TranscriptItem>,
    pub clinical_insights: Vec<ClinicalInsight>,
}

/// Root aggregate handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NormalizedDocument {
    pub conversation: Conversation,
}

impl NormalizedDocument {
    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.conversation.transcript_segments
    }

    pub fn items(&self) -> &[TranscriptItem] {
        &self.conversation.transcript_items
    }

    pub fn insights(&self) -> &[ClinicalInsight] {
        &self.conversation.clinical_insights
    }

    pub fn first_segment_id(&self) -> Option<&str> {
        self.segments().first().map(|s| s.segment_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvidenceLink {
    pub segment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummarizedSegment {
    pub summarized_segment: String,
    pub evidence_links: Vec<EvidenceLink>,
}

/// One SOAP category (or an extra category the model produced)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SoapSection {
    pub section_name: String,
    pub summary: Vec<SummarizedSegment>,
}

//! Transcript normalizer
//!
//! Turns a raw transcription result plus extracted entities into the
//! [`NormalizedDocument`] the presentation layer renders. Normalization is
//! pure and deterministic: the same inputs always produce the same document.

use std::sync::Arc;

use crate::config::DEFAULT_LANGUAGE_CODE;
use crate::document::{
    Alternative, ClinicalInsight, Conversation, InsightAttribute, ItemType, NormalizedDocument,
    ParticipantDetails, ParticipantRole, SectionDetails, Span, TranscriptItem, TranscriptSegment,
    TRANSCRIPT_SECTION,
};
use crate::entities::{EntityExtraction, Ontology, RawEntity};
use crate::transcript::{RawItem, RawTranscription};

/// Speaker label treated as the clinician by [`CanonicalLabelPolicy::default`]
pub const DEFAULT_CLINICIAN_LABEL: &str = "spk_0";

const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Decides which participant a diarization label belongs to
pub trait RolePolicy: Send + Sync {
    /// `first_label` is the label of the first diarization segment in the document
    fn role_for(&self, speaker_label: &str, first_label: &str) -> ParticipantRole;
}

/// One configured label is the clinician; everyone else is a patient
#[derive(Debug, Clone)]
pub struct CanonicalLabelPolicy {
    clinician_label: String,
}

impl CanonicalLabelPolicy {
    pub fn new(clinician_label: impl Into<String>) -> Self {
        Self {
            clinician_label: clinician_label.into(),
        }
    }
}

impl Default for CanonicalLabelPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CLINICIAN_LABEL)
    }
}

impl RolePolicy for CanonicalLabelPolicy {
    fn role_for(&self, speaker_label: &str, _first_label: &str) -> ParticipantRole {
        if speaker_label == self.clinician_label {
            ParticipantRole::Clinician
        } else {
            ParticipantRole::Patient
        }
    }
}

/// Whoever speaks first is the clinician
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSpeakerPolicy;

impl RolePolicy for FirstSpeakerPolicy {
    fn role_for(&self, speaker_label: &str, first_label: &str) -> ParticipantRole {
        if speaker_label == first_label {
            ParticipantRole::Clinician
        } else {
            ParticipantRole::Patient
        }
    }
}

/// Adapts a closure into a [`RolePolicy`]
pub struct FnRolePolicy<F>(pub F);

impl<F> RolePolicy for FnRolePolicy<F>
where
    F: Fn(&str, &str) -> ParticipantRole + Send + Sync,
{
    fn role_for(&self, speaker_label: &str, first_label: &str) -> ParticipantRole {
        (self.0)(speaker_label, first_label)
    }
}

#[derive(Clone)]
pub struct TranscriptNormalizer {
    role_policy: Arc<dyn RolePolicy>,
    language_code: String,
    min_confidence: f64,
}

impl Default for TranscriptNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE_CODE)
    }
}

impl TranscriptNormalizer {
    pub fn new(language_code: impl Into<String>) -> Self {
        Self {
            role_policy: Arc::new(CanonicalLabelPolicy::default()),
            language_code: language_code.into(),
            min_confidence: 0.0,
        }
    }

    /// Drop insights scored below `min_confidence` (0.0 to 1.0)
    ///
    /// Identifiers are assigned before filtering, so a kept insight has the
    /// same id at every threshold. Unscored insights are always kept.
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_role_policy(mut self, role_policy: Arc<dyn RolePolicy>) -> Self {
        self.role_policy = role_policy;
        self
    }

    /// Build the normalized document for `conversation_name`
    ///
    /// The raw `jobName`, when present, wins over the requested name.
    pub fn normalize(
        &self,
        conversation_name: &str,
        raw: &RawTranscription,
        entities: &EntityExtraction,
    ) -> NormalizedDocument {
        let items: Vec<TranscriptItem> = raw.results.items.iter().map(map_item).collect();
        let segments = self.build_segments(raw, &items);
        let first_segment_id = segments
            .first()
            .map(|s| s.segment_id.clone())
            .unwrap_or_else(|| segment_id(0));
        let insights = entities
            .tagged()
            .enumerate()
            .map(|(index, (ontology, entity))| map_insight(index, ontology, entity, &first_segment_id))
            .filter(|insight| insight.score.map_or(true, |score| score >= self.min_confidence))
            .collect();

        let conversation_id = raw
            .job_name
            .clone()
            .unwrap_or_else(|| conversation_name.to_string());

        NormalizedDocument {
            conversation: Conversation {
                session_id: conversation_id.clone(),
                conversation_id,
                language_code: self.language_code.clone(),
                transcript_segments: segments,
                transcript_items: items,
                clinical_insights: insights,
            },
        }
    }

    fn build_segments(&self, raw: &RawTranscription, items: &[TranscriptItem]) -> Vec<TranscriptSegment> {
        let speaker_segments = raw.speaker_segments();
        let Some(first) = speaker_segments.first() else {
            return vec![fallback_segment(raw, items)];
        };
        let first_label = first.speaker_label.as_str();

        speaker_segments
            .iter()
            .enumerate()
            .map(|(index, speaker)| {
                let begin = speaker.start_time.unwrap_or_default();
                let end = speaker.end_time.unwrap_or_default();
                let content = items
                    .iter()
                    .filter(|item| !item.is_punctuation() && item.within(begin, end))
                    .map(|item| item.content.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");

                segment(
                    index,
                    begin,
                    end,
                    content,
                    self.role_policy.role_for(&speaker.speaker_label, first_label),
                    Some(speaker.speaker_label.clone()),
                )
            })
            .collect()
    }
}

fn segment_id(index: usize) -> String {
    format!("seg-{}", index)
}

fn segment(
    index: usize,
    begin: f64,
    end: f64,
    content: String,
    role: ParticipantRole,
    speaker_label: Option<String>,
) -> TranscriptSegment {
    TranscriptSegment {
        segment_id: segment_id(index),
        begin_audio_time: begin,
        end_audio_time: end,
        content,
        participant_details: ParticipantDetails { participant_role: role },
        section_details: SectionDetails {
            section_name: TRANSCRIPT_SECTION.to_string(),
        },
        speaker_label,
    }
}

/// Without diarization the whole transcript is one clinician segment
///
/// Punctuation carries no timing, so the span comes from the spoken items.
fn fallback_segment(raw: &RawTranscription, items: &[TranscriptItem]) -> TranscriptSegment {
    let spoken = || items.iter().filter(|i| !i.is_punctuation());
    let begin = spoken()
        .map(|i| i.begin_audio_time)
        .reduce(f64::min)
        .unwrap_or(0.0);
    let end = spoken()
        .map(|i| i.end_audio_time)
        .reduce(f64::max)
        .unwrap_or(begin)
        .max(begin);
    segment(
        0,
        begin,
        end,
        raw.plain_text().to_string(),
        ParticipantRole::Clinician,
        None,
    )
}

fn confidence(value: Option<f64>) -> f64 {
    value.map_or(DEFAULT_CONFIDENCE, |c| c.clamp(0.0, 1.0))
}

fn map_item(raw: &RawItem) -> TranscriptItem {
    let alternatives: Vec<Alternative> = raw
        .alternatives
        .iter()
        .map(|alt| Alternative {
            content: alt.content.clone(),
            confidence: confidence(alt.confidence),
        })
        .collect();
    let (content, item_confidence) = alternatives
        .first()
        .map_or((String::new(), DEFAULT_CONFIDENCE), |alt| (alt.content.clone(), alt.confidence));

    TranscriptItem {
        begin_audio_time: raw.start_time.unwrap_or_default(),
        end_audio_time: raw.end_time.unwrap_or_default(),
        item_type: if raw.is_punctuation() {
            ItemType::Punctuation
        } else {
            ItemType::Pronunciation
        },
        content,
        confidence: item_confidence,
        alternatives,
    }
}

fn insight_id(index: usize, ontology: Ontology, entity: &RawEntity) -> String {
    match (entity.id, ontology) {
        (Some(id), Ontology::Entities) => id.to_string(),
        (Some(id), other) => format!("{}-{}", other, id),
        (None, _) => format!("insight-{}", index),
    }
}

fn map_insight(index: usize, ontology: Ontology, entity: &RawEntity, segment_id: &str) -> ClinicalInsight {
    let insight_id = insight_id(index, ontology, entity);
    let entity_span = Span {
        begin_character_offset: entity.begin_offset,
        end_character_offset: entity.end_offset,
        content: entity.text.clone(),
        segment_id: segment_id.to_string(),
    };

    let own_attributes = entity.attributes.iter().map(|attribute| {
        (
            attribute.id.map(|id| id.to_string()),
            attribute.attribute_type.clone(),
            attribute.score,
            Span {
                begin_character_offset: attribute.begin_offset,
                end_character_offset: attribute.end_offset,
                content: attribute.text.clone(),
                segment_id: segment_id.to_string(),
            },
        )
    });
    let traits = entity
        .traits
        .iter()
        .map(|t| (None, t.name.clone(), t.score, entity_span.clone()));

    let attributes = own_attributes
        .chain(traits)
        .enumerate()
        .map(|(j, (id, attribute_type, score, span))| InsightAttribute {
            attribute_id: id.unwrap_or_else(|| format!("{}-attr-{}", insight_id, j)),
            attribute_type,
            score,
            spans: vec![span],
        })
        .collect();

    ClinicalInsight {
        insight_id,
        category: entity.category.clone(),
        insight_type: entity.entity_type.clone(),
        ontology,
        score: entity.score,
        spans: vec![entity_span],
        attributes,
        concepts: entity.concepts.clone(),
    }
}

//! Medical entity extraction across one or more ontologies

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunking::split_by_chars;
use crate::config::AssistantConfig;
use crate::document::{Concept, SoapSection};
use crate::error::{AssistantError, AssistantResult};
use crate::providers::EntityDetector;

/// Coding system an entity was recognized against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ontology {
    /// General clinical entities (medications, conditions, anatomy, ...)
    Entities,
    #[serde(rename = "ICD10CM")]
    Icd10Cm,
    #[serde(rename = "RxNorm")]
    RxNorm,
    #[serde(rename = "SNOMEDCT")]
    Snomedct,
}

impl Ontology {
    pub const ALL: [Ontology; 4] = [
        Ontology::Entities,
        Ontology::Icd10Cm,
        Ontology::RxNorm,
        Ontology::Snomedct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Ontology::Entities => "Entities",
            Ontology::Icd10Cm => "ICD10CM",
            Ontology::RxNorm => "RxNorm",
            Ontology::Snomedct => "SNOMEDCT",
        }
    }

    /// Parse a comma separated list such as `entities,icd10,rxnorm`
    pub fn parse_list(list: &str) -> AssistantResult<Vec<Ontology>> {
        let mut ontologies = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let ontology = part.parse()?;
            if !ontologies.contains(&ontology) {
                ontologies.push(ontology);
            }
        }
        Ok(ontologies)
    }
}

impl fmt::Display for Ontology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ontology {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "entities" | "general" => Ok(Ontology::Entities),
            "icd10" | "icd10cm" => Ok(Ontology::Icd10Cm),
            "rxnorm" => Ok(Ontology::RxNorm),
            "snomed" | "snomedct" => Ok(Ontology::Snomedct),
            _ => Err(AssistantError::Config(format!("Unknown ontology: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawTrait {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawAttribute {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "Type", default)]
    pub attribute_type: String,
    #[serde(default)]
    pub begin_offset: i64,
    #[serde(default)]
    pub end_offset: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Entity as returned by the entity-recognition service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawEntity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "Type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub begin_offset: i64,
    #[serde(default)]
    pub end_offset: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub traits: Vec<RawTrait>,
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
}

impl RawEntity {
    /// Move offsets and ids of an entity found in a later chunk of the text
    fn rebase(mut self, char_offset: i64, id_base: i64) -> Self {
        self.begin_offset = self.begin_offset.saturating_add(char_offset);
        self.end_offset = self.end_offset.saturating_add(char_offset);
        self.id = self.id.map(|id| id.saturating_add(id_base));
        for attribute in &mut self.attributes {
            attribute.begin_offset = attribute.begin_offset.saturating_add(char_offset);
            attribute.end_offset = attribute.end_offset.saturating_add(char_offset);
            attribute.id = attribute.id.map(|id| id.saturating_add(id_base));
        }
        self
    }

    fn max_id(&self) -> Option<i64> {
        self.attributes
            .iter()
            .filter_map(|a| a.id)
            .chain(self.id)
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OntologyEntities {
    pub ontology: Ontology,
    pub entities: Vec<RawEntity>,
}

/// Combined extraction output; only ontologies that found something appear
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityExtraction {
    pub results: Vec<OntologyEntities>,
}

/// `{"Entities": [...]}` as written by DetectEntitiesV2
#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(rename = "Entities", default)]
    entities: Vec<RawEntity>,
}

impl EntityExtraction {
    pub fn from_entities(ontology: Ontology, entities: Vec<RawEntity>) -> Self {
        if entities.is_empty() {
            return Self::default();
        }
        Self {
            results: vec![OntologyEntities { ontology, entities }],
        }
    }

    /// Read a stored response; a bare `{"Entities": [...]}` object counts as general entities
    pub fn from_json(bytes: &[u8]) -> AssistantResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if value.get("Results").is_some() {
            return Ok(serde_json::from_value(value)?);
        }
        let response: EntitiesResponse = serde_json::from_value(value)?;
        Ok(Self::from_entities(Ontology::Entities, response.entities))
    }

    pub fn is_empty(&self) -> bool {
        self.results.iter().all(|r| r.entities.is_empty())
    }

    pub fn entity_count(&self) -> usize {
        self.results.iter().map(|r| r.entities.len()).sum()
    }

    pub fn ontologies(&self) -> Vec<Ontology> {
        self.results.iter().map(|r| r.ontology).collect()
    }

    /// Keep entities scored at least `min_confidence`; unscored entities stay
    pub fn retain_confident(&mut self, min_confidence: f64) {
        for result in &mut self.results {
            result
                .entities
                .retain(|e| e.score.map_or(true, |score| score >= min_confidence));
        }
        self.results.retain(|r| !r.entities.is_empty());
    }

    /// Every entity tagged with the ontology it came from, in result order
    pub fn tagged(&self) -> impl Iterator<Item = (Ontology, &RawEntity)> + '_ {
        self.results
            .iter()
            .flat_map(|r| r.entities.iter().map(move |e| (r.ontology, e)))
    }
}

/// Entities found in each summarized line of one SOAP section
///
/// `extracted_entities[i]` belongs to the section's `i`-th fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectionEntities {
    pub section_name: String,
    pub extracted_entities: Vec<EntityExtraction>,
}

/// Comprehend Medical units (100 characters each) needed for a clinical document
///
/// The service bills per request, so the total depends on how the text is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingUnits {
    /// One request per summarized line
    pub each_segment: u64,
    /// One request per section
    pub each_section: u64,
    /// The whole document in one request
    pub all_at_once: u64,
}

pub const CHARS_PER_UNIT: u64 = 100;

fn units_for(chars: u64) -> u64 {
    chars.div_ceil(CHARS_PER_UNIT)
}

fn char_count(text: &str) -> u64 {
    u64::try_from(text.chars().count()).unwrap_or(u64::MAX)
}

impl BillingUnits {
    pub fn estimate(sections: &[SoapSection]) -> Self {
        let mut each_segment: u64 = 0;
        let mut each_section: u64 = 0;
        let mut total_chars: u64 = 0;
        for section in sections {
            let mut section_chars: u64 = 0;
            for fragment in &section.summary {
                let chars = char_count(&fragment.summarized_segment);
                each_segment = each_segment.saturating_add(units_for(chars));
                section_chars = section_chars.saturating_add(chars);
            }
            each_section = each_section.saturating_add(units_for(section_chars));
            total_chars = total_chars.saturating_add(section_chars);
        }
        Self {
            each_segment,
            each_section,
            all_at_once: units_for(total_chars),
        }
    }
}

/// Runs entity detection for every configured ontology concurrently
pub struct EntityExtractionAdapter {
    detector: Arc<dyn EntityDetector>,
    ontologies: Vec<Ontology>,
    chunk_chars: usize,
}

impl EntityExtractionAdapter {
    pub fn new(detector: Arc<dyn EntityDetector>, config: &AssistantConfig) -> Self {
        Self {
            detector,
            ontologies: config.ontologies.clone(),
            chunk_chars: config.entity_chunk_chars,
        }
    }

    pub fn with_ontologies(mut self, ontologies: Vec<Ontology>) -> Self {
        self.ontologies = ontologies;
        self
    }

    pub fn ontologies(&self) -> &[Ontology] {
        &self.ontologies
    }

    /// Extract entities from `text`
    ///
    /// Never fails: a failed call contributes no entities and ontologies
    /// without entities are left out of the result.
    pub async fn extract(&self, text: &str) -> EntityExtraction {
        let chunks = split_by_chars(text, self.chunk_chars);
        if text.trim().is_empty() || chunks.is_empty() {
            return EntityExtraction::default();
        }

        let calls = self
            .ontologies
            .iter()
            .map(|&ontology| self.extract_ontology(ontology, &chunks));
        let results: Vec<OntologyEntities> = join_all(calls)
            .await
            .into_iter()
            .filter(|r| !r.entities.is_empty())
            .collect();

        debug!(
            requested = self.ontologies.len(),
            returned = results.len(),
            "Entity extraction finished"
        );
        EntityExtraction { results }
    }

    /// Extract entities from every summarized line of `sections`
    ///
    /// All lines are sent concurrently; the result keeps section and line
    /// order. Like [`Self::extract`] this never fails.
    pub async fn extract_sections(&self, sections: &[SoapSection]) -> Vec<SectionEntities> {
        let per_section = sections.iter().map(|section| async move {
            let calls = section
                .summary
                .iter()
                .map(|fragment| self.extract(&fragment.summarized_segment));
            SectionEntities {
                section_name: section.section_name.clone(),
                extracted_entities: join_all(calls).await,
            }
        });
        join_all(per_section).await
    }

    async fn extract_ontology(&self, ontology: Ontology, chunks: &[(usize, &str)]) -> OntologyEntities {
        let calls = chunks.iter().map(|(_, piece)| self.detector.detect(ontology, piece));
        let responses = join_all(calls).await;

        let mut entities = Vec::new();
        let mut id_base: i64 = 0;
        for ((char_offset, _), response) in chunks.iter().zip(responses) {
            let found = match response {
                Ok(found) => found,
                Err(e) => {
                    warn!(ontology = %ontology, error = %e, "Entity detection call failed, continuing without it");
                    continue;
                }
            };
            let offset = i64::try_from(*char_offset).unwrap_or(i64::MAX);
            let mut next_base = id_base;
            for entity in found {
                let entity = entity.rebase(offset, id_base);
                if let Some(max_id) = entity.max_id() {
                    next_base = next_base.max(max_id.saturating_add(1));
                }
                entities.push(entity);
            }
            id_base = next_base;
        }

        OntologyEntities { ontology, entities }
    }
}

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_comprehendmedical::types::{Entity, Icd10CmEntity, RxNormEntity, SnomedctEntity};
use aws_sdk_comprehendmedical::Client as ComprehendMedicalClient;
use tracing::debug;

use super::EntityDetector;
use crate::document::Concept;
use crate::entities::{Ontology, RawAttribute, RawEntity, RawTrait};
use crate::error::{AssistantError, AssistantResult};

/// Comprehend Medical entity types all expose the same accessors; only the
/// concept list differs per ontology.
macro_rules! entity_mapper {
    ($name:ident, $ty:ty $(, $concepts:ident)?) => {
        fn $name(e: &$ty) -> RawEntity {
            #[allow(unused_mut)]
            let mut concepts: Vec<Concept> = Vec::new();
            $(
                concepts.extend(e.$concepts().iter().map(|c| Concept {
                    code: c.code().unwrap_or_default().to_string(),
                    description: c.description().unwrap_or_default().to_string(),
                    score: c.score().map(f64::from),
                }));
            )?

            RawEntity {
                id: e.id().map(i64::from),
                category: e.category().map(|c| c.as_str().to_string()).unwrap_or_default(),
                entity_type: e.r#type().map(|t| t.as_str().to_string()).unwrap_or_default(),
                begin_offset: e.begin_offset().map(i64::from).unwrap_or_default(),
                end_offset: e.end_offset().map(i64::from).unwrap_or_default(),
                text: e.text().unwrap_or_default().to_string(),
                score: e.score().map(f64::from),
                traits: e
                    .traits()
                    .iter()
                    .map(|t| RawTrait {
                        name: t.name().map(|n| n.as_str().to_string()).unwrap_or_default(),
                        score: t.score().map(f64::from),
                    })
                    .collect(),
                attributes: e
                    .attributes()
                    .iter()
                    .map(|a| RawAttribute {
                        id: a.id().map(i64::from),
                        attribute_type: a.r#type().map(|t| t.as_str().to_string()).unwrap_or_default(),
                        begin_offset: a.begin_offset().map(i64::from).unwrap_or_default(),
                        end_offset: a.end_offset().map(i64::from).unwrap_or_default(),
                        text: a.text().unwrap_or_default().to_string(),
                        score: a.score().map(f64::from),
                    })
                    .collect(),
                concepts,
            }
        }
    };
}

entity_mapper!(from_entity, Entity);
entity_mapper!(from_icd10_cm, Icd10CmEntity, icd10_cm_concepts);
entity_mapper!(from_rx_norm, RxNormEntity, rx_norm_concepts);
entity_mapper!(from_snomedct, SnomedctEntity, snomedct_concepts);

/// Amazon Comprehend Medical, one API per ontology
pub struct ComprehendMedicalDetector {
    client: ComprehendMedicalClient,
}

impl ComprehendMedicalDetector {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: ComprehendMedicalClient::new(sdk_config),
        }
    }
}

fn call_failed(ontology: Ontology, error: impl std::fmt::Display) -> AssistantError {
    AssistantError::EntityExtraction(format!("{} detection failed: {}", ontology, error))
}

#[async_trait]
impl EntityDetector for ComprehendMedicalDetector {
    async fn detect(&self, ontology: Ontology, text: &str) -> AssistantResult<Vec<RawEntity>> {
        debug!(ontology = %ontology, chars = text.chars().count(), "Comprehend Medical request");
        let entities: Vec<RawEntity> = match ontology {
            Ontology::Entities => self
                .client
                .detect_entities_v2()
                .text(text)
                .send()
                .await
                .map_err(|e| call_failed(ontology, e.into_service_error()))?
                .entities()
                .iter()
                .map(from_entity)
                .collect(),
            Ontology::Icd10Cm => self
                .client
                .infer_icd10_cm()
                .text(text)
                .send()
                .await
                .map_err(|e| call_failed(ontology, e.into_service_error()))?
                .entities()
                .iter()
                .map(from_icd10_cm)
                .collect(),
            Ontology::RxNorm => self
                .client
                .infer_rx_norm()
                .text(text)
                .send()
                .await
                .map_err(|e| call_failed(ontology, e.into_service_error()))?
                .entities()
                .iter()
                .map(from_rx_norm)
                .collect(),
            Ontology::Snomedct => self
                .client
                .infer_snomedct()
                .text(text)
                .send()
                .await
                .map_err(|e| call_failed(ontology, e.into_service_error()))?
                .entities()
                .iter()
                .map(from_snomedct)
                .collect(),
        };
        Ok(entities)
    }
}

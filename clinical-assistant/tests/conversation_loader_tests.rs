//! Conversation Loading Workflow Tests
//!
//! These tests drive the loader end to end against in-memory adapters:
//! 1. Completed job - transcript, SOAP note and entities in one view
//! 2. Job still running - NotReady, info notification, no view
//! 3. Storage failure - Failed, error notification, prior view kept
//! 4. One ontology failing - the others still show up
//! 5. Long transcript - chunked summary merged in order
//! 6. Chatty model output - fenced JSON still parsed
//! 7. Summary entities - per-line extraction, confidence threshold, units

use std::sync::Arc;

use async_trait::async_trait;
use clinical_assistant::entities::RawEntity;
use clinical_assistant::providers::memory::{
    InMemoryObjectStore, ScriptedTextGenerator, StaticEntityDetector,
};
use clinical_assistant::providers::ObjectStore;
use clinical_assistant::*;
use parking_lot::Mutex;
use serde_json::json;

const BUCKET: &str = "clinical-bucket";

fn config() -> AssistantConfig {
    AssistantConfig::new("ap-southeast-2", BUCKET)
}

fn transcript_json() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "jobName": "visit-42",
        "results": {
            "transcripts": [{ "transcript": "Any chest pain? Yes since Monday." }],
            "items": [
                { "start_time": "0.0", "end_time": "0.4", "type": "pronunciation",
                  "alternatives": [{ "content": "Any", "confidence": "0.99" }] },
                { "start_time": "0.4", "end_time": "0.7", "type": "pronunciation",
                  "alternatives": [{ "content": "chest", "confidence": "0.98" }] },
                { "start_time": "0.7", "end_time": "1.0", "type": "pronunciation",
                  "alternatives": [{ "content": "pain", "confidence": "0.97" }] },
                { "type": "punctuation", "alternatives": [{ "content": "?", "confidence": "0.0" }] },
                { "start_time": "1.5", "end_time": "1.8", "type": "pronunciation",
                  "alternatives": [{ "content": "Yes", "confidence": "0.95" }] },
                { "start_time": "1.8", "end_time": "2.2", "type": "pronunciation",
                  "alternatives": [{ "content": "since", "confidence": "0.96" }] },
                { "start_time": "2.2", "end_time": "2.8", "type": "pronunciation",
                  "alternatives": [{ "content": "Monday", "confidence": "0.91" }] }
            ],
            "speaker_labels": {
                "speakers": 2,
                "segments": [
                    { "start_time": "0.0", "end_time": "1.0", "speaker_label": "spk_0" },
                    { "start_time": "1.5", "end_time": "2.8", "speaker_label": "spk_1" }
                ]
            }
        }
    }))
    .unwrap()
}

const SOAP_RESPONSE: &str = r#"{"Subjective":"Chest pain since Monday","Objective":"Not examined","Assessment":"Chest pain, cause unclear","Plan":"ECG\nReview in 1 week"}"#;

fn chest_pain() -> RawEntity {
    RawEntity {
        id: Some(0),
        category: "MEDICAL_CONDITION".to_string(),
        entity_type: "DX_NAME".to_string(),
        begin_offset: 4,
        end_offset: 14,
        text: "chest pain".to_string(),
        score: Some(0.93),
        ..Default::default()
    }
}

fn store_with_transcript() -> Arc<InMemoryObjectStore> {
    let store = Arc::new(InMemoryObjectStore::new(BUCKET));
    store.insert("transcripts/visit-42.json", transcript_json());
    store
}

/// Object store whose reads can be switched to fail
struct FlakyStore {
    inner: InMemoryObjectStore,
    failing: Mutex<bool>,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> AssistantResult<()> {
        self.inner.put_object(key, body, content_type).await
    }

    async fn get_object(&self, key: &str) -> AssistantResult<Vec<u8>> {
        if *self.failing.lock() {
            return Err(AssistantError::Storage("AccessDenied".to_string()));
        }
        self.inner.get_object(key).await
    }
}

// ============================================================================
// TEST 1: Completed job
// ============================================================================

#[tokio::test]
async fn test_completed_job_produces_full_view() {
    let store = store_with_transcript();
    let generator = Arc::new(ScriptedTextGenerator::new().with_response(SOAP_RESPONSE));
    let detector = Arc::new(
        StaticEntityDetector::new().with_entities(Ontology::Entities, vec![chest_pain()]),
    );
    let loader = ConversationLoader::from_parts(store, generator, detector, &config());

    let view = loader.load("visit-42").await.unwrap();

    let conversation = &view.transcript.conversation;
    assert_eq!(conversation.conversation_id, "visit-42");
    assert_eq!(conversation.language_code, "en-US");
    assert_eq!(view.transcript.segments().len(), 2);
    assert_eq!(view.transcript.segments()[0].content, "Any chest pain");
    assert_eq!(view.transcript.segments()[0].role(), ParticipantRole::Clinician);
    assert_eq!(view.transcript.segments()[1].content, "Yes since Monday");
    assert_eq!(view.transcript.segments()[1].role(), ParticipantRole::Patient);

    assert_eq!(view.transcript.insights().len(), 1);
    assert_eq!(view.transcript.insights()[0].spans[0].segment_id, "seg-0");

    assert_eq!(view.summary.subjective, "Chest pain since Monday");
    let plan = &view.sections[3];
    assert_eq!(plan.section_name, "PLAN");
    assert_eq!(plan.summary.len(), 2);
    assert_eq!(plan.summary[1].summarized_segment, "Review in 1 week");
    assert!(view
        .sections
        .iter()
        .flat_map(|s| &s.summary)
        .all(|fragment| fragment.evidence_links[0].segment_id == "seg-0"));
}

#[tokio::test]
async fn test_disabled_entity_extraction_skips_detector() {
    let mut config = config();
    config.comprehend_medical_enabled = false;
    let detector = Arc::new(
        StaticEntityDetector::new().with_entities(Ontology::Entities, vec![chest_pain()]),
    );
    let loader = ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(ScriptedTextGenerator::new().with_response(SOAP_RESPONSE)),
        detector.clone(),
        &config,
    );

    let view = loader.load("visit-42").await.unwrap();
    assert!(view.transcript.insights().is_empty());
    assert_eq!(detector.calls(), 0);
}

#[tokio::test]
async fn test_summary_is_persisted_when_enabled() {
    let mut config = config();
    config.persist_summary = true;
    let store = store_with_transcript();
    let loader = ConversationLoader::from_parts(
        store.clone(),
        Arc::new(ScriptedTextGenerator::new().with_response(SOAP_RESPONSE)),
        Arc::new(StaticEntityDetector::new()),
        &config,
    );

    loader.load("visit-42").await.unwrap();

    let saved = store.get("transcripts/visit-42_summary.json").unwrap();
    let note: SoapNote = serde_json::from_slice(&saved).unwrap();
    assert_eq!(note.plan, "ECG\nReview in 1 week");
}

#[tokio::test]
async fn test_failed_summary_write_does_not_fail_the_load() {
    let mut config = config();
    config.persist_summary = true;
    let store = store_with_transcript();
    store.fail_writes();
    let loader = ConversationLoader::from_parts(
        store,
        Arc::new(ScriptedTextGenerator::new().with_response(SOAP_RESPONSE)),
        Arc::new(StaticEntityDetector::new()),
        &config,
    );

    assert!(loader.load("visit-42").await.is_ok());
}

// ============================================================================
// TEST 2: Job still running
// ============================================================================

#[tokio::test]
async fn test_missing_transcript_is_not_ready() {
    let loader = Arc::new(ConversationLoader::from_parts(
        Arc::new(InMemoryObjectStore::new(BUCKET)),
        Arc::new(ScriptedTextGenerator::new()),
        Arc::new(StaticEntityDetector::new()),
        &config(),
    ));
    let notifications = Arc::new(NotificationLog::new());
    let mut session = ConversationSession::new(loader, notifications.clone(), "visit-99");

    let state = session.load().await.clone();

    assert_eq!(
        state,
        LoadState::NotReady {
            job_name: "visit-99".to_string()
        }
    );
    assert!(session.view().is_none());
    let shown = notifications.notifications();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].kind, NotificationKind::Info);
    assert_eq!(shown[0].header, "Job still processing");
    assert_eq!(
        shown[0].content,
        "The transcript is not ready yet. Please try again later."
    );
}

#[tokio::test]
async fn test_load_does_not_repeat_after_terminal_state() {
    let store = Arc::new(InMemoryObjectStore::new(BUCKET));
    let loader = Arc::new(ConversationLoader::from_parts(
        store.clone(),
        Arc::new(ScriptedTextGenerator::new().with_fallback(SOAP_RESPONSE)),
        Arc::new(StaticEntityDetector::new()),
        &config(),
    ));
    let notifications = Arc::new(NotificationLog::new());
    let mut session = ConversationSession::new(loader, notifications.clone(), "visit-42");

    session.load().await;
    store.insert("transcripts/visit-42.json", transcript_json());

    // no new attempt without an explicit reload
    assert!(matches!(session.load().await, LoadState::NotReady { .. }));
    assert_eq!(notifications.notifications().len(), 1);

    assert_eq!(session.reload().await, &LoadState::Ready);
    assert!(session.view().is_some());
}

// ============================================================================
// TEST 3: Storage failure
// ============================================================================

#[tokio::test]
async fn test_storage_failure_keeps_previous_view() {
    let inner = InMemoryObjectStore::new(BUCKET);
    inner.insert("transcripts/visit-42.json", transcript_json());
    let store = Arc::new(FlakyStore {
        inner,
        failing: Mutex::new(false),
    });
    let loader = Arc::new(ConversationLoader::from_parts(
        store.clone(),
        Arc::new(ScriptedTextGenerator::new().with_fallback(SOAP_RESPONSE)),
        Arc::new(StaticEntityDetector::new()),
        &config(),
    ));
    let notifications = Arc::new(NotificationLog::new());
    let mut session = ConversationSession::new(loader, notifications.clone(), "visit-42");

    assert_eq!(session.load().await, &LoadState::Ready);
    let before = session.view().cloned();

    *store.failing.lock() = true;
    let state = session.reload().await.clone();

    assert!(matches!(state, LoadState::Failed { ref message } if message.contains("AccessDenied")));
    assert_eq!(session.view().cloned(), before);
    let shown = notifications.notifications();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].kind, NotificationKind::Error);
    assert_eq!(shown[0].header, "Error loading data");
}

#[tokio::test]
async fn test_malformed_transcript_fails() {
    let store = Arc::new(InMemoryObjectStore::new(BUCKET));
    store.insert("transcripts/broken.json", b"{\"jobName\":\"broken\"}".to_vec());
    let loader = ConversationLoader::from_parts(
        store,
        Arc::new(ScriptedTextGenerator::new()),
        Arc::new(StaticEntityDetector::new()),
        &config(),
    );

    let err = loader.load("broken").await.unwrap_err();
    assert!(matches!(err, AssistantError::MalformedTranscript(_)));
}

// ============================================================================
// TEST 4: One ontology failing
// ============================================================================

#[tokio::test]
async fn test_partial_ontology_failure_is_absorbed() {
    let config = config().with_ontologies(vec![Ontology::Icd10Cm, Ontology::RxNorm, Ontology::Snomedct]);
    let detector = StaticEntityDetector::new()
        .with_entities(Ontology::Icd10Cm, vec![chest_pain()])
        .with_failure(Ontology::RxNorm)
        .with_entities(Ontology::Snomedct, vec![chest_pain()]);
    let loader = ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(ScriptedTextGenerator::new().with_response(SOAP_RESPONSE)),
        Arc::new(detector),
        &config,
    );

    let view = loader.load("visit-42").await.unwrap();
    let ontologies: Vec<Ontology> = view.transcript.insights().iter().map(|i| i.ontology).collect();
    assert_eq!(ontologies, vec![Ontology::Icd10Cm, Ontology::Snomedct]);
}

// ============================================================================
// TEST 5: Long transcript
// ============================================================================

#[tokio::test]
async fn test_long_transcript_summary_is_merged_in_chunk_order() {
    let mut config = config();
    // "Any chest pain? Yes since Monday." is 33 characters: three chunks
    config.summary_chunk_chars = 12;
    let generator = ScriptedTextGenerator::new()
        .with_response(r#"{"Subjective":"a","Objective":"","Assessment":"","Plan":""}"#)
        .with_response(r#"{"Subjective":"b","Objective":"","Assessment":"","Plan":""}"#)
        .with_response(r#"{"Subjective":"c","Objective":"","Assessment":"","Plan":""}"#);
    let loader = ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(generator),
        Arc::new(StaticEntityDetector::new()),
        &config,
    );

    let view = loader.load("visit-42").await.unwrap();
    assert_eq!(view.summary.subjective, "a\nb\nc");
}

#[tokio::test]
async fn test_model_failure_still_shows_transcript() {
    let loader = ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(ScriptedTextGenerator::new().with_failure("ThrottlingException")),
        Arc::new(StaticEntityDetector::new()),
        &config(),
    );

    let view = loader.load("visit-42").await.unwrap();
    assert_eq!(
        view.summary.error.as_deref(),
        Some("Failed to generate summary. Please check logs.")
    );
    assert_eq!(view.transcript.segments().len(), 2);
    assert!(view.sections.is_empty());
}

// ============================================================================
// TEST 6: Chatty model output
// ============================================================================

#[tokio::test]
async fn test_fenced_model_output_is_parsed() {
    let chatty = "Sure! ```json\n{\"Subjective\":\"x\",\"Objective\":\"y\",\"Assessment\":\"z\",\"Plan\":\"w\"}\n``` Hope this helps!";
    let loader = ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(ScriptedTextGenerator::new().with_response(chatty)),
        Arc::new(StaticEntityDetector::new()),
        &config(),
    );

    let view = loader.load("visit-42").await.unwrap();
    assert_eq!(view.summary.subjective, "x");
    assert_eq!(view.summary.plan, "w");
    assert_eq!(view.sections[0].summary[0].summarized_segment, "x");
}

// ============================================================================
// TEST 7: Summary entities
// ============================================================================

fn low_confidence() -> RawEntity {
    RawEntity {
        id: Some(1),
        category: "MEDICAL_CONDITION".to_string(),
        entity_type: "DX_NAME".to_string(),
        text: "pain".to_string(),
        score: Some(0.4),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_low_confidence_insights_are_left_out_of_the_view() {
    let detector = Arc::new(
        StaticEntityDetector::new()
            .with_entities(Ontology::Entities, vec![chest_pain(), low_confidence()]),
    );
    let loader = ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(ScriptedTextGenerator::new().with_response(SOAP_RESPONSE)),
        detector,
        &config(),
    );

    let view = loader.load("visit-42").await.unwrap();

    let texts: Vec<&str> = view
        .transcript
        .insights()
        .iter()
        .map(|i| i.spans[0].content.as_str())
        .collect();
    assert_eq!(texts, vec!["chest pain"]);
}

#[tokio::test]
async fn test_session_extracts_entities_per_summary_line() {
    let detector = Arc::new(
        StaticEntityDetector::new()
            .with_entities(Ontology::Entities, vec![chest_pain(), low_confidence()]),
    );
    let loader = Arc::new(ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(ScriptedTextGenerator::new().with_fallback(SOAP_RESPONSE)),
        detector,
        &config(),
    ));
    let mut session = ConversationSession::new(loader, Arc::new(NotificationLog::new()), "visit-42");

    // nothing to annotate before a view exists
    assert!(session.extract_section_entities().await.is_empty());

    session.load().await;
    let extracted = session.extract_section_entities().await.to_vec();

    let names: Vec<&str> = extracted.iter().map(|s| s.section_name.as_str()).collect();
    assert_eq!(names, vec!["SUBJECTIVE", "OBJECTIVE", "ASSESSMENT", "PLAN"]);
    // the plan has two lines
    assert_eq!(extracted[3].extracted_entities.len(), 2);
    assert!(extracted
        .iter()
        .flat_map(|s| &s.extracted_entities)
        .all(|e| e.entity_count() == 1));

    // ECG / Review in 1 week / Chest pain since Monday / Not examined / Chest pain, cause unclear
    let units = session.view().unwrap().billing_units();
    assert_eq!(units.each_segment, 5);
    assert_eq!(units.each_section, 4);
    assert_eq!(units.all_at_once, 1);
}

#[tokio::test]
async fn test_section_entities_skipped_when_comprehend_disabled() {
    let detector = Arc::new(
        StaticEntityDetector::new().with_entities(Ontology::Entities, vec![chest_pain()]),
    );
    let mut config = config();
    config.comprehend_medical_enabled = false;
    let loader = ConversationLoader::from_parts(
        store_with_transcript(),
        Arc::new(ScriptedTextGenerator::new().with_response(SOAP_RESPONSE)),
        detector.clone(),
        &config,
    );

    let view = loader.load("visit-42").await.unwrap();
    assert!(loader.extract_section_entities(&view.sections).await.is_empty());
    assert_eq!(detector.calls(), 0);
}

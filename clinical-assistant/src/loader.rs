//! Conversation load orchestration
//!
//! [`ConversationLoader`] fetches a finished transcript, runs summarization
//! and entity extraction side by side, normalizes the result and hands back a
//! [`ConversationView`]. [`ConversationSession`] wraps it with the per-view
//! state machine and the user-facing notifications.

use std::sync::Arc;

use futures::future::join;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::document::{NormalizedDocument, SoapSection};
use crate::entities::{BillingUnits, EntityExtraction, EntityExtractionAdapter, SectionEntities};
use crate::error::{AssistantError, AssistantResult};
use crate::keys::StorageKeys;
use crate::normalizer::TranscriptNormalizer;
use crate::providers::{EntityDetector, ObjectStore, Providers, TextGenerator};
use crate::summary::{to_sections, SoapNote, SummarizationAdapter};
use crate::transcript::RawTranscription;

pub const NOT_READY_HEADER: &str = "Job still processing";
pub const NOT_READY_CONTENT: &str = "The transcript is not ready yet. Please try again later.";
pub const LOAD_ERROR_HEADER: &str = "Error loading data";

const FIRST_SEGMENT_ID: &str = "seg-0";

/// Everything the presentation layer needs for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversationView {
    pub transcript: NormalizedDocument,
    pub summary: SoapNote,
    pub sections: Vec<SoapSection>,
}

impl ConversationView {
    /// Comprehend Medical units needed to annotate the SOAP sections
    pub fn billing_units(&self) -> BillingUnits {
        BillingUnits::estimate(&self.sections)
    }
}

pub struct ConversationLoader {
    store: Arc<dyn ObjectStore>,
    summarizer: SummarizationAdapter,
    extractor: Option<EntityExtractionAdapter>,
    normalizer: TranscriptNormalizer,
    keys: StorageKeys,
    persist_summary: bool,
    min_confidence: f64,
}

impl ConversationLoader {
    pub fn new(providers: &Providers, config: &AssistantConfig) -> Self {
        Self::from_parts(
            providers.store.clone(),
            providers.generator.clone(),
            providers.detector.clone(),
            config,
        )
    }

    /// Wire the loader from individual adapters
    ///
    /// Entity extraction is left out entirely when Comprehend Medical is
    /// disabled in `config`.
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        generator: Arc<dyn TextGenerator>,
        detector: Arc<dyn EntityDetector>,
        config: &AssistantConfig,
    ) -> Self {
        let extractor = config
            .comprehend_medical_enabled
            .then(|| EntityExtractionAdapter::new(detector, config));

        Self {
            store,
            summarizer: SummarizationAdapter::new(generator, config),
            extractor,
            normalizer: TranscriptNormalizer::new(config.language_code.clone())
                .with_min_confidence(config.min_confidence),
            keys: StorageKeys::from_config(config),
            persist_summary: config.persist_summary,
            min_confidence: config.min_confidence,
        }
    }

    pub fn with_normalizer(mut self, normalizer: TranscriptNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Load the conversation produced by `job_name`
    ///
    /// A transcript that does not exist yet is [`AssistantError::NotReady`].
    pub async fn load(&self, job_name: &str) -> AssistantResult<ConversationView> {
        let key = self.keys.transcript_key(job_name);
        let bytes = self.store.get_object(&key).await.map_err(|e| match e {
            AssistantError::NotFound { .. } => AssistantError::NotReady {
                job_name: job_name.to_string(),
            },
            other => other,
        })?;

        let raw = RawTranscription::from_slice(&bytes)?;
        let text = raw.plain_text();

        let entities = async {
            match &self.extractor {
                Some(extractor) => extractor.extract(text).await,
                None => EntityExtraction::default(),
            }
        };
        let (summary, entities) = join(self.summarizer.summarize(text), entities).await;

        let transcript = self.normalizer.normalize(job_name, &raw, &entities);
        let sections = to_sections(
            &summary,
            transcript.first_segment_id().unwrap_or(FIRST_SEGMENT_ID),
        );

        if self.persist_summary && !summary.is_failed() {
            self.persist(job_name, &summary).await;
        }

        info!(
            job_name,
            segments = transcript.segments().len(),
            insights = transcript.insights().len(),
            summary_failed = summary.is_failed(),
            "Conversation loaded"
        );

        Ok(ConversationView {
            transcript,
            summary,
            sections,
        })
    }

    /// Annotate each summarized line of `sections` with medical entities
    ///
    /// Entities below the configured confidence are dropped. Returns nothing
    /// when Comprehend Medical is disabled.
    pub async fn extract_section_entities(&self, sections: &[SoapSection]) -> Vec<SectionEntities> {
        let Some(extractor) = &self.extractor else {
            return Vec::new();
        };
        let mut extracted = extractor.extract_sections(sections).await;
        for extraction in extracted.iter_mut().flat_map(|s| s.extracted_entities.iter_mut()) {
            extraction.retain_confident(self.min_confidence);
        }
        info!(sections = extracted.len(), "Summary entities extracted");
        extracted
    }

    /// Best-effort write of the note next to the transcript
    async fn persist(&self, job_name: &str, summary: &SoapNote) {
        let key = self.keys.summary_key(job_name);
        let body = match serde_json::to_vec_pretty(summary) {
            Ok(body) => body,
            Err(e) => {
                warn!(job_name, error = %e, "Could not serialize summary");
                return;
            }
        };
        if let Err(e) = self.store.put_object(&key, body, "application/json").await {
            warn!(job_name, key = %key, error = %e, "Could not persist summary");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    NotReady { job_name: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Error,
}

/// Dismissible user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub header: String,
    pub content: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, header: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            header: header.to_string(),
            content: content.to_string(),
        }
    }

    pub fn for_error(error: &AssistantError) -> Self {
        if error.is_not_ready() {
            Self::new(NotificationKind::Info, NOT_READY_HEADER, NOT_READY_CONTENT)
        } else {
            Self::new(NotificationKind::Error, LOAD_ERROR_HEADER, &error.to_string())
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Keeps notifications until they are dismissed
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|n| n.id != id);
        entries.len() != before
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        self.entries.lock().push(notification);
    }
}

/// One conversation view and its load state
///
/// `Idle → Loading → {Ready | NotReady | Failed}`. A failed attempt leaves
/// the previously published view in place; only [`Self::reload`] starts a
/// new attempt.
pub struct ConversationSession {
    loader: Arc<ConversationLoader>,
    notifier: Arc<dyn Notifier>,
    job_name: String,
    state: LoadState,
    view: Option<ConversationView>,
    section_entities: Vec<SectionEntities>,
}

impl ConversationSession {
    pub fn new(loader: Arc<ConversationLoader>, notifier: Arc<dyn Notifier>, job_name: &str) -> Self {
        Self {
            loader,
            notifier,
            job_name: job_name.to_string(),
            state: LoadState::Idle,
            view: None,
            section_entities: Vec::new(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn view(&self) -> Option<&ConversationView> {
        self.view.as_ref()
    }

    pub fn section_entities(&self) -> &[SectionEntities] {
        &self.section_entities
    }

    /// Extract entities from the current view's SOAP sections
    ///
    /// Does nothing before a view has been loaded.
    pub async fn extract_section_entities(&mut self) -> &[SectionEntities] {
        if let Some(view) = &self.view {
            self.section_entities = self.loader.extract_section_entities(&view.sections).await;
        }
        &self.section_entities
    }

    /// First load; a session that already attempted a load keeps its state
    pub async fn load(&mut self) -> &LoadState {
        if self.state == LoadState::Idle {
            return self.reload().await;
        }
        &self.state
    }

    pub async fn reload(&mut self) -> &LoadState {
        self.state = LoadState::Loading;
        self.state = match self.loader.load(&self.job_name).await {
            Ok(view) => {
                self.view = Some(view);
                self.section_entities.clear();
                LoadState::Ready
            }
            Err(e) => {
                warn!(job_name = %self.job_name, error = %e, "Conversation load did not complete");
                self.notifier.notify(Notification::for_error(&e));
                match e {
                    AssistantError::NotReady { job_name } => LoadState::NotReady { job_name },
                    other => LoadState::Failed {
                        message: other.to_string(),
                    },
                }
            }
        };
        &self.state
    }
}

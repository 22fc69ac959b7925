//! Clinical Assistant Engine
//!
//! Turns a recorded doctor-patient conversation into a structured clinical
//! record: a speaker-attributed transcript, a SOAP note and coded medical
//! entities, all linked back to the transcript segments they came from.
//!
//! # Pipeline
//!
//! 1. **Submit** - [`JobSubmitter`] uploads the recording to S3 and starts a
//!    medical transcription job
//! 2. **Poll** - [`JobPoller`] tracks the job until it completes or fails
//! 3. **Load** - [`ConversationLoader`] fetches the transcript and runs
//!    summarization (Bedrock) and entity extraction (Comprehend Medical)
//!    concurrently
//! 4. **Normalize** - [`TranscriptNormalizer`] builds the
//!    [`NormalizedDocument`] the presentation layer renders
//!
//! # Features
//!
//! - Diarized segments with pluggable speaker-to-role policies
//! - Chunked summarization for long consultations, merged in order
//! - ICD-10-CM, RxNorm and SNOMED CT concepts alongside general entities
//! - Per-line entities for the SOAP note, with a confidence threshold and a
//!   Comprehend Medical unit estimate
//! - Degrades instead of failing: a broken model response or a failed
//!   ontology call never takes the whole view down
//! - PHI-redacted logging through `logger-redacted`
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use clinical_assistant::{AssistantConfig, ConversationLoader, Providers};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AssistantConfig::from_env()?;
//! let providers = Providers::from_config(&config).await;
//! let loader = ConversationLoader::new(&providers, &config);
//!
//! let view = loader.load("consult-2024-03-01").await?;
//! for section in &view.sections {
//!     println!("{}: {} points", section.section_name, section.summary.len());
//! }
//! # Ok(())
//! # }
//! ```

mod chunking;

pub mod config;
pub mod document;
pub mod entities;
pub mod error;
pub mod jobs;
pub mod keys;
pub mod loader;
pub mod normalizer;
pub mod providers;
pub mod summary;
pub mod transcript;

pub use config::{AssistantConfig, CredentialsSource};
pub use document::*;
pub use entities::{
    BillingUnits, EntityExtraction, EntityExtractionAdapter, Ontology, RawEntity, SectionEntities,
};
pub use error::{AssistantError, AssistantResult};
pub use jobs::{
    validate_job_name, AudioUpload, JobHandle, JobPage, JobPoller, JobStatus, JobSubmitter,
    JobSummary, ListJobsQuery, PollState,
};
pub use keys::{S3Uri, StorageKeys};
pub use loader::{
    ConversationLoader, ConversationSession, ConversationView, LoadState, Notification,
    NotificationKind, NotificationLog, Notifier,
};
pub use normalizer::{
    CanonicalLabelPolicy, FirstSpeakerPolicy, FnRolePolicy, RolePolicy, TranscriptNormalizer,
};
pub use providers::Providers;
pub use summary::{SoapNote, SummarizationAdapter};
pub use transcript::RawTranscription;

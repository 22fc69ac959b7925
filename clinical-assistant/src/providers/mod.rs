//! Ports to the external services the assistant depends on
//!
//! The core never talks to AWS directly. Each service sits behind one of the
//! traits below, with an AWS implementation (feature `aws`) and an in-memory
//! implementation in [`memory`] for tests and offline runs.

pub mod memory;

#[cfg(feature = "aws")]
pub mod bedrock;
#[cfg(feature = "aws")]
pub mod comprehend_medical;
#[cfg(feature = "aws")]
pub mod s3;
#[cfg(feature = "aws")]
pub mod transcribe;

use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::{Ontology, RawEntity};
use crate::error::AssistantResult;
use crate::jobs::{JobPage, JobSummary, ListJobsQuery, StartJobRequest};

/// Object storage holding uploads, transcripts and cached summaries
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> AssistantResult<()>;

    /// Read an object; a missing key is [`crate::AssistantError::NotFound`]
    async fn get_object(&self, key: &str) -> AssistantResult<Vec<u8>>;
}

/// Medical transcription job management
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn start_job(&self, request: &StartJobRequest) -> AssistantResult<JobSummary>;

    async fn get_job(&self, job_name: &str) -> AssistantResult<JobSummary>;

    async fn list_jobs(&self, query: &ListJobsQuery) -> AssistantResult<JobPage>;

    async fn delete_job(&self, job_name: &str) -> AssistantResult<()>;
}

/// Foundation model returning free text for a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> AssistantResult<String>;
}

/// Medical entity recognition for a single ontology
#[async_trait]
pub trait EntityDetector: Send + Sync {
    async fn detect(&self, ontology: Ontology, text: &str) -> AssistantResult<Vec<RawEntity>>;
}

/// Every adapter the assistant needs, bundled for wiring
#[derive(Clone)]
pub struct Providers {
    pub store: Arc<dyn ObjectStore>,
    pub transcription: Arc<dyn TranscriptionService>,
    pub generator: Arc<dyn TextGenerator>,
    pub detector: Arc<dyn EntityDetector>,
}

#[cfg(feature = "aws")]
mod aws_wiring {
    use std::sync::Arc;

    use aws_config::{BehaviorVersion, Region, SdkConfig};
    use secrecy::ExposeSecret;
    use tracing::info;

    use super::{bedrock, comprehend_medical, s3, transcribe, Providers};
    use crate::config::{AssistantConfig, CredentialsSource};

    /// Resolve the shared SDK configuration for the configured credentials
    pub async fn load_sdk_config(config: &AssistantConfig) -> SdkConfig {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        let loader = match &config.credentials {
            CredentialsSource::Default => loader,
            CredentialsSource::Profile { name } => loader.profile_name(name),
            CredentialsSource::Static {
                access_key_id,
                secret_access_key,
                session_token,
            } => loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key_id,
                secret_access_key.expose_secret(),
                session_token.as_ref().map(|t| t.expose_secret().clone()),
                None,
                "clinical-assistant",
            )),
        };

        loader.load().await
    }

    impl Providers {
        /// AWS-backed adapters sharing one SDK configuration
        pub async fn from_config(config: &AssistantConfig) -> Self {
            info!(region = %config.region, bucket = %config.bucket_name, "Initializing AWS clients");
            let sdk_config = load_sdk_config(config).await;

            Self {
                store: Arc::new(s3::S3ObjectStore::new(&sdk_config, &config.bucket_name)),
                transcription: Arc::new(transcribe::HealthScribeService::new(&sdk_config)),
                generator: Arc::new(bedrock::BedrockTextGenerator::new(
                    &sdk_config,
                    &config.model_id,
                    config.max_tokens,
                )),
                detector: Arc::new(comprehend_medical::ComprehendMedicalDetector::new(&sdk_config)),
            }
        }
    }
}

#[cfg(feature = "aws")]
pub use aws_wiring::load_sdk_config;

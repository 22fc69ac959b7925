use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::entities::Ontology;
use crate::error::{AssistantError, AssistantResult};

pub const DEFAULT_REGION: &str = "ap-southeast-2";
pub const DEFAULT_TRANSCRIPT_PREFIX: &str = "transcripts";
pub const DEFAULT_UPLOAD_PREFIX: &str = "uploads/HealthScribeDemo";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-haiku-20240307-v1:0";
pub const DEFAULT_LANGUAGE_CODE: &str = "en-US";
pub const DEFAULT_SUMMARY_CHUNK_CHARS: usize = 10_000;
pub const DEFAULT_ENTITY_CHUNK_CHARS: usize = 20_000;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.75;

/// Where AWS credentials come from
///
/// Secret material is never serialized; a serialized config only records the
/// access key id.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialsSource {
    /// SDK default provider chain (environment, shared profile, instance role)
    Default,
    /// Named profile from the shared AWS config files
    Profile { name: String },
    /// Explicit keys, e.g. temporary credentials handed over by an identity pool
    Static {
        access_key_id: String,
        #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
        secret_access_key: SecretString,
        #[serde(default, skip_serializing, deserialize_with = "deserialize_optional_secret")]
        session_token: Option<SecretString>,
    },
}

impl CredentialsSource {
    pub fn from_keys(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        CredentialsSource::Static {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key.into()),
            session_token: session_token.map(SecretString::new),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(SecretString::new(String::deserialize(deserializer)?))
}

fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::new))
}

/// Clinical assistant configuration, handed to every adapter at construction
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantConfig {
    pub region: String,
    pub bucket_name: String,
    pub credentials: CredentialsSource,
    pub transcript_prefix: String,
    pub upload_prefix: String,
    pub language_code: String,
    pub max_speaker_labels: i32,
    pub model_id: String,
    pub max_tokens: u32,
    pub summary_chunk_chars: usize,
    pub entity_chunk_chars: usize,
    pub comprehend_medical_enabled: bool,
    pub ontologies: Vec<Ontology>,
    /// Insights scored below this are left out of the view
    pub min_confidence: f64,
    pub persist_summary: bool,
}

impl AssistantConfig {
    pub fn new(region: impl Into<String>, bucket_name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket_name: bucket_name.into(),
            credentials: CredentialsSource::Default,
            transcript_prefix: DEFAULT_TRANSCRIPT_PREFIX.to_string(),
            upload_prefix: DEFAULT_UPLOAD_PREFIX.to_string(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            max_speaker_labels: 2,
            model_id: DEFAULT_MODEL_ID.to_string(),
            max_tokens: 2000,
            summary_chunk_chars: DEFAULT_SUMMARY_CHUNK_CHARS,
            entity_chunk_chars: DEFAULT_ENTITY_CHUNK_CHARS,
            comprehend_medical_enabled: true,
            ontologies: vec![Ontology::Entities],
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            persist_summary: false,
        }
    }

    pub fn with_credentials(mut self, credentials: CredentialsSource) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_ontologies(mut self, ontologies: Vec<Ontology>) -> Self {
        self.ontologies = ontologies;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Only binaries should call this; library code receives an explicit config.
    pub fn from_env() -> AssistantResult<Self> {
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string());
        let bucket_name = std::env::var("BUCKET_NAME")
            .map_err(|_| AssistantError::Config("BUCKET_NAME is not set".to_string()))?;

        Self::new(region, bucket_name).with_env_overrides()
    }

    /// Apply every optional environment variable on top of `self`, then validate
    ///
    /// Region and bucket are left as given.
    pub fn with_env_overrides(self) -> AssistantResult<Self> {
        let credentials = match (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Ok(access_key_id), Ok(secret_access_key)) => CredentialsSource::from_keys(
                access_key_id,
                secret_access_key,
                std::env::var("AWS_SESSION_TOKEN").ok(),
            ),
            _ => match std::env::var("AWS_PROFILE") {
                Ok(name) => CredentialsSource::Profile { name },
                Err(_) => CredentialsSource::Default,
            },
        };

        let mut config = self.with_credentials(credentials);

        if let Ok(prefix) = std::env::var("TRANSCRIPT_PREFIX") {
            config.transcript_prefix = prefix;
        }
        if let Ok(prefix) = std::env::var("UPLOAD_PREFIX") {
            config.upload_prefix = prefix;
        }
        if let Ok(code) = std::env::var("LANGUAGE_CODE") {
            config.language_code = code;
        }
        if let Ok(model_id) = std::env::var("BEDROCK_MODEL_ID") {
            config.model_id = model_id;
        }

        config.max_speaker_labels = std::env::var("MAX_SPEAKER_LABELS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.max_speaker_labels);

        config.max_tokens = std::env::var("BEDROCK_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.max_tokens);

        config.summary_chunk_chars = std::env::var("SUMMARY_CHUNK_CHARS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.summary_chunk_chars);

        config.entity_chunk_chars = std::env::var("ENTITY_CHUNK_CHARS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.entity_chunk_chars);

        config.comprehend_medical_enabled = std::env::var("COMPREHEND_MEDICAL_ENABLED")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(config.comprehend_medical_enabled);

        config.persist_summary = std::env::var("PERSIST_SUMMARY")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(config.persist_summary);

        config.min_confidence = std::env::var("ENTITY_MIN_CONFIDENCE")
            .ok()
            .and_then(|s| parse_confidence(&s))
            .unwrap_or(config.min_confidence);

        if let Ok(list) = std::env::var("ENTITY_ONTOLOGIES") {
            config.ontologies = Ontology::parse_list(&list)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no adapter can work with
    pub fn validate(&self) -> AssistantResult<()> {
        if self.region.trim().is_empty() {
            return Err(AssistantError::Config("region must not be empty".to_string()));
        }
        if self.bucket_name.trim().is_empty() {
            return Err(AssistantError::Config("bucket_name must not be empty".to_string()));
        }
        if self.summary_chunk_chars == 0 || self.entity_chunk_chars == 0 {
            return Err(AssistantError::Config("chunk sizes must be positive".to_string()));
        }
        if self.max_speaker_labels < 2 {
            return Err(AssistantError::Config(
                "max_speaker_labels must be at least 2 for a two-party conversation".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(AssistantError::Config(
                "min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.comprehend_medical_enabled && self.ontologies.is_empty() {
            return Err(AssistantError::Config(
                "at least one ontology is required when Comprehend Medical is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accepts "enabled"/"disabled" as well as the usual boolean spellings
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Accepts a fraction (`0.75`) or a percentage (`75`)
fn parse_confidence(value: &str) -> Option<f64> {
    let parsed: f64 = value.trim().trim_end_matches('%').parse().ok()?;
    let fraction = if parsed > 1.0 { parsed / 100.0 } else { parsed };
    (0.0..=1.0).contains(&fraction).then_some(fraction)
}

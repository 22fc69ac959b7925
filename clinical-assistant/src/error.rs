use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested artifact does not exist yet; the job is still running.
    #[error("Transcript for job '{job_name}' is not ready yet")]
    NotReady { job_name: String },

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Invalid job name: {0}")]
    InvalidJobName(String),

    #[error("Malformed transcript: {0}")]
    MalformedTranscript(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transcription service error: {0}")]
    Transcription(String),

    #[error("Text generation error: {0}")]
    Generation(String),

    #[error("Entity extraction error: {0}")]
    EntityExtraction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AssistantError {
    /// True for the "still processing" condition, as opposed to a real failure.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, AssistantError::NotReady { .. })
    }
}

pub type AssistantResult<T> = Result<T, AssistantError>;

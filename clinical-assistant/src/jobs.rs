//! Transcription job submission, management and status polling

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::error::{AssistantError, AssistantResult};
use crate::keys::{S3Uri, StorageKeys};
use crate::providers::{ObjectStore, TranscriptionService};
use crate::transcript::RawTranscription;

const MAX_JOB_NAME_LEN: usize = 200;
const SPECIALTY: &str = "PRIMARYCARE";
const CONVERSATION_TYPE: &str = "CONVERSATION";
const JOB_TAGS: [(&str, &str); 2] = [
    ("Solution", "AWS_CLINICAL_ASSISTANT_AU"),
    ("Environment", "Workshop"),
];

/// Status as reported by the transcription service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "QUEUED" => Ok(JobStatus::Queued),
            "IN_PROGRESS" => Ok(JobStatus::InProgress),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(AssistantError::Transcription(format!("Unknown job status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartJobRequest {
    pub job_name: String,
    pub media_uri: S3Uri,
    pub output_bucket: String,
    pub output_key: String,
    pub language_code: String,
    pub specialty: String,
    pub conversation_type: String,
    pub max_speaker_labels: i32,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_name: String,
    pub status: JobStatus,
    pub language_code: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListJobsQuery {
    pub name_contains: Option<String>,
    pub status: Option<JobStatus>,
    pub max_results: Option<i32>,
    pub next_token: Option<String>,
}

impl ListJobsQuery {
    /// Status filter from user input; `ALL` (or nothing) lists every job
    pub fn with_status_filter(mut self, filter: Option<&str>) -> AssistantResult<Self> {
        self.status = match filter.map(str::trim) {
            None | Some("") => None,
            Some(f) if f.eq_ignore_ascii_case("all") => None,
            Some(f) => Some(f.parse()?),
        };
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    pub next_token: Option<String>,
}

/// Returned once audio is uploaded and the job accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_name: String,
    pub media_uri: String,
    pub transcript_key: String,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Job names become object keys, so keep them to a safe alphabet
pub fn validate_job_name(job_name: &str) -> AssistantResult<()> {
    if job_name.is_empty() {
        return Err(AssistantError::InvalidJobName("job name is required".to_string()));
    }
    if job_name.chars().count() > MAX_JOB_NAME_LEN {
        return Err(AssistantError::InvalidJobName(format!(
            "job name is longer than {} characters",
            MAX_JOB_NAME_LEN
        )));
    }
    if let Some(bad) = job_name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(AssistantError::InvalidJobName(format!(
            "'{}' is not allowed in a job name",
            bad
        )));
    }
    Ok(())
}

/// Uploads recordings, starts transcription jobs and manages existing ones
pub struct JobSubmitter {
    store: Arc<dyn ObjectStore>,
    transcription: Arc<dyn TranscriptionService>,
    keys: StorageKeys,
    language_code: String,
    max_speaker_labels: i32,
}

impl JobSubmitter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transcription: Arc<dyn TranscriptionService>,
        config: &AssistantConfig,
    ) -> Self {
        Self {
            store,
            transcription,
            keys: StorageKeys::from_config(config),
            language_code: config.language_code.clone(),
            max_speaker_labels: config.max_speaker_labels,
        }
    }

    pub async fn submit(&self, job_name: &str, audio: AudioUpload) -> AssistantResult<JobHandle> {
        validate_job_name(job_name)?;

        let upload_key = self.keys.upload_key(Uuid::new_v4(), &audio.file_name);
        info!(job_name, key = %upload_key, bytes = audio.bytes.len(), "Uploading recording");
        self.store
            .put_object(&upload_key, audio.bytes, &audio.content_type)
            .await?;

        let media_uri = S3Uri::new(self.store.bucket(), upload_key);
        let transcript_key = self.keys.transcript_key(job_name);
        let request = StartJobRequest {
            job_name: job_name.to_string(),
            media_uri: media_uri.clone(),
            output_bucket: self.store.bucket().to_string(),
            output_key: transcript_key.clone(),
            language_code: self.language_code.clone(),
            specialty: SPECIALTY.to_string(),
            conversation_type: CONVERSATION_TYPE.to_string(),
            max_speaker_labels: self.max_speaker_labels,
            tags: JOB_TAGS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        };

        let summary = self.transcription.start_job(&request).await?;
        info!(job_name, status = %summary.status, "Transcription job submitted");

        Ok(JobHandle {
            job_name: job_name.to_string(),
            media_uri: media_uri.to_string(),
            transcript_key,
            status: summary.status,
            started_at: summary.start_time.or(summary.creation_time),
        })
    }

    pub async fn status(&self, job_name: &str) -> AssistantResult<JobSummary> {
        self.transcription.get_job(job_name).await
    }

    pub async fn list(&self, query: &ListJobsQuery) -> AssistantResult<JobPage> {
        self.transcription.list_jobs(query).await
    }

    pub async fn delete(&self, job_name: &str) -> AssistantResult<()> {
        info!(job_name, "Deleting transcription job");
        self.transcription.delete_job(job_name).await
    }

    pub fn poller(&self, job_name: &str) -> JobPoller {
        JobPoller::new(
            job_name,
            self.transcription.clone(),
            self.store.clone(),
            self.keys.clone(),
        )
    }
}

/// Where a submitted job stands, as far as the poller knows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    Submitted,
    InProgress,
    Completed,
    Failed { reason: String },
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Completed | PollState::Failed { .. })
    }

    fn from_summary(summary: &JobSummary) -> Self {
        match summary.status {
            JobStatus::Queued => PollState::Submitted,
            JobStatus::InProgress => PollState::InProgress,
            JobStatus::Completed => PollState::Completed,
            JobStatus::Failed => PollState::Failed {
                reason: summary
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "no failure reason reported".to_string()),
            },
        }
    }
}

/// Explicit job-status state machine
///
/// Every [`JobPoller::poll`] issues one status query. Once the job is
/// `Completed` or `Failed` the poller stops querying. The transcript is only
/// fetched after the job has completed.
pub struct JobPoller {
    job_name: String,
    state: PollState,
    polls: u32,
    transcription: Arc<dyn TranscriptionService>,
    store: Arc<dyn ObjectStore>,
    keys: StorageKeys,
}

impl JobPoller {
    pub fn new(
        job_name: &str,
        transcription: Arc<dyn TranscriptionService>,
        store: Arc<dyn ObjectStore>,
        keys: StorageKeys,
    ) -> Self {
        Self {
            job_name: job_name.to_string(),
            state: PollState::Submitted,
            polls: 0,
            transcription,
            store,
            keys,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Number of status queries issued so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub async fn poll(&mut self) -> AssistantResult<PollState> {
        if self.state.is_terminal() {
            return Ok(self.state.clone());
        }

        self.polls = self.polls.saturating_add(1);
        let summary = self.transcription.get_job(&self.job_name).await?;
        let next = PollState::from_summary(&summary);
        if next != self.state {
            debug!(job_name = %self.job_name, from = ?self.state, to = ?next, "Job state changed");
        }
        if let PollState::Failed { reason } = &next {
            warn!(job_name = %self.job_name, reason = %reason, "Transcription job failed");
        }
        self.state = next;
        Ok(self.state.clone())
    }

    /// Poll until the job settles or `max_polls` queries have been made
    pub async fn poll_until_settled(&mut self, interval: Duration, max_polls: u32) -> AssistantResult<PollState> {
        for attempt in 1..=max_polls {
            let state = self.poll().await?;
            if state.is_terminal() || attempt == max_polls {
                return Ok(state);
            }
            tokio::time::sleep(interval).await;
        }
        Ok(self.state.clone())
    }

    /// Fetch the transcription result of a completed job
    pub async fn fetch_transcript(&self) -> AssistantResult<RawTranscription> {
        if self.state != PollState::Completed {
            return Err(AssistantError::NotReady {
                job_name: self.job_name.clone(),
            });
        }
        let key = self.keys.transcript_key(&self.job_name);
        let bytes = self.store.get_object(&key).await.map_err(|e| match e {
            AssistantError::NotFound { .. } => AssistantError::NotReady {
                job_name: self.job_name.clone(),
            },
            other => other,
        })?;
        RawTranscription::from_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{InMemoryObjectStore, InMemoryTranscriptionService};

    fn config() -> AssistantConfig {
        AssistantConfig::new("ap-southeast-2", "clinical-bucket")
    }

    fn audio() -> AudioUpload {
        AudioUpload {
            file_name: "recordings/visit.wav".to_string(),
            content_type: "audio/wav".to_string(),
            bytes: vec![0u8; 16],
        }
    }

    #[test]
    fn test_job_name_validation() {
        assert!(validate_job_name("visit-2024.01_a").is_ok());
        assert!(validate_job_name("").is_err());
        assert!(validate_job_name("has space").is_err());
        assert!(validate_job_name("slash/name").is_err());
        assert!(validate_job_name(&"a".repeat(201)).is_err());
        assert!(validate_job_name(&"a".repeat(200)).is_ok());
    }

    #[test]
    fn test_status_filter_all_means_no_filter() {
        let query = ListJobsQuery::default().with_status_filter(Some("ALL")).unwrap();
        assert_eq!(query.status, None);
        let query = ListJobsQuery::default().with_status_filter(Some("in_progress")).unwrap();
        assert_eq!(query.status, Some(JobStatus::InProgress));
        assert!(ListJobsQuery::default().with_status_filter(Some("done")).is_err());
    }

    #[tokio::test]
    async fn test_submit_uploads_audio_and_starts_job() {
        let store = Arc::new(InMemoryObjectStore::new("clinical-bucket"));
        let transcription = Arc::new(InMemoryTranscriptionService::new());
        let submitter = JobSubmitter::new(store.clone(), transcription.clone(), &config());

        let handle = submitter.submit("visit-1", audio()).await.unwrap();

        assert_eq!(handle.status, JobStatus::Queued);
        assert_eq!(handle.transcript_key, "transcripts/visit-1.json");
        assert!(handle.media_uri.starts_with("s3://clinical-bucket/uploads/HealthScribeDemo/"));
        assert!(handle.media_uri.ends_with("/visit.wav"));
        assert_eq!(store.keys().len(), 1);

        let request = transcription.started().pop().unwrap();
        assert_eq!(request.output_key, "transcripts/visit-1.json");
        assert_eq!(request.output_bucket, "clinical-bucket");
        assert_eq!(request.max_speaker_labels, 2);
        assert_eq!(request.specialty, "PRIMARYCARE");
        assert!(request
            .tags
            .contains(&("Solution".to_string(), "AWS_CLINICAL_ASSISTANT_AU".to_string())));
    }

    #[tokio::test]
    async fn test_invalid_name_uploads_nothing() {
        let store = Arc::new(InMemoryObjectStore::new("clinical-bucket"));
        let submitter = JobSubmitter::new(
            store.clone(),
            Arc::new(InMemoryTranscriptionService::new()),
            &config(),
        );

        let err = submitter.submit("bad name", audio()).await.unwrap_err();
        assert!(matches!(err, AssistantError::InvalidJobName(_)));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_poller_walks_the_state_machine() {
        let store = Arc::new(InMemoryObjectStore::new("clinical-bucket"));
        let transcription = Arc::new(InMemoryTranscriptionService::new());
        let submitter = JobSubmitter::new(store.clone(), transcription.clone(), &config());
        submitter.submit("visit-1", audio()).await.unwrap();

        let mut poller = submitter.poller("visit-1");
        assert_eq!(poller.poll().await.unwrap(), PollState::Submitted);
        assert!(poller.fetch_transcript().await.unwrap_err().is_not_ready());

        transcription.set_status("visit-1", JobStatus::InProgress, None);
        assert_eq!(poller.poll().await.unwrap(), PollState::InProgress);

        transcription.set_status("visit-1", JobStatus::Completed, None);
        store.insert(
            "transcripts/visit-1.json",
            br#"{"results":{"transcripts":[{"transcript":"hi"}],"items":[]}}"#.to_vec(),
        );
        assert_eq!(poller.poll().await.unwrap(), PollState::Completed);
        assert_eq!(poller.fetch_transcript().await.unwrap().plain_text(), "hi");

        // terminal: no further status queries
        let polls = poller.polls();
        poller.poll().await.unwrap();
        assert_eq!(poller.polls(), polls);
    }

    #[tokio::test]
    async fn test_poller_reports_failure_reason() {
        let store = Arc::new(InMemoryObjectStore::new("clinical-bucket"));
        let transcription = Arc::new(InMemoryTranscriptionService::new());
        let submitter = JobSubmitter::new(store, transcription.clone(), &config());
        submitter.submit("visit-2", audio()).await.unwrap();
        transcription.set_status("visit-2", JobStatus::Failed, Some("Unsupported media format"));

        let mut poller = submitter.poller("visit-2");
        let state = poller
            .poll_until_settled(Duration::from_millis(1), 5)
            .await
            .unwrap();
        assert_eq!(
            state,
            PollState::Failed {
                reason: "Unsupported media format".to_string()
            }
        );
        assert_eq!(poller.polls(), 1);
        assert!(poller.fetch_transcript().await.unwrap_err().is_not_ready());
    }

    #[tokio::test]
    async fn test_poll_until_settled_gives_up_after_max_polls() {
        let store = Arc::new(InMemoryObjectStore::new("clinical-bucket"));
        let transcription = Arc::new(InMemoryTranscriptionService::new());
        let submitter = JobSubmitter::new(store, transcription.clone(), &config());
        submitter.submit("visit-3", audio()).await.unwrap();
        transcription.set_status("visit-3", JobStatus::InProgress, None);

        let mut poller = submitter.poller("visit-3");
        let state = poller
            .poll_until_settled(Duration::from_millis(1), 3)
            .await
            .unwrap();
        assert_eq!(state, PollState::InProgress);
        assert_eq!(poller.polls(), 3);
    }

    #[tokio::test]
    async fn test_unknown_job_status_is_an_error() {
        let store = Arc::new(InMemoryObjectStore::new("clinical-bucket"));
        let transcription = Arc::new(InMemoryTranscriptionService::new());
        let submitter = JobSubmitter::new(store, transcription, &config());

        let mut poller = submitter.poller("missing");
        assert!(matches!(
            poller.poll().await,
            Err(AssistantError::Transcription(_))
        ));
        assert_eq!(poller.state(), &PollState::Submitted);
    }
}

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_transcribe::primitives::DateTime as SdkDateTime;
use aws_sdk_transcribe::types::{
    LanguageCode, Media, MedicalTranscriptionJob, MedicalTranscriptionJobSummary,
    MedicalTranscriptionSetting, Specialty, Tag, TranscriptionJobStatus, Type,
};
use aws_sdk_transcribe::Client as TranscribeClient;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::TranscriptionService;
use crate::error::{AssistantError, AssistantResult};
use crate::jobs::{JobPage, JobStatus, JobSummary, ListJobsQuery, StartJobRequest};

/// Amazon Transcribe Medical conversation jobs
pub struct HealthScribeService {
    client: TranscribeClient,
}

impl HealthScribeService {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: TranscribeClient::new(sdk_config),
        }
    }
}

fn to_chrono(time: Option<&SdkDateTime>) -> Option<DateTime<Utc>> {
    time.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
}

fn to_status(status: Option<&TranscriptionJobStatus>) -> AssistantResult<JobStatus> {
    status
        .ok_or_else(|| AssistantError::Transcription("job has no status".to_string()))?
        .as_str()
        .parse()
}

fn job_summary(job: &MedicalTranscriptionJob) -> AssistantResult<JobSummary> {
    Ok(JobSummary {
        job_name: job.medical_transcription_job_name().unwrap_or_default().to_string(),
        status: to_status(job.transcription_job_status())?,
        language_code: job.language_code().map(|c| c.as_str().to_string()),
        creation_time: to_chrono(job.creation_time()),
        start_time: to_chrono(job.start_time()),
        completion_time: to_chrono(job.completion_time()),
        failure_reason: job.failure_reason().map(str::to_string),
    })
}

fn list_entry(job: &MedicalTranscriptionJobSummary) -> AssistantResult<JobSummary> {
    Ok(JobSummary {
        job_name: job.medical_transcription_job_name().unwrap_or_default().to_string(),
        status: to_status(job.transcription_job_status())?,
        language_code: job.language_code().map(|c| c.as_str().to_string()),
        creation_time: to_chrono(job.creation_time()),
        start_time: to_chrono(job.start_time()),
        completion_time: to_chrono(job.completion_time()),
        failure_reason: job.failure_reason().map(str::to_string),
    })
}

#[async_trait]
impl TranscriptionService for HealthScribeService {
    async fn start_job(&self, request: &StartJobRequest) -> AssistantResult<JobSummary> {
        let settings = MedicalTranscriptionSetting::builder()
            .show_speaker_labels(true)
            .max_speaker_labels(request.max_speaker_labels)
            .build();

        let mut call = self
            .client
            .start_medical_transcription_job()
            .medical_transcription_job_name(&request.job_name)
            .language_code(LanguageCode::from(request.language_code.as_str()))
            .media(Media::builder().media_file_uri(request.media_uri.to_string()).build())
            .output_bucket_name(&request.output_bucket)
            .output_key(&request.output_key)
            .specialty(Specialty::from(request.specialty.as_str()))
            .r#type(Type::from(request.conversation_type.as_str()))
            .settings(settings);

        for (key, value) in &request.tags {
            let tag = Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| AssistantError::Transcription(format!("Invalid job tag {}: {}", key, e)))?;
            call = call.tags(tag);
        }

        info!(job_name = %request.job_name, media = %request.media_uri, "StartMedicalTranscriptionJob");
        let output = call.send().await.map_err(|e| {
            AssistantError::Transcription(format!(
                "Failed to start job {}: {}",
                request.job_name,
                e.into_service_error()
            ))
        })?;

        output
            .medical_transcription_job()
            .map(job_summary)
            .transpose()?
            .ok_or_else(|| AssistantError::Transcription("start response carried no job".to_string()))
    }

    async fn get_job(&self, job_name: &str) -> AssistantResult<JobSummary> {
        debug!(job_name, "GetMedicalTranscriptionJob");
        let output = self
            .client
            .get_medical_transcription_job()
            .medical_transcription_job_name(job_name)
            .send()
            .await
            .map_err(|e| {
                AssistantError::Transcription(format!(
                    "Failed to get job {}: {}",
                    job_name,
                    e.into_service_error()
                ))
            })?;

        output
            .medical_transcription_job()
            .map(job_summary)
            .transpose()?
            .ok_or_else(|| AssistantError::Transcription(format!("job {} not found", job_name)))
    }

    async fn list_jobs(&self, query: &ListJobsQuery) -> AssistantResult<JobPage> {
        let output = self
            .client
            .list_medical_transcription_jobs()
            .set_status(query.status.map(|s| TranscriptionJobStatus::from(s.as_str())))
            .set_job_name_contains(query.name_contains.clone())
            .set_max_results(query.max_results)
            .set_next_token(query.next_token.clone())
            .send()
            .await
            .map_err(|e| {
                AssistantError::Transcription(format!("Failed to list jobs: {}", e.into_service_error()))
            })?;

        let jobs = output
            .medical_transcription_job_summaries()
            .iter()
            .map(list_entry)
            .collect::<AssistantResult<Vec<_>>>()?;

        Ok(JobPage {
            jobs,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn delete_job(&self, job_name: &str) -> AssistantResult<()> {
        self.client
            .delete_medical_transcription_job()
            .medical_transcription_job_name(job_name)
            .send()
            .await
            .map_err(|e| {
                AssistantError::Transcription(format!(
                    "Failed to delete job {}: {}",
                    job_name,
                    e.into_service_error()
                ))
            })?;
        Ok(())
    }
}

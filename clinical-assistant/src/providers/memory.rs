//! In-memory adapters for tests and offline runs

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{EntityDetector, ObjectStore, TextGenerator, TranscriptionService};
use crate::entities::{Ontology, RawEntity};
use crate::error::{AssistantError, AssistantResult};
use crate::jobs::{JobPage, JobStatus, JobSummary, ListJobsQuery, StartJobRequest};

/// Bucket backed by a map
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_writes: Mutex<bool>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.objects.lock().insert(key.to_string(), body);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self) {
        *self.failing_writes.lock() = true;
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, _content_type: &str) -> AssistantResult<()> {
        if *self.failing_writes.lock() {
            return Err(AssistantError::Storage(format!("write to {} rejected", key)));
        }
        self.insert(key, body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> AssistantResult<Vec<u8>> {
        self.get(key).ok_or_else(|| AssistantError::NotFound {
            key: key.to_string(),
        })
    }
}

/// Replays canned model responses in order, recording every prompt
#[derive(Debug, Default)]
pub struct ScriptedTextGenerator {
    responses: Mutex<VecDeque<AssistantResult<String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: &str) -> Self {
        self.responses.lock().push_back(Ok(response.to_string()));
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.responses
            .lock()
            .push_back(Err(AssistantError::Generation(message.to_string())));
        self
    }

    /// Response used once the script runs out
    pub fn with_fallback(mut self, response: &str) -> Self {
        self.fallback = Some(response.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate(&self, prompt: &str) -> AssistantResult<String> {
        self.prompts.lock().push(prompt.to_string());
        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AssistantError::Generation("no scripted response left".to_string())),
        }
    }
}

/// Returns the same entities for every call of an ontology
#[derive(Debug, Default)]
pub struct StaticEntityDetector {
    entities: HashMap<Ontology, Vec<RawEntity>>,
    failing: Vec<Ontology>,
    calls: AtomicUsize,
}

impl StaticEntityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(mut self, ontology: Ontology, entities: Vec<RawEntity>) -> Self {
        self.entities.insert(ontology, entities);
        self
    }

    pub fn with_failure(mut self, ontology: Ontology) -> Self {
        self.failing.push(ontology);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityDetector for StaticEntityDetector {
    async fn detect(&self, ontology: Ontology, _text: &str) -> AssistantResult<Vec<RawEntity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&ontology) {
            return Err(AssistantError::EntityExtraction(format!(
                "{} detection unavailable",
                ontology
            )));
        }
        Ok(self.entities.get(&ontology).cloned().unwrap_or_default())
    }
}

/// Job registry whose statuses are advanced by the test
#[derive(Debug, Default)]
pub struct InMemoryTranscriptionService {
    jobs: Mutex<BTreeMap<String, JobSummary>>,
    started: Mutex<Vec<StartJobRequest>>,
}

impl InMemoryTranscriptionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, job_name: &str, status: JobStatus, failure_reason: Option<&str>) {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .entry(job_name.to_string())
            .or_insert_with(|| summary(job_name, JobStatus::Queued));
        job.status = status;
        job.failure_reason = failure_reason.map(str::to_string);
        if status == JobStatus::Completed {
            job.completion_time = Some(Utc::now());
        }
    }

    /// Requests received by `start_job`, oldest first
    pub fn started(&self) -> Vec<StartJobRequest> {
        self.started.lock().clone()
    }
}

fn summary(job_name: &str, status: JobStatus) -> JobSummary {
    JobSummary {
        job_name: job_name.to_string(),
        status,
        language_code: None,
        creation_time: Some(Utc::now()),
        start_time: None,
        completion_time: None,
        failure_reason: None,
    }
}

#[async_trait]
impl TranscriptionService for InMemoryTranscriptionService {
    async fn start_job(&self, request: &StartJobRequest) -> AssistantResult<JobSummary> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&request.job_name) {
            return Err(AssistantError::Transcription(format!(
                "job {} already exists",
                request.job_name
            )));
        }
        let mut job = summary(&request.job_name, JobStatus::Queued);
        job.language_code = Some(request.language_code.clone());
        jobs.insert(request.job_name.clone(), job.clone());
        self.started.lock().push(request.clone());
        Ok(job)
    }

    async fn get_job(&self, job_name: &str) -> AssistantResult<JobSummary> {
        self.jobs
            .lock()
            .get(job_name)
            .cloned()
            .ok_or_else(|| AssistantError::Transcription(format!("job {} not found", job_name)))
    }

    async fn list_jobs(&self, query: &ListJobsQuery) -> AssistantResult<JobPage> {
        let limit = query
            .max_results
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::MAX);
        let jobs = self
            .jobs
            .lock()
            .values()
            .filter(|job| query.status.map_or(true, |s| job.status == s))
            .filter(|job| {
                query
                    .name_contains
                    .as_deref()
                    .map_or(true, |part| job.job_name.contains(part))
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(JobPage {
            jobs,
            next_token: None,
        })
    }

    async fn delete_job(&self, job_name: &str) -> AssistantResult<()> {
        self.jobs
            .lock()
            .remove(job_name)
            .map(|_| ())
            .ok_or_else(|| AssistantError::Transcription(format!("job {} not found", job_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = InMemoryObjectStore::new("bucket");
        let err = store.get_object("nope").await.unwrap_err();
        assert!(matches!(err, AssistantError::NotFound { ref key } if key == "nope"));
    }

    #[tokio::test]
    async fn test_scripted_generator_replays_in_order() {
        let generator = ScriptedTextGenerator::new()
            .with_response("one")
            .with_failure("throttled")
            .with_fallback("again");

        assert_eq!(generator.generate("a").await.unwrap(), "one");
        assert!(generator.generate("b").await.is_err());
        assert_eq!(generator.generate("c").await.unwrap(), "again");
        assert_eq!(generator.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_status() {
        let service = InMemoryTranscriptionService::new();
        service.set_status("a", JobStatus::Completed, None);
        service.set_status("b", JobStatus::InProgress, None);

        let query = ListJobsQuery {
            status: Some(JobStatus::Completed),
            ..Default::default()
        };
        let page = service.list_jobs(&query).await.unwrap();
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].job_name, "a");

        service.delete_job("a").await.unwrap();
        assert!(service.get_job("a").await.is_err());
    }
}

//! Object key conventions shared by the submitter, the poller and the loader
//!
//! Transcription output lands at `<transcript prefix>/<job>.json`, cached SOAP
//! notes at `<transcript prefix>/<job>_summary.json` and uploaded audio at
//! `<upload prefix>/<uuid>/<file name>`.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::error::AssistantError;

const TRANSCRIPT_SUFFIX: &str = ".json";
const SUMMARY_SUFFIX: &str = "_summary.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    transcript_prefix: String,
    upload_prefix: String,
}

impl StorageKeys {
    pub fn new(transcript_prefix: &str, upload_prefix: &str) -> Self {
        Self {
            transcript_prefix: transcript_prefix.trim_matches('/').to_string(),
            upload_prefix: upload_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(&config.transcript_prefix, &config.upload_prefix)
    }

    pub fn transcript_key(&self, job_name: &str) -> String {
        join(&self.transcript_prefix, &format!("{}{}", job_name, TRANSCRIPT_SUFFIX))
    }

    pub fn summary_key(&self, job_name: &str) -> String {
        join(&self.transcript_prefix, &format!("{}{}", job_name, SUMMARY_SUFFIX))
    }

    /// Key for an uploaded recording; directory parts of `file_name` are dropped
    pub fn upload_key(&self, upload_id: Uuid, file_name: &str) -> String {
        let base_name = file_name
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("audio");
        join(&self.upload_prefix, &format!("{}/{}", upload_id, base_name))
    }

    /// Recover the job name from a transcript key written by [`Self::transcript_key`]
    pub fn job_name_from_transcript_key(&self, key: &str) -> Option<String> {
        let relative = if self.transcript_prefix.is_empty() {
            key
        } else {
            key.strip_prefix(self.transcript_prefix.as_str())?.strip_prefix('/')?
        };
        if relative.ends_with(SUMMARY_SUFFIX) || relative.contains('/') {
            return None;
        }
        relative
            .strip_suffix(TRANSCRIPT_SUFFIX)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// `s3://bucket/key` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("s3://")
            .ok_or_else(|| AssistantError::Storage(format!("Not an s3:// URI: {}", s)))?;
        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self::new(bucket, key)),
            _ => Err(AssistantError::Storage(format!("S3 URI needs a bucket and a key: {}", s))),
        }
    }
}

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

use super::ObjectStore;
use crate::error::{AssistantError, AssistantResult};

/// Single S3 bucket holding uploads, transcripts and summaries
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig, bucket: &str) -> Self {
        Self::with_client(S3Client::new(sdk_config), bucket)
    }

    pub fn with_client(client: S3Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> AssistantResult<()> {
        debug!(bucket = %self.bucket, key, bytes = body.len(), "PutObject");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| AssistantError::Storage(format!("S3 upload of {} failed: {}", key, e)))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> AssistantResult<Vec<u8>> {
        debug!(bucket = %self.bucket, key, "GetObject");
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(AssistantError::NotFound { key: key.to_string() });
                }
                return Err(AssistantError::Storage(format!(
                    "S3 download of {} failed: {}",
                    key, service_error
                )));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| AssistantError::Storage(format!("Failed to read S3 object {}: {}", key, e)))?;
        Ok(body.into_bytes().to_vec())
    }
}

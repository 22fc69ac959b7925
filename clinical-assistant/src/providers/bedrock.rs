use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TextGenerator;
use crate::error::{AssistantError, AssistantResult};

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    anthropic_version: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic messages model invoked through Bedrock
pub struct BedrockTextGenerator {
    client: BedrockClient,
    model_id: String,
    max_tokens: u32,
}

impl BedrockTextGenerator {
    pub fn new(sdk_config: &SdkConfig, model_id: &str, max_tokens: u32) -> Self {
        Self {
            client: BedrockClient::new(sdk_config),
            model_id: model_id.to_string(),
            max_tokens,
        }
    }

    fn request_body(&self, prompt: &str) -> AssistantResult<Vec<u8>> {
        let request = MessagesRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: vec![ContentBlock { kind: "text", text: prompt }],
            }],
        };
        Ok(serde_json::to_vec(&request)?)
    }
}

/// First text block of a messages response
fn response_text(body: &[u8]) -> AssistantResult<String> {
    let response: MessagesResponse = serde_json::from_slice(body)?;
    response
        .content
        .into_iter()
        .find_map(|block| block.text)
        .ok_or_else(|| AssistantError::Generation("model response has no text content".to_string()))
}

#[async_trait]
impl TextGenerator for BedrockTextGenerator {
    async fn generate(&self, prompt: &str) -> AssistantResult<String> {
        debug!(model_id = %self.model_id, prompt_chars = prompt.chars().count(), "InvokeModel");
        let output = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(self.request_body(prompt)?))
            .send()
            .await
            .map_err(|e| {
                AssistantError::Generation(format!(
                    "Bedrock invocation of {} failed: {}",
                    self.model_id,
                    e.into_service_error()
                ))
            })?;

        response_text(output.body().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_takes_first_text_block() {
        let body = br#"{"id":"msg_1","content":[{"type":"text","text":"{\"Subjective\":\"cough\"}"}],"stop_reason":"end_turn"}"#;
        assert_eq!(response_text(body).unwrap(), r#"{"Subjective":"cough"}"#);
    }

    #[test]
    fn test_response_without_text_is_an_error() {
        assert!(matches!(
            response_text(br#"{"content":[]}"#),
            Err(AssistantError::Generation(_))
        ));
        assert!(response_text(b"not json").is_err());
    }
}

//! Wire format of a medical transcription result
//!
//! The result object is owned by the transcription service, so every field
//! below the top-level `results` object is optional and tolerant: numbers may
//! arrive as strings, unexpected types fall back to defaults, and list
//! elements that cannot be read are skipped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{AssistantError, AssistantResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTranscription {
    #[serde(rename = "jobName", default, deserialize_with = "lenient_option_string")]
    pub job_name: Option<String>,
    pub results: RawResults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResults {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub transcripts: Vec<RawTranscriptText>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub items: Vec<RawItem>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub speaker_labels: Option<RawSpeakerLabels>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTranscriptText {
    #[serde(default, deserialize_with = "lenient_string")]
    pub transcript: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub start_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub end_time: Option<f64>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub alternatives: Vec<RawAlternative>,
}

impl RawItem {
    pub fn is_punctuation(&self) -> bool {
        self.kind == "punctuation"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlternative {
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpeakerLabels {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub segments: Vec<RawSpeakerSegment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpeakerSegment {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub start_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub end_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub speaker_label: String,
}

impl RawTranscription {
    /// Parse a stored transcription result
    ///
    /// Fails only when the payload is not JSON or has no `results` object.
    pub fn from_slice(bytes: &[u8]) -> AssistantResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| AssistantError::MalformedTranscript(e.to_string()))
    }

    pub fn from_value(value: Value) -> AssistantResult<Self> {
        serde_json::from_value(value).map_err(|e| AssistantError::MalformedTranscript(e.to_string()))
    }

    /// Full transcript text (`results.transcripts[0].transcript`), empty when absent
    pub fn plain_text(&self) -> &str {
        self.results
            .transcripts
            .first()
            .map_or("", |t| t.transcript.as_str())
    }

    pub fn speaker_segments(&self) -> &[RawSpeakerSegment] {
        self.results
            .speaker_labels
            .as_ref()
            .map_or(&[], |labels| labels.segments.as_slice())
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_option_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(lenient_string(deserializer)?).filter(|s| !s.is_empty()))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(values) => values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_transcribe_output() {
        let raw = RawTranscription::from_value(json!({
            "jobName": "visit-1",
            "results": {
                "transcripts": [{ "transcript": "Hello there." }],
                "items": [
                    { "start_time": "0.5", "end_time": "0.9", "type": "pronunciation",
                      "alternatives": [{ "content": "Hello", "confidence": "0.98" }] },
                    { "type": "punctuation", "alternatives": [{ "content": ".", "confidence": "0.0" }] }
                ],
                "speaker_labels": {
                    "speakers": 2,
                    "segments": [{ "start_time": "0.5", "end_time": "0.9", "speaker_label": "spk_0", "items": [] }]
                }
            }
        }))
        .unwrap();

        assert_eq!(raw.job_name.as_deref(), Some("visit-1"));
        assert_eq!(raw.plain_text(), "Hello there.");
        assert_eq!(raw.results.items.len(), 2);
        assert_eq!(raw.results.items[0].start_time, Some(0.5));
        assert!(raw.results.items[1].is_punctuation());
        assert_eq!(raw.results.items[1].start_time, None);
        assert_eq!(raw.speaker_segments().len(), 1);
    }

    #[test]
    fn test_numbers_and_garbage_are_tolerated() {
        let raw = RawTranscription::from_value(json!({
            "results": {
                "transcripts": "not a list",
                "items": [
                    { "start_time": 1.25, "end_time": "abc", "type": 7, "alternatives": {} },
                    null,
                    42
                ],
                "speaker_labels": "nope"
            }
        }))
        .unwrap();

        assert_eq!(raw.plain_text(), "");
        assert_eq!(raw.results.items.len(), 1);
        let item = &raw.results.items[0];
        assert_eq!(item.start_time, Some(1.25));
        assert_eq!(item.end_time, None);
        assert_eq!(item.kind, "7");
        assert!(item.alternatives.is_empty());
        assert!(raw.speaker_segments().is_empty());
    }

    #[test]
    fn test_missing_results_is_malformed() {
        let err = RawTranscription::from_value(json!({ "jobName": "x" })).unwrap_err();
        assert!(matches!(err, AssistantError::MalformedTranscript(_)));

        let err = RawTranscription::from_slice(b"<html>").unwrap_err();
        assert!(matches!(err, AssistantError::MalformedTranscript(_)));
    }
}

//! Clinical Assistant CLI
//!
//! Submits recordings for transcription, follows the jobs and prints the
//! resulting conversation view (transcript, SOAP note, clinical insights).
//!
//! Usage:
//!   clinical-assistant submit --job-name visit-42 --audio visit.wav
//!   clinical-assistant wait visit-42 --interval-secs 15
//!   clinical-assistant load visit-42 --output visit-42.json --section-entities
//!   clinical-assistant normalize --transcript visit-42.json --entities entities.json --summary note.json
//!
//! Configuration comes from the environment (or a `.env` file): `BUCKET_NAME`,
//! `AWS_REGION`, `AWS_PROFILE`, `BEDROCK_MODEL_ID`, `ENTITY_ONTOLOGIES`, ...

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use clinical_assistant::summary::{parse_model_output, to_sections};
use clinical_assistant::{
    AssistantConfig, AudioUpload, BillingUnits, ConversationLoader, ConversationSession,
    ConversationView, EntityExtraction, JobSubmitter, ListJobsQuery, LoadState, Notification,
    NotificationKind, Notifier, PollState, Providers, RawTranscription, SectionEntities, SoapNote,
    TranscriptNormalizer,
};
use logger_redacted::{LogFormat, LoggerConfig};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "clinical-assistant")]
#[command(about = "Transcribe, summarize and annotate clinical conversations")]
struct Cli {
    /// S3 bucket for recordings, transcripts and summaries
    #[arg(long, global = true, env = "BUCKET_NAME")]
    bucket: Option<String>,

    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION", default_value = "ap-southeast-2")]
    region: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output: pretty, json or bunyan
    #[arg(long, global = true, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Directory for daily rotated log files
    #[arg(long, global = true, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a recording and start a transcription job
    Submit {
        /// Job name ([0-9A-Za-z._-], at most 200 characters)
        #[arg(long)]
        job_name: String,

        /// Audio file to upload
        #[arg(long)]
        audio: PathBuf,

        /// Content type; guessed from the file extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Show the status of a job
    Status { job_name: String },

    /// Poll a job until it completes or fails
    Wait {
        job_name: String,

        #[arg(long, default_value = "10")]
        interval_secs: u64,

        #[arg(long, default_value = "60")]
        max_polls: u32,
    },

    /// List transcription jobs
    List {
        /// QUEUED, IN_PROGRESS, COMPLETED, FAILED or ALL
        #[arg(long, default_value = "ALL")]
        status: String,

        #[arg(long)]
        name_contains: Option<String>,

        #[arg(long)]
        max_results: Option<i32>,

        #[arg(long)]
        next_token: Option<String>,
    },

    /// Delete a transcription job
    Delete { job_name: String },

    /// Load a finished conversation and print its view
    Load {
        job_name: String,

        /// Write the view here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also extract entities from every line of the SOAP note
        #[arg(long)]
        section_entities: bool,
    },

    /// Normalize local result files without calling AWS
    Normalize {
        /// Transcription result JSON
        #[arg(long)]
        transcript: PathBuf,

        /// Entity extraction JSON ({"Entities": [...]} or {"Results": [...]})
        #[arg(long)]
        entities: Option<PathBuf>,

        /// SOAP note JSON or raw model output to derive sections from
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Name used when the transcript has no jobName
        #[arg(long, default_value = "local")]
        job_name: String,

        #[arg(long, env = "LANGUAGE_CODE", default_value = "en-US")]
        language_code: String,
    },
}

/// Conversation view together with the per-line SOAP entities
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AnnotatedView<'a> {
    #[serde(flatten)]
    view: &'a ConversationView,
    section_entities: &'a [SectionEntities],
    units: BillingUnits,
}

/// Prints notifications to stderr the way a flash bar would show them
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        let label = match notification.kind {
            NotificationKind::Info => "info",
            NotificationKind::Error => "error",
        };
        eprintln!("[{}] {}: {}", label, notification.header, notification.content);
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "mp4" | "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        "amr" => "audio/amr",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<AssistantConfig> {
    let bucket = cli
        .bucket
        .clone()
        .context("BUCKET_NAME (or --bucket) is required")?;
    Ok(AssistantConfig::new(cli.region.clone(), bucket).with_env_overrides()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut logger = LoggerConfig::default()
        .with_level(&cli.log_level)
        .with_format(cli.log_format.parse::<LogFormat>()?);
    logger.log_directory = cli.log_dir.clone();
    let _guard = logger_redacted::init(&logger)?;

    // Offline command, no AWS configuration needed
    if let Command::Normalize {
        transcript,
        entities,
        summary,
        job_name,
        language_code,
    } = &cli.command
    {
        return normalize(
            transcript,
            entities.as_deref(),
            summary.as_deref(),
            job_name,
            language_code,
        )
        .await;
    }

    let config = load_config(&cli)?;
    let providers = Providers::from_config(&config).await;
    let submitter = JobSubmitter::new(
        providers.store.clone(),
        providers.transcription.clone(),
        &config,
    );

    match cli.command {
        Command::Submit {
            job_name,
            audio,
            content_type,
        } => {
            let bytes = tokio::fs::read(&audio)
                .await
                .with_context(|| format!("Failed to read {}", audio.display()))?;
            let upload = AudioUpload {
                file_name: audio
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio")
                    .to_string(),
                content_type: content_type.unwrap_or_else(|| content_type_for(&audio).to_string()),
                bytes,
            };
            let handle = submitter.submit(&job_name, upload).await?;
            print_json(&handle)?;
        }
        Command::Status { job_name } => {
            print_json(&submitter.status(&job_name).await?)?;
        }
        Command::Wait {
            job_name,
            interval_secs,
            max_polls,
        } => {
            let mut poller = submitter.poller(&job_name);
            let state = poller
                .poll_until_settled(Duration::from_secs(interval_secs), max_polls)
                .await?;
            print_json(&state)?;
            match state {
                PollState::Completed => info!(job_name = %job_name, "Transcript is ready"),
                PollState::Failed { reason } => bail!("Job {} failed: {}", job_name, reason),
                _ => bail!("Job {} did not settle after {} polls", job_name, max_polls),
            }
        }
        Command::List {
            status,
            name_contains,
            max_results,
            next_token,
        } => {
            let query = ListJobsQuery {
                name_contains,
                max_results,
                next_token,
                ..Default::default()
            }
            .with_status_filter(Some(status.as_str()))?;
            print_json(&submitter.list(&query).await?)?;
        }
        Command::Delete { job_name } => {
            submitter.delete(&job_name).await?;
            info!(job_name = %job_name, "Job deleted");
        }
        Command::Load {
            job_name,
            output,
            section_entities,
        } => {
            let loader = Arc::new(ConversationLoader::new(&providers, &config));
            let mut session = ConversationSession::new(loader, Arc::new(ConsoleNotifier), &job_name);
            match session.load().await {
                LoadState::Ready => {}
                LoadState::NotReady { .. } => return Ok(()),
                other => bail!("Loading {} ended in {:?}", job_name, other),
            }
            if section_entities {
                session.extract_section_entities().await;
            }
            if let Some(view) = session.view() {
                let units = view.billing_units();
                info!(
                    each_segment = units.each_segment,
                    each_section = units.each_section,
                    all_at_once = units.all_at_once,
                    "Comprehend Medical units for the SOAP note"
                );
                let json = if section_entities {
                    serde_json::to_string_pretty(&AnnotatedView {
                        view,
                        section_entities: session.section_entities(),
                        units,
                    })?
                } else {
                    serde_json::to_string_pretty(view)?
                };
                match output {
                    Some(path) => {
                        tokio::fs::write(&path, json)
                            .await
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        info!(path = %path.display(), "Conversation view written");
                    }
                    None => println!("{}", json),
                }
            }
        }
        Command::Normalize { .. } => {}
    }

    Ok(())
}

async fn normalize(
    transcript: &Path,
    entities: Option<&Path>,
    summary: Option<&Path>,
    job_name: &str,
    language_code: &str,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(transcript)
        .await
        .with_context(|| format!("Failed to read {}", transcript.display()))?;
    let raw = RawTranscription::from_slice(&bytes)?;

    let extraction = match entities {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            EntityExtraction::from_json(&bytes)?
        }
        None => EntityExtraction::default(),
    };

    let summary = match summary {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse_model_output(&text)
        }
        None => SoapNote::default(),
    };

    let document = TranscriptNormalizer::new(language_code).normalize(job_name, &raw, &extraction);
    let sections = to_sections(&summary, document.first_segment_id().unwrap_or("seg-0"));
    info!(
        segments = document.segments().len(),
        insights = document.insights().len(),
        "Transcript normalized"
    );

    print_json(&ConversationView {
        transcript: document,
        summary,
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for(Path::new("visit.WAV")), "audio/wav");
        assert_eq!(content_type_for(Path::new("visit.m4a")), "audio/mp4");
        assert_eq!(content_type_for(Path::new("visit")), "application/octet-stream");
    }

    #[test]
    fn test_load_section_entities_flag() {
        let cli = Cli::try_parse_from([
            "clinical-assistant",
            "--bucket",
            "b",
            "load",
            "visit-42",
            "--section-entities",
        ])
        .unwrap();
        match cli.command {
            Command::Load { section_entities, .. } => assert!(section_entities),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_list_defaults_to_all_statuses() {
        let cli = Cli::try_parse_from(["clinical-assistant", "--bucket", "b", "list"]).unwrap();
        match cli.command {
            Command::List { status, .. } => assert_eq!(status, "ALL"),
            other => panic!("unexpected command {:?}", other),
        }
    }
}

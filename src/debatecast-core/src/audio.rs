//! Text-to-speech rendering of a parsed script through ElevenLabs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ELEVENLABS_API_KEY_VAR, VoicesConfig};
use crate::error::{PipelineError, Result};
use crate::persona::Persona;
use crate::script::ScriptLine;

const SLUG_CHARS: usize = 30;

/// Turns text into encoded audio bytes for a voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;

    /// Fails when no request could succeed, such as a missing API key.
    fn ready(&self) -> Result<()> {
        Ok(())
    }
}

/// A voice available to the configured ElevenLabs account.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
}

impl std::fmt::Debug for ElevenLabsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsClient")
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ElevenLabsClient {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        voices: &VoicesConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_id: voices.tts_model.clone(),
            stability: voices.stability,
            similarity_boost: voices.similarity_boost,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or(PipelineError::MissingConfig(ELEVENLABS_API_KEY_VAR))
    }

    /// List the voices available to this account.
    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(format!("{}/v1/voices", self.base_url))
            .header("xi-api-key", self.api_key()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Upstream {
                service: "ElevenLabs",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: VoicesResponse = response.json().await?;
        Ok(body.voices)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    fn ready(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let body = json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": self.stability,
                "similarity_boost": self.similarity_boost,
            }
        });

        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", self.base_url, voice_id))
            .header("xi-api-key", self.api_key()?)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Upstream {
                service: "ElevenLabs",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// What to do when one line fails to synthesize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the line as skipped and keep going.
    #[default]
    Skip,
    /// Stop at the failing line.
    Abort,
}

/// A rendered line on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioSegment {
    /// 0-based index into the script lines.
    pub index: usize,
    pub speaker: Persona,
    pub text: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLine {
    pub index: usize,
    pub speaker: Persona,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioReport {
    pub segments: Vec<AudioSegment>,
    pub skipped: Vec<SkippedLine>,
}

/// Progress events emitted while rendering.
#[derive(Debug, Clone)]
pub enum AudioEvent {
    LineStarted {
        index: usize,
        total: usize,
        speaker: Persona,
    },
    LineSaved {
        index: usize,
        path: PathBuf,
    },
    LineSkipped {
        index: usize,
        error: String,
    },
}

pub type AudioCallback = Box<dyn Fn(AudioEvent) + Send + Sync>;

/// Renders script lines to one audio file each.
pub struct AudioRenderer {
    synth: Arc<dyn SpeechSynthesizer>,
    voices: VoicesConfig,
    output_dir: PathBuf,
    policy: FailurePolicy,
    callback: Option<AudioCallback>,
}

impl AudioRenderer {
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        voices: VoicesConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            synth,
            voices,
            output_dir: output_dir.into(),
            policy: FailurePolicy::default(),
            callback: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set a callback for progress events.
    pub fn with_callback(mut self, callback: AudioCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ready(&self) -> Result<()> {
        self.synth.ready()
    }

    /// Synthesize every line in order.
    ///
    /// Files written before an aborting failure stay on disk.
    pub async fn render(&self, lines: &[ScriptLine]) -> Result<AudioReport> {
        std::fs::create_dir_all(&self.output_dir)?;
        let mut report = AudioReport::default();
        let total = lines.len();

        for (index, line) in lines.iter().enumerate() {
            self.emit(AudioEvent::LineStarted {
                index,
                total,
                speaker: line.speaker,
            });

            let voice_id = self.voices.voice_for(line.speaker);
            let bytes = match self.synthesize_line(index, line, voice_id).await {
                Ok(bytes) => bytes,
                Err(e @ PipelineError::MissingConfig(_)) => return Err(e),
                Err(e) => match self.policy {
                    FailurePolicy::Abort => {
                        tracing::error!(line = index + 1, error = %e, "audio synthesis failed, aborting");
                        return Err(e);
                    }
                    FailurePolicy::Skip => {
                        tracing::warn!(line = index + 1, error = %e, "audio synthesis failed, skipping line");
                        self.emit(AudioEvent::LineSkipped {
                            index,
                            error: e.to_string(),
                        });
                        report.skipped.push(SkippedLine {
                            index,
                            speaker: line.speaker,
                            error: e.to_string(),
                        });
                        continue;
                    }
                },
            };

            let path = self
                .output_dir
                .join(segment_filename(index, line.speaker, &line.text));
            std::fs::write(&path, &bytes)?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved audio segment");

            self.emit(AudioEvent::LineSaved {
                index,
                path: path.clone(),
            });
            report.segments.push(AudioSegment {
                index,
                speaker: line.speaker,
                text: line.text.clone(),
                path,
            });
        }

        tracing::info!(
            saved = report.segments.len(),
            skipped = report.skipped.len(),
            "audio rendering finished"
        );
        Ok(report)
    }

    async fn synthesize_line(&self, index: usize, line: &ScriptLine, voice_id: &str) -> Result<Vec<u8>> {
        let bytes = self.synth.synthesize(&line.text, voice_id).await?;
        if bytes.is_empty() {
            return Err(PipelineError::EmptyAudio { line: index + 1 });
        }
        Ok(bytes)
    }

    fn emit(&self, event: AudioEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// `{NN}_{PERSONA}_{slug}.mp3` with a 1-based, zero-padded index.
pub fn segment_filename(index: usize, speaker: Persona, text: &str) -> String {
    let slug: String = text
        .chars()
        .take(SLUG_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("{:02}_{}_{}.mp3", index + 1, speaker.tag(), slug)
}

/// An audio file as listed to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFileEntry {
    pub filename: String,
    pub path: String,
    pub speaker: Option<Persona>,
}

/// `.mp3` and `.wav` files in `dir`, sorted by name. A missing directory
/// lists as empty.
pub fn list_audio_files<P: AsRef<Path>>(dir: P) -> Result<Vec<AudioFileEntry>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        if audio_content_type(&filename).is_none() {
            continue;
        }
        let speaker = filename.split('_').nth(1).and_then(Persona::from_tag);
        entries.push(AudioFileEntry {
            path: format!("/audio/{}", filename),
            filename,
            speaker,
        });
    }

    entries.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(entries)
}

/// Delete the audio files a previous run left in `dir`.
pub fn clear_audio_files<P: AsRef<Path>>(dir: P) -> Result<usize> {
    let dir = dir.as_ref();
    let files = list_audio_files(dir)?;
    for file in &files {
        std::fs::remove_file(dir.join(&file.filename))?;
    }
    Ok(files.len())
}

/// Content type for a served audio file, by extension.
pub fn audio_content_type(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        _ => None,
    }
}

//! Scripted stand-ins for the LLM and TTS seams.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::audio::SpeechSynthesizer;
use crate::config::ELEVENLABS_API_KEY_VAR;
use crate::error::{PipelineError, Result};
use crate::llm::{Completion, CompletionModel, CompletionRequest};

/// Replies with queued responses in order and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, content: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(content.into()));
        self
    }

    pub fn fail(self, error: PipelineError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        let content = next.unwrap_or_else(|| {
            Err(PipelineError::Upstream {
                service: "scripted model",
                status: 500,
                body: "no reply queued".to_string(),
            })
        })?;
        let raw = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        });
        Ok(Completion { content, raw })
    }
}

/// Returns `text.len()` bytes of audio per call, or nothing for texts
/// listed as silent.
#[derive(Default)]
pub struct FakeSpeech {
    silent: Vec<String>,
    unavailable: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent_for(mut self, text: impl Into<String>) -> Self {
        self.silent.push(text.into());
        self
    }

    /// Report a missing ElevenLabs key from `ready`.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// `(voice_id, text)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    fn ready(&self) -> Result<()> {
        if self.unavailable {
            return Err(PipelineError::MissingConfig(ELEVENLABS_API_KEY_VAR));
        }
        Ok(())
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .push((voice_id.to_string(), text.to_string()));
        if self.silent.iter().any(|s| s == text) {
            return Ok(Vec::new());
        }
        Ok(vec![0xFF; text.len()])
    }
}
